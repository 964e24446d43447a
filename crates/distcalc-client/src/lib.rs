pub mod client;

pub use client::{CalcClient, ClientConfig};
