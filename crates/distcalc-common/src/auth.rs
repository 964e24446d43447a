// Copyright 2025 Distcalc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Authentication for the public calculator API
//!
//! Callers identify themselves with an API key in the `X-API-Key` header.
//! Each configured key maps to an owner identity, and tasks are scoped to the
//! owner that submitted them.
//!
//! - **Disabled** (default): every caller is anonymous and sees every task
//! - **API keys**: a missing or unknown key is rejected with
//!   [`DistcalcError::Unauthorized`]
//!
//! Keys are compared in constant time.
//!
//! # Example
//!
//! ```
//! use distcalc_common::auth::AuthConfig;
//!
//! let auth = AuthConfig::disabled().with_key("alice", "alice-secret");
//! assert_eq!(auth.authenticate(Some("alice-secret")).unwrap(), Some("alice".to_string()));
//! assert!(auth.authenticate(None).is_err());
//!
//! let open = AuthConfig::disabled();
//! assert_eq!(open.authenticate(None).unwrap(), None);
//! ```

use std::fmt;

use crate::error::{DistcalcError, Result};

/// Name of the header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Resolves API keys to owner identities.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// `(owner, key)` pairs; empty means authentication is disabled
    keys: Vec<(String, String)>,
}

impl AuthConfig {
    /// Creates a configuration that accepts every caller anonymously.
    pub fn disabled() -> Self {
        Self { keys: Vec::new() }
    }

    /// Adds an API key for `owner`, enabling authentication.
    ///
    /// # Arguments
    ///
    /// * `owner` - Identity that tasks submitted with this key belong to
    /// * `api_key` - Secret the caller sends in `X-API-Key`
    pub fn with_key(mut self, owner: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.keys.push((owner.into(), api_key.into()));
        self
    }

    /// Parses an `OWNER:KEY` entry as given on the command line.
    ///
    /// # Returns
    ///
    /// The `(owner, key)` pair, or a [`DistcalcError::Protocol`] error if
    /// either side is empty or the separator is missing.
    pub fn parse_entry(entry: &str) -> Result<(String, String)> {
        match entry.split_once(':') {
            Some((owner, key)) if !owner.is_empty() && !key.is_empty() => {
                Ok((owner.to_string(), key.to_string()))
            }
            _ => Err(DistcalcError::Protocol(format!(
                "API key entry '{}' must have the form OWNER:KEY",
                entry
            ))),
        }
    }

    pub fn requires_auth(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Resolves the caller behind an optional API key.
    ///
    /// # Returns
    ///
    /// - `Ok(None)` when authentication is disabled
    /// - `Ok(Some(owner))` when the key matches a configured entry
    /// - `Err(Unauthorized)` when authentication is enabled and the key is
    ///   missing or unknown
    pub fn authenticate(&self, provided_key: Option<&str>) -> Result<Option<String>> {
        if !self.requires_auth() {
            return Ok(None);
        }

        let provided_key = provided_key.ok_or(DistcalcError::Unauthorized)?;

        // Check every entry so the timing does not reveal which one matched
        let mut owner = None;
        for (candidate, key) in &self.keys {
            if constant_time_eq(key, provided_key) && owner.is_none() {
                owner = Some(candidate.clone());
            }
        }

        owner.map(Some).ok_or(DistcalcError::Unauthorized)
    }
}

impl fmt::Display for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.requires_auth() {
            write!(f, "ApiKey({} owners)", self.keys.len())
        } else {
            write!(f, "Disabled")
        }
    }
}

/// Compares two strings without short-circuiting on the first difference.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}
