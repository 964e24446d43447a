//! Command bodies for the `distcalc` binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use distcalc_client::CalcClient;
use distcalc_common::auth::AuthConfig;
use distcalc_common::protocol::TaskId;
use distcalc_orchestrator::{HttpServer, LeaseConfig, Orchestrator};
use distcalc_worker::{Worker, WorkerConfig};

/// Validates that a URL string starts with http:// or https://
///
/// # Arguments
///
/// * `url` - The URL string to validate
/// * `description` - What the URL is for, used in the error (e.g. "orchestrator URL")
pub fn validate_http_url(url: &str, description: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow!(
            "Invalid {}: '{}' must start with http:// or https://",
            description,
            url
        ))
    }
}

/// Builds the orchestrator's auth config from repeated `OWNER:KEY` entries.
///
/// No entries means authentication is disabled.
pub fn auth_from_entries(entries: &[String]) -> Result<AuthConfig> {
    let mut auth = AuthConfig::disabled();
    for entry in entries {
        let (owner, key) = AuthConfig::parse_entry(entry)?;
        auth = auth.with_key(owner, key);
    }
    Ok(auth)
}

/// Lease settings from command line flags, falling back to defaults.
///
/// # Errors
///
/// Fails if the lease is enabled with a zero timeout or sweep interval.
pub fn lease_config(
    lease_timeout_ms: Option<u64>,
    sweep_interval_ms: Option<u64>,
    disable: bool,
) -> Result<LeaseConfig> {
    let defaults = LeaseConfig::default();
    let config = LeaseConfig {
        lease_timeout: lease_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.lease_timeout),
        sweep_interval: sweep_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.sweep_interval),
        enabled: !disable,
    };
    config.validate()?;
    Ok(config)
}

/// Worker settings given on the command line.
///
/// Every field left `None` keeps the value from the environment (or the
/// default).
#[derive(Debug, Default, Clone)]
pub struct WorkerOverrides {
    pub computing_power: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub time_addition_ms: Option<u64>,
    pub time_subtraction_ms: Option<u64>,
    pub time_multiplication_ms: Option<u64>,
    pub time_division_ms: Option<u64>,
}

impl WorkerOverrides {
    pub fn apply(&self, mut config: WorkerConfig) -> Result<WorkerConfig> {
        if let Some(power) = self.computing_power {
            config.computing_power = power;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.time_addition_ms {
            config.costs.addition = Duration::from_millis(ms);
        }
        if let Some(ms) = self.time_subtraction_ms {
            config.costs.subtraction = Duration::from_millis(ms);
        }
        if let Some(ms) = self.time_multiplication_ms {
            config.costs.multiplication = Duration::from_millis(ms);
        }
        if let Some(ms) = self.time_division_ms {
            config.costs.division = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Runs an orchestrator until the server stops.
pub async fn run_orchestrator(bind: &str, auth: AuthConfig, lease: LeaseConfig) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| anyhow!("Invalid bind address {}: {}", bind, e))?;

    if lease.enabled {
        tracing::info!(
            "Subtask lease: {:?}, swept every {:?}",
            lease.lease_timeout,
            lease.sweep_interval
        );
    } else {
        tracing::info!("Subtask lease disabled");
    }
    if auth.requires_auth() {
        tracing::info!("API key authentication enabled: {}", auth);
    }

    let orchestrator = Arc::new(Orchestrator::with_config(lease));
    HttpServer::new(orchestrator)
        .with_auth(auth)
        .run(addr)
        .await?;
    Ok(())
}

/// Runs a worker pool until Ctrl-C, then stops it.
pub async fn run_worker(orchestrator_url: &str, config: WorkerConfig) -> Result<()> {
    validate_http_url(orchestrator_url, "orchestrator URL")?;

    tracing::info!(
        "Worker: {} compute loops, costs {:?}",
        config.computing_power,
        config.costs
    );
    let client = CalcClient::new(orchestrator_url)?;
    let handle = Worker::new(client, config).spawn();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down worker pool");
    handle.shutdown().await;
    Ok(())
}

/// Submits an expression and returns the stored task as raw JSON.
pub async fn submit(
    url: &str,
    id: TaskId,
    expression: &str,
    api_key: Option<String>,
) -> Result<String> {
    let client = client_for(url, api_key)?;
    client.submit(id, expression).await?;
    let task = client.task(id).await?;
    Ok(serde_json::to_string(&task)?)
}

/// Fetches one task, or all visible tasks, as raw JSON.
pub async fn get(url: &str, id: Option<TaskId>, api_key: Option<String>) -> Result<String> {
    let client = client_for(url, api_key)?;
    let json = match id {
        Some(id) => serde_json::to_string(&client.task(id).await?)?,
        None => serde_json::to_string(&client.tasks().await?)?,
    };
    Ok(json)
}

fn client_for(url: &str, api_key: Option<String>) -> Result<CalcClient> {
    validate_http_url(url, "orchestrator URL")?;
    let client = CalcClient::new(url)?;
    Ok(match api_key {
        Some(key) => client.with_api_key(key),
        None => client,
    })
}
