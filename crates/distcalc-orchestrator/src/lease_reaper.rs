use std::sync::Arc;
use std::time::{Duration, Instant};

use distcalc_common::{DistcalcError, Result};
use tracing::{error, info};

use crate::store::TaskStore;

/// Assignment lease configuration.
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// How long a worker may hold a subtask before it is handed out again
    pub lease_timeout: Duration,
    /// How often expired leases are looked for
    pub sweep_interval: Duration,
    /// When false no reaper runs and assigned subtasks wait forever
    pub enabled: bool,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(5),
            enabled: true,
        }
    }
}

impl LeaseConfig {
    /// Checks that an enabled lease can actually expire and be swept.
    ///
    /// # Errors
    ///
    /// [`DistcalcError::Protocol`] if the lease is enabled with a zero
    /// timeout or a zero sweep interval.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.lease_timeout.is_zero() {
            return Err(DistcalcError::Protocol(
                "lease timeout must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(DistcalcError::Protocol(
                "lease sweep interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Background task returning expired assignments to the queue.
pub struct LeaseReaper {
    store: Arc<TaskStore>,
    config: LeaseConfig,
}

impl LeaseReaper {
    /// Creates a new lease reaper.
    ///
    /// # Arguments
    /// * `store` - The store whose assignments are swept
    /// * `config` - Lease configuration
    pub fn new(store: Arc<TaskStore>, config: LeaseConfig) -> Self {
        Self { store, config }
    }

    /// Starts the reaper task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Main sweep loop
    async fn run(self) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);

        loop {
            interval.tick().await;
            if let Err(e) = self.sweep(Instant::now()).await {
                error!("Lease sweep failed: {}", e);
            }
        }
    }

    /// Requeues every assignment older than the lease timeout at `now`.
    pub async fn sweep(&self, now: Instant) -> Result<usize> {
        let deadline = match now.checked_sub(self.config.lease_timeout) {
            Some(deadline) => deadline,
            None => return Ok(0),
        };

        let requeued = self.store.requeue_expired(deadline).await?;
        if requeued > 0 {
            info!("Requeued {} subtasks with expired leases", requeued);
        }
        Ok(requeued)
    }
}
