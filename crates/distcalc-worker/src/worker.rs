use std::time::{Duration, Instant};

use distcalc_client::CalcClient;
use distcalc_common::expr::Fragment;
use distcalc_common::protocol::ResultReport;
use distcalc_common::{DistcalcError, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::cost::CostModel;

/// Waits out the operator's cost, then evaluates the fragment.
///
/// Division by zero and non-finite results come back as
/// [`DistcalcError::Compute`].
pub async fn compute(fragment: &Fragment, costs: &CostModel) -> Result<f64> {
    let delay = costs.delay(fragment.operator());
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    fragment.evaluate()
}

/// A pull-based compute worker.
///
/// Each compute loop repeatedly takes one subtask from the orchestrator,
/// computes it and reports the outcome. Loops are independent; the
/// orchestrator never hands the same subtask to two of them while a lease is
/// live.
#[derive(Clone)]
pub struct Worker {
    client: CalcClient,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(client: CalcClient, config: WorkerConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn client(&self) -> &CalcClient {
        &self.client
    }

    /// Runs a single pull, compute and report cycle.
    ///
    /// # Returns
    /// - `Ok(true)` - a subtask was processed and its outcome reported
    /// - `Ok(false)` - the orchestrator had nothing to hand out
    /// - `Err(...)` - the pull failed, or the report failed after retries
    pub async fn process_one(&self) -> Result<bool> {
        let Some(subtask) = self.client.request_subtask().await? else {
            return Ok(false);
        };
        debug!(
            "Took subtask '{}' of task {}",
            subtask.fragment, subtask.task_id
        );

        let report = match subtask.fragment.parse::<Fragment>() {
            Ok(fragment) => match compute(&fragment, &self.config.costs).await {
                Ok(value) => ResultReport::finished(subtask.task_id, subtask.fragment, value),
                Err(e) => {
                    warn!("Task {}: {}", subtask.task_id, e);
                    ResultReport::error(subtask.task_id, subtask.fragment)
                }
            },
            Err(e) => {
                warn!(
                    "Task {}: cannot compute '{}': {}",
                    subtask.task_id, subtask.fragment, e
                );
                ResultReport::error(subtask.task_id, subtask.fragment)
            }
        };

        self.report_with_retry(&report).await?;
        Ok(true)
    }

    /// Sends a report, retrying transient failures with exponential backoff.
    async fn report_with_retry(&self, report: &ResultReport) -> Result<()> {
        let retry = &self.config.retry;
        let mut backoff_ms = retry.initial_backoff_ms;
        let mut last_error: Option<DistcalcError> = None;

        for attempt in 0..=retry.max_retries {
            match self.client.report(report).await {
                Ok(()) => {
                    if attempt > 0 {
                        info!(
                            "Report for task {} delivered on attempt {}",
                            report.task_id,
                            attempt + 1
                        );
                    }
                    return Ok(());
                }
                Err(e) if attempt < retry.max_retries && e.is_retryable() => {
                    warn!(
                        "Report for task {} failed (attempt {}): {}, retrying in {}ms",
                        report.task_id,
                        attempt + 1,
                        e,
                        backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = retry.next_backoff(backoff_ms);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DistcalcError::Transport("report was never attempted".to_string())
        }))
    }

    /// Starts `computing_power` compute loops in the background.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loops = self.config.computing_power.max(1);

        info!(
            "Starting {} compute loops against {}",
            loops,
            self.client.base_url()
        );

        let handles = (0..loops)
            .map(|index| {
                let worker = self.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move { worker.run(index, shutdown).await })
            })
            .collect();

        WorkerHandle {
            shutdown: shutdown_tx,
            handles,
        }
    }

    async fn run(&self, index: usize, mut shutdown: watch::Receiver<bool>) {
        debug!("Compute loop {} started", index);
        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                _ = shutdown.changed() => break,
                outcome = self.process_one() => outcome,
            };

            let idle = match outcome {
                Ok(processed) => !processed,
                Err(e) => {
                    warn!("Compute loop {}: {}", index, e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }
        debug!("Compute loop {} stopped", index);
    }
}

/// Handle to a running worker pool.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Number of compute loops in the pool.
    pub fn loops(&self) -> usize {
        self.handles.len()
    }

    /// Signals every loop to stop and waits for them.
    ///
    /// A loop interrupted mid-subtask drops it without reporting; the
    /// orchestrator's lease sweep hands it out again.
    pub async fn shutdown(self) {
        let started = Instant::now();
        let _ = self.shutdown.send(true);
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                warn!("Compute loop ended abnormally: {}", e);
            }
        }
        info!("Worker pool stopped in {:?}", started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use distcalc_common::expr::Operator;

    fn unreachable_worker() -> Worker {
        let client = CalcClient::new("http://127.0.0.1:1").unwrap();
        Worker::new(
            client,
            WorkerConfig {
                computing_power: 2,
                poll_interval: Duration::from_millis(10),
                costs: CostModel::zero(),
                retry: RetryConfig::none(),
            },
        )
    }

    #[tokio::test]
    async fn test_compute_values() {
        let costs = CostModel::zero();
        let cases = [
            (Fragment::new("2", "3", Operator::Add), 5.0),
            (Fragment::new("2", "3", Operator::Sub), -1.0),
            (Fragment::new("-2", "3", Operator::Mul), -6.0),
            (Fragment::new("7", "2", Operator::Div), 3.5),
        ];
        for (fragment, expected) in cases {
            assert_eq!(compute(&fragment, &costs).await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_compute_division_by_zero() {
        let fragment = Fragment::new("5", "0", Operator::Div);
        let err = compute(&fragment, &CostModel::zero()).await.unwrap_err();
        assert!(matches!(err, DistcalcError::Compute(_)));
    }

    #[tokio::test]
    async fn test_compute_waits_for_operator_cost() {
        let costs = CostModel {
            multiplication: Duration::from_millis(30),
            ..CostModel::zero()
        };

        let started = Instant::now();
        compute(&Fragment::new("2", "2", Operator::Add), &costs)
            .await
            .unwrap();
        let fast = started.elapsed();

        let started = Instant::now();
        compute(&Fragment::new("2", "2", Operator::Mul), &costs)
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(fast < Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_process_one_propagates_transport_errors() {
        let err = unreachable_worker().process_one().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_spawn_and_shutdown() {
        let handle = unreachable_worker().spawn();
        assert_eq!(handle.loops(), 2);

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("pool did not stop");
    }
}
