//! Worker configuration.
//!
//! Defaults can be overridden from the environment:
//!
//! | variable | field | default |
//! |---|---|---|
//! | `COMPUTING_POWER` | number of concurrent compute loops | 10 |
//! | `POLL_INTERVAL_MS` | idle wait between empty pulls | 1000 |
//! | `TIME_ADDITION_MS` | delay for `+` | 5000 |
//! | `TIME_SUBTRACTION_MS` | delay for `-` | 5000 |
//! | `TIME_MULTIPLICATIONS_MS` | delay for `*` | 15000 |
//! | `TIME_DIVISIONS_MS` | delay for `/` | 15000 |
//!
//! Command line flags are applied on top by the CLI.

use std::time::Duration;

use distcalc_common::{DistcalcError, Result};

use crate::cost::CostModel;

pub const ENV_COMPUTING_POWER: &str = "COMPUTING_POWER";
pub const ENV_POLL_INTERVAL_MS: &str = "POLL_INTERVAL_MS";
pub const ENV_TIME_ADDITION_MS: &str = "TIME_ADDITION_MS";
pub const ENV_TIME_SUBTRACTION_MS: &str = "TIME_SUBTRACTION_MS";
pub const ENV_TIME_MULTIPLICATIONS_MS: &str = "TIME_MULTIPLICATIONS_MS";
pub const ENV_TIME_DIVISIONS_MS: &str = "TIME_DIVISIONS_MS";

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Number of compute loops, each handling one subtask at a time
    pub computing_power: usize,
    /// Wait after an empty pull or a failed request
    pub poll_interval: Duration,
    pub costs: CostModel,
    pub retry: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            computing_power: 10,
            poll_interval: Duration::from_millis(1000),
            costs: CostModel::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff for resending a result report after a transient failure.
///
/// A computed result is not thrown away on the first connection error; the
/// report is retried up to `max_retries` more times, each wait multiplied by
/// `backoff_multiplier` and capped at `max_backoff_ms`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Default: 3
    pub max_retries: usize,
    /// Default: 50ms
    pub initial_backoff_ms: u64,
    /// Default: 5000ms
    pub max_backoff_ms: u64,
    /// Default: 2.0
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Wait before the next attempt, given the previous wait.
    pub fn next_backoff(&self, backoff_ms: u64) -> u64 {
        std::cmp::min(
            (backoff_ms as f64 * self.backoff_multiplier) as u64,
            self.max_backoff_ms,
        )
    }
}

impl WorkerConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// Overrides fields from `lookup`, which maps a variable name to its
    /// value.
    ///
    /// # Errors
    ///
    /// [`DistcalcError::Protocol`] naming the variable if a value is not a
    /// non-negative integer, or if `COMPUTING_POWER` is zero.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(power) = parse_var(&lookup, ENV_COMPUTING_POWER)? {
            self.computing_power = power as usize;
        }
        if let Some(ms) = parse_var(&lookup, ENV_POLL_INTERVAL_MS)? {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, ENV_TIME_ADDITION_MS)? {
            self.costs.addition = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, ENV_TIME_SUBTRACTION_MS)? {
            self.costs.subtraction = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, ENV_TIME_MULTIPLICATIONS_MS)? {
            self.costs.multiplication = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, ENV_TIME_DIVISIONS_MS)? {
            self.costs.division = Duration::from_millis(ms);
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.computing_power == 0 {
            return Err(DistcalcError::Protocol(
                "computing power must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<F>(lookup: &F, name: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            DistcalcError::Protocol(format!(
                "{} must be a non-negative integer, got '{}'",
                name, raw
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.computing_power, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.costs, CostModel::default());
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let retry = RetryConfig::default();
        assert_eq!(retry.next_backoff(50), 100);
        assert_eq!(retry.next_backoff(100), 200);
        assert_eq!(retry.next_backoff(4000), 5000);
        assert_eq!(RetryConfig::none().max_retries, 0);
    }

    #[test]
    fn test_overlay_without_variables_keeps_defaults() {
        let config = WorkerConfig::default().overlay(env(&[])).unwrap();
        assert_eq!(config, WorkerConfig::default());
    }

    #[test]
    fn test_overlay_reads_every_variable() {
        let config = WorkerConfig::default()
            .overlay(env(&[
                ("COMPUTING_POWER", "3"),
                ("POLL_INTERVAL_MS", "250"),
                ("TIME_ADDITION_MS", "1"),
                ("TIME_SUBTRACTION_MS", "2"),
                ("TIME_MULTIPLICATIONS_MS", "3"),
                ("TIME_DIVISIONS_MS", " 4 "),
            ]))
            .unwrap();

        assert_eq!(config.computing_power, 3);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.costs.addition, Duration::from_millis(1));
        assert_eq!(config.costs.subtraction, Duration::from_millis(2));
        assert_eq!(config.costs.multiplication, Duration::from_millis(3));
        assert_eq!(config.costs.division, Duration::from_millis(4));
    }

    #[test]
    fn test_overlay_rejects_bad_values() {
        let err = WorkerConfig::default()
            .overlay(env(&[("TIME_ADDITION_MS", "fast")]))
            .unwrap_err();
        assert!(err.to_string().contains("TIME_ADDITION_MS"));

        assert!(WorkerConfig::default()
            .overlay(env(&[("COMPUTING_POWER", "-1")]))
            .is_err());
        assert!(WorkerConfig::default()
            .overlay(env(&[("COMPUTING_POWER", "0")]))
            .is_err());
    }
}
