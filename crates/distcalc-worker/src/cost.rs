//! Simulated operation cost.
//!
//! Every operator has a fixed duration the worker waits before computing,
//! standing in for an expensive operation.

use std::time::Duration;

use distcalc_common::expr::Operator;

/// Delay per operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostModel {
    pub addition: Duration,
    pub subtraction: Duration,
    pub multiplication: Duration,
    pub division: Duration,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            addition: Duration::from_millis(5000),
            subtraction: Duration::from_millis(5000),
            multiplication: Duration::from_millis(15000),
            division: Duration::from_millis(15000),
        }
    }
}

impl CostModel {
    /// No delay for any operator.
    pub fn zero() -> Self {
        Self::uniform(Duration::ZERO)
    }

    /// The same delay for every operator.
    pub fn uniform(delay: Duration) -> Self {
        Self {
            addition: delay,
            subtraction: delay,
            multiplication: delay,
            division: delay,
        }
    }

    pub fn delay(&self, op: Operator) -> Duration {
        match op {
            Operator::Add => self.addition,
            Operator::Sub => self.subtraction,
            Operator::Mul => self.multiplication,
            Operator::Div => self.division,
        }
    }
}
