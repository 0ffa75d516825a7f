//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do after a step ends in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep going; steps are independent
    #[default]
    Continue,
    /// Stop issuing steps after the first failure
    HaltOnFirstFailure,
}

/// Bounded retry of failed dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per step, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds
    #[serde(default)]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: 0,
        }
    }
}

impl RetryPolicy {
    /// Allow up to `max_attempts` attempts per step.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Set the pause between attempts.
    #[must_use]
    pub fn with_backoff(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    /// Effective attempt count; never less than one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Pause between attempts.
    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

fn default_max_parallel() -> usize {
    10
}

/// How steps are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One step at a time, in definition order
    #[default]
    Sequential,
    /// Steps whose dependencies have finished run side by side
    Concurrent {
        #[serde(default = "default_max_parallel")]
        max_parallel: usize,
    },
}

impl ExecutionMode {
    /// Maximum number of steps in flight.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Concurrent { max_parallel } => (*max_parallel).max(1),
        }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Failure handling
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Retry of failed steps
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Scheduling
    #[serde(default)]
    pub execution: ExecutionMode,
}

impl OrchestratorConfig {
    /// Set the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the execution mode.
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.retry.attempts(), 1);
        assert_eq!(config.execution.max_in_flight(), 1);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0).attempts(), 1);
        assert_eq!(
            ExecutionMode::Concurrent { max_parallel: 0 }.max_in_flight(),
            1
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let config: OrchestratorConfig = serde_json::from_str(
            r#"{"failure_policy": "halt_on_first_failure",
                "retry": {"max_attempts": 3},
                "execution": {"mode": "concurrent"}}"#,
        )
        .unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::HaltOnFirstFailure);
        assert_eq!(config.retry, RetryPolicy::new(3));
        assert_eq!(
            config.execution,
            ExecutionMode::Concurrent { max_parallel: 10 }
        );
    }
}
