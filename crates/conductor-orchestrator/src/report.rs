//! Run reports.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use conductor_core::ResultEnvelope;

use crate::workflow::StepDefinition;

/// Why a step was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Step lacks a destination agent or a task
    MissingAgentOrTask,
    /// Task is present but is not a mapping
    TaskNotMapping,
    /// An earlier step failed under the halt-on-first-failure policy
    HaltedAfterFailure,
    /// The run was cancelled before the step was issued
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MissingAgentOrTask => "missing agent or task",
            Self::TaskNotMapping => "task is not a mapping",
            Self::HaltedAfterFailure => "halted after an earlier failure",
            Self::Cancelled => "run cancelled",
        };
        f.write_str(text)
    }
}

/// Lifecycle of a single step.
///
/// `Pending -> Dispatched -> Success | Failure`, or `Pending -> Skipped`.
/// A retried failure goes back through `Dispatched`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Dispatched,
    Success,
    Failure,
    Skipped,
}

impl StepState {
    /// Whether the step will not change state again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Skipped)
    }
}

/// What happened to a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Dispatched at least once; one envelope per attempt, last is final
    Attempted { attempts: Vec<ResultEnvelope> },
    /// Never dispatched
    Skipped { reason: SkipReason },
}

impl StepOutcome {
    /// The final envelope, if the step was dispatched.
    #[must_use]
    pub fn envelope(&self) -> Option<&ResultEnvelope> {
        match self {
            Self::Attempted { attempts } => attempts.last(),
            Self::Skipped { .. } => None,
        }
    }

    /// Every envelope, in attempt order.
    #[must_use]
    pub fn attempts(&self) -> &[ResultEnvelope] {
        match self {
            Self::Attempted { attempts } => attempts,
            Self::Skipped { .. } => &[],
        }
    }

    /// Skip reason, if the step was skipped.
    #[must_use]
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped { reason } => Some(*reason),
            Self::Attempted { .. } => None,
        }
    }

    /// Terminal state this outcome corresponds to.
    #[must_use]
    pub fn state(&self) -> StepState {
        match self {
            Self::Skipped { .. } => StepState::Skipped,
            Self::Attempted { attempts } => match attempts.last() {
                Some(env) if env.is_success() => StepState::Success,
                Some(_) => StepState::Failure,
                None => StepState::Dispatched,
            },
        }
    }
}

/// One entry of a run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Position in the workflow
    pub index: usize,
    /// Step label
    pub label: String,
    /// The step as defined
    pub step: StepDefinition,
    /// What happened
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

impl StepReport {
    /// Terminal state of the step.
    #[must_use]
    pub fn state(&self) -> StepState {
        self.outcome.state()
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step was attempted or skipped as malformed
    Completed,
    /// The workflow had no steps
    Empty,
    /// Step `at_step` failed and the remaining steps were not issued
    Halted { at_step: usize },
    /// Cancelled; `at_step` is the first step that was not issued
    Cancelled { at_step: usize },
}

/// Ordered record of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunReport {
    /// Unique run ID
    pub run_id: Uuid,
    /// Name of the workflow that ran
    pub workflow_name: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the run
    pub total_time_ms: u64,
    /// How the run ended
    pub outcome: RunOutcome,
    /// One entry per step, in definition order
    pub entries: Vec<StepReport>,
}

impl WorkflowRunReport {
    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the report has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that ended in `state`.
    #[must_use]
    pub fn count(&self, state: StepState) -> usize {
        self.entries.iter().filter(|e| e.state() == state).count()
    }

    /// Whether any dispatched step ended in failure.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.count(StepState::Failure) > 0
    }

    /// Serialize as pretty-printed JSON for audit.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::Task;
    use serde_json::json;

    fn report(outcomes: Vec<StepOutcome>) -> WorkflowRunReport {
        WorkflowRunReport {
            run_id: Uuid::new_v4(),
            workflow_name: "W".into(),
            started_at: Utc::now(),
            total_time_ms: 0,
            outcome: RunOutcome::Completed,
            entries: outcomes
                .into_iter()
                .enumerate()
                .map(|(index, outcome)| StepReport {
                    index,
                    label: format!("Unnamed Step {}", index + 1),
                    step: StepDefinition::new("a", Task::new()),
                    outcome,
                })
                .collect(),
        }
    }

    #[test]
    fn test_outcome_state() {
        let retried = StepOutcome::Attempted {
            attempts: vec![
                ResultEnvelope::failure("a", "boom"),
                ResultEnvelope::success("a", 1),
            ],
        };
        assert_eq!(retried.state(), StepState::Success);
        assert_eq!(retried.attempts().len(), 2);
        assert!(retried.envelope().unwrap().is_success());

        let skipped = StepOutcome::Skipped {
            reason: SkipReason::Cancelled,
        };
        assert_eq!(skipped.state(), StepState::Skipped);
        assert!(skipped.envelope().is_none());
        assert_eq!(skipped.skip_reason(), Some(SkipReason::Cancelled));
    }

    #[test]
    fn test_counts() {
        let r = report(vec![
            StepOutcome::Attempted {
                attempts: vec![ResultEnvelope::success("a", 1)],
            },
            StepOutcome::Attempted {
                attempts: vec![ResultEnvelope::failure("a", "boom")],
            },
            StepOutcome::Skipped {
                reason: SkipReason::MissingAgentOrTask,
            },
        ]);
        assert_eq!(r.len(), 3);
        assert_eq!(r.count(StepState::Success), 1);
        assert_eq!(r.count(StepState::Failure), 1);
        assert_eq!(r.count(StepState::Skipped), 1);
        assert!(r.has_failures());
    }

    #[test]
    fn test_json_shape() {
        let r = report(vec![StepOutcome::Skipped {
            reason: SkipReason::TaskNotMapping,
        }]);
        let value: serde_json::Value = serde_json::from_str(&r.to_json().unwrap()).unwrap();
        assert_eq!(value["outcome"], json!({"kind": "completed"}));
        assert_eq!(value["entries"][0]["outcome"], "skipped");
        assert_eq!(value["entries"][0]["reason"], "task_not_mapping");
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(
            SkipReason::MissingAgentOrTask.to_string(),
            "missing agent or task"
        );
    }
}
