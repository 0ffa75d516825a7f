//! Workflow events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use conductor_core::{AgentId, ResultStatus};

use crate::report::{RunOutcome, SkipReason};

/// Events emitted by an orchestrator during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    RunStarted {
        run_id: Uuid,
        workflow_name: String,
        steps: usize,
    },
    StepDispatched {
        index: usize,
        label: String,
        agent: AgentId,
        attempt: u32,
    },
    StepCompleted {
        index: usize,
        label: String,
        status: ResultStatus,
        attempts: u32,
    },
    StepSkipped {
        index: usize,
        label: String,
        reason: SkipReason,
    },
    RunFinished {
        run_id: Uuid,
        outcome: RunOutcome,
        total_time_ms: u64,
    },
}
