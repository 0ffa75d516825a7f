//! # conductor-orchestrator
//!
//! Workflow engine for conductor.
//!
//! Provides:
//! - Workflow definitions loaded from YAML or JSON
//! - Sequential execution in definition order, or concurrent execution
//!   bounded by `max_parallel` and ordered by `depends_on`
//! - Fail-open or halt-on-first-failure policies and bounded retries
//! - Run reports that keep every step, attempted or skipped, in order
//!
//! ```rust,no_run
//! use conductor_core::Dispatcher;
//! use conductor_orchestrator::{Orchestrator, WorkflowParseError};
//!
//! # async fn run(dispatcher: impl Dispatcher) -> Result<(), WorkflowParseError> {
//! let orchestrator = Orchestrator::new(dispatcher);
//! let report = orchestrator.run_file("workflows/report.yaml").await?;
//! println!("{}", report.to_json().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod events;
mod orchestrator;
mod report;
mod workflow;

pub use config::{ExecutionMode, FailurePolicy, OrchestratorConfig, RetryPolicy};
pub use error::WorkflowParseError;
pub use events::WorkflowEvent;
pub use orchestrator::Orchestrator;
pub use report::{RunOutcome, SkipReason, StepOutcome, StepReport, StepState, WorkflowRunReport};
pub use workflow::{StepDefinition, WorkflowDefinition};
