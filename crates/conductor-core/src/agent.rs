//! Agent contract - the single capability every agent variant implements.

use async_trait::async_trait;

use crate::{
    error::AgentError,
    types::{ResultEnvelope, Task},
};

/// A unit that accepts a task and returns exactly one result envelope.
///
/// Concrete agents are registered explicitly at bootstrap. Every agent is
/// built from a persona: its constructor calls
/// [`Persona::load`](crate::Persona::load) (or
/// [`Persona::from_text`](crate::Persona::from_text)) and returns the
/// [`ConstructionError`](crate::ConstructionError) instead of
/// starting without one. Agents validate their own task schema inside
/// `execute`, typically via [`Task::require`].
///
/// ```no_run
/// use async_trait::async_trait;
/// use conductor_core::{Agent, AgentError, ConstructionError, Persona, ResultEnvelope, Task};
///
/// struct Researcher {
///     persona: Persona,
/// }
///
/// impl Researcher {
///     fn new() -> Result<Self, ConstructionError> {
///         Ok(Self {
///             persona: Persona::load("prompts/researcher.md")?,
///         })
///     }
/// }
///
/// #[async_trait]
/// impl Agent for Researcher {
///     fn name(&self) -> &str {
///         "researcher"
///     }
///
///     async fn execute(&self, task: Task) -> Result<ResultEnvelope, AgentError> {
///         let topic = task.require("topic")?;
///         let brief = format!("{}\n\n{topic}", self.persona.content());
///         Ok(ResultEnvelope::success("researcher", brief))
///     }
/// }
///
/// let _researcher = Researcher::new();
/// ```
///
/// Side effects are implementation-defined; each agent documents its own
/// ordering and idempotence guarantees, including whether overlapping
/// `execute` calls on one instance are safe. The registry and dispatcher do
/// not enforce reentrancy.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Execute one task.
    ///
    /// Returning `Err` is the agent's way of signalling an execution error;
    /// the dispatcher turns it into a failure envelope.
    async fn execute(&self, task: Task) -> Result<ResultEnvelope, AgentError>;
}
