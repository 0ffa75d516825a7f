//! Error types for agents, the registry and transports.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::AgentId;

/// Errors an agent may signal from `execute`.
///
/// The dispatcher converts every one of these into a failure envelope.
#[derive(Error, Debug)]
pub enum AgentError {
    /// A field the agent requires is absent from the task
    #[error("Missing task field: {0}")]
    MissingField(String),

    /// The task is present but unusable
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// Task execution failed
    #[error("Task execution failed: {0}")]
    ExecutionFailed(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Create an execution error.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }
}

/// Fatal errors raised while constructing an agent.
#[derive(Error, Debug)]
pub enum ConstructionError {
    /// Persona resource does not exist
    #[error("Persona not found: {}", .0.display())]
    PersonaNotFound(PathBuf),

    /// Persona resource exists but could not be read
    #[error("Failed to read persona {}: {source}", path.display())]
    PersonaUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persona resource is empty
    #[error("Persona is empty: {}", .0.display())]
    EmptyPersona(PathBuf),

    /// Agent-specific configuration problem
    #[error("Invalid agent configuration: {0}")]
    InvalidConfig(String),
}

/// Registry lookup and mutation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Identifier already registered
    #[error("Agent already registered: {0}")]
    DuplicateAgent(AgentId),

    /// Identifier not present
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),
}

/// Errors from a remote transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No reply within the allotted time
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// Request could not be sent or answered
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Reply could not be decoded or had the wrong shape
    #[error("Invalid reply: {0}")]
    InvalidReply(String),

    /// Remote side answered with an error message
    #[error("Remote error [{code}]: {message}")]
    Remote { code: String, message: String },
}
