//! Core type definitions for the orchestration core.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::AgentError;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Immutable token naming a registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// TASK
// ============================================================================

/// Opaque keyed payload handed to one agent invocation.
///
/// The core never inspects the keys; each agent defines its own schema and
/// uses [`Task::require`] to fail fast when something it needs is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Task(Map<String, Value>);

impl Task {
    /// Create an empty task.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a field an agent cannot work without.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::MissingField`] if the key is absent.
    pub fn require(&self, key: &str) -> Result<&Value, AgentError> {
        self.0
            .get(key)
            .ok_or_else(|| AgentError::MissingField(key.to_string()))
    }

    /// Whether the task carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Borrow the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON object value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Task {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Task {
    type Error = Value;

    /// Only JSON objects are tasks; anything else is handed back.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

// ============================================================================
// RESULT ENVELOPE
// ============================================================================

/// Status of a dispatch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// The agent completed the task
    Success,
    /// Routing or execution failed
    Failure,
}

/// Metrics attached to an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetrics {
    /// Time spent inside the dispatch call in milliseconds
    #[serde(default)]
    pub execution_time_ms: u64,
}

/// Normalized success/failure wrapper returned from every dispatch.
///
/// Only constructible through [`ResultEnvelope::success`] and
/// [`ResultEnvelope::failure`], so a `Failure` always carries an error and a
/// `Success` always carries a result. Deserialization enforces the same rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct ResultEnvelope {
    status: ResultStatus,
    source_agent: AgentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default)]
    metrics: ResultMetrics,
}

impl ResultEnvelope {
    /// Successful result produced by `source`.
    pub fn success(source: impl Into<AgentId>, result: impl Into<Value>) -> Self {
        Self {
            status: ResultStatus::Success,
            source_agent: source.into(),
            result: Some(result.into()),
            error: None,
            metrics: ResultMetrics::default(),
        }
    }

    /// Failed result attributed to `source`.
    pub fn failure(source: impl Into<AgentId>, error: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Failure,
            source_agent: source.into(),
            result: None,
            error: Some(error.into()),
            metrics: ResultMetrics::default(),
        }
    }

    /// Attach the measured execution time.
    #[must_use]
    pub fn with_execution_time(mut self, execution_time_ms: u64) -> Self {
        self.metrics.execution_time_ms = execution_time_ms;
        self
    }

    #[must_use]
    pub fn status(&self) -> ResultStatus {
        self.status
    }

    #[must_use]
    pub fn source_agent(&self) -> &AgentId {
        &self.source_agent
    }

    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn metrics(&self) -> &ResultMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == ResultStatus::Failure
    }
}

/// Unchecked wire form of [`ResultEnvelope`].
#[derive(Deserialize)]
struct RawEnvelope {
    status: ResultStatus,
    source_agent: AgentId,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    metrics: ResultMetrics,
}

impl TryFrom<RawEnvelope> for ResultEnvelope {
    type Error = String;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        match raw.status {
            ResultStatus::Failure if raw.error.is_none() => {
                Err("failure envelope must carry an error".to_string())
            }
            ResultStatus::Success if raw.result.is_none() => {
                Err("success envelope must carry a result".to_string())
            }
            status => Ok(Self {
                status,
                source_agent: raw.source_agent,
                result: raw.result,
                error: raw.error,
                metrics: raw.metrics,
            }),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
