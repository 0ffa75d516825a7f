//! Message types for the protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AgentId, ResultEnvelope, Task};

/// Current protocol version.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Reference to a message endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRef {
    /// Agent ID
    pub agent_id: AgentId,
    /// Optional agent name
    #[serde(default)]
    pub agent_name: Option<String>,
}

impl AgentRef {
    /// Create a new agent reference.
    #[must_use]
    pub fn new(agent_id: impl Into<AgentId>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: None,
        }
    }

    /// Create with name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }
}

/// Message metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Unique message ID
    pub id: String,
    /// Creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Protocol version
    pub version: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// Routing information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingInfo {
    /// Sender
    pub from: AgentRef,
    /// Recipient
    pub to: AgentRef,
    /// ID of the request this message answers
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Type of message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Task request
    Task,
    /// Task result
    Result,
    /// Protocol-level error
    Error,
}

/// Message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Task message
    Task {
        /// The task payload
        payload: Task,
    },
    /// Result message
    Result {
        /// The result envelope
        payload: ResultEnvelope,
    },
    /// Error that prevented an envelope from being produced
    Error {
        /// Error code
        code: String,
        /// Error message
        message: String,
    },
}

/// Control settings for message handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSettings {
    /// Time-to-live in milliseconds
    pub ttl_ms: u64,
    /// Task ID shared by a request and its reply
    pub task_id: String,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            ttl_ms: 60_000,
            task_id: Uuid::new_v4().to_string(),
        }
    }
}

/// A complete message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Metadata
    pub metadata: Metadata,
    /// Routing info
    pub routing: RoutingInfo,
    /// Content
    pub content: MessageContent,
    /// Control settings
    pub control: ControlSettings,
}

impl Message {
    /// Create a task message.
    #[must_use]
    pub fn task(from: AgentRef, to: AgentRef, payload: Task) -> Self {
        Self {
            metadata: Metadata::default(),
            routing: RoutingInfo {
                from,
                to,
                correlation_id: None,
            },
            content: MessageContent::Task { payload },
            control: ControlSettings::default(),
        }
    }

    /// Set the time-to-live.
    #[must_use]
    pub fn with_ttl(mut self, ttl_ms: u64) -> Self {
        self.control.ttl_ms = ttl_ms;
        self
    }

    /// Create a result message in response to another message.
    #[must_use]
    pub fn result(request: &Message, payload: ResultEnvelope) -> Self {
        Self::reply(request, MessageContent::Result { payload })
    }

    /// Create an error message in response to another message.
    #[must_use]
    pub fn error(request: &Message, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::reply(
            request,
            MessageContent::Error {
                code: code.into(),
                message: message.into(),
            },
        )
    }

    fn reply(request: &Message, content: MessageContent) -> Self {
        Self {
            metadata: Metadata::default(),
            routing: RoutingInfo {
                from: request.routing.to.clone(),
                to: request.routing.from.clone(),
                correlation_id: Some(request.metadata.id.clone()),
            },
            content,
            control: ControlSettings {
                task_id: request.control.task_id.clone(),
                ..Default::default()
            },
        }
    }

    /// Get the message type.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match &self.content {
            MessageContent::Task { .. } => MessageType::Task,
            MessageContent::Result { .. } => MessageType::Result,
            MessageContent::Error { .. } => MessageType::Error,
        }
    }

    /// Encode as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
