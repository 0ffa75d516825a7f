//! Bus error types.

use thiserror::Error;

/// Errors raised by a [`crate::MessageBus`] or one of its channels.
#[derive(Error, Debug)]
pub enum BusError {
    /// Could not reach the server
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Pending messages could not be flushed on shutdown
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Request/reply failed for a reason other than timeout or no responders
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// No subscriber on the subject; the agent worker is not running
    #[error("No responders on subject: {0}")]
    NoResponders(String),

    /// No reply within the request timeout
    #[error("Request timed out")]
    Timeout,

    /// The bus was disconnected
    #[error("Bus is closed")]
    Closed,

    /// Outgoing message could not be encoded
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Incoming payload is not a valid message
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}
