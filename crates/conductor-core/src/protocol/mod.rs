//! Wire protocol for the dispatcher-to-agent boundary.
//!
//! A request carries `(Task, AgentId)`, a reply carries a `ResultEnvelope`.
//! Transports must preserve both verbatim.

mod message;

pub use message::{
    AgentRef, ControlSettings, Message, MessageContent, MessageType, Metadata, RoutingInfo,
    PROTOCOL_VERSION,
};
