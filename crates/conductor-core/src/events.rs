//! Structured events.
//!
//! Components report what they did through an optional channel so the
//! caller picks the observability sink. `tracing` output is emitted
//! independently of whether a sink is attached.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::types::{AgentId, ResultStatus};

/// Sender half used by components to publish events.
pub type EventSink<E> = UnboundedSender<E>;

/// Send an event if a sink is attached. A closed receiver is ignored.
pub fn emit<E>(sink: &Option<EventSink<E>>, event: E) {
    if let Some(ref tx) = sink {
        let _ = tx.send(event);
    }
}

/// Events emitted by a dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    /// Destination resolved, call issued
    Routed {
        destination: AgentId,
        local: bool,
    },
    /// Call returned an envelope
    Completed {
        destination: AgentId,
        status: ResultStatus,
        duration_ms: u64,
    },
    /// Destination could not be routed
    Unroutable {
        destination: AgentId,
        reason: String,
    },
}
