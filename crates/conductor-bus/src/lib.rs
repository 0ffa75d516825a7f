//! # conductor-bus
//!
//! Message-bus plumbing for remote agents.
//!
//! A [`BusTransport`] plugs into the core dispatcher and turns each remote
//! dispatch into a request/reply exchange on the agent's inbox subject. An
//! [`AgentWorker`] sits on the other end, runs the local agent and replies
//! with its result envelope. Both work over any [`MessageBus`]: [`NatsBus`]
//! for real deployments, [`MemoryBus`] for tests and single-process setups.

mod error;
mod memory;
mod nats;
mod patterns;
mod traits;
mod transport;
mod worker;

pub use error::BusError;
pub use memory::{MemoryBus, MemoryChannel};
pub use nats::{NatsBus, NatsChannel, NatsConfig};
pub use patterns::{SubjectPatterns, AGENT_QUEUE_GROUP};
pub use traits::{Channel, Delivery, DeliveryStream, MessageBus};
pub use transport::BusTransport;
pub use worker::{AgentWorker, WorkerStats};
