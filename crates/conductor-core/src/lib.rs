//! # conductor-core
//!
//! Core components of the conductor orchestration core.
//!
//! This crate provides:
//! - [`Agent`] - the contract every agent variant implements
//! - [`Persona`] - behaviour specification loaded at agent construction
//! - [`AgentRegistry`] - lookup table from [`AgentId`] to agent or remote endpoint
//! - [`Dispatcher`] / [`RegistryDispatcher`] - routes a [`Task`] and returns a [`ResultEnvelope`]
//! - [`Transport`] - the seam where in-process calls become network calls
//! - Protocol types for the dispatcher-to-agent boundary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use conductor_core::prelude::*;
//!
//! # async fn run(analyst: Arc<dyn Agent>) -> Result<(), RegistryError> {
//! let mut registry = AgentRegistry::new();
//! registry.register("analyst", analyst)?;
//!
//! let dispatcher = RegistryDispatcher::new(Arc::new(registry)).with_timeout(5_000);
//! let envelope = dispatcher
//!     .route_task(Task::new().with("query", "summarize"), &AgentId::new("analyst"))
//!     .await;
//! println!("{:?}", envelope.status());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod persona;
pub mod prelude;
pub mod protocol;
pub mod registry;
pub mod types;

pub use agent::Agent;
pub use dispatch::{invoke_local, DispatchConfig, Dispatcher, RegistryDispatcher, Transport};
pub use error::{AgentError, ConstructionError, RegistryError, TransportError};
pub use events::{emit, DispatchEvent, EventSink};
pub use persona::Persona;
pub use registry::{AgentEntry, AgentRegistry, RemoteEndpoint};
pub use types::{AgentId, ResultEnvelope, ResultMetrics, ResultStatus, Task};
