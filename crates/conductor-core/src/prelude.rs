//! Prelude - Import everything you need with one line.
//!
//! ```rust
//! use conductor_core::prelude::*;
//! ```

pub use crate::agent::Agent;
pub use crate::dispatch::{Dispatcher, RegistryDispatcher, Transport};
pub use crate::error::{AgentError, ConstructionError, RegistryError, TransportError};
pub use crate::persona::Persona;
pub use crate::registry::{AgentRegistry, RemoteEndpoint};
pub use crate::types::{AgentId, ResultEnvelope, ResultStatus, Task};
