//! Agent registry - lookup table from identifier to agent.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{agent::Agent, error::RegistryError, types::AgentId};

/// Connection descriptor for an agent living behind a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEndpoint {
    /// Subject / address the transport sends requests to
    pub subject: String,
    /// Per-endpoint timeout override in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl RemoteEndpoint {
    /// Create an endpoint for a subject.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            timeout_ms: None,
        }
    }

    /// Override the dispatcher timeout for this endpoint.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// What an identifier resolves to.
#[derive(Clone)]
pub enum AgentEntry {
    /// In-process agent instance
    Local(Arc<dyn Agent>),
    /// Agent reachable through a transport
    Remote(RemoteEndpoint),
}

impl AgentEntry {
    /// Whether this entry is served in-process.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl fmt::Debug for AgentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(agent) => f.debug_tuple("Local").field(&agent.name()).finish(),
            Self::Remote(endpoint) => f.debug_tuple("Remote").field(endpoint).finish(),
        }
    }
}

/// Mapping from [`AgentId`] to a live agent or a remote endpoint.
///
/// Populated by bootstrap code through `&mut self`; afterwards it is shared
/// as `Arc<AgentRegistry>` and only read, so lookups need no locking. It
/// holds no task-specific state.
///
/// Duplicate registrations are rejected rather than overwritten.
#[derive(Debug, Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<AgentId, AgentEntry>,
}

impl AgentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-process agent.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateAgent`] if `id` is already present.
    pub fn register(
        &mut self,
        id: impl Into<AgentId>,
        agent: Arc<dyn Agent>,
    ) -> Result<(), RegistryError> {
        self.insert(id.into(), AgentEntry::Local(agent))
    }

    /// Register an agent reachable through a transport.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateAgent`] if `id` is already present.
    pub fn register_remote(
        &mut self,
        id: impl Into<AgentId>,
        endpoint: RemoteEndpoint,
    ) -> Result<(), RegistryError> {
        self.insert(id.into(), AgentEntry::Remote(endpoint))
    }

    fn insert(&mut self, id: AgentId, entry: AgentEntry) -> Result<(), RegistryError> {
        if self.agents.contains_key(&id) {
            return Err(RegistryError::DuplicateAgent(id));
        }

        info!(agent_id = %id, local = entry.is_local(), "Agent registered");
        self.agents.insert(id, entry);
        Ok(())
    }

    /// Remove an agent, returning its entry if present.
    pub fn unregister(&mut self, id: &AgentId) -> Option<AgentEntry> {
        let removed = self.agents.remove(id);
        if removed.is_some() {
            info!(agent_id = %id, "Agent unregistered");
        }
        removed
    }

    /// Resolve an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownAgent`] if `id` is absent. This is the
    /// single place an unroutable destination is detected.
    pub fn resolve(&self, id: &AgentId) -> Result<&AgentEntry, RegistryError> {
        self.agents
            .get(id)
            .ok_or_else(|| RegistryError::UnknownAgent(id.clone()))
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains_key(id)
    }

    /// Registered identifiers, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<_> = self.agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::types::{ResultEnvelope, Task};
    use async_trait::async_trait;

    struct NamedAgent(&'static str);

    #[async_trait]
    impl Agent for NamedAgent {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, _task: Task) -> Result<ResultEnvelope, AgentError> {
            Ok(ResultEnvelope::success(self.0, "ok"))
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = AgentRegistry::new();
        registry
            .register("analyst", Arc::new(NamedAgent("analyst")))
            .unwrap();

        let entry = registry.resolve(&AgentId::new("analyst")).unwrap();
        assert!(entry.is_local());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_is_rejected() {
        let mut registry = AgentRegistry::new();
        registry.register("a", Arc::new(NamedAgent("a"))).unwrap();

        let err = registry
            .register_remote("a", RemoteEndpoint::new("agents.a.inbox"))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateAgent(AgentId::new("a")));

        // Original entry untouched
        assert!(registry.resolve(&AgentId::new("a")).unwrap().is_local());
    }

    #[test]
    fn test_unknown_agent() {
        let registry = AgentRegistry::new();
        let err = registry.resolve(&AgentId::new("ghost")).unwrap_err();
        assert_eq!(err, RegistryError::UnknownAgent(AgentId::new("ghost")));
    }

    #[test]
    fn test_unregister_then_register_again() {
        let mut registry = AgentRegistry::new();
        registry
            .register_remote("r", RemoteEndpoint::new("agents.r.inbox").with_timeout(500))
            .unwrap();

        let removed = registry.unregister(&AgentId::new("r")).unwrap();
        match removed {
            AgentEntry::Remote(endpoint) => assert_eq!(endpoint.timeout_ms, Some(500)),
            AgentEntry::Local(_) => panic!("Expected remote entry"),
        }
        assert!(registry.is_empty());

        registry.register("r", Arc::new(NamedAgent("r"))).unwrap();
        assert_eq!(registry.ids(), vec![AgentId::new("r")]);
    }
}
