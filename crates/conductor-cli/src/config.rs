//! Runner configuration.
//!
//! Read from a TOML file, then overridden by `CONDUCTOR_*` environment
//! variables, then by command-line flags.
//!
//! ```toml
//! [nats]
//! url = "nats://nats.internal:4222"
//!
//! [dispatch]
//! timeout_ms = 10000
//!
//! [orchestrator]
//! failure_policy = "halt_on_first_failure"
//! retry = { max_attempts = 2, backoff_ms = 500 }
//! execution = { mode = "concurrent", max_parallel = 4 }
//!
//! [agents.research]
//! subject = "team.research.inbox"
//! timeout_ms = 60000
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use conductor_bus::{NatsConfig, SubjectPatterns};
use conductor_core::{AgentId, AgentRegistry, DispatchConfig, RegistryError, RemoteEndpoint};
use conductor_orchestrator::{OrchestratorConfig, WorkflowDefinition};

/// Environment variable overriding `nats.url`.
pub const ENV_NATS_URL: &str = "CONDUCTOR_NATS_URL";
/// Environment variable overriding `dispatch.timeout_ms`.
pub const ENV_TIMEOUT_MS: &str = "CONDUCTOR_TIMEOUT_MS";

/// Main runner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub nats: NatsSection,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Remote agents by id
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
}

/// NATS connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsSection {
    #[serde(default = "default_nats_url")]
    pub url: String,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_client_name() -> String {
    "conductor".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl Default for NatsSection {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            client_name: default_client_name(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// A remote agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Inbox subject; defaults to `agents.{id}.inbox`
    pub subject: Option<String>,
    /// Per-agent dispatch timeout
    pub timeout_ms: Option<u64>,
}

impl AppConfig {
    /// Load from an optional TOML file and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml_str(&text)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `CONDUCTOR_*` overrides. Unparseable values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_NATS_URL) {
            debug!(url = %url, "NATS URL from environment");
            self.nats.url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            match raw.parse() {
                Ok(timeout_ms) => self.dispatch.timeout_ms = timeout_ms,
                Err(_) => warn!(value = %raw, "Ignoring invalid {}", ENV_TIMEOUT_MS),
            }
        }
    }

    /// NATS client settings.
    #[must_use]
    pub fn nats_config(&self) -> NatsConfig {
        NatsConfig {
            url: self.nats.url.clone(),
            client_name: self.nats.client_name.clone(),
            connect_timeout: Duration::from_millis(self.nats.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.dispatch.timeout_ms),
        }
    }

    /// Build the registry of remote agents.
    ///
    /// Agents come from the config file and from `extra`. If neither names
    /// any agent, every agent referenced by `workflow` is registered at its
    /// standard inbox.
    pub fn registry(
        &self,
        extra: &[String],
        workflow: &WorkflowDefinition,
    ) -> Result<AgentRegistry, RegistryError> {
        let mut registry = AgentRegistry::new();

        for (id, agent) in &self.agents {
            let subject = agent
                .subject
                .clone()
                .unwrap_or_else(|| SubjectPatterns::agent_inbox(id));
            let mut endpoint = RemoteEndpoint::new(subject);
            if let Some(timeout_ms) = agent.timeout_ms {
                endpoint = endpoint.with_timeout(timeout_ms);
            }
            registry.register_remote(id.as_str(), endpoint)?;
        }

        let inferred: Vec<String>;
        let ids: &[String] = if self.agents.is_empty() && extra.is_empty() {
            inferred = workflow
                .steps
                .iter()
                .filter_map(|step| step.agent.as_ref())
                .filter(|id| !id.as_str().is_empty())
                .map(|id| id.to_string())
                .collect();
            &inferred
        } else {
            extra
        };

        for id in ids {
            if registry.contains(&AgentId::from(id.as_str())) {
                continue;
            }
            registry.register_remote(
                id.as_str(),
                RemoteEndpoint::new(SubjectPatterns::agent_inbox(id)),
            )?;
        }

        Ok(registry)
    }
}
