//! Dispatcher - the routing boundary between workflow steps and agents.
//!
//! Callers only see [`Dispatcher::route_task`], a request/response call that
//! always yields a [`ResultEnvelope`]. Whether the agent runs in-process or
//! behind a [`Transport`] is decided by its registry entry, so replacing a
//! local agent with a networked one needs no change to callers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    agent::Agent,
    error::TransportError,
    events::{emit, DispatchEvent, EventSink},
    registry::{AgentEntry, AgentRegistry, RemoteEndpoint},
    types::{AgentId, ResultEnvelope, Task},
};

/// Something that routes a task to a named agent.
///
/// Expected failures (unknown destination, agent error, timeout) come back
/// as failure envelopes; `route_task` itself never fails.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Route `task` to `destination` and wait for the result.
    async fn route_task(&self, task: Task, destination: &AgentId) -> ResultEnvelope;
}

#[async_trait]
impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    async fn route_task(&self, task: Task, destination: &AgentId) -> ResultEnvelope {
        (**self).route_task(task, destination).await
    }
}

/// Carries a request to a remote agent and brings back its envelope.
///
/// Implementations (message queue, RPC, HTTP) must preserve the request
/// `(Task, AgentId)` and the reply envelope verbatim.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait at most `timeout` for the reply.
    async fn request(
        &self,
        destination: &AgentId,
        endpoint: &RemoteEndpoint,
        task: Task,
        timeout: Duration,
    ) -> Result<ResultEnvelope, TransportError>;
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Bound on every dispatch call in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Registry-backed dispatcher.
///
/// Holds no per-call state: two identical calls produce two independent
/// envelopes.
pub struct RegistryDispatcher {
    registry: Arc<AgentRegistry>,
    transport: Option<Arc<dyn Transport>>,
    config: DispatchConfig,
    events: Option<EventSink<DispatchEvent>>,
}

impl RegistryDispatcher {
    /// Create a dispatcher over a populated registry.
    #[must_use]
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        info!(agents = registry.len(), "Dispatcher initialized");
        Self {
            registry,
            transport: None,
            config: DispatchConfig::default(),
            events: None,
        }
    }

    /// Set the transport used for remote entries.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.config.timeout_ms = timeout_ms;
        self
    }

    /// Attach an event sink.
    #[must_use]
    pub fn with_events(mut self, events: EventSink<DispatchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// The registry this dispatcher routes through.
    #[must_use]
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    async fn call_remote(
        &self,
        destination: &AgentId,
        endpoint: &RemoteEndpoint,
        task: Task,
    ) -> ResultEnvelope {
        let Some(ref transport) = self.transport else {
            warn!(destination = %destination, "No transport configured for remote agent");
            return ResultEnvelope::failure(
                destination.clone(),
                format!("no transport configured for remote agent: {destination}"),
            );
        };

        let timeout_ms = endpoint.timeout_ms.unwrap_or(self.config.timeout_ms);
        let timeout = Duration::from_millis(timeout_ms);

        // The transport gets the same bound, but is not trusted to honour it.
        let result = tokio::time::timeout(
            timeout,
            transport.request(destination, endpoint, task, timeout),
        )
        .await
        .unwrap_or(Err(TransportError::Timeout(timeout_ms)));

        match result {
            Ok(envelope) => envelope,
            Err(TransportError::Timeout(ms)) => {
                ResultEnvelope::failure(destination.clone(), format!("timed out after {ms}ms"))
            }
            Err(TransportError::Remote { code, message }) => ResultEnvelope::failure(
                destination.clone(),
                format!("remote error [{code}]: {message}"),
            ),
            Err(e) => ResultEnvelope::failure(destination.clone(), e.to_string()),
        }
    }
}

#[async_trait]
impl Dispatcher for RegistryDispatcher {
    #[instrument(skip(self, task), fields(destination = %destination))]
    async fn route_task(&self, task: Task, destination: &AgentId) -> ResultEnvelope {
        let start = Instant::now();
        debug!(fields = task.len(), "Dispatching task");

        let entry = match self.registry.resolve(destination) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Unroutable destination");
                emit(
                    &self.events,
                    DispatchEvent::Unroutable {
                        destination: destination.clone(),
                        reason: e.to_string(),
                    },
                );
                return ResultEnvelope::failure(
                    destination.clone(),
                    format!("unknown destination: {destination}"),
                )
                .with_execution_time(elapsed_ms(start));
            }
        };

        emit(
            &self.events,
            DispatchEvent::Routed {
                destination: destination.clone(),
                local: entry.is_local(),
            },
        );

        let envelope = match entry {
            AgentEntry::Local(agent) => {
                invoke_local(
                    Arc::clone(agent),
                    destination,
                    task,
                    Duration::from_millis(self.config.timeout_ms),
                )
                .await
            }
            AgentEntry::Remote(endpoint) => self.call_remote(destination, endpoint, task).await,
        };

        let duration_ms = elapsed_ms(start);
        let envelope = envelope.with_execution_time(duration_ms);

        info!(status = ?envelope.status(), duration_ms, "Received response");
        emit(
            &self.events,
            DispatchEvent::Completed {
                destination: destination.clone(),
                status: envelope.status(),
                duration_ms,
            },
        );

        envelope
    }
}

/// Run a local agent with the dispatcher's guarantees.
///
/// The agent runs in its own tokio task so a panic is reported as a failure
/// envelope. On timeout the call is abandoned, not aborted: the agent's task
/// keeps running to completion in the background.
pub async fn invoke_local(
    agent: Arc<dyn Agent>,
    destination: &AgentId,
    task: Task,
    timeout: Duration,
) -> ResultEnvelope {
    let handle = tokio::spawn(async move { agent.execute(task).await });

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(envelope))) => envelope,
        Ok(Ok(Err(e))) => {
            warn!(destination = %destination, error = %e, "Agent execution failed");
            ResultEnvelope::failure(destination.clone(), e.to_string())
        }
        Ok(Err(join_error)) => {
            warn!(destination = %destination, error = %join_error, "Agent task aborted");
            ResultEnvelope::failure(destination.clone(), format!("agent panicked: {join_error}"))
        }
        Err(_) => {
            let timeout_ms = duration_ms(timeout);
            warn!(destination = %destination, timeout_ms, "Agent timed out");
            ResultEnvelope::failure(destination.clone(), format!("timed out after {timeout_ms}ms"))
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    duration_ms(start.elapsed())
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// TESTS
// ============================================================================
