//! Agent worker - serves one local agent on its bus inbox.
//!
//! The worker is the remote half of [`crate::BusTransport`]: it answers every
//! request with a result message, turning agent errors, panics and timeouts
//! into failure envelopes exactly like the in-process dispatcher does.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use conductor_core::protocol::{Message, MessageContent};
use conductor_core::{invoke_local, Agent, AgentId};

use crate::{
    error::BusError,
    patterns::{SubjectPatterns, AGENT_QUEUE_GROUP},
    traits::{Delivery, MessageBus},
};

/// Counters reported when a worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Requests answered with a result envelope
    pub handled: u64,
    /// Messages answered with a protocol error or dropped
    pub rejected: u64,
}

/// Serves a single agent over a message bus.
///
/// Requests are handled one at a time, so agents that are not reentrant
/// are safe behind a single worker. Run several workers in the same queue
/// group to scale a reentrant agent.
pub struct AgentWorker<B: MessageBus> {
    id: AgentId,
    agent: Arc<dyn Agent>,
    bus: Arc<B>,
    subject: String,
    queue_group: String,
    max_timeout: Duration,
}

impl<B: MessageBus + 'static> AgentWorker<B> {
    /// Create a worker listening on the agent's standard inbox.
    pub fn new(id: impl Into<AgentId>, agent: Arc<dyn Agent>, bus: Arc<B>) -> Self {
        let id = id.into();
        Self {
            subject: SubjectPatterns::agent_inbox(id.as_str()),
            id,
            agent,
            bus,
            queue_group: AGENT_QUEUE_GROUP.to_string(),
            max_timeout: Duration::from_secs(300),
        }
    }

    /// Listen on a custom subject.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Join a custom queue group.
    #[must_use]
    pub fn with_queue_group(mut self, group: impl Into<String>) -> Self {
        self.queue_group = group.into();
        self
    }

    /// Upper bound on a single execution, regardless of the request TTL.
    /// Requests with no TTL (`ttl_ms == 0`) get the full bound.
    #[must_use]
    pub fn with_max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = timeout;
        self
    }

    /// Subject this worker listens on.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Run on a background task.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<Result<WorkerStats, BusError>> {
        tokio::spawn(self.run(shutdown))
    }

    /// Serve requests until `shutdown` fires or the subscription ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be created.
    #[instrument(skip(self, shutdown), fields(agent_id = %self.id, subject = %self.subject))]
    pub async fn run(self, shutdown: CancellationToken) -> Result<WorkerStats, BusError> {
        let mut deliveries = self
            .bus
            .channel(&self.subject)
            .queue_subscribe(&self.queue_group)
            .await?;

        info!(agent = self.agent.name(), "Agent worker started");
        let mut stats = WorkerStats::default();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("Shutdown requested");
                    break;
                }
                next = deliveries.next() => match next {
                    Some(delivery) => self.handle(delivery, &mut stats).await,
                    None => {
                        debug!("Subscription closed");
                        break;
                    }
                },
            }
        }

        info!(handled = stats.handled, rejected = stats.rejected, "Agent worker stopped");
        Ok(stats)
    }

    fn execution_timeout(&self, ttl_ms: u64) -> Duration {
        match ttl_ms {
            0 => self.max_timeout,
            ms => Duration::from_millis(ms).min(self.max_timeout),
        }
    }

    async fn handle(&self, delivery: Delivery, stats: &mut WorkerStats) {
        let Some(reply_to) = delivery.reply_to else {
            warn!("Dropping request without reply subject");
            stats.rejected += 1;
            return;
        };
        let request = delivery.message;

        let reply = match &request.content {
            MessageContent::Task { payload } => {
                let timeout = self.execution_timeout(request.control.ttl_ms);
                let envelope =
                    invoke_local(Arc::clone(&self.agent), &self.id, payload.clone(), timeout).await;
                debug!(status = ?envelope.status(), "Task handled");
                stats.handled += 1;
                Message::result(&request, envelope)
            }
            _ => {
                stats.rejected += 1;
                Message::error(
                    &request,
                    "unexpected_message",
                    format!(
                        "agent inbox accepts tasks only, got {:?}",
                        request.message_type()
                    ),
                )
            }
        };

        if let Err(e) = self.bus.reply(&reply_to, &reply).await {
            warn!(error = %e, "Failed to send reply");
        }
    }
}
