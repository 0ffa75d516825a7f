//! Bus-backed [`Transport`] for the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use conductor_core::protocol::{AgentRef, Message, MessageContent};
use conductor_core::{AgentId, RemoteEndpoint, ResultEnvelope, Task, Transport, TransportError};

use crate::{error::BusError, traits::MessageBus};

/// Sends dispatch requests as request/reply messages over a [`MessageBus`].
pub struct BusTransport<B: MessageBus> {
    bus: Arc<B>,
    origin: AgentRef,
}

impl<B: MessageBus> BusTransport<B> {
    /// Create a transport; requests are sent as coming from `orchestrator`.
    pub fn new(bus: Arc<B>) -> Self {
        Self {
            bus,
            origin: AgentRef::new("orchestrator"),
        }
    }

    /// Override the sender identity stamped on requests.
    #[must_use]
    pub fn with_origin(mut self, origin: AgentRef) -> Self {
        self.origin = origin;
        self
    }
}

#[async_trait]
impl<B: MessageBus + 'static> Transport for BusTransport<B> {
    #[instrument(skip(self, task), fields(destination = %destination, subject = %endpoint.subject))]
    async fn request(
        &self,
        destination: &AgentId,
        endpoint: &RemoteEndpoint,
        task: Task,
        timeout: Duration,
    ) -> Result<ResultEnvelope, TransportError> {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let request = Message::task(self.origin.clone(), AgentRef::new(destination.clone()), task)
            .with_ttl(timeout_ms);

        let reply = self
            .bus
            .channel(&endpoint.subject)
            .request(&request, timeout_ms)
            .await
            .map_err(|e| match e {
                BusError::Timeout => TransportError::Timeout(timeout_ms),
                BusError::DeserializationError(msg) => TransportError::InvalidReply(msg),
                other => TransportError::RequestFailed(other.to_string()),
            })?;

        if reply.routing.correlation_id.as_deref() != Some(request.metadata.id.as_str()) {
            return Err(TransportError::InvalidReply(format!(
                "reply does not answer request {}",
                request.metadata.id
            )));
        }

        debug!(message_type = ?reply.message_type(), "Reply received");

        match reply.content {
            MessageContent::Result { payload } => Ok(payload),
            MessageContent::Error { code, message } => Err(TransportError::Remote { code, message }),
            MessageContent::Task { .. } => Err(TransportError::InvalidReply(
                "expected a result, got a task".to_string(),
            )),
        }
    }
}
