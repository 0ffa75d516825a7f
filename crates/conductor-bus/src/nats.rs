//! NATS message bus implementation.

use std::time::Duration;

use async_nats::{Client, ConnectOptions, Subscriber};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, warn};

use conductor_core::protocol::Message;

use crate::{
    error::BusError,
    traits::{Channel, Delivery, DeliveryStream, MessageBus},
};

/// NATS client configuration.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Client name for identification
    pub client_name: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Default request timeout
    pub request_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            client_name: "conductor".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl NatsConfig {
    /// Create config with a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set client name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }
}

/// NATS-based message bus.
pub struct NatsBus {
    client: Client,
    url: String,
}

impl NatsBus {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns an error if connection fails.
    pub async fn connect(config: NatsConfig) -> Result<Self, BusError> {
        info!(url = %config.url, client = %config.client_name, "Connecting to NATS");

        let options = ConnectOptions::new()
            .name(&config.client_name)
            .connection_timeout(config.connect_timeout)
            .request_timeout(Some(config.request_timeout));

        let client = async_nats::connect_with_options(config.url.as_str(), options)
            .await
            .map_err(|e| BusError::ConnectionFailed(e.to_string()))?;

        info!("Connected to NATS");

        Ok(Self {
            client,
            url: config.url,
        })
    }

    /// Get the connection URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn disconnect(&self) -> Result<(), BusError> {
        info!("Disconnecting from NATS");
        self.client
            .flush()
            .await
            .map_err(|e| BusError::DisconnectFailed(e.to_string()))
    }

    fn channel(&self, subject: &str) -> Box<dyn Channel> {
        Box::new(NatsChannel {
            client: self.client.clone(),
            subject: subject.to_string(),
        })
    }

    fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }
}

/// A NATS channel for a specific subject.
pub struct NatsChannel {
    client: Client,
    subject: String,
}

fn into_deliveries(subscriber: Subscriber) -> DeliveryStream {
    let stream = subscriber.filter_map(|msg| async move {
        match Message::from_bytes(&msg.payload) {
            Ok(message) => Some(Delivery {
                message,
                reply_to: msg.reply.map(|subject| subject.to_string()),
            }),
            Err(e) => {
                warn!(subject = %msg.subject, error = %e, "Dropping undecodable message");
                None
            }
        }
    });

    Box::pin(stream)
}

#[async_trait]
impl Channel for NatsChannel {
    fn subject(&self) -> &str {
        &self.subject
    }

    async fn publish(&self, message: &Message) -> Result<(), BusError> {
        let payload = message
            .to_bytes()
            .map_err(|e| BusError::SerializationError(e.to_string()))?;

        debug!(subject = %self.subject, "Publishing message");

        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| BusError::PublishFailed(e.to_string()))
    }

    async fn subscribe(&self) -> Result<DeliveryStream, BusError> {
        debug!(subject = %self.subject, "Subscribing to subject");

        let subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .map_err(|e| BusError::SubscribeFailed(e.to_string()))?;

        Ok(into_deliveries(subscriber))
    }

    async fn queue_subscribe(&self, group: &str) -> Result<DeliveryStream, BusError> {
        debug!(subject = %self.subject, group = %group, "Joining queue group");

        let subscriber = self
            .client
            .queue_subscribe(self.subject.clone(), group.to_string())
            .await
            .map_err(|e| BusError::SubscribeFailed(e.to_string()))?;

        Ok(into_deliveries(subscriber))
    }

    async fn request(&self, message: &Message, timeout_ms: u64) -> Result<Message, BusError> {
        let payload = message
            .to_bytes()
            .map_err(|e| BusError::SerializationError(e.to_string()))?;

        debug!(subject = %self.subject, timeout_ms = %timeout_ms, "Sending request");

        let response = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.client.request(self.subject.clone(), payload.into()),
        )
        .await
        .map_err(|_| BusError::Timeout)?
        .map_err(|e| match e.kind() {
            async_nats::RequestErrorKind::NoResponders => {
                BusError::NoResponders(self.subject.clone())
            }
            async_nats::RequestErrorKind::TimedOut => BusError::Timeout,
            _ => BusError::RequestFailed(e.to_string()),
        })?;

        Message::from_bytes(&response.payload)
            .map_err(|e| BusError::DeserializationError(e.to_string()))
    }
}
