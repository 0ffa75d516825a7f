//! Traits for message bus implementations.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use conductor_core::protocol::Message;

use crate::error::BusError;

/// A message received from a subscription.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Decoded message
    pub message: Message,
    /// Subject the sender waits on, for request/reply
    pub reply_to: Option<String>,
}

/// Stream of deliveries from a subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Delivery> + Send>>;

/// A communication channel for a specific subject.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Subject this channel is bound to.
    fn subject(&self) -> &str;

    /// Publish a message to this channel.
    async fn publish(&self, message: &Message) -> Result<(), BusError>;

    /// Subscribe to every message on this channel.
    async fn subscribe(&self) -> Result<DeliveryStream, BusError>;

    /// Subscribe as part of a queue group; each message goes to one member.
    async fn queue_subscribe(&self, group: &str) -> Result<DeliveryStream, BusError>;

    /// Send a request and wait for response.
    async fn request(&self, message: &Message, timeout_ms: u64) -> Result<Message, BusError>;
}

/// Message bus for dispatcher-to-agent communication.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Disconnect from the bus.
    async fn disconnect(&self) -> Result<(), BusError>;

    /// Create a channel for a subject.
    fn channel(&self, subject: &str) -> Box<dyn Channel>;

    /// Check if connected.
    fn is_connected(&self) -> bool;

    /// Answer a request on its reply subject.
    async fn reply(&self, reply_to: &str, message: &Message) -> Result<(), BusError> {
        self.channel(reply_to).publish(message).await
    }
}
