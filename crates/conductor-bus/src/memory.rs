//! In-process message bus.
//!
//! Mirrors the NATS semantics the dispatcher relies on: exact-subject
//! routing, queue groups that hand each message to one member, and
//! request/reply through a generated inbox subject. Useful for tests and
//! for single-process deployments that still want the bus boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use conductor_core::protocol::Message;

use crate::{
    error::BusError,
    traits::{Channel, Delivery, DeliveryStream, MessageBus},
};

struct Subscription {
    group: Option<String>,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct Inner {
    subjects: RwLock<HashMap<String, Vec<Subscription>>>,
    closed: AtomicBool,
    next_member: AtomicUsize,
}

impl Inner {
    async fn add(&self, subject: &str, group: Option<String>) -> Result<DeliveryStream, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut subjects = self.subjects.write().await;
        subjects.retain(|_, subs| {
            subs.retain(|sub| !sub.tx.is_closed());
            !subs.is_empty()
        });
        subjects
            .entry(subject.to_string())
            .or_default()
            .push(Subscription { group, tx });
        drop(subjects);

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|delivery| (delivery, rx))
        });
        Ok(Box::pin(stream))
    }

    /// Deliver to every plain subscriber and one member per queue group.
    /// Returns how many subscribers received the message.
    async fn deliver(&self, subject: &str, delivery: Delivery) -> Result<usize, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let mut subjects = self.subjects.write().await;
        let Some(subs) = subjects.get_mut(subject) else {
            return Ok(0);
        };
        subs.retain(|sub| !sub.tx.is_closed());

        let mut delivered = 0;
        let mut groups: HashMap<&str, Vec<&Subscription>> = HashMap::new();

        for sub in subs.iter() {
            match sub.group.as_deref() {
                None => {
                    if sub.tx.send(delivery.clone()).is_ok() {
                        delivered += 1;
                    }
                }
                Some(group) => groups.entry(group).or_default().push(sub),
            }
        }

        for members in groups.values() {
            let pick = self.next_member.fetch_add(1, Ordering::Relaxed) % members.len();
            if members[pick].tx.send(delivery.clone()).is_ok() {
                delivered += 1;
            }
        }

        if subs.is_empty() {
            subjects.remove(subject);
        }

        Ok(delivered)
    }
}

/// Removes a request's reply inbox when the request finishes or is dropped.
/// If the map is locked at that moment, the next subscription prunes it.
struct InboxGuard {
    inner: Arc<Inner>,
    inbox: String,
}

impl Drop for InboxGuard {
    fn drop(&mut self) {
        if let Ok(mut subjects) = self.inner.subjects.try_write() {
            subjects.remove(&self.inbox);
        }
    }
}

/// In-memory message bus. Cheap to clone; clones share subscriptions.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

impl MemoryBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on a subject.
    pub async fn subscriber_count(&self, subject: &str) -> usize {
        self.inner
            .subjects
            .read()
            .await
            .get(subject)
            .map_or(0, |subs| subs.iter().filter(|s| !s.tx.is_closed()).count())
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn disconnect(&self) -> Result<(), BusError> {
        self.inner.closed.store(true, Ordering::SeqCst);
        // Dropping the senders ends every subscription stream.
        self.inner.subjects.write().await.clear();
        Ok(())
    }

    fn channel(&self, subject: &str) -> Box<dyn Channel> {
        Box::new(MemoryChannel {
            inner: Arc::clone(&self.inner),
            subject: subject.to_string(),
        })
    }

    fn is_connected(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst)
    }
}

/// A channel on a [`MemoryBus`].
pub struct MemoryChannel {
    inner: Arc<Inner>,
    subject: String,
}

#[async_trait]
impl Channel for MemoryChannel {
    fn subject(&self) -> &str {
        &self.subject
    }

    async fn publish(&self, message: &Message) -> Result<(), BusError> {
        debug!(subject = %self.subject, "Publishing message");
        let delivery = Delivery {
            message: message.clone(),
            reply_to: None,
        };
        self.inner.deliver(&self.subject, delivery).await.map(|_| ())
    }

    async fn subscribe(&self) -> Result<DeliveryStream, BusError> {
        self.inner.add(&self.subject, None).await
    }

    async fn queue_subscribe(&self, group: &str) -> Result<DeliveryStream, BusError> {
        self.inner.add(&self.subject, Some(group.to_string())).await
    }

    async fn request(&self, message: &Message, timeout_ms: u64) -> Result<Message, BusError> {
        use futures::StreamExt;

        let inbox = format!("_INBOX.{}", uuid::Uuid::new_v4().simple());
        let mut replies = self.inner.add(&inbox, None).await?;
        let _guard = InboxGuard {
            inner: Arc::clone(&self.inner),
            inbox: inbox.clone(),
        };

        debug!(subject = %self.subject, inbox = %inbox, timeout_ms, "Sending request");

        let delivery = Delivery {
            message: message.clone(),
            reply_to: Some(inbox.clone()),
        };
        let delivered = self.inner.deliver(&self.subject, delivery).await;

        match delivered {
            Ok(0) => Err(BusError::NoResponders(self.subject.clone())),
            Ok(_) => {
                match tokio::time::timeout(Duration::from_millis(timeout_ms), replies.next()).await
                {
                    Ok(Some(reply)) => Ok(reply.message),
                    Ok(None) => Err(BusError::Closed),
                    Err(_) => Err(BusError::Timeout),
                }
            }
            Err(e) => Err(e),
        }
    }
}
