//! The message queue seam every service publishes and consumes
//! through.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

use taskmesh_core::{Envelope, TaskmeshError, TaskmeshResult};

/// A pub/sub message queue.
///
/// Topics are created on first use from either side. Publishing to a
/// topic nobody consumes succeeds and the message is dropped;
/// delivery starts only from the moment of subscription. Within one
/// topic, a subscriber observes messages in publish order.
#[async_trait]
pub trait MessageQueue: Send + Sync + std::fmt::Debug {
    /// Publishes `envelope` to its `destination` topic.
    async fn publish(&self, envelope: Envelope) -> TaskmeshResult<()>;

    /// Opens a subscription on `topic`.
    async fn subscribe(&self, topic: &str) -> TaskmeshResult<Subscription>;

    /// Backend identifier used in logs.
    fn name(&self) -> &str;
}

/// A live subscription to one topic.
///
/// Receivers that fall behind the channel capacity lose the oldest
/// messages; [`Subscription::recv`] logs the gap and keeps going
/// rather than tearing the consumer down.
pub struct Subscription {
    topic: String,
    receiver: broadcast::Receiver<Envelope>,
}

impl Subscription {
    pub(crate) fn new(topic: impl Into<String>, receiver: broadcast::Receiver<Envelope>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
        }
    }

    /// Topic this subscription is attached to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits for the next envelope.
    ///
    /// Returns an error only when the topic itself is gone (the queue
    /// was dropped), which consumers treat as shutdown.
    pub async fn recv(&mut self) -> TaskmeshResult<Envelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Ok(envelope),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(TaskmeshError::Queue(format!(
                        "topic '{}' closed",
                        self.topic
                    )));
                }
            }
        }
    }
}
