//! In-memory queue backend over Tokio broadcast channels.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use taskmesh_core::{Envelope, TaskmeshResult};

use crate::queue::{MessageQueue, Subscription};

/// Per-topic channel capacity before slow subscribers start losing
/// messages.
pub const DEFAULT_TOPIC_CAPACITY: usize = 256;

/// Process-local [`MessageQueue`] backed by one broadcast channel per
/// topic. Cloning is cheap and every clone shares the same topics.
#[derive(Clone, Debug)]
pub struct InMemoryQueue {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Envelope>>>>,
    capacity: usize,
}

impl InMemoryQueue {
    /// Creates a queue with [`DEFAULT_TOPIC_CAPACITY`] per topic.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Creates a queue with a custom per-topic capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Topics that exist right now, for diagnostics.
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.read().keys().cloned().collect()
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<Envelope> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        let mut topics = self.topics.write();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn publish(&self, envelope: Envelope) -> TaskmeshResult<()> {
        let topic = envelope.destination.clone();
        let sender = self.sender_for(&topic);
        // send only errors when the topic has no live receivers;
        // publishing into the void is allowed.
        if sender.send(envelope).is_err() {
            debug!(topic = %topic, "published with no subscribers, message dropped");
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> TaskmeshResult<Subscription> {
        let receiver = self.sender_for(topic).subscribe();
        debug!(topic = %topic, "subscription opened");
        Ok(Subscription::new(topic, receiver))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
