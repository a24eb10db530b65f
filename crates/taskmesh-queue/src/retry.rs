//! Publish retries for at-least-once delivery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use taskmesh_core::{Envelope, TaskmeshError, TaskmeshResult};

use crate::queue::{MessageQueue, Subscription};

/// Configures retry behaviour for queue publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
}

impl RetryPolicy {
    /// Backoff delay in milliseconds for a given attempt: exponential
    /// from `backoff_base_ms`, capped at `backoff_max_ms`.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let delay = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        delay.min(self.backoff_max_ms)
    }

    /// A policy that never retries, for callers that want a single
    /// attempt through retry-shaped plumbing.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 5_000,
        }
    }
}

/// A [`MessageQueue`] wrapper that retries failed publishes with
/// exponential backoff. Subscriptions pass straight through.
///
/// Publish-side retries are what gives the mesh its at-least-once
/// delivery: a transient backend failure surfaces to the caller only
/// after the whole retry budget is spent.
#[derive(Debug)]
pub struct RetryingQueue<Q> {
    inner: Q,
    policy: RetryPolicy,
}

impl<Q: MessageQueue> RetryingQueue<Q> {
    /// Wraps `inner` with the given retry policy.
    pub fn new(inner: Q, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped queue.
    pub fn inner(&self) -> &Q {
        &self.inner
    }
}

#[async_trait]
impl<Q: MessageQueue> MessageQueue for RetryingQueue<Q> {
    async fn publish(&self, envelope: Envelope) -> TaskmeshResult<()> {
        let mut last_err: Option<TaskmeshError> = None;

        for attempt in 0..=self.policy.max_retries {
            match self.inner.publish(envelope.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if attempt < self.policy.max_retries {
                        let delay = self.policy.backoff_ms(attempt);
                        warn!(
                            topic = %envelope.destination,
                            attempt,
                            delay_ms = delay,
                            error = %e,
                            "Publish failed, backing off"
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| TaskmeshError::Queue("publish retry budget exhausted".into())))
    }

    async fn subscribe(&self, topic: &str) -> TaskmeshResult<Subscription> {
        self.inner.subscribe(topic).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
