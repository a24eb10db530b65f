//! The terminal consumer on the human topic.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use taskmesh_core::{topics, MessageKind, Task, TaskmeshResult};
use taskmesh_queue::MessageQueue;

use crate::sink::ResultSink;

/// Limits governing the result consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanConsumerConfig {
    /// Most results held back while the sink is unavailable. Beyond
    /// this the oldest buffered result is dropped.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// How often buffered results are retried against the sink.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_buffer_capacity() -> usize {
    1024
}

fn default_flush_interval_ms() -> u64 {
    1000
}

impl HumanConsumerConfig {
    /// Flush interval as a [`Duration`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for HumanConsumerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

/// Terminal subscriber on the human topic.
///
/// Stores every finalized task it receives. A sink failure never
/// travels back to the sender: the task is buffered and retried until
/// the sink recovers, and the service reports itself degraded while
/// anything is waiting.
pub struct TaskResultService {
    queue: Arc<dyn MessageQueue>,
    sink: Arc<dyn ResultSink>,
    config: HumanConsumerConfig,
    buffer: Mutex<VecDeque<Task>>,
}

impl TaskResultService {
    /// Builds the consumer over the given queue and sink.
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        sink: Arc<dyn ResultSink>,
        config: HumanConsumerConfig,
    ) -> Self {
        Self {
            queue,
            sink,
            config,
            buffer: Mutex::new(VecDeque::new()),
        }
    }

    /// Every stored task, oldest first.
    pub async fn results(&self) -> Vec<Task> {
        self.sink.all().await
    }

    /// Looks up one stored task.
    pub async fn result(&self, task_id: Uuid) -> Option<Task> {
        self.sink.get(task_id).await
    }

    /// Results waiting for the sink to come back.
    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// True while results are buffered against an unavailable sink.
    pub async fn is_degraded(&self) -> bool {
        self.buffered().await > 0
    }

    /// Consumes the human topic until the queue shuts down. Buffered
    /// results are retried on a timer, so the sink recovering does not
    /// wait for fresh traffic.
    pub async fn run(self: Arc<Self>) -> TaskmeshResult<()> {
        let mut sub = self.queue.subscribe(topics::HUMAN).await?;
        info!(
            buffer_capacity = self.config.buffer_capacity,
            "Result consumer listening"
        );

        let mut flush_tick = tokio::time::interval(self.config.flush_interval());
        loop {
            tokio::select! {
                envelope = sub.recv() => {
                    let envelope = envelope?;
                    if envelope.kind != MessageKind::TaskResult {
                        continue;
                    }
                    match envelope.payload_as::<Task>() {
                        Ok(task) => self.accept(task).await,
                        Err(e) => {
                            warn!(
                                source = %envelope.source,
                                error = %e,
                                "Unreadable result payload"
                            );
                        }
                    }
                }
                _ = flush_tick.tick() => {
                    self.flush().await;
                }
            }
        }
    }

    /// Takes one finalized task. Never fails the sender: a sink
    /// failure buffers the task instead.
    async fn accept(&self, task: Task) {
        self.flush().await;

        let mut buffer = self.buffer.lock().await;
        if !buffer.is_empty() {
            // Still degraded: queue behind the older results.
            Self::push_bounded(&mut buffer, task, self.config.buffer_capacity);
            return;
        }
        drop(buffer);

        info!(
            task_id = %task.id,
            status = ?task.status,
            steps = task.history.len(),
            "Result received"
        );
        if let Err(e) = self.sink.store(&task).await {
            warn!(task_id = %task.id, error = %e, "Result sink unavailable, buffering");
            let mut buffer = self.buffer.lock().await;
            Self::push_bounded(&mut buffer, task, self.config.buffer_capacity);
        }
    }

    /// Retries buffered results against the sink, oldest first.
    async fn flush(&self) {
        let mut buffer = self.buffer.lock().await;
        if buffer.is_empty() {
            return;
        }
        while let Some(task) = buffer.pop_front() {
            if let Err(e) = self.sink.store(&task).await {
                buffer.push_front(task);
                warn!(buffered = buffer.len(), error = %e, "Result sink still unavailable");
                return;
            }
        }
        info!("Result sink recovered, buffer drained");
    }

    fn push_bounded(buffer: &mut VecDeque<Task>, task: Task, capacity: usize) {
        buffer.push_back(task);
        if buffer.len() > capacity {
            if let Some(dropped) = buffer.pop_front() {
                warn!(task_id = %dropped.id, "Result buffer full, dropped oldest");
            }
        }
    }
}
