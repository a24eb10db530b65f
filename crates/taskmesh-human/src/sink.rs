//! Storage boundary for finalized tasks.

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use taskmesh_core::{Task, TaskmeshResult};

/// Where finalized tasks land for retrieval by an external actor.
///
/// `store` is the only operation that may fail; the consumer buffers
/// around failures instead of failing the sender.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persists one finalized task. May be called again with the same
    /// task id on redelivery; implementations replace, not append.
    async fn store(&self, task: &Task) -> TaskmeshResult<()>;

    /// Every stored task, oldest first.
    async fn all(&self) -> Vec<Task>;

    /// Looks up one stored task.
    async fn get(&self, task_id: Uuid) -> Option<Task>;
}

/// Keeps finalized tasks in memory, in arrival order.
#[derive(Default)]
pub struct MemorySink {
    tasks: RwLock<Vec<Task>>,
}

impl MemorySink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn store(&self, task: &Task) -> TaskmeshResult<()> {
        let mut tasks = self.tasks.write();
        match tasks.iter_mut().find(|stored| stored.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
        Ok(())
    }

    async fn all(&self) -> Vec<Task> {
        self.tasks.read().clone()
    }

    async fn get(&self, task_id: Uuid) -> Option<Task> {
        self.tasks
            .read()
            .iter()
            .find(|stored| stored.id == task_id)
            .cloned()
    }
}
