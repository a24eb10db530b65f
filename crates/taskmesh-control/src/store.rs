//! The task table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use uuid::Uuid;

use taskmesh_core::Task;

/// Shared handle to one task. Whoever holds the lock owns every
/// decision about that task until they release it, which is what
/// keeps a task to at most one open step under concurrent results.
pub type TaskHandle = Arc<Mutex<Task>>;

/// In-memory table of every task the control plane has accepted.
pub struct TaskStore {
    tasks: RwLock<HashMap<Uuid, TaskHandle>>,
}

impl TaskStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts `task` unless its id is already present. Returns the
    /// handle plus whether this call created it.
    pub fn insert_if_absent(&self, task: Task) -> (TaskHandle, bool) {
        let mut tasks = self.tasks.write();
        if let Some(existing) = tasks.get(&task.id) {
            return (Arc::clone(existing), false);
        }
        let handle: TaskHandle = Arc::new(Mutex::new(task.clone()));
        tasks.insert(task.id, Arc::clone(&handle));
        (handle, true)
    }

    /// Looks up a task handle.
    pub fn get(&self, id: Uuid) -> Option<TaskHandle> {
        self.tasks.read().get(&id).cloned()
    }

    /// A point-in-time copy of one task.
    pub async fn snapshot(&self, id: Uuid) -> Option<Task> {
        let handle = self.get(id)?;
        let task = handle.lock().await;
        Some(task.clone())
    }

    /// Point-in-time copies of every task, oldest first.
    pub async fn list(&self) -> Vec<Task> {
        let handles: Vec<TaskHandle> = self.tasks.read().values().cloned().collect();
        let mut tasks = Vec::with_capacity(handles.len());
        for handle in handles {
            tasks.push(handle.lock().await.clone());
        }
        tasks.sort_by_key(|task| task.created_at);
        tasks
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
