//! Task lifecycle types tracked by the control plane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted but not yet routed to any agent.
    Pending,
    /// First step dispatched, no result seen yet.
    Routed,
    /// At least one step completed and another is underway.
    InProgress,
    /// Finished with an answer.
    Completed,
    /// Escalated to the human consumer without an answer.
    NeedsHuman,
    /// Cancelled or administratively failed.
    Failed,
}

impl TaskStatus {
    /// Terminal states accept no further step results.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::NeedsHuman | Self::Failed)
    }
}

/// One agent hop in a task's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    /// Service the step was dispatched to.
    pub agent: String,
    /// Instruction text sent to the agent.
    pub input: String,
    /// Output reported by the agent; `None` while the step is open.
    pub output: Option<String>,
    /// When the step was dispatched.
    pub started_at: DateTime<Utc>,
    /// When the result was recorded.
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskStep {
    /// Opens a step for the given agent.
    pub fn open(agent: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            input: input.into(),
            output: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// A step is open until its output is recorded.
    pub fn is_open(&self) -> bool {
        self.output.is_none()
    }

    /// Records the agent's output and closes the step.
    pub fn close(&mut self, output: impl Into<String>) {
        self.output = Some(output.into());
        self.finished_at = Some(Utc::now());
    }
}

/// A unit of work flowing through the mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Mesh-wide task id, the correlation key for every message about
    /// this task.
    pub id: Uuid,
    /// The original instruction as submitted.
    pub input: String,
    /// Ordered agent hops; at most the last entry may be open.
    #[serde(default)]
    pub history: Vec<TaskStep>,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Who submitted the task (service name or HTTP client marker).
    pub origin: String,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a pending task with a fresh id.
    pub fn new(input: impl Into<String>, origin: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            input: input.into(),
            history: Vec::new(),
            status: TaskStatus::Pending,
            origin: origin.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overrides the generated id, for submissions that carry their
    /// own.
    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// The currently open step, if any.
    pub fn open_step(&self) -> Option<&TaskStep> {
        self.history.last().filter(|step| step.is_open())
    }

    /// Mutable access to the open step.
    pub fn open_step_mut(&mut self) -> Option<&mut TaskStep> {
        self.history.last_mut().filter(|step| step.is_open())
    }

    /// Zero-based index of the open step.
    pub fn open_step_index(&self) -> Option<u32> {
        self.open_step()
            .map(|_| (self.history.len() - 1) as u32)
    }

    /// Number of open steps; the mesh keeps this at most 1.
    pub fn open_step_count(&self) -> usize {
        self.history.iter().filter(|step| step.is_open()).count()
    }

    /// Appends an open step and returns its index. Callers must
    /// ensure no step is already open.
    pub fn begin_step(&mut self, agent: impl Into<String>, input: impl Into<String>) -> u32 {
        self.history.push(TaskStep::open(agent, input));
        self.status = if self.history.len() == 1 {
            TaskStatus::Routed
        } else {
            TaskStatus::InProgress
        };
        self.touch();
        (self.history.len() - 1) as u32
    }

    /// Output of the most recent closed step.
    pub fn last_output(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find_map(|step| step.output.as_deref())
    }

    /// Moves the task to a new status and bumps `updated_at`.
    pub fn mark(&mut self, status: TaskStatus) {
        self.status = status;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
