//! Task data model for the execution graph.
//!
//! Tasks are the atomic units of work dispatched to agent workers. Each
//! task tracks its dependencies, capability tag, status, and outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task within a plan.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The kind of agent worker a task should be dispatched to.
///
/// This is a closed set: the dispatch call site matches exhaustively
/// instead of comparing strings. `General` is the explicit fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Find files, symbols, or components relevant to a task.
    Locate,
    /// Understand and explain existing behavior.
    Analyze,
    /// Gather external information and best practices.
    Research,
    /// Combine prior outputs into a deliverable.
    Synthesize,
    /// Anything that fits no specialized worker.
    #[default]
    General,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Locate => "locate",
            Capability::Analyze => "analyze",
            Capability::Research => "research",
            Capability::Synthesize => "synthesize",
            Capability::General => "general",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task status in its lifecycle.
///
/// Pending is the only non-terminal state a task can be dispatched from.
/// Blocked, Completed, Failed, and Cancelled are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Task created but not yet dispatched.
    #[default]
    Pending,
    /// Task is currently being executed by an agent worker.
    InProgress,
    /// Task completed successfully.
    Completed,
    /// Task failed with an error.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// A dependency failed; this task will never be dispatched.
    Blocked {
        /// Reason why the task is blocked.
        reason: String,
    },
    /// The run was aborted before this task was dispatched.
    Cancelled {
        /// Reason why the task was cancelled.
        reason: String,
    },
}

impl TaskStatus {
    /// Check if this is a terminal status (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed { .. }
                | TaskStatus::Blocked { .. }
                | TaskStatus::Cancelled { .. }
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
            TaskStatus::Blocked { reason } => write!(f, "blocked: {}", reason),
            TaskStatus::Cancelled { reason } => write!(f, "cancelled: {}", reason),
        }
    }
}

/// A single task in the execution graph.
///
/// Tasks carry their dependency ids directly so that the serialized
/// form of a graph is simply its ordered list of tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Short unique name, referenceable from `after:` markers.
    pub name: String,
    /// Detailed description of what the task should accomplish.
    pub description: String,
    /// Explicit, checkable criterion for when the task is done.
    pub success_criterion: String,
    /// Ids of the tasks that must reach a terminal state first.
    pub depends_on: Vec<TaskId>,
    /// Which kind of agent worker should execute this task.
    pub capability: Capability,
    /// Current execution status.
    pub status: TaskStatus,
    /// Output produced by a successful dispatch.
    pub result: Option<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task started execution.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task with the given name and description.
    pub fn new(name: &str, description: &str, capability: Capability) -> Self {
        Self {
            id: TaskId::new(),
            name: name.to_string(),
            description: description.to_string(),
            success_criterion: format!("a recorded result exists for: {}", description),
            depends_on: Vec::new(),
            capability,
            status: TaskStatus::Pending,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Replace the derived success criterion with an explicit one.
    pub fn with_success_criterion(mut self, criterion: &str) -> Self {
        self.success_criterion = criterion.to_string();
        self
    }

    /// Start the task execution.
    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    /// Mark the task as successfully completed, storing its output.
    pub fn complete(&mut self, output: &str) {
        self.status = TaskStatus::Completed;
        self.result = Some(output.to_string());
        self.completed_at = Some(Utc::now());
    }

    /// Mark the task as failed with an error message.
    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed {
            error: error.to_string(),
        };
        self.completed_at = Some(Utc::now());
    }

    /// Mark the task as blocked by a failed dependency.
    pub fn block(&mut self, reason: &str) {
        self.status = TaskStatus::Blocked {
            reason: reason.to_string(),
        };
        self.completed_at = Some(Utc::now());
    }

    /// Mark the task as cancelled by an aborted run.
    pub fn cancel(&mut self, reason: &str) {
        self.status = TaskStatus::Cancelled {
            reason: reason.to_string(),
        };
        self.completed_at = Some(Utc::now());
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if the task can still be dispatched.
    pub fn is_pending(&self) -> bool {
        matches!(self.status, TaskStatus::Pending)
    }

    /// The error detail for a failed task, if any.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            TaskStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}
