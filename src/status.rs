//! Live status projection of a task graph.
//!
//! The tracker renders the graph as an ordered list for display and
//! enforces a presentation rule: at most one row is ever shown as
//! `in_progress`. This is deliberately independent of the coordinator's
//! internal concurrency — several tasks may really be running at once,
//! but the projection highlights a single active item. The active task
//! is explicit state on the tracker, not a process-wide global.

use crate::core::{Capability, TaskGraph, TaskId, TaskStatus};
use crate::error::{Error, Result};

/// One row of the projected status list.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub id: TaskId,
    pub name: String,
    pub capability: Capability,
    /// The status to display. Never `InProgress` for more than one row.
    pub status: TaskStatus,
    /// Whether this row is the tracker's active task.
    pub active: bool,
}

/// Ordered projection of a graph with a single-active-task invariant.
pub struct StatusTracker {
    order: Vec<(TaskId, String)>,
    active: Option<TaskId>,
}

impl StatusTracker {
    /// Build a tracker over the graph's creation order.
    pub fn from_graph(graph: &TaskGraph) -> Self {
        Self {
            order: graph
                .tasks()
                .map(|t| (t.id, t.name.clone()))
                .collect(),
            active: None,
        }
    }

    /// The currently active task, if any.
    pub fn active(&self) -> Option<TaskId> {
        self.active
    }

    /// Mark a task as the active item.
    ///
    /// Marking the already-active task again is a no-op.
    ///
    /// # Errors
    /// `Error::ConcurrencyPolicy` if a different task is already
    /// active; `Error::Validation` if the task is not in the tracker.
    pub fn set_active(&mut self, id: TaskId) -> Result<()> {
        let Some((_, name)) = self.order.iter().find(|(tid, _)| *tid == id) else {
            return Err(Error::Validation(format!("unknown task {}", id)));
        };
        match self.active {
            Some(current) if current == id => Ok(()),
            Some(current) => {
                let active_name = self
                    .order
                    .iter()
                    .find(|(tid, _)| *tid == current)
                    .map(|(_, n)| n.clone())
                    .unwrap_or_else(|| current.short());
                Err(Error::ConcurrencyPolicy {
                    active: active_name,
                    attempted: name.clone(),
                })
            }
            None => {
                self.active = Some(id);
                Ok(())
            }
        }
    }

    /// Release the active slot if `id` holds it.
    pub fn clear_active(&mut self, id: &TaskId) {
        if self.active == Some(*id) {
            self.active = None;
        }
    }

    /// Project the graph into ordered display rows.
    ///
    /// Graph rows that are genuinely `InProgress` but not the tracker's
    /// active task are demoted to `Pending` for display, keeping the
    /// one-active-item rule without touching execution state.
    pub fn project(&self, graph: &TaskGraph) -> Vec<StatusLine> {
        self.order
            .iter()
            .filter_map(|(id, _)| graph.get(id))
            .map(|task| {
                let active = self.active == Some(task.id);
                let status = match &task.status {
                    TaskStatus::InProgress if !active => TaskStatus::Pending,
                    other => other.clone(),
                };
                StatusLine {
                    id: task.id,
                    name: task.name.clone(),
                    capability: task.capability,
                    status,
                    active,
                }
            })
            .collect()
    }
}
