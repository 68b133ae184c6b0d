//! Task dependency graph for plan execution.
//!
//! This module provides the TaskGraph structure that represents one
//! planning pass as a directed acyclic graph of tasks. The graph is
//! built once, validated, and from then on only task statuses change —
//! edges are never added or removed after construction.

use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use std::collections::{HashMap, HashSet, VecDeque};

/// Per-status task counts, used for summaries and result reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub blocked: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    /// Total number of tasks counted.
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed + self.blocked
            + self.cancelled
    }
}

/// The task dependency graph for one plan.
///
/// Nodes are tasks; an edge A -> B means B depends on A. Creation order
/// is preserved so that scheduling and display are deterministic. The
/// serialized form is the ordered list of tasks (each task carries its
/// own dependency ids), which round-trips without loss.
pub struct TaskGraph {
    /// The underlying directed graph.
    graph: DiGraph<Task, ()>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    index: HashMap<TaskId, NodeIndex>,
    /// Task ids in creation order.
    order: Vec<TaskId>,
}

impl TaskGraph {
    /// Build a graph from tasks whose `depends_on` lists are already filled.
    ///
    /// # Errors
    /// Returns `Error::Validation` if a task id or name is duplicated,
    /// a dependency references an unknown task, or a task depends on
    /// itself. Acyclicity is NOT checked here; call [`Self::validate`].
    pub fn from_tasks(tasks: Vec<Task>) -> Result<Self> {
        Self::build(tasks).map_err(Error::Validation)
    }

    /// Rebuild a graph from persisted task records.
    ///
    /// Identical to [`Self::from_tasks`] except that structural problems
    /// are reported as `Error::StateCorruption`, since records come from
    /// a snapshot that was valid when written.
    pub fn from_records(records: Vec<Task>) -> Result<Self> {
        Self::build(records).map_err(Error::StateCorruption)
    }

    fn build(tasks: Vec<Task>) -> std::result::Result<Self, String> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut order = Vec::with_capacity(tasks.len());
        let mut names = HashSet::new();

        for task in tasks {
            if index.contains_key(&task.id) {
                return Err(format!("duplicate task id {}", task.id));
            }
            if !names.insert(task.name.clone()) {
                return Err(format!("duplicate task name '{}'", task.name));
            }
            let id = task.id;
            let node = graph.add_node(task);
            index.insert(id, node);
            order.push(id);
        }

        // Wire edges from each task's dependency list. An edge runs from
        // the dependency to the dependent.
        for &id in &order {
            let node = index[&id];
            let deps = graph[node].depends_on.clone();
            let mut seen = HashSet::new();
            for dep in deps {
                if dep == id {
                    let name = graph[node].name.clone();
                    return Err(format!("task '{}' depends on itself", name));
                }
                let Some(&dep_node) = index.get(&dep) else {
                    let name = graph[node].name.clone();
                    return Err(format!(
                        "task '{}' depends on unknown task {}",
                        name, dep
                    ));
                };
                if seen.insert(dep) {
                    graph.add_edge(dep_node, node, ());
                }
            }
        }

        Ok(Self {
            graph,
            index,
            order,
        })
    }

    /// Serialize the graph as its ordered list of task records.
    pub fn to_records(&self) -> Vec<Task> {
        self.order
            .iter()
            .map(|id| self.graph[self.index[id]].clone())
            .collect()
    }

    /// Get a reference to a task by its ID.
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&node| &self.graph[node])
    }

    /// Get a mutable reference to a task by its ID.
    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        if let Some(&node) = self.index.get(id) {
            Some(&mut self.graph[node])
        } else {
            None
        }
    }

    /// Find a task by its unique name.
    pub fn find_by_name(&self, name: &str) -> Option<&Task> {
        self.tasks().find(|t| t.name == name)
    }

    /// Iterate over all tasks in creation order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().map(|id| &self.graph[self.index[id]])
    }

    /// Task ids in creation order.
    pub fn order(&self) -> &[TaskId] {
        &self.order
    }

    /// Get the number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependency edges in the graph.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Check if the graph contains a task.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    /// Ids of the tasks that `id` directly depends on.
    pub fn dependencies_of(&self, id: &TaskId) -> Vec<TaskId> {
        self.get(id)
            .map(|t| t.depends_on.clone())
            .unwrap_or_default()
    }

    /// Ids of the tasks that directly depend on `id`.
    pub fn dependents_of(&self, id: &TaskId) -> Vec<TaskId> {
        if let Some(&node) = self.index.get(id) {
            self.graph
                .neighbors_directed(node, petgraph::Direction::Outgoing)
                .map(|n| self.graph[n].id)
                .collect()
        } else {
            Vec::new()
        }
    }

    /// All tasks reachable from `id` via the dependency relation.
    ///
    /// Used to propagate blocking: when a task fails, its full
    /// transitive closure of dependents must never be dispatched.
    pub fn dependents_closure(&self, id: &TaskId) -> HashSet<TaskId> {
        let mut reached = HashSet::new();
        if let Some(&start) = self.index.get(id) {
            let mut bfs = Bfs::new(&self.graph, start);
            while let Some(node) = bfs.next(&self.graph) {
                if node != start {
                    reached.insert(self.graph[node].id);
                }
            }
        }
        reached
    }

    /// Tasks participating in a dependency cycle, in creation order.
    ///
    /// Implemented with iterative in-degree elimination rather than a
    /// recursive traversal: tasks are peeled off as their in-degree
    /// drops to zero, and whatever cannot be peeled is exactly the set
    /// of tasks on (or downstream-locked inside) a cycle.
    pub fn cycle_members(&self) -> Vec<TaskId> {
        let mut in_degree: HashMap<TaskId, usize> = HashMap::new();
        for &id in &self.order {
            let node = self.index[&id];
            let deg = self
                .graph
                .neighbors_directed(node, petgraph::Direction::Incoming)
                .count();
            in_degree.insert(id, deg);
        }

        let mut queue: VecDeque<TaskId> = self
            .order
            .iter()
            .filter(|id| in_degree[*id] == 0)
            .copied()
            .collect();
        let mut placed = HashSet::new();

        while let Some(id) = queue.pop_front() {
            placed.insert(id);
            for dep in self.dependents_of(&id) {
                if let Some(deg) = in_degree.get_mut(&dep) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dep);
                    }
                }
            }
        }

        self.order
            .iter()
            .filter(|id| !placed.contains(*id))
            .copied()
            .collect()
    }

    /// Validate that the dependency relation is acyclic.
    ///
    /// # Errors
    /// Returns `Error::Cycle` naming every task on a detected cycle.
    pub fn validate(&self) -> Result<()> {
        let members = self.cycle_members();
        if members.is_empty() {
            return Ok(());
        }
        Err(Error::Cycle {
            tasks: members
                .iter()
                .filter_map(|id| self.get(id).map(|t| t.name.clone()))
                .collect(),
        })
    }

    /// Count tasks by status.
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in self.tasks() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed { .. } => counts.failed += 1,
                TaskStatus::Blocked { .. } => counts.blocked += 1,
                TaskStatus::Cancelled { .. } => counts.cancelled += 1,
            }
        }
        counts
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
