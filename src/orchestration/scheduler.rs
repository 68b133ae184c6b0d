//! Stage computation for parallel task execution.
//!
//! A stage is a set of tasks whose dependencies are all satisfied by
//! earlier stages; tasks within one stage may run concurrently while
//! stages themselves run strictly in order. Staging uses iterative
//! in-degree elimination (Kahn's algorithm) layered by distance from
//! the roots.

use crate::core::{TaskGraph, TaskId};
use crate::error::{Error, Result};
use crate::stlog_debug;
use std::collections::{HashMap, HashSet};

/// The ordered sequence of parallel-execution stages for one graph.
///
/// Computing a plan is pure and deterministic: the same graph always
/// produces the same stages, with tasks inside a stage ordered by
/// creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<Vec<TaskId>>,
}

impl StagePlan {
    /// Compute the stage layering for a graph.
    ///
    /// Stage 0 holds every task with no dependencies; stage k holds the
    /// tasks whose dependencies all sit in stages 0..k. This revalidates
    /// acyclicity even though the builder already did — a graph loaded
    /// from a persisted snapshot never went through the builder.
    ///
    /// # Errors
    /// Returns `Error::Graph` listing every task that could not be
    /// placed (the cycle participants).
    pub fn compute(graph: &TaskGraph) -> Result<Self> {
        let mut remaining: HashMap<TaskId, usize> = graph
            .order()
            .iter()
            .map(|&id| {
                let distinct: HashSet<TaskId> = graph.dependencies_of(&id).into_iter().collect();
                (id, distinct.len())
            })
            .collect();
        let mut placed: HashSet<TaskId> = HashSet::new();
        let mut stages = Vec::new();

        while placed.len() < graph.task_count() {
            // Everything unplaced whose dependencies are all placed, in
            // creation order.
            let stage: Vec<TaskId> = graph
                .order()
                .iter()
                .filter(|id| !placed.contains(*id) && remaining[*id] == 0)
                .copied()
                .collect();

            if stage.is_empty() {
                let unplaced: Vec<String> = graph
                    .order()
                    .iter()
                    .filter(|id| !placed.contains(*id))
                    .filter_map(|id| graph.get(id).map(|t| t.name.clone()))
                    .collect();
                return Err(Error::Graph { tasks: unplaced });
            }

            for id in &stage {
                placed.insert(*id);
                for dependent in graph.dependents_of(id) {
                    if let Some(count) = remaining.get_mut(&dependent) {
                        *count -= 1;
                    }
                }
            }
            stages.push(stage);
        }

        stlog_debug!(
            "StagePlan::compute tasks={} stages={}",
            graph.task_count(),
            stages.len()
        );
        Ok(Self { stages })
    }

    /// The stages in execution order.
    pub fn stages(&self) -> &[Vec<TaskId>] {
        &self.stages
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Total number of tasks across all stages.
    pub fn task_count(&self) -> usize {
        self.stages.iter().map(|s| s.len()).sum()
    }

    /// The stage index a task was placed in.
    pub fn stage_of(&self, id: &TaskId) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.contains(id))
    }
}
