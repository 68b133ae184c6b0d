//! Shared test fixtures for integration tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use strata::core::{Capability, Task, TaskGraph, TaskId};
use strata::error::Error;
use strata::orchestration::AgentDispatch;
use strata::project::ContextHints;

/// Build a graph from (name, dependency-names) pairs.
pub fn graph_of(specs: &[(&str, &[&str])]) -> TaskGraph {
    let mut tasks: Vec<Task> = specs
        .iter()
        .map(|(name, _)| Task::new(name, &format!("{} description", name), Capability::General))
        .collect();
    let ids: HashMap<String, TaskId> = tasks.iter().map(|t| (t.name.clone(), t.id)).collect();
    for (task, (_, deps)) in tasks.iter_mut().zip(specs.iter()) {
        for dep in deps.iter() {
            task.depends_on.push(ids[*dep]);
        }
    }
    TaskGraph::from_tasks(tasks).unwrap()
}

/// Look up a task id by name.
pub fn id_of(graph: &TaskGraph, name: &str) -> TaskId {
    graph.find_by_name(name).unwrap().id
}

/// Deterministic dispatcher with scripted failures and observability.
pub struct ScriptedDispatch {
    failures: HashMap<String, String>,
    delay: Duration,
    dispatched: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedDispatch {
    pub fn new() -> Self {
        Self {
            failures: HashMap::new(),
            delay: Duration::ZERO,
            dispatched: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Script a failure for the named task.
    pub fn failing(mut self, name: &str, error: &str) -> Self {
        self.failures.insert(name.to_string(), error.to_string());
        self
    }

    /// Apply a delay to every dispatch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Names of dispatched tasks in arrival order.
    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }

    /// Highest number of dispatches observed in flight at once.
    pub fn peak(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentDispatch for ScriptedDispatch {
    async fn dispatch(&self, task: &Task, _hints: &ContextHints) -> strata::Result<String> {
        self.dispatched.lock().unwrap().push(task.name.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.failures.get(&task.name) {
            Some(error) => Err(Error::DispatchFailed {
                task: task.name.clone(),
                message: error.clone(),
            }),
            None => Ok(format!("output of {}", task.name)),
        }
    }
}
