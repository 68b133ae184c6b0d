//! Stage-by-stage execution of a plan across agent workers.
//!
//! The coordinator walks the stages strictly in order, dispatching the
//! tasks of each stage concurrently under a semaphore bound, and never
//! starts a stage before every task of the previous one is terminal.
//! Dispatch failures are absorbed: the failing task is recorded and its
//! full transitive closure of dependents is blocked before the next
//! stage begins. An external abort via the coordinator's cancellation
//! token stops in-flight work at the next await point and cancels
//! everything not yet dispatched.

use crate::core::{TaskGraph, TaskId};
use crate::error::{Error, Result};
use crate::orchestration::dispatch::AgentDispatch;
use crate::orchestration::scheduler::StagePlan;
use crate::project::ContextHints;
use crate::{stlog, stlog_debug, stlog_warn};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

/// Knobs for one execution run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum concurrent dispatches within a stage.
    pub max_parallel: usize,
    /// Bound on each individual dispatch call.
    pub task_timeout: Duration,
    /// Abort remaining stages on the first failure instead of
    /// continuing with blocking propagation.
    pub fail_fast: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_parallel: crate::config::DEFAULT_MAX_PARALLEL,
            task_timeout: Duration::from_secs(crate::config::DEFAULT_TASK_TIMEOUT_SECS),
            fail_fast: false,
        }
    }
}

/// Events emitted during a run for observers (CLI progress, logs).
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// A stage has begun executing.
    StageStarted {
        /// Zero-based stage index.
        index: usize,
        /// Total number of stages in the plan.
        total: usize,
        /// Tasks dispatched in this stage.
        tasks: Vec<TaskId>,
    },
    /// A task was handed to an agent worker.
    TaskStarted { task_id: TaskId },
    /// A task completed successfully.
    TaskCompleted { task_id: TaskId },
    /// A task failed (dispatch error or timeout).
    TaskFailed { task_id: TaskId, error: String },
    /// A task was blocked by an upstream failure.
    TaskBlocked { task_id: TaskId },
    /// Tasks were cancelled by an abort or fail-fast.
    TasksCancelled { tasks: Vec<TaskId> },
    /// The run is over.
    RunFinished { status: PlanStatus },
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Every task completed.
    Success,
    /// Some tasks failed, were blocked, or were cancelled.
    Partial,
    /// The run was aborted by the cancellation token.
    Cancelled,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Success => write!(f, "success"),
            PlanStatus::Partial => write!(f, "partial"),
            PlanStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Aggregated result of one run.
///
/// Task ids are listed in creation order; each failed task's original
/// error text stays on the task itself in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResult {
    pub completed: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    pub blocked: Vec<TaskId>,
    pub cancelled: Vec<TaskId>,
    /// Wall-clock time for the whole run.
    pub elapsed: Duration,
    /// Wall-clock time per stage, in stage order.
    pub stage_durations: Vec<Duration>,
    pub status: PlanStatus,
}

impl PlanResult {
    pub fn is_success(&self) -> bool {
        self.status == PlanStatus::Success
    }
}

/// What one dispatched task resolved to.
enum Outcome {
    Completed { id: TaskId, output: String },
    Failed { id: TaskId, error: String },
    Cancelled { id: TaskId },
}

impl Outcome {
    fn id(&self) -> TaskId {
        match self {
            Outcome::Completed { id, .. }
            | Outcome::Failed { id, .. }
            | Outcome::Cancelled { id } => *id,
        }
    }
}

/// Drives a [`StagePlan`] to completion against a shared graph.
pub struct ExecutionCoordinator {
    graph: Arc<RwLock<TaskGraph>>,
    dispatcher: Arc<dyn AgentDispatch>,
    options: RunOptions,
    cancel: CancellationToken,
    event_tx: Option<mpsc::Sender<ExecutionEvent>>,
}

impl ExecutionCoordinator {
    pub fn new(
        graph: Arc<RwLock<TaskGraph>>,
        dispatcher: Arc<dyn AgentDispatch>,
        options: RunOptions,
    ) -> Self {
        Self {
            graph,
            dispatcher,
            options,
            cancel: CancellationToken::new(),
            event_tx: None,
        }
    }

    /// Attach an event channel for run observers.
    pub fn with_events(mut self, tx: mpsc::Sender<ExecutionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Token an external caller can cancel to abort the run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn emit(&self, event: ExecutionEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Execute the plan.
    ///
    /// Stages run strictly in order; a stage's tasks run concurrently
    /// up to `max_parallel`. Only `Pending` tasks are dispatched, so a
    /// resumed graph skips its completed work automatically.
    pub async fn run(&self, plan: &StagePlan, hints: &ContextHints) -> Result<PlanResult> {
        let run_started = Instant::now();
        let hints = Arc::new(hints.clone());
        let semaphore = Arc::new(Semaphore::new(self.options.max_parallel.max(1)));

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        let mut blocked = Vec::new();
        let mut cancelled = Vec::new();
        let mut stage_durations = Vec::new();

        stlog!(
            "Run starting: {} stages, {} tasks, max_parallel={}",
            plan.len(),
            plan.task_count(),
            self.options.max_parallel
        );

        for (index, stage) in plan.stages().iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            let stage_started = Instant::now();

            // Only pending tasks are dispatched; blocked, cancelled, and
            // already-completed tasks pass through untouched.
            let runnable: Vec<TaskId> = {
                let graph = self.graph.read().await;
                stage
                    .iter()
                    .copied()
                    .filter(|id| graph.get(id).map(|t| t.is_pending()).unwrap_or(false))
                    .collect()
            };

            self.emit(ExecutionEvent::StageStarted {
                index,
                total: plan.len(),
                tasks: runnable.clone(),
            })
            .await;
            stlog_debug!("Stage {} of {}: {} task(s)", index + 1, plan.len(), runnable.len());

            let mut handles = Vec::with_capacity(runnable.len());
            for id in runnable.iter().copied() {
                handles.push(tokio::spawn(Self::run_task(
                    id,
                    Arc::clone(&self.graph),
                    Arc::clone(&self.dispatcher),
                    Arc::clone(&hints),
                    Arc::clone(&semaphore),
                    self.cancel.clone(),
                    self.options.task_timeout,
                    self.event_tx.clone(),
                )));
            }

            // Statuses were already committed by each worker as its
            // dispatch settled; this loop only does the bookkeeping.
            let mut stage_failed = Vec::new();
            for joined in join_all(handles).await {
                match joined {
                    Ok(Outcome::Completed { id, .. }) => {
                        completed.push(id);
                        self.emit(ExecutionEvent::TaskCompleted { task_id: id }).await;
                    }
                    Ok(Outcome::Failed { id, error }) => {
                        failed.push(id);
                        stage_failed.push(id);
                        self.emit(ExecutionEvent::TaskFailed {
                            task_id: id,
                            error,
                        })
                        .await;
                    }
                    Ok(Outcome::Cancelled { id }) => {
                        cancelled.push(id);
                    }
                    Err(e) => {
                        // A panicked worker loses its task id; the sweep
                        // below fails whatever is still marked running.
                        stlog_warn!("Dispatch worker join error: {}", e);
                    }
                }
            }

            // Defensive sweep: anything still in progress after the
            // stage settled came from a panicked worker.
            {
                let mut graph = self.graph.write().await;
                for id in stage {
                    if let Some(task) = graph.get_mut(id) {
                        if task.status == crate::core::TaskStatus::InProgress {
                            let message =
                                Error::TaskJoin("agent worker panicked".to_string()).to_string();
                            task.fail(&message);
                            failed.push(*id);
                            stage_failed.push(*id);
                        }
                    }
                }
            }

            stage_durations.push(stage_started.elapsed());

            if !stage_failed.is_empty() {
                let newly_blocked = self.propagate_blocking(&stage_failed).await;
                for id in &newly_blocked {
                    self.emit(ExecutionEvent::TaskBlocked { task_id: *id }).await;
                }
                blocked.extend(newly_blocked);

                if self.options.fail_fast {
                    let swept = self.cancel_remaining("fail-fast abort").await;
                    if !swept.is_empty() {
                        self.emit(ExecutionEvent::TasksCancelled {
                            tasks: swept.clone(),
                        })
                        .await;
                        cancelled.extend(swept);
                    }
                    break;
                }
            }
        }

        if self.cancel.is_cancelled() {
            let swept = self.cancel_remaining("run aborted").await;
            if !swept.is_empty() {
                self.emit(ExecutionEvent::TasksCancelled {
                    tasks: swept.clone(),
                })
                .await;
                cancelled.extend(swept);
            }
        }

        // Report ids deterministically, in creation order.
        {
            let graph = self.graph.read().await;
            let position: HashMap<TaskId, usize> = graph
                .order()
                .iter()
                .enumerate()
                .map(|(i, id)| (*id, i))
                .collect();
            for list in [&mut completed, &mut failed, &mut blocked, &mut cancelled] {
                list.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
            }
        }

        let status = if self.cancel.is_cancelled() && !cancelled.is_empty() {
            PlanStatus::Cancelled
        } else if failed.is_empty() && blocked.is_empty() && cancelled.is_empty() {
            PlanStatus::Success
        } else {
            PlanStatus::Partial
        };

        stlog!(
            "Run finished: status={} completed={} failed={} blocked={} cancelled={} elapsed={:?}",
            status,
            completed.len(),
            failed.len(),
            blocked.len(),
            cancelled.len(),
            run_started.elapsed()
        );
        self.emit(ExecutionEvent::RunFinished { status }).await;

        Ok(PlanResult {
            completed,
            failed,
            blocked,
            cancelled,
            elapsed: run_started.elapsed(),
            stage_durations,
            status,
        })
    }

    /// One task's dispatch lifecycle, run inside the stage's worker set.
    ///
    /// The terminal status is committed here, while the semaphore permit
    /// is still held, so the graph never shows more than `max_parallel`
    /// tasks in progress at once: a task is `InProgress` only between
    /// `start()` and the commit, and both happen under the same permit.
    #[allow(clippy::too_many_arguments)]
    async fn run_task(
        id: TaskId,
        graph: Arc<RwLock<TaskGraph>>,
        dispatcher: Arc<dyn AgentDispatch>,
        hints: Arc<ContextHints>,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
        task_timeout: Duration,
        event_tx: Option<mpsc::Sender<ExecutionEvent>>,
    ) -> Outcome {
        let Ok(_permit) = semaphore.acquire_owned().await else {
            return Self::commit(&graph, Outcome::Cancelled { id }).await;
        };
        if cancel.is_cancelled() {
            return Self::commit(&graph, Outcome::Cancelled { id }).await;
        }

        // Mark started and snapshot the task for the dispatcher.
        let task = {
            let mut graph = graph.write().await;
            match graph.get_mut(&id) {
                Some(task) => {
                    task.start();
                    task.clone()
                }
                None => {
                    return Outcome::Failed {
                        id,
                        error: "task missing from graph".to_string(),
                    }
                }
            }
        };
        if let Some(tx) = &event_tx {
            let _ = tx.send(ExecutionEvent::TaskStarted { task_id: id }).await;
        }

        let work = dispatcher.dispatch(&task, &hints);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Outcome::Cancelled { id },
            res = tokio::time::timeout(task_timeout, work) => match res {
                Err(_) => Outcome::Failed {
                    id,
                    error: Error::DispatchTimeout {
                        task: task.name.clone(),
                        after: task_timeout,
                    }
                    .to_string(),
                },
                Ok(Ok(output)) => Outcome::Completed { id, output },
                Ok(Err(e)) => Outcome::Failed {
                    id,
                    error: e.to_string(),
                },
            },
        };
        Self::commit(&graph, outcome).await
    }

    /// Write an outcome's terminal status into the graph.
    ///
    /// Called by the worker before its permit is released; the stage
    /// loop afterwards only aggregates the returned outcomes.
    async fn commit(graph: &Arc<RwLock<TaskGraph>>, outcome: Outcome) -> Outcome {
        let mut graph = graph.write().await;
        if let Some(task) = graph.get_mut(&outcome.id()) {
            match &outcome {
                Outcome::Completed { output, .. } => task.complete(output),
                Outcome::Failed { error, .. } => task.fail(error),
                Outcome::Cancelled { .. } => task.cancel("run aborted"),
            }
        }
        outcome
    }

    /// Block every pending transitive dependent of the given failures.
    ///
    /// Computed once per stage, after all of its tasks settled and
    /// before the next stage starts.
    async fn propagate_blocking(&self, newly_failed: &[TaskId]) -> Vec<TaskId> {
        let mut blocked_by: HashMap<TaskId, TaskId> = HashMap::new();
        {
            let graph = self.graph.read().await;
            for fid in newly_failed {
                for dependent in graph.dependents_closure(fid) {
                    blocked_by.entry(dependent).or_insert(*fid);
                }
            }
        }

        let mut newly_blocked = Vec::new();
        let mut graph = self.graph.write().await;
        for id in graph.order().to_vec() {
            let Some(&fid) = blocked_by.get(&id) else {
                continue;
            };
            let cause = graph.get(&fid).map(|t| t.name.clone()).unwrap_or_default();
            if let Some(task) = graph.get_mut(&id) {
                if task.is_pending() {
                    task.block(&format!("dependency '{}' failed", cause));
                    newly_blocked.push(id);
                }
            }
        }
        newly_blocked
    }

    /// Cancel every still-pending task; returns the cancelled ids.
    async fn cancel_remaining(&self, reason: &str) -> Vec<TaskId> {
        let mut swept = Vec::new();
        let mut graph = self.graph.write().await;
        for id in graph.order().to_vec() {
            if let Some(task) = graph.get_mut(&id) {
                if task.is_pending() {
                    task.cancel(reason);
                    swept.push(id);
                }
            }
        }
        swept
    }
}
