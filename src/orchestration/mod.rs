//! Orchestration layer for the strata multi-agent system.
//!
//! This module turns a problem statement into a validated task graph,
//! layers the graph into parallel-execution stages, and drives those
//! stages against external agent workers.

mod builder;
mod coordinator;
mod dispatch;
mod scheduler;

pub use builder::{capability_for, TaskGraphBuilder};
pub use coordinator::{
    ExecutionCoordinator, ExecutionEvent, PlanResult, PlanStatus, RunOptions,
};
pub use dispatch::{render_prompt, AgentDispatch, ProcessDispatch, SimulatedDispatch};
pub use scheduler::StagePlan;
