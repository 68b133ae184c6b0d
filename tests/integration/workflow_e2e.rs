//! End-to-end scenarios: problem statement to PlanResult.

use std::sync::Arc;
use tokio::sync::RwLock;

use strata::core::TaskStatus;
use strata::error::Error;
use strata::orchestration::{
    ExecutionCoordinator, PlanStatus, RunOptions, SimulatedDispatch, StagePlan, TaskGraphBuilder,
};
use strata::project::ContextHints;

use crate::fixtures::{graph_of, id_of, ScriptedDispatch};

#[tokio::test]
async fn test_problem_to_completed_plan() {
    let builder = TaskGraphBuilder::new();
    let graph = builder
        .decompose(
            "- locate the auth modules [provides: auth-files]\n\
             - analyze the auth flow [needs: auth-files]\n\
             - summarize the findings [needs: auth-files] [after: analyze-the-auth-flow]",
            &ContextHints::new(),
        )
        .unwrap();
    let plan = StagePlan::compute(&graph).unwrap();
    assert_eq!(plan.len(), 3);

    let graph = Arc::new(RwLock::new(graph));
    let coordinator = ExecutionCoordinator::new(
        Arc::clone(&graph),
        Arc::new(SimulatedDispatch::new()),
        RunOptions::default(),
    );
    let result = coordinator
        .run(&plan, &ContextHints::new())
        .await
        .unwrap();

    assert_eq!(result.status, PlanStatus::Success);
    assert_eq!(result.completed.len(), 3);

    let graph = graph.read().await;
    for task in graph.tasks() {
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.result.as_deref().unwrap().contains(&task.name));
    }
}

#[tokio::test]
async fn test_single_task_success_scenario() {
    // Smallest possible plan: one task, one stage, one dispatch.
    let graph = graph_of(&[("t1", &[])]);
    let plan = StagePlan::compute(&graph).unwrap();
    let graph = Arc::new(RwLock::new(graph));

    let coordinator = ExecutionCoordinator::new(
        Arc::clone(&graph),
        Arc::new(ScriptedDispatch::new()),
        RunOptions::default(),
    );
    let result = coordinator.run(&plan, &ContextHints::new()).await.unwrap();

    assert_eq!(result.status, PlanStatus::Success);
    assert_eq!(result.completed.len(), 1);
    assert!(result.failed.is_empty());
    assert!(result.blocked.is_empty());
}

#[tokio::test]
async fn test_partial_failure_scenario() {
    // Two roots joining into one task; the first root fails.
    let graph = graph_of(&[("t1", &[]), ("t2", &[]), ("t3", &["t1", "t2"])]);
    let plan = StagePlan::compute(&graph).unwrap();
    assert_eq!(plan.len(), 2);
    assert_eq!(
        plan.stages()[0],
        vec![id_of(&graph, "t1"), id_of(&graph, "t2")]
    );
    assert_eq!(plan.stages()[1], vec![id_of(&graph, "t3")]);

    let dispatcher = Arc::new(ScriptedDispatch::new().failing("t1", "agent error"));
    let id_t1 = id_of(&graph, "t1");
    let id_t2 = id_of(&graph, "t2");
    let id_t3 = id_of(&graph, "t3");
    let graph = Arc::new(RwLock::new(graph));

    let coordinator = ExecutionCoordinator::new(
        Arc::clone(&graph),
        dispatcher.clone(),
        RunOptions::default(),
    );
    let result = coordinator.run(&plan, &ContextHints::new()).await.unwrap();

    assert_eq!(result.status, PlanStatus::Partial);
    assert_eq!(result.completed, vec![id_t2]);
    assert_eq!(result.failed, vec![id_t1]);
    assert_eq!(result.blocked, vec![id_t3]);
    assert!(!dispatcher.dispatched().contains(&"t3".to_string()));
}

#[tokio::test]
async fn test_cycle_rejected_before_any_dispatch() {
    // A->B->C->A is rejected by the builder...
    let builder = TaskGraphBuilder::new();
    let result = builder.decompose(
        "- task a [needs: c-out] [provides: a-out]\n\
         - task b [needs: a-out] [provides: b-out]\n\
         - task c [needs: b-out] [provides: c-out]",
        &ContextHints::new(),
    );
    match result {
        Err(Error::Cycle { tasks }) => {
            assert_eq!(tasks, vec!["task-a", "task-b", "task-c"]);
        }
        other => panic!("Expected Cycle error, got {:?}", other),
    }

    // ...and by the scheduler, for a graph that bypassed the builder.
    let graph = graph_of(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"])]);
    match StagePlan::compute(&graph) {
        Err(Error::Graph { tasks }) => {
            assert_eq!(tasks.len(), 3);
        }
        other => panic!("Expected Graph error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fallback_decomposition_runs_sequentially() {
    let builder = TaskGraphBuilder::new();
    let graph = builder
        .decompose("Build user authentication with JWT", &ContextHints::new())
        .unwrap();
    let plan = StagePlan::compute(&graph).unwrap();
    // Five chained phases: one per stage.
    assert_eq!(plan.len(), 5);

    let dispatcher = Arc::new(ScriptedDispatch::new());
    let graph = Arc::new(RwLock::new(graph));
    let coordinator = ExecutionCoordinator::new(
        Arc::clone(&graph),
        dispatcher.clone(),
        RunOptions::default(),
    );
    let result = coordinator.run(&plan, &ContextHints::new()).await.unwrap();

    assert_eq!(result.status, PlanStatus::Success);
    assert_eq!(
        dispatcher.dispatched(),
        vec![
            "analyze-requirements",
            "design-solution",
            "implement-core",
            "write-tests",
            "review-and-optimize"
        ]
    );
}

#[tokio::test]
async fn test_failed_task_errors_are_never_swallowed() {
    let graph = graph_of(&[("a", &[]), ("b", &[])]);
    let plan = StagePlan::compute(&graph).unwrap();
    let graph = Arc::new(RwLock::new(graph));

    let dispatcher = Arc::new(
        ScriptedDispatch::new()
            .failing("a", "first distinct error")
            .failing("b", "second distinct error"),
    );
    let coordinator = ExecutionCoordinator::new(
        Arc::clone(&graph),
        dispatcher,
        RunOptions::default(),
    );
    let result = coordinator.run(&plan, &ContextHints::new()).await.unwrap();

    assert_eq!(result.failed.len(), 2);
    let graph = graph.read().await;
    assert!(graph
        .find_by_name("a")
        .unwrap()
        .error()
        .unwrap()
        .contains("first distinct error"));
    assert!(graph
        .find_by_name("b")
        .unwrap()
        .error()
        .unwrap()
        .contains("second distinct error"));
}
