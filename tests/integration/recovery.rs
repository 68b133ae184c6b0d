//! Session persistence and resume behavior.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::RwLock;

use strata::core::TaskStatus;
use strata::error::Error;
use strata::orchestration::{ExecutionCoordinator, PlanStatus, RunOptions, StagePlan};
use strata::project::ContextHints;
use strata::state::{CheckpointEntry, ContextStore, DecisionEntry};

use crate::fixtures::{graph_of, id_of, ScriptedDispatch};

fn store() -> (ContextStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = ContextStore::open(dir.path()).unwrap();
    (store, dir)
}

#[tokio::test]
async fn test_interrupted_run_resumes_to_completion() {
    let (store, _dir) = store();

    // First session: run a three-stage chain but abort partway through.
    let graph = graph_of(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
    let plan = StagePlan::compute(&graph).unwrap();
    let graph = Arc::new(RwLock::new(graph));

    let dispatcher =
        Arc::new(ScriptedDispatch::new().with_delay(Duration::from_millis(60)));
    let coordinator = ExecutionCoordinator::new(
        Arc::clone(&graph),
        dispatcher,
        RunOptions::default(),
    );

    let token = coordinator.cancel_token();
    tokio::spawn(async move {
        // Let 'a' finish, then abort during 'b'.
        tokio::time::sleep(Duration::from_millis(90)).await;
        token.cancel();
    });

    let first = coordinator.run(&plan, &ContextHints::new()).await.unwrap();
    assert_eq!(first.status, PlanStatus::Cancelled);
    assert_eq!(first.completed.len(), 1);

    // Persist the partial state, as the CLI does before exiting.
    store.save_state(&*graph.read().await).unwrap();

    // Second session: load, requeue interrupted tasks, run the rest.
    let mut resumed = store.load_state().unwrap();
    for id in resumed.order().to_vec() {
        let task = resumed.get_mut(&id).unwrap();
        if matches!(
            task.status,
            TaskStatus::InProgress | TaskStatus::Cancelled { .. }
        ) {
            task.status = TaskStatus::Pending;
        }
    }
    let plan = StagePlan::compute(&resumed).unwrap();
    let resumed = Arc::new(RwLock::new(resumed));

    let dispatcher = Arc::new(ScriptedDispatch::new());
    let coordinator = ExecutionCoordinator::new(
        Arc::clone(&resumed),
        dispatcher.clone(),
        RunOptions::default(),
    );
    let second = coordinator.run(&plan, &ContextHints::new()).await.unwrap();

    assert_eq!(second.status, PlanStatus::Success);
    // 'a' completed in the first session and was not re-dispatched.
    assert!(!dispatcher.dispatched().contains(&"a".to_string()));
    let final_graph = resumed.read().await;
    assert!(final_graph.tasks().all(|t| t.status == TaskStatus::Completed));

    store.save_state(&final_graph).unwrap();
    let counts = store.load_state().unwrap().status_counts();
    assert_eq!(counts.completed, 3);
}

#[test]
fn test_snapshot_roundtrip_with_mixed_statuses() {
    let (store, _dir) = store();

    let mut graph = graph_of(&[
        ("done", &[]),
        ("broke", &[]),
        ("stuck", &["broke"]),
        ("waiting", &[]),
    ]);
    let id_done = id_of(&graph, "done");
    let id_broke = id_of(&graph, "broke");
    let id_stuck = id_of(&graph, "stuck");
    graph.get_mut(&id_done).unwrap().start();
    graph.get_mut(&id_done).unwrap().complete("all good");
    graph.get_mut(&id_broke).unwrap().fail("exit code 1");
    graph.get_mut(&id_stuck).unwrap().block("dependency 'broke' failed");

    store.save_state(&graph).unwrap();
    let loaded = store.load_state().unwrap();

    // Structure and field-wise contents are identical.
    assert_eq!(loaded.task_count(), 4);
    assert_eq!(loaded.dependency_count(), 1);
    for (orig, read) in graph.tasks().zip(loaded.tasks()) {
        assert_eq!(orig.id, read.id);
        assert_eq!(orig.status, read.status);
        assert_eq!(orig.result, read.result);
        assert_eq!(orig.depends_on, read.depends_on);
    }
    assert_eq!(
        loaded.get(&id_broke).unwrap().error(),
        Some("exit code 1")
    );
}

#[test]
fn test_corrupted_snapshot_is_fatal_to_resume() {
    let (store, dir) = store();
    std::fs::write(dir.path().join("state.json"), "[{\"id\": \"trunc").unwrap();

    assert!(matches!(
        store.load_state(),
        Err(Error::StateCorruption(_))
    ));
}

#[test]
fn test_snapshot_with_dangling_dependency_is_corrupt() {
    let (store, dir) = store();
    let graph = graph_of(&[("a", &[]), ("b", &["a"])]);
    let mut records = graph.to_records();
    records.remove(0); // b now references a task that is gone
    std::fs::write(
        dir.path().join("state.json"),
        serde_json::to_string_pretty(&records).unwrap(),
    )
    .unwrap();

    assert!(matches!(
        store.load_state(),
        Err(Error::StateCorruption(_))
    ));
}

#[test]
fn test_logs_accumulate_across_sessions() {
    let dir = TempDir::new().unwrap();

    {
        let store = ContextStore::open(dir.path()).unwrap();
        store
            .append_decision(&DecisionEntry::new("use JSONL logs", "append-only and greppable"))
            .unwrap();
        store
            .append_checkpoint(&CheckpointEntry::new("session one", "started"))
            .unwrap();
    }
    {
        let store = ContextStore::open(dir.path()).unwrap();
        store
            .append_decision(&DecisionEntry::new("resume from snapshot", "cheaper than replanning"))
            .unwrap();

        let decisions = store.read_decisions().unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].decision, "use JSONL logs");
        assert_eq!(decisions[1].decision, "resume from snapshot");
        assert_eq!(store.read_checkpoints().unwrap().len(), 1);
    }
}

#[test]
fn test_summary_reflects_persisted_run() {
    let (store, _dir) = store();

    let mut graph = graph_of(&[("t1", &[]), ("t2", &[])]);
    let id = id_of(&graph, "t1");
    graph.get_mut(&id).unwrap().start();
    graph.get_mut(&id).unwrap().complete("ok");
    store.save_state(&graph).unwrap();
    store
        .append_checkpoint(
            &CheckpointEntry::new("ship it", "halfway there")
                .with_next_actions(vec!["finish t2".to_string()])
                .with_completion_percent(50),
        )
        .unwrap();

    let summary = store.session_summary().unwrap();
    assert!(summary.contains("1 completed"));
    assert!(summary.contains("**ship it** (50%)"));
    assert!(summary.contains("- finish t2"));

    let handoff = store.handoff().unwrap();
    assert_eq!(handoff.tasks.len(), 2);
    assert_eq!(handoff.recent_checkpoints.len(), 1);
}
