use std::sync::Arc;

use timeloom::events::Event;
use timeloom::runtime::{Engine, ExecutionManager, ManagerError, RunOutcome};
use timeloom::services::Services;

mod common;
use common::*;

fn manager_with(services: &Services) -> ExecutionManager {
    let graph = timeloom::graph::compile(two_agent_registry().as_ref(), services).unwrap();
    let store: Arc<dyn timeloom::checkpoint::CheckpointStore> =
        Arc::new(timeloom::checkpoint::InMemoryStore::new());
    ExecutionManager::new(Arc::new(Engine::new(Arc::new(graph), store)))
}

#[tokio::test]
async fn cancelling_mid_node_writes_no_checkpoint() {
    let (executor, started) = BlockingExecutor::new();
    let decisions = ScriptedDecisions::new(&[&["researcher"]]);
    let services = Services::new(decisions, executor);
    let manager = manager_with(&services);
    let store = manager.engine().store().clone();

    let run = manager.start_run("m1", "hang on this").unwrap();
    started.notified().await;

    // The researcher is blocked inside the executor; the head is the
    // supervisor checkpoint that dispatched it.
    let head_before = store.head("m1").await.unwrap().unwrap();
    assert_eq!(head_before.pending_next, vec!["agent:researcher".to_string()]);
    let count_before = store.history("m1").await.unwrap().len();

    assert!(manager.cancel("m1"));
    let outcome = run.handle.await.unwrap().unwrap();
    match outcome {
        RunOutcome::Cancelled { checkpoint } => {
            assert_eq!(checkpoint.unwrap().id, head_before.id);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }

    // Nothing new was persisted for the aborted step.
    assert_eq!(store.history("m1").await.unwrap().len(), count_before);
    assert_eq!(store.head("m1").await.unwrap().unwrap().id, head_before.id);
}

#[tokio::test]
async fn a_second_run_on_the_same_thread_is_rejected() {
    let (executor, started) = BlockingExecutor::new();
    let decisions = ScriptedDecisions::new(&[&["researcher"], &["researcher"]]);
    let services = Services::new(decisions, executor);
    let manager = manager_with(&services);

    let run = manager.start_run("m2", "first").unwrap();
    started.notified().await;

    let err = manager.start_run("m2", "second").unwrap_err();
    assert!(matches!(err, ManagerError::AlreadyRunning { .. }));

    // A different thread is unaffected.
    let other = manager.start_run("m2b", "parallel").unwrap();
    assert_eq!(manager.running(), vec!["m2".to_string(), "m2b".to_string()]);

    manager.cancel("m2");
    manager.cancel("m2b");
    let _ = run.handle.await;
    let _ = other.handle.await;
}

#[tokio::test]
async fn finished_runs_deregister_their_handles() {
    let decisions = ScriptedDecisions::new(&[&["researcher"], &["FINISH"]]);
    let services = Services::new(decisions, Arc::new(EchoExecutor));
    let manager = manager_with(&services);

    let run = manager.start_run("m3", "quick question").unwrap();
    let outcome = run.handle.await.unwrap().unwrap();
    assert!(matches!(outcome, RunOutcome::Interrupted { .. }));
    assert!(manager.running().is_empty());

    let resume = manager.resume_run("m3", None, None).unwrap();
    let outcome = resume.handle.await.unwrap().unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert!(manager.running().is_empty());
}

#[tokio::test]
async fn the_event_stream_reports_run_progress() {
    let decisions = ScriptedDecisions::new(&[&["researcher"], &["FINISH"]]);
    let services = Services::new(decisions, Arc::new(EchoExecutor));
    let manager = manager_with(&services);

    let run = manager.start_run("m4", "stream me").unwrap();
    let mut events = Vec::new();
    while let Some(event) = run.events.next().await {
        events.push(event);
    }
    run.handle.await.unwrap().unwrap();

    assert!(events
        .iter()
        .any(|e| matches!(e, Event::NodeStart { node, .. } if node == "preprocess")));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Token { node, .. } if node == "agent:researcher")));
    assert!(events.iter().any(|e| matches!(e, Event::Checkpoint { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Interrupt { node, .. } if node == "qa")));
}

#[tokio::test]
async fn cancel_of_an_idle_thread_reports_nothing_to_cancel() {
    let decisions = ScriptedDecisions::new(&[]);
    let services = Services::new(decisions, Arc::new(EchoExecutor));
    let manager = manager_with(&services);
    assert!(!manager.cancel("nobody-home"));
}
