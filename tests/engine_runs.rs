use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use timeloom::events::Event;
use timeloom::graph::Graph;
use timeloom::nodes::{AgentNode, PreprocessNode, QaNode, SupervisorNode};
use timeloom::runtime::{RunOutcome, RuntimeConfig};
use timeloom::services::{Redactor, Services};
use timeloom::task::TaskStatus;
use timeloom::types::NodeKind;

mod common;
use common::*;

#[tokio::test]
async fn run_reaches_qa_interrupt_and_resumes_to_completion() {
    let decisions = ScriptedDecisions::new(&[&["researcher"], &["FINISH"]]);
    let services = Services::new(decisions, Arc::new(EchoExecutor));
    let engine = engine_with(&services);

    let (outcome, events) = run_to_outcome(&engine, "t1", "what is a superstep?").await;
    match outcome {
        RunOutcome::Interrupted { before, .. } => assert_eq!(before, vec![NodeKind::Qa]),
        other => panic!("expected interrupt before qa, got {other:?}"),
    }
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Interrupt { node, .. } if node == "qa")));

    let (outcome, _) = resume_to_outcome(&engine, "t1", None, None).await;
    let checkpoint = match outcome {
        RunOutcome::Completed { checkpoint } => checkpoint,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(checkpoint.pending_next, vec!["End".to_string()]);

    let head = engine.store().head("t1").await.unwrap().unwrap();
    // Researcher echo plus the qa review.
    assert_eq!(head.state.results.len(), 2);
    assert_eq!(
        head.state.results.get()[0].summary,
        "echo: what is a superstep?"
    );
    // User input, researcher note, qa answer.
    assert_eq!(head.state.messages.len(), 3);
}

#[tokio::test]
async fn new_input_on_an_existing_thread_concatenates() {
    let decisions = ScriptedDecisions::new(&[&["researcher"], &["FINISH"]]);
    let services = Services::new(decisions, Arc::new(EchoExecutor));
    let engine = engine_with(&services);

    run_to_completion(&engine, "t2", "ask one").await;
    run_to_completion(&engine, "t2", "ask two").await;

    let head = engine.store().head("t2").await.unwrap().unwrap();
    assert_eq!(head.state.input.get(), "ask one\n\nask two");
}

#[tokio::test]
async fn empty_input_short_circuits_to_terminal() {
    let decisions = ScriptedDecisions::new(&[]);
    let services = Services::new(decisions, Arc::new(EchoExecutor));
    let engine = engine_with(&services);

    let (outcome, events) = run_to_outcome(&engine, "t3", "   ").await;
    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert!(events.iter().any(|e| matches!(e, Event::Done { .. })));

    let head = engine.store().head("t3").await.unwrap().unwrap();
    assert_eq!(head.pending_next, vec!["End".to_string()]);
    assert!(head.state.results.is_empty());
}

#[tokio::test]
async fn node_failure_is_recorded_and_the_run_continues() {
    let decisions = ScriptedDecisions::new(&[&["researcher"], &["FINISH"]]);
    let services = Services::new(decisions, Arc::new(FailingExecutor { message: "backend down" }));
    let engine = engine_with(&services);

    let outcome = run_to_completion(&engine, "t4", "try anyway").await;
    assert!(matches!(outcome, RunOutcome::Completed { .. }));

    let head = engine.store().head("t4").await.unwrap().unwrap();
    // The researcher's failed attempt is persisted as data.
    assert!(head
        .state
        .results
        .get()
        .iter()
        .any(|r| r.status == TaskStatus::Failed));
    assert!(!head.state.errors.is_empty());
}

#[tokio::test]
async fn node_timeout_is_a_failed_node_not_a_failed_run() {
    let decisions = ScriptedDecisions::new(&[&["researcher"], &["FINISH"]]);
    let services = Services::new(
        decisions,
        Arc::new(SlowExecutor {
            delay: Duration::from_millis(200),
        }),
    );
    let config = RuntimeConfig {
        node_timeout: Duration::from_millis(50),
        ..RuntimeConfig::default()
    };
    let engine = engine_with_config(&services, config);

    let outcome = run_to_completion(&engine, "t5", "slow question").await;
    assert!(matches!(outcome, RunOutcome::Completed { .. }));

    let head = engine.store().head("t5").await.unwrap().unwrap();
    assert!(head
        .state
        .errors
        .get()
        .iter()
        .any(|e| e.error.message.contains("timed out")));
}

#[tokio::test]
async fn tool_execution_interrupt_accepts_an_edited_call_list() {
    let decisions = ScriptedDecisions::new(&[&["tool_planning"], &["FINISH"]]);
    let services = Services::new(decisions, Arc::new(EchoExecutor));
    let engine = engine_with(&services);

    let (outcome, _) = run_to_outcome(&engine, "t6", "draft the plan").await;
    match outcome {
        RunOutcome::Interrupted { before, .. } => {
            assert_eq!(before, vec![NodeKind::ToolExecution]);
        }
        other => panic!("expected interrupt before tool_execution, got {other:?}"),
    }

    // A human edits the staged call during the pause.
    let (outcome, _) =
        resume_to_outcome(&engine, "t6", None, Some(json!(["edited call"]))).await;
    assert!(matches!(outcome, RunOutcome::Interrupted { .. }));
    let (outcome, _) = resume_to_outcome(&engine, "t6", None, None).await;
    assert!(matches!(outcome, RunOutcome::Completed { .. }));

    let head = engine.store().head("t6").await.unwrap().unwrap();
    let summaries: Vec<&str> = head
        .state
        .results
        .get()
        .iter()
        .map(|r| r.summary.as_str())
        .collect();
    assert!(summaries.contains(&"echo: edited call"));
    assert!(!summaries.contains(&"echo: draft the plan"));
}

#[tokio::test]
async fn a_redactor_wired_through_services_scrubs_stored_input() {
    let decisions = ScriptedDecisions::new(&[&["researcher"], &["FINISH"]]);
    let redactor: Redactor = Arc::new(|text: &str| text.replace("hunter2", "[redacted]"));
    let services = Services::new(decisions, Arc::new(EchoExecutor)).with_redactor(redactor);
    let engine = engine_with(&services);

    run_to_completion(&engine, "t8", "the password is hunter2").await;

    let head = engine.store().head("t8").await.unwrap().unwrap();
    assert_eq!(head.state.input.get(), "the password is [redacted]");
    // Nothing downstream of the input ever saw the raw text.
    assert!(head
        .state
        .results
        .get()
        .iter()
        .all(|r| !r.summary.contains("hunter2")));
}

/// Compile-equivalent wiring without the interrupt set, for the round-trip
/// equivalence check.
fn uninterrupted_graph(services: &Services) -> Graph {
    let routable = vec![
        NodeKind::Agent("researcher".into()),
        NodeKind::Agent("analyst".into()),
        NodeKind::ToolPlanning,
        NodeKind::Qa,
    ];
    Graph::builder()
        .add_node(NodeKind::Preprocess, Arc::new(PreprocessNode))
        .add_node(
            NodeKind::Supervisor,
            Arc::new(SupervisorNode::new(services.decisions.clone(), routable)),
        )
        .add_node(
            NodeKind::Agent("researcher".into()),
            Arc::new(AgentNode::new("researcher", services.executor.clone())),
        )
        .add_node(NodeKind::Qa, Arc::new(QaNode::new(services.executor.clone())))
        .add_edge(NodeKind::Start, NodeKind::Preprocess)
        .add_edge(NodeKind::Preprocess, NodeKind::Supervisor)
        .add_edge(NodeKind::Agent("researcher".into()), NodeKind::Supervisor)
        .add_edge(NodeKind::Qa, NodeKind::End)
        .build()
}

#[tokio::test]
async fn interrupted_then_resumed_run_matches_an_uninterrupted_one() {
    let script: &[&[&str]] = &[&["researcher"], &["FINISH"]];

    let services_a = Services::new(ScriptedDecisions::new(script), Arc::new(EchoExecutor));
    let engine_a = engine_with(&services_a);
    run_to_completion(&engine_a, "t7", "same question").await;

    let services_b = Services::new(ScriptedDecisions::new(script), Arc::new(EchoExecutor));
    let store: Arc<dyn timeloom::checkpoint::CheckpointStore> =
        Arc::new(timeloom::checkpoint::InMemoryStore::new());
    let engine_b = timeloom::runtime::Engine::new(
        Arc::new(uninterrupted_graph(&services_b)),
        store,
    );
    let (outcome, _) = run_to_outcome(&engine_b, "t7", "same question").await;
    assert!(matches!(outcome, RunOutcome::Completed { .. }));

    let a = engine_a.store().head("t7").await.unwrap().unwrap().state;
    let b = engine_b.store().head("t7").await.unwrap().unwrap().state;
    assert_eq!(a.messages.get(), b.messages.get());
    let summaries = |s: &timeloom::state::RunState| -> Vec<String> {
        s.results.get().iter().map(|r| r.summary.clone()).collect()
    };
    assert_eq!(summaries(&a), summaries(&b));
}
