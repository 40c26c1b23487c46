//! Graph and engine fixtures shared across the integration tests.

use std::sync::Arc;
use tokio::sync::watch;

use timeloom::checkpoint::{CheckpointStore, InMemoryStore};
use timeloom::events::{Event, EventEmitter};
use timeloom::graph::compile;
use timeloom::registry::{AgentSpec, StaticRegistry, WorkflowNodeSpec, WorkflowSpec};
use timeloom::runtime::{Engine, RunOutcome, RuntimeConfig};
use timeloom::services::Services;

/// Registry with two plain agents, the baseline for most tests.
pub fn two_agent_registry() -> Arc<StaticRegistry> {
    StaticRegistry::builder()
        .agent(AgentSpec::new("researcher", "looks things up"))
        .agent(AgentSpec::new("analyst", "crunches findings"))
        .build()
}

/// A supervisor-led workflow over the researcher agent.
pub fn team_workflow() -> WorkflowSpec {
    WorkflowSpec {
        name: "team".to_string(),
        description: "supervised research team".to_string(),
        nodes: vec![
            WorkflowNodeSpec {
                id: "lead".to_string(),
                node_type: "supervisor".to_string(),
            },
            WorkflowNodeSpec {
                id: "r1".to_string(),
                node_type: "researcher".to_string(),
            },
        ],
        edges: vec![("r1".to_string(), "lead".to_string())],
    }
}

/// Compile the two-agent registry and wrap it in an engine over a fresh
/// in-memory store.
pub fn engine_with(services: &Services) -> Arc<Engine> {
    engine_with_config(services, RuntimeConfig::default())
}

pub fn engine_with_config(services: &Services, config: RuntimeConfig) -> Arc<Engine> {
    let graph = compile(two_agent_registry().as_ref(), services).expect("compile");
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryStore::new());
    Arc::new(Engine::new(Arc::new(graph), store).with_config(config))
}

/// Drive a run to its first outcome, collecting the emitted events.
pub async fn run_to_outcome(engine: &Engine, thread: &str, input: &str) -> (RunOutcome, Vec<Event>) {
    let (emitter, events) = EventEmitter::channel();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let outcome = engine.run(thread, input, emitter, cancel_rx).await.expect("run");
    (outcome, events.drain())
}

/// Resume from the thread head (or an explicit checkpoint), collecting events.
pub async fn resume_to_outcome(
    engine: &Engine,
    thread: &str,
    from_checkpoint: Option<&str>,
    payload: Option<serde_json::Value>,
) -> (RunOutcome, Vec<Event>) {
    let (emitter, events) = EventEmitter::channel();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let outcome = engine
        .resume(thread, from_checkpoint, payload, emitter, cancel_rx)
        .await
        .expect("resume");
    (outcome, events.drain())
}

/// Run through every interrupt until the thread completes, resuming with no
/// payload each time.
pub async fn run_to_completion(engine: &Engine, thread: &str, input: &str) -> RunOutcome {
    let (mut outcome, _) = run_to_outcome(engine, thread, input).await;
    while matches!(outcome, RunOutcome::Interrupted { .. }) {
        outcome = resume_to_outcome(engine, thread, None, None).await.0;
    }
    outcome
}
