use std::sync::Arc;

use timeloom::runtime::{fork, reconstruct, StateOverrides};
use timeloom::services::Services;
use timeloom::types::{FORK_MARKER, START_MARKER};

mod common;
use common::*;

#[tokio::test]
async fn a_linear_run_reconstructs_as_a_labelled_chain() {
    let decisions = ScriptedDecisions::new(&[&["researcher"], &["FINISH"]]);
    let services = Services::new(decisions, Arc::new(EchoExecutor));
    let engine = engine_with(&services);

    run_to_completion(&engine, "topo1", "question").await;
    let history = engine.store().history("topo1").await.unwrap();
    let entries = reconstruct(&history);

    assert_eq!(entries.len(), history.len());
    assert_eq!(entries[0].node, START_MARKER);
    assert!(entries[0].parent_id.is_none());

    let labels: Vec<&str> = entries.iter().map(|e| e.node.as_str()).collect();
    assert!(labels.contains(&"preprocess"));
    assert!(labels.contains(&"supervisor"));
    assert!(labels.contains(&"agent:researcher"));
    assert!(labels.contains(&"qa"));

    // Linear history: every non-root entry is its parent's only child.
    for entry in &entries[..entries.len() - 1] {
        assert_eq!(entry.children.len(), 1);
    }
    assert!(entries.last().unwrap().children.is_empty());
}

#[tokio::test]
async fn forks_appear_as_sibling_branches() {
    let decisions = ScriptedDecisions::new(&[&["researcher"], &["FINISH"]]);
    let services = Services::new(decisions, Arc::new(EchoExecutor));
    let engine = engine_with(&services);

    run_to_completion(&engine, "topo2", "question").await;
    let root_id = engine
        .store()
        .history("topo2")
        .await
        .unwrap()
        .last()
        .unwrap()
        .id
        .clone();
    fork(
        engine.store().as_ref(),
        "topo2",
        &root_id,
        StateOverrides::default(),
    )
    .await
    .unwrap();

    let history = engine.store().history("topo2").await.unwrap();
    let entries = reconstruct(&history);
    let root_entry = entries
        .iter()
        .find(|e| e.checkpoint_id == root_id)
        .unwrap();
    assert_eq!(root_entry.children.len(), 2);
    assert!(entries.iter().any(|e| e.node == FORK_MARKER));
}

#[tokio::test]
async fn reconstruction_is_stable_across_repeated_calls() {
    let decisions = ScriptedDecisions::new(&[&["researcher"], &["FINISH"]]);
    let services = Services::new(decisions, Arc::new(EchoExecutor));
    let engine = engine_with(&services);

    run_to_completion(&engine, "topo3", "question").await;
    let history = engine.store().history("topo3").await.unwrap();
    assert_eq!(reconstruct(&history), reconstruct(&history));
}
