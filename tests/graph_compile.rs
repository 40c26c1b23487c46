use std::sync::Arc;

use timeloom::graph::{compile, CompileError};
use timeloom::registry::{AgentSpec, StaticRegistry, WorkflowNodeSpec, WorkflowSpec};
use timeloom::services::Services;
use timeloom::types::NodeKind;

mod common;
use common::*;

fn services() -> Services {
    Services::new(ScriptedDecisions::new(&[]), Arc::new(EchoExecutor))
}

#[test]
fn compiling_the_same_registry_twice_is_deterministic() {
    let registry = two_agent_registry();
    let services = services();
    let a = compile(registry.as_ref(), &services).unwrap();
    let b = compile(registry.as_ref(), &services).unwrap();
    assert_eq!(a.node_kinds(), b.node_kinds());
    assert_eq!(
        a.successors(&NodeKind::Preprocess),
        b.successors(&NodeKind::Preprocess)
    );
    assert_eq!(
        a.successors(&NodeKind::Agent("researcher".into())),
        b.successors(&NodeKind::Agent("researcher".into()))
    );
}

#[test]
fn control_wiring_funnels_back_to_the_supervisor() {
    let graph = compile(two_agent_registry().as_ref(), &services()).unwrap();
    assert_eq!(graph.entry(), &NodeKind::Preprocess);
    assert_eq!(
        graph.successors(&NodeKind::Preprocess),
        &[NodeKind::Supervisor]
    );
    assert_eq!(
        graph.successors(&NodeKind::ToolPlanning),
        &[NodeKind::ToolExecution]
    );
    assert_eq!(
        graph.successors(&NodeKind::ToolExecution),
        &[NodeKind::Supervisor]
    );
    assert_eq!(graph.successors(&NodeKind::Qa), &[NodeKind::End]);
    for agent in ["researcher", "analyst"] {
        assert_eq!(
            graph.successors(&NodeKind::Agent(agent.into())),
            &[NodeKind::Supervisor]
        );
    }
    assert!(graph.should_interrupt_before(&NodeKind::Qa));
    assert!(graph.should_interrupt_before(&NodeKind::ToolExecution));
    assert!(!graph.should_interrupt_before(&NodeKind::Supervisor));
}

#[test]
fn reserved_name_collisions_are_skipped_not_fatal() {
    let registry = StaticRegistry::builder()
        .agent(AgentSpec::new("qa", "shadows a control node"))
        .agent(AgentSpec::new("researcher", "fine"))
        .build();
    let graph = compile(registry.as_ref(), &services()).unwrap();
    assert!(!graph.contains(&NodeKind::Agent("qa".into())));
    assert!(graph.contains(&NodeKind::Agent("researcher".into())));
}

#[test]
fn duplicate_dynamic_names_are_a_compile_error() {
    let registry = StaticRegistry::builder()
        .agent(AgentSpec::new("researcher", "one"))
        .agent(AgentSpec::new("researcher", "two"))
        .build();
    assert!(matches!(
        compile(registry.as_ref(), &services()),
        Err(CompileError::DuplicateNode { .. })
    ));

    // Agents and workflows share the namespace.
    let registry = StaticRegistry::builder()
        .agent(AgentSpec::new("team", "an agent"))
        .workflow(WorkflowSpec {
            name: "team".to_string(),
            description: String::new(),
            nodes: vec![WorkflowNodeSpec {
                id: "t".to_string(),
                node_type: "team".to_string(),
            }],
            edges: vec![],
        })
        .build();
    assert!(matches!(
        compile(registry.as_ref(), &services()),
        Err(CompileError::DuplicateNode { .. })
    ));
}

#[test]
fn an_unresolvable_workflow_fails_the_whole_compile() {
    let registry = StaticRegistry::builder()
        .workflow(WorkflowSpec {
            name: "broken".to_string(),
            description: String::new(),
            nodes: vec![WorkflowNodeSpec {
                id: "x".to_string(),
                node_type: "unregistered_agent".to_string(),
            }],
            edges: vec![],
        })
        .build();
    assert!(matches!(
        compile(registry.as_ref(), &services()),
        Err(CompileError::Workflow { .. })
    ));
}
