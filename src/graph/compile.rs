//! Registry-driven graph compilation.
//!
//! Compilation is deterministic: the same registry snapshot and services
//! always yield the same node set and wiring. Dynamic names that collide
//! with reserved control names are skipped with a warning; duplicate
//! dynamic names are a hard error.

use miette::Diagnostic;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use thiserror::Error;

use super::builder::Graph;
use crate::nodes::{
    AgentNode, PreprocessNode, QaNode, SupervisorNode, ToolExecutionNode, ToolPlanningNode,
    WorkflowNode,
};
use crate::registry::Registry;
use crate::runtime::workflow::{ComposedWorkflow, ComposerError};
use crate::services::Services;
use crate::types::NodeKind;

#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    #[error("duplicate dynamic node name `{name}`")]
    #[diagnostic(
        code(timeloom::compile::duplicate_node),
        help("agent and workflow names share one namespace; rename one of the entries")
    )]
    DuplicateNode { name: String },

    #[error("workflow `{name}` failed to compose")]
    #[diagnostic(code(timeloom::compile::workflow))]
    Workflow {
        name: String,
        #[source]
        #[diagnostic_source]
        source: ComposerError,
    },
}

/// Compile the registry snapshot into an executable graph.
pub fn compile(registry: &dyn Registry, services: &Services) -> Result<Graph, CompileError> {
    let agents = registry.agents();
    let workflows = registry.workflows();

    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut dynamic: Vec<NodeKind> = Vec::new();

    let mut builder = Graph::builder()
        .entry(NodeKind::Preprocess)
        .interrupt_before(NodeKind::Qa)
        .interrupt_before(NodeKind::ToolExecution)
        .redactor(services.redactor.clone())
        .add_node(NodeKind::Preprocess, Arc::new(PreprocessNode))
        .add_node(NodeKind::ToolPlanning, Arc::new(ToolPlanningNode))
        .add_node(
            NodeKind::ToolExecution,
            Arc::new(ToolExecutionNode::new(services.executor.clone())),
        )
        .add_node(NodeKind::Qa, Arc::new(QaNode::new(services.executor.clone())));

    for agent in &agents {
        if NodeKind::is_reserved_name(&agent.name) {
            tracing::warn!(name = %agent.name, "agent name collides with a control node, skipping");
            continue;
        }
        if !seen.insert(agent.name.clone()) {
            return Err(CompileError::DuplicateNode {
                name: agent.name.clone(),
            });
        }
        let kind = NodeKind::Agent(agent.name.clone());
        builder = builder.add_node(
            kind.clone(),
            Arc::new(AgentNode::new(agent.name.clone(), services.executor.clone())),
        );
        dynamic.push(kind);
    }

    for workflow in &workflows {
        if NodeKind::is_reserved_name(&workflow.name) {
            tracing::warn!(name = %workflow.name, "workflow name collides with a control node, skipping");
            continue;
        }
        if !seen.insert(workflow.name.clone()) {
            return Err(CompileError::DuplicateNode {
                name: workflow.name.clone(),
            });
        }
        let composed =
            ComposedWorkflow::compose(workflow, &agents, services).map_err(|source| {
                CompileError::Workflow {
                    name: workflow.name.clone(),
                    source,
                }
            })?;
        let kind = NodeKind::Workflow(workflow.name.clone());
        builder = builder.add_node(kind.clone(), Arc::new(WorkflowNode::new(Arc::new(composed))));
        dynamic.push(kind);
    }

    // The supervisor may route to every dynamic node plus tool planning
    // and qa.
    let mut routable = dynamic.clone();
    routable.push(NodeKind::ToolPlanning);
    routable.push(NodeKind::Qa);
    builder = builder.add_node(
        NodeKind::Supervisor,
        Arc::new(SupervisorNode::new(services.decisions.clone(), routable)),
    );

    // Static wiring. The supervisor routes explicitly, so it carries no
    // static edges; everything else funnels back to it.
    builder = builder
        .add_edge(NodeKind::Start, NodeKind::Preprocess)
        .add_edge(NodeKind::Preprocess, NodeKind::Supervisor)
        .add_edge(NodeKind::ToolPlanning, NodeKind::ToolExecution)
        .add_edge(NodeKind::ToolExecution, NodeKind::Supervisor)
        .add_edge(NodeKind::Qa, NodeKind::End);
    for kind in &dynamic {
        builder = builder.add_edge(kind.clone(), NodeKind::Supervisor);
    }

    let graph = builder.build();
    tracing::info!(
        nodes = graph.node_kinds().len(),
        agents = agents.len(),
        workflows = workflows.len(),
        "graph compiled"
    );
    Ok(graph)
}
