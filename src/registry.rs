//! Declarative registry of dynamic graph members.
//!
//! Agents and workflows are data, not code: the compiler turns registry
//! entries into graph nodes and wires them to the supervisor. A registry
//! snapshot is immutable; recompiling with a new snapshot is how the node
//! set changes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A dynamically registered agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Registry name; becomes `NodeKind::Agent(name)`.
    pub name: String,
    /// Capability description surfaced to the decision service.
    #[serde(default)]
    pub description: String,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// One vertex of a declarative sub-workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowNodeSpec {
    /// Instance id, unique within the workflow.
    pub id: String,
    /// Node type: `"supervisor"`, an agent name, or another control name.
    pub node_type: String,
}

/// A dynamically registered sub-workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// Registry name; becomes `NodeKind::Workflow(name)`.
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<WorkflowNodeSpec>,
    /// Directed edges between instance ids. The target `"End"` terminates
    /// the sub-run.
    pub edges: Vec<(String, String)>,
}

/// Source of dynamic graph members.
pub trait Registry: Send + Sync {
    fn agents(&self) -> Vec<AgentSpec>;
    fn workflows(&self) -> Vec<WorkflowSpec>;
}

/// Fixed in-memory registry. The common case: built once at startup, shared
/// behind an [`Arc`].
#[derive(Clone, Debug, Default)]
pub struct StaticRegistry {
    agents: Vec<AgentSpec>,
    workflows: Vec<WorkflowSpec>,
}

impl StaticRegistry {
    pub fn builder() -> StaticRegistryBuilder {
        StaticRegistryBuilder::default()
    }
}

impl Registry for StaticRegistry {
    fn agents(&self) -> Vec<AgentSpec> {
        self.agents.clone()
    }

    fn workflows(&self) -> Vec<WorkflowSpec> {
        self.workflows.clone()
    }
}

#[derive(Debug, Default)]
pub struct StaticRegistryBuilder {
    agents: Vec<AgentSpec>,
    workflows: Vec<WorkflowSpec>,
}

impl StaticRegistryBuilder {
    #[must_use]
    pub fn agent(mut self, spec: AgentSpec) -> Self {
        self.agents.push(spec);
        self
    }

    #[must_use]
    pub fn workflow(mut self, spec: WorkflowSpec) -> Self {
        self.workflows.push(spec);
        self
    }

    pub fn build(self) -> Arc<StaticRegistry> {
        Arc::new(StaticRegistry {
            agents: self.agents,
            workflows: self.workflows,
        })
    }
}
