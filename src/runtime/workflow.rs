//! Declarative sub-workflow composition and execution.
//!
//! A [`WorkflowSpec`] is compiled once into a [`ComposedWorkflow`]: handlers
//! per instance, static edges, and a type-to-instance remap for supervisor
//! routing. Executing it runs a bounded superstep loop over a private copy
//! of the parent state and returns only the growth as a [`NodeDelta`], so
//! from the outer engine's perspective the whole sub-run is one node.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use crate::channels::errors::{ErrorEvent, Fault};
use crate::node::{Node, NodeContext, NodeDelta, NodeError, Route};
use crate::nodes::{AgentNode, SupervisorNode};
use crate::reducers::ReducerRegistry;
use crate::registry::{AgentSpec, WorkflowSpec};
use crate::services::Services;
use crate::state::{RunState, StateSnapshot};
use crate::types::NodeKind;

/// Upper bound on sub-run supersteps. A sub-workflow that has not settled
/// by then is stopped with whatever it produced so far.
pub const SUB_RUN_STEP_CAP: u64 = 25;

/// Terminal edge target inside a workflow spec.
const END_TARGET: &str = "End";

#[derive(Debug, Error, Diagnostic)]
pub enum ComposerError {
    #[error("workflow `{workflow}` has no nodes")]
    #[diagnostic(code(timeloom::workflow::empty))]
    Empty { workflow: String },

    #[error("workflow `{workflow}` declares instance `{instance}` twice")]
    #[diagnostic(code(timeloom::workflow::duplicate_instance))]
    DuplicateInstance { workflow: String, instance: String },

    #[error("workflow `{workflow}` instance `{instance}` has unknown node type `{node_type}`")]
    #[diagnostic(
        code(timeloom::workflow::unknown_node_type),
        help("workflow node types must be `supervisor` or a registered agent name")
    )]
    UnknownNodeType {
        workflow: String,
        instance: String,
        node_type: String,
    },

    #[error("workflow `{workflow}` edge references unknown instance `{target}`")]
    #[diagnostic(code(timeloom::workflow::unknown_edge_target))]
    UnknownEdgeTarget { workflow: String, target: String },
}

/// A workflow spec resolved against the registry and ready to run.
pub struct ComposedWorkflow {
    name: String,
    entry: String,
    handlers: FxHashMap<String, Arc<dyn Node>>,
    /// Instance id of each node's type, for supervisor route remapping.
    instances_by_type: FxHashMap<String, Vec<String>>,
    edges: FxHashMap<String, Vec<String>>,
    supervisors: FxHashSet<String>,
    node_kinds: FxHashMap<String, NodeKind>,
}

impl ComposedWorkflow {
    /// Resolve `spec` against the registered agents and service seams.
    pub fn compose(
        spec: &WorkflowSpec,
        agents: &[AgentSpec],
        services: &Services,
    ) -> Result<Self, ComposerError> {
        if spec.nodes.is_empty() {
            return Err(ComposerError::Empty {
                workflow: spec.name.clone(),
            });
        }

        let agent_names: FxHashSet<&str> = agents.iter().map(|a| a.name.as_str()).collect();
        let mut handlers: FxHashMap<String, Arc<dyn Node>> = FxHashMap::default();
        let mut instances_by_type: FxHashMap<String, Vec<String>> = FxHashMap::default();
        let mut supervisors = FxHashSet::default();
        let mut node_kinds = FxHashMap::default();

        // Supervisor instances may route to any agent type present in this
        // workflow, plus qa (remapped to termination below). Each type
        // appears once no matter how many instances declare it.
        let mut seen_types: FxHashSet<&str> = FxHashSet::default();
        let mut routable: Vec<NodeKind> = Vec::new();
        for node in &spec.nodes {
            if node.node_type != "supervisor" && seen_types.insert(node.node_type.as_str()) {
                routable.push(NodeKind::Agent(node.node_type.clone()));
            }
        }
        routable.push(NodeKind::Qa);

        for node in &spec.nodes {
            if handlers.contains_key(&node.id) {
                return Err(ComposerError::DuplicateInstance {
                    workflow: spec.name.clone(),
                    instance: node.id.clone(),
                });
            }
            let handler: Arc<dyn Node> = if node.node_type == "supervisor" {
                supervisors.insert(node.id.clone());
                node_kinds.insert(node.id.clone(), NodeKind::Supervisor);
                Arc::new(SupervisorNode::new(
                    services.decisions.clone(),
                    routable.clone(),
                ))
            } else if agent_names.contains(node.node_type.as_str()) {
                node_kinds.insert(node.id.clone(), NodeKind::Agent(node.node_type.clone()));
                Arc::new(AgentNode::new(
                    node.node_type.clone(),
                    services.executor.clone(),
                ))
            } else {
                return Err(ComposerError::UnknownNodeType {
                    workflow: spec.name.clone(),
                    instance: node.id.clone(),
                    node_type: node.node_type.clone(),
                });
            };
            handlers.insert(node.id.clone(), handler);
            instances_by_type
                .entry(node.node_type.clone())
                .or_default()
                .push(node.id.clone());
        }

        let mut edges: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for (from, to) in &spec.edges {
            if !handlers.contains_key(from) {
                return Err(ComposerError::UnknownEdgeTarget {
                    workflow: spec.name.clone(),
                    target: from.clone(),
                });
            }
            if to != END_TARGET && !handlers.contains_key(to) {
                return Err(ComposerError::UnknownEdgeTarget {
                    workflow: spec.name.clone(),
                    target: to.clone(),
                });
            }
            edges.entry(from.clone()).or_default().push(to.clone());
        }

        // Entry: the first supervisor instance if one exists, else the
        // first declared node.
        let entry = spec
            .nodes
            .iter()
            .find(|n| n.node_type == "supervisor")
            .unwrap_or(&spec.nodes[0])
            .id
            .clone();

        Ok(Self {
            name: spec.name.clone(),
            entry,
            handlers,
            instances_by_type,
            edges,
            supervisors,
            node_kinds,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the sub-graph over a private copy of the parent state and return
    /// the accumulated growth.
    #[instrument(skip_all, fields(workflow = %self.name, thread = %ctx.thread_id))]
    pub async fn execute(
        &self,
        parent: &StateSnapshot,
        ctx: &NodeContext,
    ) -> Result<NodeDelta, NodeError> {
        let mut state = seed_from_snapshot(parent);
        let marks = state.growth_marks();
        let registry = ReducerRegistry::new();

        let mut frontier = vec![self.entry.clone()];
        let mut step: u64 = 0;
        while !frontier.is_empty() {
            step += 1;
            if step > SUB_RUN_STEP_CAP {
                tracing::warn!(cap = SUB_RUN_STEP_CAP, "sub-run step cap reached");
                break;
            }

            let snapshot = state.snapshot();
            let mut deltas = Vec::with_capacity(frontier.len());
            let mut routes = Vec::with_capacity(frontier.len());
            for instance in &frontier {
                let handler = self.handlers.get(instance).ok_or_else(|| {
                    NodeError::Workflow(format!("no handler for instance `{instance}`"))
                })?;
                let kind = self.node_kinds[instance].clone();
                let sub_ctx = NodeContext {
                    node: kind.clone(),
                    step: ctx.step,
                    thread_id: ctx.thread_id.clone(),
                    emitter: ctx.emitter.clone(),
                    resume: None,
                };
                match handler.run(snapshot.clone(), sub_ctx).await {
                    Ok(output) => {
                        deltas.push((kind, output.delta));
                        routes.push((instance.clone(), output.route));
                    }
                    Err(err) => {
                        // Same policy as the outer engine: failure is data.
                        deltas.push((
                            kind.clone(),
                            NodeDelta::error(ErrorEvent::node(
                                kind.encode(),
                                ctx.step,
                                Fault::msg(err.to_string()),
                            )),
                        ));
                        routes.push((instance.clone(), Route::Follow));
                    }
                }
            }

            registry
                .apply_step(&mut state, deltas)
                .map_err(|err| NodeError::Workflow(err.to_string()))?;

            frontier = self.next_frontier(routes);
        }

        Ok(growth_delta(parent, &state, marks))
    }

    /// Map routing choices onto instance ids for the next superstep.
    fn next_frontier(&self, routes: Vec<(String, Route)>) -> Vec<String> {
        let mut next: Vec<String> = Vec::new();
        for (instance, route) in routes {
            match route {
                Route::End => {}
                Route::Follow => {
                    for target in self.edges.get(&instance).into_iter().flatten() {
                        if target != END_TARGET {
                            next.push(target.clone());
                        }
                    }
                }
                Route::To(kinds) => {
                    debug_assert!(self.supervisors.contains(&instance));
                    for kind in kinds {
                        match kind {
                            // Inside a sub-graph, qa means "this run is done".
                            NodeKind::Qa | NodeKind::End => {}
                            NodeKind::Agent(type_name) => {
                                if let Some(ids) = self.instances_by_type.get(&type_name) {
                                    next.extend(ids.iter().cloned());
                                }
                            }
                            other => {
                                tracing::warn!(target = %other, "unroutable sub-graph target");
                            }
                        }
                    }
                }
            }
        }
        next.sort();
        next.dedup();
        next
    }
}

/// Private sub-run state seeded from the parent snapshot.
fn seed_from_snapshot(parent: &StateSnapshot) -> RunState {
    let mut state = RunState::builder()
        .with_input(parent.input.clone())
        .build();
    *state.messages.get_mut() = parent.messages.clone();
    *state.results.get_mut() = parent.results.clone();
    *state.extra.get_mut() = parent.extra.clone();
    // Plan and retry start fresh: the sub-run's routing history is its own.
    state
}

/// Growth of the sub-run relative to the parent snapshot, as a delta the
/// outer barrier can merge.
fn growth_delta(parent: &StateSnapshot, state: &RunState, marks: crate::state::GrowthMarks) -> NodeDelta {
    let messages = state.messages.get()[marks.messages_len..].to_vec();
    let results = state.results.get()[marks.results_len..].to_vec();
    let errors = state.errors.get()[marks.errors_len..].to_vec();

    // Input suffix past the seeded text, minus the concat separator.
    let input_suffix = state
        .input
        .get()
        .get(marks.input_len..)
        .map(|s| s.trim_start_matches("\n\n").to_string())
        .filter(|s| !s.is_empty());

    let extra_changed: rustc_hash::FxHashMap<String, serde_json::Value> = state
        .extra
        .get()
        .iter()
        .filter(|(key, value)| parent.extra.get(*key) != Some(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    NodeDelta {
        input: input_suffix,
        messages: if messages.is_empty() {
            None
        } else {
            Some(messages)
        },
        results: if results.is_empty() {
            None
        } else {
            Some(results)
        },
        extra: if extra_changed.is_empty() {
            None
        } else {
            Some(extra_changed)
        },
        plan: None,
        retry: None,
        errors: if errors.is_empty() {
            None
        } else {
            Some(errors)
        },
    }
}
