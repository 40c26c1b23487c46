//! The supervisor: routing brain of the graph.
//!
//! Consults the decision service, then passes the proposals through the
//! circuit breaker before routing. A decision failure is recorded as an
//! error event and routed to QA so the run still terminates with an answer.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::instrument;

use crate::breaker;
use crate::channels::errors::{ErrorEvent, Fault};
use crate::node::{Node, NodeContext, NodeDelta, NodeError, NodeOutput, Route};
use crate::services::{DecisionRequest, DecisionService};
use crate::state::StateSnapshot;
use crate::types::NodeKind;

pub struct SupervisorNode {
    decisions: Arc<dyn DecisionService>,
    /// Every name the decision service may legally propose.
    available: Vec<String>,
    /// Proposal name to graph node. Agent and workflow names share this
    /// namespace, so a workflow proposal resolves to its `Workflow` kind
    /// rather than being mistaken for an agent.
    by_label: FxHashMap<String, NodeKind>,
}

impl SupervisorNode {
    pub fn new(decisions: Arc<dyn DecisionService>, routable: Vec<NodeKind>) -> Self {
        let available = routable.iter().map(NodeKind::label).collect();
        let by_label = routable
            .into_iter()
            .map(|kind| (kind.label(), kind))
            .collect();
        Self {
            decisions,
            available,
            by_label,
        }
    }

    /// Map proposal-derived kinds back onto graph nodes by label; unknown
    /// proposals are recorded and dropped.
    fn resolve(
        &self,
        targets: Vec<NodeKind>,
        ctx: &NodeContext,
        errors: &mut Vec<ErrorEvent>,
    ) -> Vec<NodeKind> {
        targets
            .into_iter()
            .filter_map(|target| match self.by_label.get(&target.label()) {
                Some(kind) => Some(kind.clone()),
                None => {
                    tracing::warn!(target = %target, "decision proposed unknown node");
                    errors.push(ErrorEvent::node(
                        ctx.node.encode(),
                        ctx.step,
                        Fault::msg(format!("unknown routing target `{}`", target.label())),
                    ));
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl Node for SupervisorNode {
    #[instrument(skip_all, fields(thread = %ctx.thread_id, step = ctx.step))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let request = DecisionRequest {
            snapshot: snapshot.clone(),
            available: self.available.clone(),
            thread_id: ctx.thread_id.clone(),
            step: ctx.step,
        };

        let decision = match self.decisions.decide(request).await {
            Ok(decision) => decision,
            Err(err) => {
                // Decision failure is data: record it and fall through to QA
                // so the thread still produces an answer.
                tracing::warn!(error = %err, "decision service failed, routing to qa");
                let event =
                    ErrorEvent::node(ctx.node.encode(), ctx.step, Fault::msg(err.to_string()))
                        .with_tag("decision");
                return Ok(NodeOutput::to(NodeDelta::error(event), vec![NodeKind::Qa]));
            }
        };

        let verdict = breaker::apply(&decision.next, decision.plan, &snapshot.retry);
        if verdict.tripped {
            ctx.emitter.diagnostic(
                "breaker",
                serde_json::json!({
                    "thread": ctx.thread_id,
                    "step": ctx.step,
                    "detail": "routing loop detected, finishing via qa",
                }),
            );
        }

        let mut errors = Vec::new();
        let mut targets = self.resolve(verdict.targets, &ctx, &mut errors);
        if targets.is_empty() {
            targets.push(NodeKind::Qa);
        }

        tracing::debug!(targets = ?targets, "supervisor routed");
        Ok(NodeOutput {
            delta: NodeDelta {
                plan: Some(verdict.plan),
                retry: Some(verdict.guard),
                errors: if errors.is_empty() {
                    None
                } else {
                    Some(errors)
                },
                ..Default::default()
            },
            route: Route::To(targets),
        })
    }
}
