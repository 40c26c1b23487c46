//! Dynamic agent node: one unit of agent work per visit.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

use crate::channels::errors::{ErrorEvent, Fault};
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeDelta, NodeError, NodeOutput};
use crate::services::WorkExecutor;
use crate::state::StateSnapshot;
use crate::task::{Task, TaskKind, TaskResult};

pub struct AgentNode {
    name: String,
    executor: Arc<dyn WorkExecutor>,
}

impl AgentNode {
    pub fn new(name: impl Into<String>, executor: Arc<dyn WorkExecutor>) -> Self {
        Self {
            name: name.into(),
            executor,
        }
    }
}

#[async_trait]
impl Node for AgentNode {
    #[instrument(skip_all, fields(agent = %self.name, thread = %ctx.thread_id, step = ctx.step))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let task = Task::new(TaskKind::Agent, &ctx.node, snapshot.input.clone());
        match self.executor.execute(task.clone(), &snapshot).await {
            Ok(result) => {
                ctx.emit_token(result.summary.clone());
                let note = Message::assistant(result.summary.clone());
                Ok(NodeOutput::follow(NodeDelta {
                    messages: Some(vec![note]),
                    results: Some(vec![result]),
                    ..Default::default()
                }))
            }
            Err(err) => {
                // Failure is data: the supervisor sees the failed result and
                // the error event on its next visit and decides what to do.
                tracing::warn!(error = %err, "agent task failed");
                let event =
                    ErrorEvent::node(ctx.node.encode(), ctx.step, Fault::msg(err.to_string()))
                        .with_tag("agent");
                Ok(NodeOutput::follow(NodeDelta {
                    results: Some(vec![TaskResult::failed(&task, err.to_string())]),
                    errors: Some(vec![event]),
                    ..Default::default()
                }))
            }
        }
    }
}
