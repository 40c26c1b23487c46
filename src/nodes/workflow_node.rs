//! Dynamic workflow node: runs a composed sub-graph as a single step.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

use crate::node::{Node, NodeContext, NodeError, NodeOutput};
use crate::runtime::workflow::ComposedWorkflow;
use crate::state::StateSnapshot;

pub struct WorkflowNode {
    composed: Arc<ComposedWorkflow>,
}

impl WorkflowNode {
    pub fn new(composed: Arc<ComposedWorkflow>) -> Self {
        Self { composed }
    }
}

#[async_trait]
impl Node for WorkflowNode {
    #[instrument(skip_all, fields(workflow = %self.composed.name(), thread = %ctx.thread_id, step = ctx.step))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let delta = self.composed.execute(&snapshot, &ctx).await?;
        Ok(NodeOutput::follow(delta))
    }
}
