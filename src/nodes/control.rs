//! The non-routing control nodes: preprocess, tool planning, tool
//! execution and QA.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

use super::PENDING_TOOLS_KEY;
use crate::channels::errors::{ErrorEvent, Fault};
use crate::node::{Node, NodeContext, NodeDelta, NodeError, NodeOutput};
use crate::services::WorkExecutor;
use crate::state::StateSnapshot;
use crate::task::{Task, TaskKind, TaskResult};

/// Entry control node: validates input and annotates the run.
///
/// Input redaction happens in the engine before anything is persisted;
/// by the time this node sees a snapshot the text is already scrubbed.
/// Empty input short-circuits the run to `End`.
pub struct PreprocessNode;

#[async_trait]
impl Node for PreprocessNode {
    #[instrument(skip_all, fields(thread = %ctx.thread_id, step = ctx.step))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        if snapshot.input.trim().is_empty() {
            tracing::debug!("empty input, ending run");
            return Ok(NodeOutput::end(NodeDelta::default()));
        }

        let mut extra = FxHashMap::default();
        extra.insert("input_chars".to_string(), json!(snapshot.input.len()));
        ctx.emit_token("input accepted");
        Ok(NodeOutput::follow(NodeDelta {
            extra: Some(extra),
            ..Default::default()
        }))
    }
}

/// Expands the current plan into a staged tool list for `tool_execution`.
pub struct ToolPlanningNode;

#[async_trait]
impl Node for ToolPlanningNode {
    #[instrument(skip_all, fields(thread = %ctx.thread_id, step = ctx.step))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        // With an empty plan, fall back to treating the raw input as one
        // tool invocation.
        let staged: Vec<String> = if snapshot.plan.is_empty() {
            vec![snapshot.input.clone()]
        } else {
            snapshot.plan.clone()
        };

        tracing::debug!(count = staged.len(), "staged tool calls");
        ctx.emit_token(format!("planned {} tool call(s)", staged.len()));

        let mut extra = FxHashMap::default();
        extra.insert(PENDING_TOOLS_KEY.to_string(), json!(staged));
        Ok(NodeOutput::follow(NodeDelta {
            extra: Some(extra),
            ..Default::default()
        }))
    }
}

/// Runs the staged tool list through the work executor.
///
/// Failures become failed task results plus error events; the node itself
/// only errors when there is nothing staged to run.
pub struct ToolExecutionNode {
    executor: Arc<dyn WorkExecutor>,
}

impl ToolExecutionNode {
    pub fn new(executor: Arc<dyn WorkExecutor>) -> Self {
        Self { executor }
    }

    fn staged_tools(snapshot: &StateSnapshot, resume: Option<&Value>) -> Vec<String> {
        // A resume payload of strings replaces the staged list, which lets
        // a human approve or edit the calls during the interrupt.
        if let Some(Value::Array(items)) = resume {
            return items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
        }
        snapshot
            .extra
            .get(PENDING_TOOLS_KEY)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Node for ToolExecutionNode {
    #[instrument(skip_all, fields(thread = %ctx.thread_id, step = ctx.step))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let staged = Self::staged_tools(&snapshot, ctx.resume.as_ref());
        if staged.is_empty() {
            return Err(NodeError::InvalidState {
                node: ctx.node.encode(),
                reason: "no staged tool calls".to_string(),
            });
        }

        let mut results = Vec::with_capacity(staged.len());
        let mut errors = Vec::new();
        for call in staged {
            let task = Task::new(TaskKind::Tool, &ctx.node, call);
            match self.executor.execute(task.clone(), &snapshot).await {
                Ok(result) => {
                    ctx.emit_token(result.summary.clone());
                    results.push(result);
                }
                Err(err) => {
                    tracing::warn!(task = %task.id, error = %err, "tool call failed");
                    errors.push(ErrorEvent::node(
                        ctx.node.encode(),
                        ctx.step,
                        Fault::msg(err.to_string()),
                    ));
                    results.push(TaskResult::failed(&task, err.to_string()));
                }
            }
        }

        let mut extra = FxHashMap::default();
        extra.insert(PENDING_TOOLS_KEY.to_string(), json!([]));
        Ok(NodeOutput::follow(NodeDelta {
            results: Some(results),
            extra: Some(extra),
            errors: if errors.is_empty() {
                None
            } else {
                Some(errors)
            },
            ..Default::default()
        }))
    }
}

/// Final review: synthesizes the answer from accumulated results.
pub struct QaNode {
    executor: Arc<dyn WorkExecutor>,
}

impl QaNode {
    pub fn new(executor: Arc<dyn WorkExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Node for QaNode {
    #[instrument(skip_all, fields(thread = %ctx.thread_id, step = ctx.step))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let mut brief = snapshot.input.clone();
        for result in &snapshot.results {
            brief.push_str("\n\n");
            brief.push_str(&result.summary);
        }
        // Reviewer guidance supplied at resume is appended to the brief.
        if let Some(Value::String(guidance)) = ctx.resume.as_ref() {
            brief.push_str("\n\n");
            brief.push_str(guidance);
        }

        let task = Task::new(TaskKind::Review, &ctx.node, brief);
        let result = self
            .executor
            .execute(task, &snapshot)
            .await
            .map_err(|err| NodeError::Executor(err.to_string()))?;

        ctx.emit_token(result.summary.clone());
        let answer = crate::message::Message::assistant(result.summary.clone());
        Ok(NodeOutput::follow(NodeDelta {
            messages: Some(vec![answer]),
            results: Some(vec![result]),
            ..Default::default()
        }))
    }
}
