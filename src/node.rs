//! The node contract: every executable vertex implements [`Node`].
//!
//! A node receives an immutable [`StateSnapshot`] plus a [`NodeContext`] and
//! returns a [`NodeOutput`]: a delta of channel writes and a routing choice.
//! Nodes never mutate shared state; the barrier folds deltas in afterwards.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::breaker::RetryGuard;
use crate::channels::errors::ErrorEvent;
use crate::events::EventEmitter;
use crate::message::Message;
use crate::state::StateSnapshot;
use crate::task::TaskResult;
use crate::types::{ChannelKey, NodeKind};

/// Per-invocation context handed to a node alongside the snapshot.
#[derive(Clone)]
pub struct NodeContext {
    /// The node being executed.
    pub node: NodeKind,
    /// Superstep counter, 1-based for executed steps.
    pub step: u64,
    /// Owning thread.
    pub thread_id: String,
    /// Emitter for progress and diagnostic events.
    pub emitter: EventEmitter,
    /// Payload supplied when resuming through an interrupt, if any.
    pub resume: Option<Value>,
}

impl NodeContext {
    /// Emit a progress token attributed to this node.
    pub fn emit_token(&self, text: impl Into<String>) {
        self.emitter.token(&self.node, text);
    }
}

/// Partial state update produced by one node invocation.
///
/// `None` means "no write to this channel"; the barrier only invokes a
/// reducer for channels that are `Some`. An all-`None` delta is legal and
/// leaves every version untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDelta {
    /// Text to concatenate onto the input channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<TaskResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<FxHashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryGuard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorEvent>>,
}

impl NodeDelta {
    /// Delta appending a single message.
    pub fn message(message: Message) -> Self {
        Self {
            messages: Some(vec![message]),
            ..Default::default()
        }
    }

    /// Delta appending a single error event.
    pub fn error(event: ErrorEvent) -> Self {
        Self {
            errors: Some(vec![event]),
            ..Default::default()
        }
    }

    /// Whether this delta writes `channel`.
    pub fn writes(&self, channel: ChannelKey) -> bool {
        match channel {
            ChannelKey::Input => self.input.is_some(),
            ChannelKey::Messages => self.messages.is_some(),
            ChannelKey::Results => self.results.is_some(),
            ChannelKey::Extra => self.extra.is_some(),
            ChannelKey::Plan => self.plan.is_some(),
            ChannelKey::Retry => self.retry.is_some(),
            ChannelKey::Errors => self.errors.is_some(),
        }
    }

    /// True when no channel is written.
    pub fn is_empty(&self) -> bool {
        self.input.is_none()
            && self.messages.is_none()
            && self.results.is_none()
            && self.extra.is_none()
            && self.plan.is_none()
            && self.retry.is_none()
            && self.errors.is_none()
    }
}

/// Routing choice returned by a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Take the node's static outgoing edges.
    Follow,
    /// Override the frontier with explicit targets.
    To(Vec<NodeKind>),
    /// Terminate this branch of execution.
    End,
}

/// What a node produced: channel writes plus a routing choice.
#[derive(Clone, Debug)]
pub struct NodeOutput {
    pub delta: NodeDelta,
    pub route: Route,
}

impl NodeOutput {
    pub fn follow(delta: NodeDelta) -> Self {
        Self {
            delta,
            route: Route::Follow,
        }
    }

    pub fn to(delta: NodeDelta, targets: Vec<NodeKind>) -> Self {
        Self {
            delta,
            route: Route::To(targets),
        }
    }

    pub fn end(delta: NodeDelta) -> Self {
        Self {
            delta,
            route: Route::End,
        }
    }
}

/// Failure inside a node handler.
///
/// The engine converts these into error events on the errors channel; they
/// do not abort the run.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    #[error("executor failed: {0}")]
    #[diagnostic(code(timeloom::node::executor))]
    Executor(String),

    #[error("decision service failed: {0}")]
    #[diagnostic(code(timeloom::node::decision))]
    Decision(String),

    #[error("invalid state for {node}: {reason}")]
    #[diagnostic(
        code(timeloom::node::invalid_state),
        help("check the channel contents the node expects at this point in the graph")
    )]
    InvalidState { node: String, reason: String },

    #[error("sub-workflow failed: {0}")]
    #[diagnostic(code(timeloom::node::workflow))]
    Workflow(String),
}

/// An executable vertex of the compiled graph.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, snapshot: StateSnapshot, ctx: NodeContext) -> Result<NodeOutput, NodeError>;
}
