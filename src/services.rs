//! Pluggable service seams.
//!
//! The engine never talks to a model or a tool directly; the supervisor
//! consults a [`DecisionService`] and worker nodes hand tasks to a
//! [`WorkExecutor`]. Tests script these seams; production wires them to
//! real backends.

use async_trait::async_trait;
use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;

use crate::state::StateSnapshot;
use crate::task::{Task, TaskResult};

/// What the supervisor asks the decision service.
#[derive(Clone, Debug)]
pub struct DecisionRequest {
    /// Current thread state.
    pub snapshot: StateSnapshot,
    /// Names the decision may route to (dynamic nodes plus
    /// `tool_planning` and `qa`).
    pub available: Vec<String>,
    pub thread_id: String,
    pub step: u64,
}

/// A routing decision: where to go next and the remaining plan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decision {
    /// Proposed next nodes by name. Placeholders (`""`, `"none"`, `"null"`,
    /// `"FINISH"`) mean "nothing left to do".
    pub next: Vec<String>,
    /// Updated plan, overwritten into the plan channel.
    pub plan: Vec<String>,
}

#[derive(Debug, Error, Diagnostic)]
#[error("decision service error: {message}")]
#[diagnostic(code(timeloom::services::decision))]
pub struct DecisionError {
    pub message: String,
}

impl DecisionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Routing brain behind the supervisor.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn decide(&self, request: DecisionRequest) -> Result<Decision, DecisionError>;
}

#[derive(Debug, Error, Diagnostic)]
#[error("executor error for task {task_id}: {message}")]
#[diagnostic(code(timeloom::services::executor))]
pub struct ExecutorError {
    pub task_id: String,
    pub message: String,
}

impl ExecutorError {
    pub fn new(task: &Task, message: impl Into<String>) -> Self {
        Self {
            task_id: task.id.clone(),
            message: message.into(),
        }
    }
}

/// Performs the actual work behind agent, tool and review nodes.
#[async_trait]
pub trait WorkExecutor: Send + Sync {
    async fn execute(
        &self,
        task: Task,
        snapshot: &StateSnapshot,
    ) -> Result<TaskResult, ExecutorError>;
}

/// Input scrubber the engine applies to incoming text before anything is
/// persisted or logged. Identity when absent.
pub type Redactor = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Everything the graph compiler needs to construct node handlers.
#[derive(Clone)]
pub struct Services {
    pub decisions: Arc<dyn DecisionService>,
    pub executor: Arc<dyn WorkExecutor>,
    pub redactor: Option<Redactor>,
}

impl Services {
    pub fn new(decisions: Arc<dyn DecisionService>, executor: Arc<dyn WorkExecutor>) -> Self {
        Self {
            decisions,
            executor,
            redactor: None,
        }
    }

    #[must_use]
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = Some(redactor);
        self
    }
}
