//! Work items handed to the [`WorkExecutor`](crate::services::WorkExecutor)
//! and the results it returns.
//!
//! Tasks live only for the duration of one node invocation; results are
//! persisted as part of the state snapshot inside the checkpoint that
//! follows the step.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::NodeKind;

/// Category of work a task represents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A unit of agent work (research, drafting, analysis).
    Agent,
    /// A planned tool invocation.
    Tool,
    /// Final review / answer synthesis.
    Review,
}

/// Lifecycle of a task inside one node invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

/// A unit of work dispatched to the executor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    /// Node this task was created for, encoded via [`NodeKind::encode`].
    pub assigned_node: String,
    pub input: String,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(kind: TaskKind, assigned_node: &NodeKind, input: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            assigned_node: assigned_node.encode(),
            input: input.into(),
            status: TaskStatus::Pending,
        }
    }
}

/// Outcome of executing a [`Task`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub summary: String,
    pub raw_output: Value,
    pub assigned_to: String,
    #[serde(default)]
    pub metadata: FxHashMap<String, Value>,
    #[serde(default)]
    pub citations: Vec<String>,
    pub status: TaskStatus,
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    /// Successful result with a plain-text summary.
    pub fn completed(task: &Task, summary: impl Into<String>, raw_output: Value) -> Self {
        Self {
            task_id: task.id.clone(),
            summary: summary.into(),
            raw_output,
            assigned_to: task.assigned_node.clone(),
            metadata: FxHashMap::default(),
            citations: Vec::new(),
            status: TaskStatus::Completed,
            finished_at: Utc::now(),
        }
    }

    /// Failed result carrying the error text as its summary. Node failure is
    /// data: the engine appends this and keeps routing.
    pub fn failed(task: &Task, error: impl Into<String>) -> Self {
        Self {
            task_id: task.id.clone(),
            summary: error.into(),
            raw_output: Value::Null,
            assigned_to: task.assigned_node.clone(),
            metadata: FxHashMap::default(),
            citations: Vec::new(),
            status: TaskStatus::Failed,
            finished_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn with_citations(mut self, citations: Vec<String>) -> Self {
        self.citations = citations;
        self
    }
}
