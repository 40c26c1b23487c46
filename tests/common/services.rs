//! Scripted service seams shared across the integration tests.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use timeloom::services::{
    Decision, DecisionError, DecisionRequest, DecisionService, ExecutorError, WorkExecutor,
};
use timeloom::state::StateSnapshot;
use timeloom::task::{Task, TaskResult};

/// Decision service replaying a fixed script; once the script is exhausted
/// every further decision is `FINISH`.
pub struct ScriptedDecisions {
    script: Mutex<VecDeque<Decision>>,
}

impl ScriptedDecisions {
    pub fn new(steps: &[&[&str]]) -> Arc<Self> {
        let script = steps
            .iter()
            .map(|next| Decision {
                next: next.iter().map(|s| s.to_string()).collect(),
                plan: Vec::new(),
            })
            .collect();
        Arc::new(Self {
            script: Mutex::new(script),
        })
    }
}

#[async_trait]
impl DecisionService for ScriptedDecisions {
    async fn decide(&self, _request: DecisionRequest) -> Result<Decision, DecisionError> {
        let next = self.script.lock().expect("script lock").pop_front();
        Ok(next.unwrap_or_else(|| Decision {
            next: vec!["FINISH".to_string()],
            plan: Vec::new(),
        }))
    }
}

/// Executor echoing the task input back as the summary.
pub struct EchoExecutor;

#[async_trait]
impl WorkExecutor for EchoExecutor {
    async fn execute(
        &self,
        task: Task,
        _snapshot: &StateSnapshot,
    ) -> Result<TaskResult, ExecutorError> {
        let summary = format!("echo: {}", task.input);
        Ok(TaskResult::completed(
            &task,
            summary,
            json!({ "input": task.input }),
        ))
    }
}

/// Executor that always fails with a fixed message.
pub struct FailingExecutor {
    pub message: &'static str,
}

#[async_trait]
impl WorkExecutor for FailingExecutor {
    async fn execute(
        &self,
        task: Task,
        _snapshot: &StateSnapshot,
    ) -> Result<TaskResult, ExecutorError> {
        Err(ExecutorError::new(&task, self.message))
    }
}

/// Executor that sleeps before echoing, for timeout tests.
pub struct SlowExecutor {
    pub delay: Duration,
}

#[async_trait]
impl WorkExecutor for SlowExecutor {
    async fn execute(
        &self,
        task: Task,
        _snapshot: &StateSnapshot,
    ) -> Result<TaskResult, ExecutorError> {
        tokio::time::sleep(self.delay).await;
        Ok(TaskResult::completed(&task, "late", json!(null)))
    }
}

/// Executor that signals when a task reaches it and then never returns, for
/// cancellation tests.
pub struct BlockingExecutor {
    pub started: Arc<Notify>,
}

impl BlockingExecutor {
    pub fn new() -> (Arc<Self>, Arc<Notify>) {
        let started = Arc::new(Notify::new());
        (
            Arc::new(Self {
                started: started.clone(),
            }),
            started,
        )
    }
}

#[async_trait]
impl WorkExecutor for BlockingExecutor {
    async fn execute(
        &self,
        _task: Task,
        _snapshot: &StateSnapshot,
    ) -> Result<TaskResult, ExecutorError> {
        self.started.notify_one();
        std::future::pending().await
    }
}
