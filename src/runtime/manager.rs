//! Execution manager: at most one live run per thread, with cooperative
//! cancellation.
//!
//! Each running thread holds a watch sender; flipping it to `true` makes
//! the engine abandon the in-flight superstep without writing a checkpoint.
//! Entries deregister themselves when their run settles, even on panic.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::events::{EventEmitter, EventStream};
use crate::runtime::engine::{Engine, EngineError, RunOutcome};

#[derive(Debug, Error, Diagnostic)]
pub enum ManagerError {
    #[error("thread `{thread_id}` already has a live run")]
    #[diagnostic(
        code(timeloom::manager::already_running),
        help("cancel the live run or wait for it to finish before starting another")
    )]
    AlreadyRunning { thread_id: String },
}

/// A started run: the join handle for its outcome plus its event stream.
#[derive(Debug)]
pub struct RunHandle {
    pub handle: JoinHandle<Result<RunOutcome, EngineError>>,
    pub events: EventStream,
}

type ActiveRuns = Arc<Mutex<FxHashMap<String, watch::Sender<bool>>>>;

/// Removes the thread's registration when the run task ends.
struct Deregister {
    active: ActiveRuns,
    thread_id: String,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.active
            .lock()
            .expect("manager lock poisoned")
            .remove(&self.thread_id);
    }
}

pub struct ExecutionManager {
    engine: Arc<Engine>,
    active: ActiveRuns,
}

impl ExecutionManager {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            active: Arc::new(Mutex::new(FxHashMap::default())),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Start a run with new input on `thread_id`.
    pub fn start_run(
        &self,
        thread_id: impl Into<String>,
        input: impl Into<String>,
    ) -> Result<RunHandle, ManagerError> {
        let thread_id = thread_id.into();
        let input = input.into();
        let (emitter, events, cancel, guard) = self.register(&thread_id)?;
        let engine = self.engine.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            engine.run(&thread_id, &input, emitter, cancel).await
        });
        Ok(RunHandle { handle, events })
    }

    /// Resume a paused thread, optionally passing a payload to the nodes
    /// about to run. `from_checkpoint` picks the branch to continue; `None`
    /// means the thread head.
    pub fn resume_run(
        &self,
        thread_id: impl Into<String>,
        from_checkpoint: Option<String>,
        payload: Option<Value>,
    ) -> Result<RunHandle, ManagerError> {
        let thread_id = thread_id.into();
        let (emitter, events, cancel, guard) = self.register(&thread_id)?;
        let engine = self.engine.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            engine
                .resume(
                    &thread_id,
                    from_checkpoint.as_deref(),
                    payload,
                    emitter,
                    cancel,
                )
                .await
        });
        Ok(RunHandle { handle, events })
    }

    fn register(
        &self,
        thread_id: &str,
    ) -> Result<(EventEmitter, EventStream, watch::Receiver<bool>, Deregister), ManagerError> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            let mut active = self.active.lock().expect("manager lock poisoned");
            if active.contains_key(thread_id) {
                return Err(ManagerError::AlreadyRunning {
                    thread_id: thread_id.to_string(),
                });
            }
            active.insert(thread_id.to_string(), cancel_tx);
        }
        let (emitter, events) = EventEmitter::channel();
        let guard = Deregister {
            active: self.active.clone(),
            thread_id: thread_id.to_string(),
        };
        Ok((emitter, events, cancel_rx, guard))
    }

    /// Request cancellation of the live run on `thread_id`. Returns whether
    /// a live run was found.
    pub fn cancel(&self, thread_id: &str) -> bool {
        let active = self.active.lock().expect("manager lock poisoned");
        match active.get(thread_id) {
            Some(sender) => sender.send(true).is_ok(),
            None => false,
        }
    }

    /// Thread ids with a live run.
    pub fn running(&self) -> Vec<String> {
        let active = self.active.lock().expect("manager lock poisoned");
        let mut ids: Vec<String> = active.keys().cloned().collect();
        ids.sort();
        ids
    }
}
