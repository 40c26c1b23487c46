//! The superstep execution engine.
//!
//! A run is a loop of supersteps: execute the frontier concurrently against
//! one snapshot, merge the deltas at the barrier, append exactly one
//! checkpoint, then compute the next frontier from the routing choices.
//! Every durable boundary a caller can resume from is a checkpoint row;
//! interrupts and process death are therefore the same recovery problem.

use futures_util::future::join_all;
use miette::Diagnostic;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::instrument;

use crate::channels::errors::{ErrorEvent, Fault};
use crate::checkpoint::{Checkpoint, CheckpointStore, StoreError};
use crate::events::{Event, EventEmitter};
use crate::graph::Graph;
use crate::message::Message;
use crate::node::{NodeContext, NodeDelta, Route};
use crate::reducers::{BarrierError, ReducerRegistry};
use crate::runtime::config::RuntimeConfig;
use crate::services::Redactor;
use crate::state::RunState;
use crate::types::{ChannelKey, NodeKind, START_MARKER};

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Barrier(#[from] BarrierError),

    #[error("nothing to resume on thread `{thread_id}`")]
    #[diagnostic(
        code(timeloom::engine::nothing_to_resume),
        help("the thread has no pending frontier; start a new run with fresh input instead")
    )]
    NothingToResume { thread_id: String },

    #[error("checkpoint `{checkpoint_id}` not found in thread `{thread_id}`")]
    #[diagnostic(
        code(timeloom::engine::checkpoint_not_found),
        help("list the thread history to find resumable checkpoint ids")
    )]
    CheckpointNotFound {
        thread_id: String,
        checkpoint_id: String,
    },

    #[error("step limit {limit} exceeded on thread `{thread_id}`")]
    #[diagnostic(code(timeloom::engine::step_limit))]
    StepLimitExceeded { thread_id: String, limit: u64 },
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The frontier reached `End`; `checkpoint` is the terminal checkpoint.
    Completed { checkpoint: Checkpoint },
    /// Execution paused before an interrupt point. `checkpoint` already
    /// carries the pending frontier, so the pause is durable as-is.
    Interrupted {
        checkpoint: Checkpoint,
        before: Vec<NodeKind>,
    },
    /// The run was cancelled mid-step. No checkpoint is written for the
    /// cancelled step; `checkpoint` is the last durable one.
    Cancelled { checkpoint: Option<Checkpoint> },
}

pub struct Engine {
    graph: Arc<Graph>,
    store: Arc<dyn CheckpointStore>,
    registry: ReducerRegistry,
    config: RuntimeConfig,
    redactor: Option<Redactor>,
}

impl Engine {
    pub fn new(graph: Arc<Graph>, store: Arc<dyn CheckpointStore>) -> Self {
        let redactor = graph.redactor().cloned();
        Self {
            graph,
            store,
            registry: ReducerRegistry::new(),
            config: RuntimeConfig::default(),
            redactor,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = Some(redactor);
        self
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Start (or continue) a run with new user input.
    ///
    /// On a fresh thread this seeds a root checkpoint; on an existing one
    /// the input is concatenated onto the head state and execution restarts
    /// at the graph entry.
    #[instrument(skip_all, fields(thread = %thread_id))]
    pub async fn run(
        &self,
        thread_id: &str,
        input: &str,
        emitter: EventEmitter,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunOutcome, EngineError> {
        // Redaction happens before anything touches storage.
        let input = match &self.redactor {
            Some(redact) => redact(input),
            None => input.to_string(),
        };

        let entry = self.graph.entry().clone();
        let head = self.store.head(thread_id).await?;
        let (state, checkpoint) = match head {
            None => {
                let state = RunState::new_with_input(&input);
                let checkpoint = Checkpoint::new(
                    thread_id,
                    None,
                    state.clone(),
                    START_MARKER,
                    vec![entry.encode()],
                    vec![ChannelKey::Input, ChannelKey::Messages],
                    0,
                );
                (state, checkpoint)
            }
            Some(head) => {
                let mut state = head.state.clone();
                let delta = NodeDelta {
                    input: Some(input.clone()),
                    messages: Some(vec![Message::user(input)]),
                    ..Default::default()
                };
                let outcome = self
                    .registry
                    .apply_step(&mut state, vec![(NodeKind::Start, delta)])?;
                let checkpoint = Checkpoint::new(
                    thread_id,
                    Some(head.id),
                    state.clone(),
                    START_MARKER,
                    vec![entry.encode()],
                    outcome.updated,
                    head.step + 1,
                );
                (state, checkpoint)
            }
        };

        let step = checkpoint.step;
        self.store.append(checkpoint.clone()).await?;
        emitter.emit(Event::Checkpoint {
            checkpoint_id: checkpoint.id.clone(),
            step,
        });

        self.run_loop(
            thread_id,
            state,
            vec![entry],
            step,
            checkpoint,
            None,
            false,
            emitter,
            cancel,
        )
        .await
    }

    /// Resume a thread paused at an interrupt (or recovered after a crash),
    /// optionally handing `payload` to the nodes about to run.
    ///
    /// `from_checkpoint` selects the branch: `None` continues from the
    /// thread head, an explicit id continues from that checkpoint, which is
    /// how a caller keeps working on a branch after the head has moved to a
    /// fork elsewhere in the tree.
    #[instrument(skip_all, fields(thread = %thread_id))]
    pub async fn resume(
        &self,
        thread_id: &str,
        from_checkpoint: Option<&str>,
        payload: Option<Value>,
        emitter: EventEmitter,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunOutcome, EngineError> {
        let head = match from_checkpoint {
            Some(checkpoint_id) => self
                .store
                .get(thread_id, checkpoint_id)
                .await?
                .ok_or_else(|| EngineError::CheckpointNotFound {
                    thread_id: thread_id.to_string(),
                    checkpoint_id: checkpoint_id.to_string(),
                })?,
            None => self
                .store
                .head(thread_id)
                .await?
                .ok_or_else(|| EngineError::NothingToResume {
                    thread_id: thread_id.to_string(),
                })?,
        };

        let frontier: Vec<NodeKind> = head
            .pending_next
            .iter()
            .map(|name| NodeKind::decode(name))
            .filter(|kind| !kind.is_virtual())
            .collect();
        if frontier.is_empty() {
            return Err(EngineError::NothingToResume {
                thread_id: thread_id.to_string(),
            });
        }

        let state = head.state.clone();
        let step = head.step;
        self.run_loop(
            thread_id, state, frontier, step, head, payload, true, emitter, cancel,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        &self,
        thread_id: &str,
        mut state: RunState,
        mut frontier: Vec<NodeKind>,
        mut step: u64,
        mut last: Checkpoint,
        resume_payload: Option<Value>,
        mut resuming: bool,
        emitter: EventEmitter,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RunOutcome, EngineError> {
        loop {
            if frontier.is_empty() {
                emitter.emit(Event::Done {
                    thread_id: thread_id.to_string(),
                    step,
                });
                return Ok(RunOutcome::Completed { checkpoint: last });
            }

            // Interrupt points pause the run before the frontier executes.
            // The checkpoint appended last step already carries this
            // frontier as pending_next, so no extra write is needed.
            if !resuming
                && frontier
                    .iter()
                    .any(|kind| self.graph.should_interrupt_before(kind))
            {
                for kind in &frontier {
                    emitter.emit(Event::Interrupt {
                        node: kind.encode(),
                        step,
                    });
                }
                tracing::info!(frontier = ?frontier, "interrupted before frontier");
                return Ok(RunOutcome::Interrupted {
                    checkpoint: last,
                    before: frontier,
                });
            }

            step += 1;
            if step > self.config.max_steps {
                return Err(EngineError::StepLimitExceeded {
                    thread_id: thread_id.to_string(),
                    limit: self.config.max_steps,
                });
            }

            let snapshot = state.snapshot();
            let payload = if resuming { resume_payload.clone() } else { None };

            let dispatch = frontier.iter().map(|kind| {
                let kind = kind.clone();
                let snapshot = snapshot.clone();
                let emitter = emitter.clone();
                let payload = payload.clone();
                let thread = thread_id.to_string();
                let timeout = self.config.node_timeout;
                async move {
                    let handler = match self.graph.node(&kind) {
                        Some(handler) => handler.clone(),
                        None => {
                            // Stale checkpoint naming a node that no longer
                            // compiles; record and keep going.
                            let fault = Fault::msg(format!("no handler for `{kind}`"));
                            return (
                                kind.clone(),
                                NodeDelta::error(ErrorEvent::engine(thread, step, fault)),
                                Route::Follow,
                            );
                        }
                    };
                    emitter.node_start(&kind, step);
                    let ctx = NodeContext {
                        node: kind.clone(),
                        step,
                        thread_id: thread,
                        emitter: emitter.clone(),
                        resume: payload,
                    };
                    let outcome = tokio::time::timeout(timeout, handler.run(snapshot, ctx)).await;
                    emitter.node_end(&kind, step);
                    match outcome {
                        Ok(Ok(output)) => (kind, output.delta, output.route),
                        Ok(Err(err)) => {
                            tracing::warn!(node = %kind, error = %err, "node failed");
                            emitter.emit(Event::Error {
                                node: kind.encode(),
                                message: err.to_string(),
                            });
                            let event = ErrorEvent::node(
                                kind.encode(),
                                step,
                                Fault::msg(err.to_string()),
                            );
                            (kind, NodeDelta::error(event), Route::Follow)
                        }
                        Err(_) => {
                            tracing::warn!(node = %kind, "node timed out");
                            emitter.emit(Event::Error {
                                node: kind.encode(),
                                message: "node timed out".to_string(),
                            });
                            let event = ErrorEvent::node(
                                kind.encode(),
                                step,
                                Fault::msg("node timed out"),
                            );
                            (kind, NodeDelta::error(event), Route::Follow)
                        }
                    }
                }
            });

            let executed = tokio::select! {
                _ = wait_cancelled(&mut cancel) => {
                    tracing::info!(step, "run cancelled mid-step, discarding partial work");
                    return Ok(RunOutcome::Cancelled {
                        checkpoint: Some(last),
                    });
                }
                executed = join_all(dispatch) => executed,
            };

            let mut deltas = Vec::with_capacity(executed.len());
            let mut routes = Vec::with_capacity(executed.len());
            for (kind, delta, route) in executed {
                deltas.push((kind.clone(), delta));
                routes.push((kind, route));
            }

            let producing = if routes.len() == 1 {
                routes[0].0.encode()
            } else {
                routes
                    .iter()
                    .map(|(kind, _)| kind.encode())
                    .collect::<Vec<_>>()
                    .join("+")
            };

            let barrier = self.registry.apply_step(&mut state, deltas)?;

            let mut next: Vec<NodeKind> = Vec::new();
            for (kind, route) in routes {
                match route {
                    Route::End => {}
                    Route::Follow => {
                        for target in self.graph.successors(&kind) {
                            if !matches!(target, NodeKind::End) {
                                next.push(target.clone());
                            }
                        }
                    }
                    Route::To(targets) => {
                        for target in targets {
                            if matches!(target, NodeKind::End) {
                                // Terminal target; contributes nothing to
                                // the next frontier.
                            } else if self.graph.contains(&target) {
                                next.push(target);
                            } else {
                                tracing::warn!(target = %target, "dropping unknown routing target");
                            }
                        }
                    }
                }
            }
            next.sort_by_key(NodeKind::encode);
            next.dedup();

            let done = next.is_empty();
            let pending_next: Vec<String> = if done {
                vec![NodeKind::End.encode()]
            } else {
                next.iter().map(NodeKind::encode).collect()
            };

            let checkpoint = Checkpoint::new(
                thread_id,
                Some(last.id.clone()),
                state.clone(),
                producing,
                pending_next,
                barrier.updated,
                step,
            );
            self.store.append(checkpoint.clone()).await?;
            emitter.emit(Event::Checkpoint {
                checkpoint_id: checkpoint.id.clone(),
                step,
            });
            last = checkpoint;

            if done {
                emitter.emit(Event::Done {
                    thread_id: thread_id.to_string(),
                    step,
                });
                return Ok(RunOutcome::Completed { checkpoint: last });
            }

            frontier = next;
            resuming = false;
        }
    }
}

/// Resolves once the cancel flag flips to `true`; never resolves if the
/// sender is dropped without cancelling.
async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    if *cancel.borrow() {
        return;
    }
    while cancel.changed().await.is_ok() {
        if *cancel.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await;
}
