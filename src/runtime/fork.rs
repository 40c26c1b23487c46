//! Forking: branch a thread from any historical checkpoint.
//!
//! A fork appends a sibling checkpoint whose parent is the fork target, so
//! the original branch is never touched. Overrides flow through the same
//! reducers as node deltas; the one exception is `replace_input`, which
//! swaps the input text wholesale instead of concatenating.

use miette::Diagnostic;
use thiserror::Error;
use tracing::instrument;

use crate::channels::Channel;
use crate::checkpoint::{Checkpoint, CheckpointStore, StoreError};
use crate::node::NodeDelta;
use crate::reducers::{BarrierError, ReducerRegistry};
use crate::types::{ChannelKey, NodeKind, FORK_MARKER};

/// State adjustments applied at fork time.
#[derive(Clone, Debug, Default)]
pub struct StateOverrides {
    /// Channel writes merged through the ordinary reducers. `delta.input`
    /// concatenates by default.
    pub delta: NodeDelta,
    /// When set, `delta.input` replaces the input text instead of
    /// concatenating onto it.
    pub replace_input: bool,
}

impl StateOverrides {
    pub fn is_empty(&self) -> bool {
        self.delta.is_empty()
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ForkError {
    #[error("checkpoint `{checkpoint_id}` not found in thread `{thread_id}`")]
    #[diagnostic(
        code(timeloom::fork::checkpoint_not_found),
        help("list the thread history to find forkable checkpoint ids")
    )]
    CheckpointNotFound {
        thread_id: String,
        checkpoint_id: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Barrier(#[from] BarrierError),
}

/// Create a new branch rooted at `checkpoint_id` with `overrides` applied.
///
/// The fork checkpoint becomes the thread head (head follows append order),
/// so a subsequent `resume` continues on the new branch. When overrides
/// change state, the pending frontier is reset to the supervisor so routing
/// re-decides against the altered state; otherwise the target's own pending
/// frontier is kept.
#[instrument(skip_all, fields(thread = %thread_id, from = %checkpoint_id))]
pub async fn fork(
    store: &dyn CheckpointStore,
    thread_id: &str,
    checkpoint_id: &str,
    overrides: StateOverrides,
) -> Result<Checkpoint, ForkError> {
    let target = store
        .get(thread_id, checkpoint_id)
        .await?
        .ok_or_else(|| ForkError::CheckpointNotFound {
            thread_id: thread_id.to_string(),
            checkpoint_id: checkpoint_id.to_string(),
        })?;

    let mut state = target.state.clone();
    let mut delta = overrides.delta.clone();
    let mut updated: Vec<ChannelKey> = Vec::new();

    if overrides.replace_input {
        if let Some(input) = delta.input.take() {
            if state.input.get() != input {
                state.input.replace(input);
                let v = state.input.version() + 1;
                state.input.set_version(v);
                updated.push(ChannelKey::Input);
            }
        }
    }

    let registry = ReducerRegistry::new();
    let outcome = registry.apply_step(&mut state, vec![(NodeKind::Start, delta)])?;
    updated.extend(outcome.updated);

    let pending_next = if overrides.is_empty() && updated.is_empty() {
        target.pending_next.clone()
    } else {
        vec![NodeKind::Supervisor.encode()]
    };

    let checkpoint = Checkpoint::new(
        thread_id,
        Some(target.id.clone()),
        state,
        FORK_MARKER,
        pending_next,
        updated,
        target.step + 1,
    );
    store.append(checkpoint.clone()).await?;
    tracing::info!(fork = %checkpoint.id, "forked thread");
    Ok(checkpoint)
}
