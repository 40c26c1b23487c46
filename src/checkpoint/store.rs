//! The checkpoint store trait and its in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::state::RunState;
use crate::types::ChannelKey;

/// One durable point in a thread's history.
///
/// `parent_id` is `None` only for a thread's root checkpoint. `pending_next`
/// holds the frontier that would execute next, which is what makes resume
/// after an interrupt possible from storage alone.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub id: String,
    pub thread_id: String,
    pub parent_id: Option<String>,
    pub state: RunState,
    /// Encoded `NodeKind` of the node whose barrier produced this
    /// checkpoint, or [`crate::types::START_MARKER`] for roots.
    pub producing_node: String,
    /// Encoded `NodeKind`s of the frontier to execute next.
    pub pending_next: Vec<String>,
    /// Channels updated at the producing barrier.
    pub writes: Vec<String>,
    pub step: u64,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        thread_id: impl Into<String>,
        parent_id: Option<String>,
        state: RunState,
        producing_node: impl Into<String>,
        pending_next: Vec<String>,
        writes: Vec<ChannelKey>,
        step: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            parent_id,
            state,
            producing_node: producing_node.into(),
            pending_next,
            writes: writes.iter().map(ChannelKey::to_string).collect(),
            step,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("checkpoint `{checkpoint_id}` already exists in thread `{thread_id}`")]
    #[diagnostic(code(timeloom::store::conflict))]
    Conflict {
        thread_id: String,
        checkpoint_id: String,
    },

    #[error("parent checkpoint `{parent_id}` not found in thread `{thread_id}`")]
    #[diagnostic(
        code(timeloom::store::missing_parent),
        help("a non-root checkpoint must name an existing parent in the same thread")
    )]
    MissingParent {
        thread_id: String,
        parent_id: String,
    },

    #[error(transparent)]
    #[diagnostic(code(timeloom::store::serialization))]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    #[diagnostic(code(timeloom::store::backend))]
    Backend(String),
}

/// Append-only checkpoint storage.
///
/// `head` is the most recently appended checkpoint of the thread, across
/// all branches: appending to a forked branch moves the head there.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn append(&self, checkpoint: Checkpoint) -> Result<(), StoreError>;

    async fn get(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<Checkpoint>, StoreError>;

    async fn head(&self, thread_id: &str) -> Result<Option<Checkpoint>, StoreError>;

    /// Full history, newest first. The last element is always the thread
    /// root; reversing gives append order, which is also causal order
    /// within any one branch.
    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, StoreError>;

    async fn delete_thread(&self, thread_id: &str) -> Result<(), StoreError>;

    async fn list_threads(&self) -> Result<Vec<String>, StoreError>;
}

/// Non-durable store for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryStore {
    threads: Mutex<FxHashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStore {
    async fn append(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        let mut threads = self.threads.lock().expect("store lock poisoned");
        let entries = threads.entry(checkpoint.thread_id.clone()).or_default();
        if entries.iter().any(|c| c.id == checkpoint.id) {
            return Err(StoreError::Conflict {
                thread_id: checkpoint.thread_id,
                checkpoint_id: checkpoint.id,
            });
        }
        if let Some(parent_id) = &checkpoint.parent_id {
            if !entries.iter().any(|c| &c.id == parent_id) {
                return Err(StoreError::MissingParent {
                    thread_id: checkpoint.thread_id.clone(),
                    parent_id: parent_id.clone(),
                });
            }
        }
        entries.push(checkpoint);
        Ok(())
    }

    async fn get(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let threads = self.threads.lock().expect("store lock poisoned");
        Ok(threads
            .get(thread_id)
            .and_then(|entries| entries.iter().find(|c| c.id == checkpoint_id).cloned()))
    }

    async fn head(&self, thread_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let threads = self.threads.lock().expect("store lock poisoned");
        Ok(threads
            .get(thread_id)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        let threads = self.threads.lock().expect("store lock poisoned");
        let mut entries = threads.get(thread_id).cloned().unwrap_or_default();
        entries.reverse();
        Ok(entries)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), StoreError> {
        let mut threads = self.threads.lock().expect("store lock poisoned");
        threads.remove(thread_id);
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<String>, StoreError> {
        let threads = self.threads.lock().expect("store lock poisoned");
        let mut ids: Vec<String> = threads.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
