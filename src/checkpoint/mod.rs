//! Durable checkpoint storage.
//!
//! Checkpoints form a tree per thread: every checkpoint names its parent,
//! and forks create siblings rather than overwriting history. The store
//! trait is append-only; nothing ever mutates a stored checkpoint.

mod persistence;
mod store;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use persistence::{PersistedChannel, PersistedState};
pub use store::{Checkpoint, CheckpointStore, InMemoryStore, StoreError};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
