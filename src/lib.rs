//! # timeloom
//!
//! A durable, branchable execution engine for multi-agent workflows.
//!
//! Work is organized as a graph of nodes executed in supersteps: every
//! superstep runs the current frontier concurrently against one immutable
//! state snapshot, merges the resulting deltas through per-channel reducers,
//! and appends exactly one checkpoint. Because checkpoints form a tree and
//! carry the pending frontier, any point in history can be paused at,
//! resumed from, or forked into a new branch with adjusted state.
//!
//! The moving parts:
//! - [`state`]: versioned channels with fixed reducers ([`reducers`]);
//! - [`graph`]: registry-driven compilation of control and dynamic nodes;
//! - [`runtime`]: the superstep [`runtime::Engine`], interrupts, forking,
//!   topology reconstruction and the execution manager;
//! - [`checkpoint`]: append-only storage, in memory or SQLite;
//! - [`services`]: the pluggable decision and work-execution seams.
//!
//! ```no_run
//! use std::sync::Arc;
//! use timeloom::checkpoint::InMemoryStore;
//! use timeloom::graph::compile;
//! use timeloom::registry::{AgentSpec, StaticRegistry};
//! use timeloom::runtime::{Engine, ExecutionManager};
//! use timeloom::services::Services;
//! # fn services() -> Services { unimplemented!() }
//!
//! # async fn demo() -> miette::Result<()> {
//! let registry = StaticRegistry::builder()
//!     .agent(AgentSpec::new("researcher", "looks things up"))
//!     .build();
//! let graph = compile(registry.as_ref(), &services())?;
//! let engine = Engine::new(Arc::new(graph), Arc::new(InMemoryStore::new()));
//! let manager = ExecutionManager::new(Arc::new(engine));
//! let run = manager.start_run("thread-1", "what is a superstep?").unwrap();
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod channels;
pub mod checkpoint;
pub mod events;
pub mod graph;
pub mod message;
pub mod node;
pub mod nodes;
pub mod reducers;
pub mod registry;
pub mod runtime;
pub mod services;
pub mod state;
pub mod task;
pub mod telemetry;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointStore, InMemoryStore};
pub use events::{Event, EventEmitter, EventStream};
pub use graph::{compile, Graph, GraphBuilder};
pub use node::{Node, NodeContext, NodeDelta, NodeError, NodeOutput, Route};
pub use registry::{AgentSpec, Registry, StaticRegistry, WorkflowSpec};
pub use runtime::{Engine, EngineError, ExecutionManager, RunOutcome, RuntimeConfig};
pub use services::{Decision, DecisionRequest, DecisionService, Services, WorkExecutor};
pub use state::{RunState, StateSnapshot};
pub use types::{ChannelKey, NodeKind};

#[cfg(feature = "sqlite")]
pub use checkpoint::SqliteStore;
