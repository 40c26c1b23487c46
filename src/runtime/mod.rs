//! Execution runtime: the superstep engine and everything that drives it.

pub mod config;
pub mod engine;
pub mod fork;
pub mod manager;
pub mod topology;
pub mod workflow;

pub use config::RuntimeConfig;
pub use engine::{Engine, EngineError, RunOutcome};
pub use fork::{fork, ForkError, StateOverrides};
pub use manager::{ExecutionManager, ManagerError, RunHandle};
pub use topology::{attribute, reconstruct, Attribution, TopologyEntry};
pub use workflow::{ComposedWorkflow, ComposerError};
