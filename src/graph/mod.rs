//! Graph construction: the manual [`GraphBuilder`] and the registry-driven
//! [`compile`](compile::compile) front end.

mod builder;
mod compile;

pub use builder::{Graph, GraphBuilder};
pub use compile::{compile, CompileError};
