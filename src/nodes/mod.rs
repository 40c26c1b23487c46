//! Built-in node handlers: the five control nodes plus the dynamic
//! agent and workflow wrappers minted by the compiler.

mod agent;
mod control;
mod supervisor;
mod workflow_node;

pub use agent::AgentNode;
pub use control::{PreprocessNode, QaNode, ToolExecutionNode, ToolPlanningNode};
pub use supervisor::SupervisorNode;
pub use workflow_node::WorkflowNode;

/// Extra-channel key holding the tool list staged by `tool_planning` for
/// `tool_execution` to consume.
pub const PENDING_TOOLS_KEY: &str = "pending_tools";
