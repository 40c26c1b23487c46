//! Core identifiers for the timeloom execution graph.
//!
//! [`NodeKind`] names every vertex the scheduler can visit: the virtual
//! `Start`/`End` endpoints, the five fixed control nodes, and the two
//! dynamic families discovered from the registry at compile time.
//! [`ChannelKey`] names the state channels reducers operate on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved producing-node marker stored on root checkpoints.
pub const START_MARKER: &str = "__start__";

/// Sentinel value meaning "attribution unknown" in checkpoint metadata.
pub const UNKNOWN_NODE: &str = "unknown";

/// Producing-node marker stored on checkpoints created by a fork.
pub const FORK_MARKER: &str = "__fork__";

/// Identifies a vertex of the execution graph.
///
/// Control nodes are fixed members of every compiled graph; `Agent` and
/// `Workflow` variants are minted from the registry snapshot during
/// compilation. Dynamic names that collide with a control name are rejected
/// at compile time, so the string payloads never shadow a control variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Virtual entry marker; never executed.
    Start,
    /// Virtual terminal marker; never executed.
    End,
    /// Normalizes and records incoming user input.
    Preprocess,
    /// Routing brain: consults the decision service through the circuit breaker.
    Supervisor,
    /// Expands the current plan into concrete tool tasks.
    ToolPlanning,
    /// Executes planned tool tasks via the work executor.
    ToolExecution,
    /// Final review/answer synthesis before termination.
    Qa,
    /// Dynamically registered agent, keyed by its registry name.
    Agent(String),
    /// Dynamically registered sub-graph workflow, keyed by its registry name.
    Workflow(String),
}

impl NodeKind {
    /// Wire names of the five control nodes.
    pub const CONTROL_NAMES: [&'static str; 5] = [
        "preprocess",
        "supervisor",
        "tool_planning",
        "tool_execution",
        "qa",
    ];

    /// Encode into the persisted string form.
    ///
    /// Control nodes use their bare wire names; dynamic nodes are prefixed
    /// so the two families round-trip unambiguously:
    /// `Agent("researcher")` → `"agent:researcher"`.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeKind::Start => "Start".to_string(),
            NodeKind::End => "End".to_string(),
            NodeKind::Preprocess => "preprocess".to_string(),
            NodeKind::Supervisor => "supervisor".to_string(),
            NodeKind::ToolPlanning => "tool_planning".to_string(),
            NodeKind::ToolExecution => "tool_execution".to_string(),
            NodeKind::Qa => "qa".to_string(),
            NodeKind::Agent(name) => format!("agent:{name}"),
            NodeKind::Workflow(name) => format!("workflow:{name}"),
        }
    }

    /// Decode a persisted string form.
    ///
    /// Forward compatible: an unrecognized bare name decodes as
    /// `Agent(name)`, which matches how historical checkpoints refer to
    /// dynamic nodes by their plain registry name.
    pub fn decode(s: &str) -> Self {
        match s {
            "Start" => NodeKind::Start,
            "End" => NodeKind::End,
            "preprocess" => NodeKind::Preprocess,
            "supervisor" => NodeKind::Supervisor,
            "tool_planning" => NodeKind::ToolPlanning,
            "tool_execution" => NodeKind::ToolExecution,
            "qa" => NodeKind::Qa,
            other => {
                if let Some(rest) = other.strip_prefix("agent:") {
                    NodeKind::Agent(rest.to_string())
                } else if let Some(rest) = other.strip_prefix("workflow:") {
                    NodeKind::Workflow(rest.to_string())
                } else {
                    NodeKind::Agent(other.to_string())
                }
            }
        }
    }

    /// Display label used by topology reconstruction and events.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            NodeKind::Agent(name) | NodeKind::Workflow(name) => name.clone(),
            other => other.encode(),
        }
    }

    /// Returns `true` for the virtual `Start`/`End` endpoints.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        matches!(self, NodeKind::Start | NodeKind::End)
    }

    /// Returns `true` for one of the five fixed control nodes.
    #[must_use]
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            NodeKind::Preprocess
                | NodeKind::Supervisor
                | NodeKind::ToolPlanning
                | NodeKind::ToolExecution
                | NodeKind::Qa
        )
    }

    /// Returns `true` if `name` is reserved for a control node or endpoint.
    #[must_use]
    pub fn is_reserved_name(name: &str) -> bool {
        Self::CONTROL_NAMES.contains(&name) || name == "Start" || name == "End"
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        NodeKind::decode(s)
    }
}

/// Identifies a state channel for reducer registration and conflict checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKey {
    /// Accumulated user input (string-concat reducer).
    Input,
    /// Conversation messages (append reducer).
    Messages,
    /// Work executor results (append reducer).
    Results,
    /// Free-form metadata (shallow map-merge reducer).
    Extra,
    /// Future step names maintained by the router (overwrite reducer).
    Plan,
    /// Circuit-breaker guard (overwrite reducer).
    Retry,
    /// Error events (append reducer).
    Errors,
}

impl ChannelKey {
    /// Every channel, in barrier application order.
    pub const ALL: [ChannelKey; 7] = [
        ChannelKey::Input,
        ChannelKey::Messages,
        ChannelKey::Results,
        ChannelKey::Extra,
        ChannelKey::Plan,
        ChannelKey::Retry,
        ChannelKey::Errors,
    ];

    /// Channels safe to receive writes from multiple nodes in one superstep.
    ///
    /// Append and map-merge reducers commute up to completion order; the
    /// concat/overwrite channels do not and must stay single-writer.
    #[must_use]
    pub fn fan_out_safe(&self) -> bool {
        matches!(
            self,
            ChannelKey::Messages | ChannelKey::Results | ChannelKey::Extra | ChannelKey::Errors
        )
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelKey::Input => "input",
            ChannelKey::Messages => "messages",
            ChannelKey::Results => "results",
            ChannelKey::Extra => "extra",
            ChannelKey::Plan => "plan",
            ChannelKey::Retry => "retry",
            ChannelKey::Errors => "errors",
        };
        write!(f, "{name}")
    }
}
