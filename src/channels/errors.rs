//! Error events accumulated on the append-reduced errors channel.
//!
//! Node failures are converted into [`ErrorEvent`]s rather than aborting the
//! run; the errors channel is therefore ordinary state, persisted inside
//! checkpoints like any other channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where in the engine an error originated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ErrorScope {
    /// Raised by a node handler. `node` holds the encoded `NodeKind`.
    Node { node: String, step: u64 },
    /// Raised while merging deltas at the barrier.
    Barrier { step: u64 },
    /// Raised by the engine outside any node.
    Engine { thread: String, step: u64 },
    #[default]
    App,
}

/// Structured error cause, optionally chained.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fault {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<Fault>>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Default for Fault {
    fn default() -> Self {
        Fault {
            message: String::new(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c as &dyn std::error::Error)
    }
}

impl Fault {
    pub fn msg(m: impl Into<String>) -> Self {
        Fault {
            message: m.into(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    #[must_use]
    pub fn with_cause(mut self, cause: Fault) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// One recorded error with scope, cause, tags and free-form context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEvent {
    #[serde(default = "chrono::Utc::now")]
    pub when: DateTime<Utc>,
    #[serde(default)]
    pub scope: ErrorScope,
    #[serde(default)]
    pub error: Fault,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl Default for ErrorEvent {
    fn default() -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::default(),
            error: Fault::default(),
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }
}

impl ErrorEvent {
    /// Node-scoped error event.
    pub fn node(node: impl Into<String>, step: u64, error: Fault) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Node {
                node: node.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Barrier-scoped error event.
    pub fn barrier(step: u64, error: Fault) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Barrier { step },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Engine-scoped error event.
    pub fn engine(thread: impl Into<String>, step: u64, error: Fault) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Engine {
                thread: thread.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}
