//! Streaming event bus.
//!
//! The engine publishes progress over an unbounded flume channel so callers
//! can observe a run (tokens, node boundaries, checkpoints, interrupts)
//! without touching the checkpoint store. Dropping the [`EventStream`] never
//! stalls the engine: sends are fire-and-forget.

use flume::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::NodeKind;

/// One observable occurrence during a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Incremental output text attributed to a node.
    Token { node: String, text: String },
    NodeStart { node: String, step: u64 },
    NodeEnd { node: String, step: u64 },
    /// A checkpoint was appended for the thread.
    Checkpoint { checkpoint_id: String, step: u64 },
    /// Execution paused before the named node.
    Interrupt { node: String, step: u64 },
    /// The run reached a terminal frontier.
    Done { thread_id: String, step: u64 },
    /// A node failure recorded as state (the run continues).
    Error { node: String, message: String },
    /// Engine-internal diagnostics that are not part of the run protocol.
    Diagnostic { scope: String, detail: Value },
}

/// Cloneable sending half handed to nodes via [`crate::node::NodeContext`].
#[derive(Clone)]
pub struct EventEmitter {
    tx: Sender<Event>,
}

impl EventEmitter {
    /// Emitter wired to a fresh stream.
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, EventStream { rx })
    }

    /// Emitter whose events go nowhere. Useful in tests of pure node logic.
    pub fn disconnected() -> Self {
        let (tx, _) = flume::unbounded();
        Self { tx }
    }

    pub fn emit(&self, event: Event) {
        // Receiver gone means nobody is listening; that is fine.
        let _ = self.tx.send(event);
    }

    pub fn token(&self, node: &NodeKind, text: impl Into<String>) {
        self.emit(Event::Token {
            node: node.encode(),
            text: text.into(),
        });
    }

    pub fn node_start(&self, node: &NodeKind, step: u64) {
        self.emit(Event::NodeStart {
            node: node.encode(),
            step,
        });
    }

    pub fn node_end(&self, node: &NodeKind, step: u64) {
        self.emit(Event::NodeEnd {
            node: node.encode(),
            step,
        });
    }

    pub fn diagnostic(&self, scope: &str, detail: Value) {
        self.emit(Event::Diagnostic {
            scope: scope.to_string(),
            detail,
        });
    }
}

/// Receiving half returned to the caller of a run.
#[derive(Debug)]
pub struct EventStream {
    rx: Receiver<Event>,
}

impl EventStream {
    /// Await the next event; `None` once every emitter is dropped.
    pub async fn next(&self) -> Option<Event> {
        self.rx.recv_async().await.ok()
    }

    /// Drain whatever is currently buffered without waiting.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }
}
