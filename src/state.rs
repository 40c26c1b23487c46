//! Execution state: one versioned channel per field, each with a fixed
//! reducer (see [`crate::reducers`]).
//!
//! Nodes never touch [`RunState`] directly; they receive a [`StateSnapshot`]
//! and return a delta which the barrier merges through the reducer registry.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::breaker::RetryGuard;
use crate::channels::{
    Channel, CellChannel, ErrorsChannel, MapChannel, MessagesChannel, PlanChannel, ResultsChannel,
    TextChannel,
};
use crate::channels::errors::ErrorEvent;
use crate::message::Message;
use crate::task::TaskResult;

/// The full mutable state of one thread's execution.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RunState {
    /// Accumulated user input (string-concat).
    pub input: TextChannel,
    /// Conversation history (append).
    pub messages: MessagesChannel,
    /// Executor results (append).
    pub results: ResultsChannel,
    /// Free-form metadata (shallow merge).
    pub extra: MapChannel,
    /// Router plan (overwrite).
    pub plan: PlanChannel,
    /// Circuit-breaker guard (overwrite).
    pub retry: CellChannel<RetryGuard>,
    /// Error events (append).
    pub errors: ErrorsChannel,
}

/// Immutable point-in-time view handed to node handlers.
#[derive(Clone, Debug, Default)]
pub struct StateSnapshot {
    pub input: String,
    pub messages: Vec<Message>,
    pub results: Vec<TaskResult>,
    pub extra: FxHashMap<String, Value>,
    pub plan: Vec<String>,
    pub retry: RetryGuard,
    pub errors: Vec<ErrorEvent>,
}

impl RunState {
    /// State seeded with the first piece of user input.
    pub fn new_with_input(input: &str) -> Self {
        let mut state = Self::default();
        state.input.concat(input);
        state
            .messages
            .get_mut()
            .push(Message::user(input.to_string()));
        state
    }

    pub fn builder() -> RunStateBuilder {
        RunStateBuilder::default()
    }

    /// Cloned view safe to hand to concurrently running handlers.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            input: self.input.snapshot(),
            messages: self.messages.snapshot(),
            results: self.results.snapshot(),
            extra: self.extra.snapshot(),
            plan: self.plan.snapshot(),
            retry: self.retry.snapshot(),
            errors: self.errors.snapshot(),
        }
    }

    /// Lengths of the append/concat channels, used by the workflow composer
    /// to compute incremental deltas after a sub-run.
    pub fn growth_marks(&self) -> GrowthMarks {
        GrowthMarks {
            input_len: self.input.len(),
            messages_len: self.messages.len(),
            results_len: self.results.len(),
            errors_len: self.errors.len(),
        }
    }
}

/// Pre-run lengths of the growable channels.
#[derive(Clone, Copy, Debug)]
pub struct GrowthMarks {
    pub input_len: usize,
    pub messages_len: usize,
    pub results_len: usize,
    pub errors_len: usize,
}

/// Fluent construction for tests and fork overrides.
#[derive(Debug, Default)]
pub struct RunStateBuilder {
    input: String,
    messages: Vec<Message>,
    extra: FxHashMap<String, Value>,
    plan: Vec<String>,
}

impl RunStateBuilder {
    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn with_plan(mut self, plan: Vec<String>) -> Self {
        self.plan = plan;
        self
    }

    pub fn build(self) -> RunState {
        RunState {
            input: TextChannel::new(self.input, 1),
            messages: MessagesChannel::new(self.messages, 1),
            results: ResultsChannel::default(),
            extra: MapChannel::new(self.extra, 1),
            plan: PlanChannel::new(self.plan, 1),
            retry: CellChannel::default(),
            errors: ErrorsChannel::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_is_independent_of_state() {
        let mut state = RunState::new_with_input("hello");
        state.extra.get_mut().insert("k".into(), json!("v"));
        let snapshot = state.snapshot();
        state.extra.get_mut().clear();
        state.input.concat("more");
        assert_eq!(snapshot.extra.get("k"), Some(&json!("v")));
        assert_eq!(snapshot.input, "hello");
    }
}
