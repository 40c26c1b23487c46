//! Serializable mirror of the runtime state.
//!
//! [`RunState`] itself carries no serde derives; this module owns the wire
//! shape so the runtime types can evolve without silently changing what is
//! stored. Conversions are lossless in both directions.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::breaker::RetryGuard;
use crate::channels::errors::ErrorEvent;
use crate::channels::{CellChannel, Channel, MapChannel, SeqChannel, TextChannel};
use crate::message::Message;
use crate::state::RunState;
use crate::task::TaskResult;

/// One channel's payload plus its version counter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedChannel<T> {
    pub value: T,
    pub version: u32,
}

impl<T> PersistedChannel<T> {
    fn new(value: T, version: u32) -> Self {
        Self { value, version }
    }
}

/// Wire shape of a full state snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedState {
    pub input: PersistedChannel<String>,
    pub messages: PersistedChannel<Vec<Message>>,
    pub results: PersistedChannel<Vec<TaskResult>>,
    pub extra: PersistedChannel<FxHashMap<String, Value>>,
    pub plan: PersistedChannel<Vec<String>>,
    pub retry: PersistedChannel<RetryGuard>,
    pub errors: PersistedChannel<Vec<ErrorEvent>>,
}

impl From<&RunState> for PersistedState {
    fn from(state: &RunState) -> Self {
        Self {
            input: PersistedChannel::new(state.input.snapshot(), state.input.version()),
            messages: PersistedChannel::new(state.messages.snapshot(), state.messages.version()),
            results: PersistedChannel::new(state.results.snapshot(), state.results.version()),
            extra: PersistedChannel::new(state.extra.snapshot(), state.extra.version()),
            plan: PersistedChannel::new(state.plan.snapshot(), state.plan.version()),
            retry: PersistedChannel::new(state.retry.snapshot(), state.retry.version()),
            errors: PersistedChannel::new(state.errors.snapshot(), state.errors.version()),
        }
    }
}

impl From<PersistedState> for RunState {
    fn from(persisted: PersistedState) -> Self {
        RunState {
            input: TextChannel::new(persisted.input.value, persisted.input.version),
            messages: SeqChannel::new(persisted.messages.value, persisted.messages.version),
            results: SeqChannel::new(persisted.results.value, persisted.results.version),
            extra: MapChannel::new(persisted.extra.value, persisted.extra.version),
            plan: CellChannel::new(persisted.plan.value, persisted.plan.version),
            retry: CellChannel::new(persisted.retry.value, persisted.retry.version),
            errors: SeqChannel::new(persisted.errors.value, persisted.errors.version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_persistence() {
        let mut state = RunState::new_with_input("question");
        state.plan.set(vec!["step".to_string()]);
        state.plan.set_version(3);

        let persisted = PersistedState::from(&state);
        let json = serde_json::to_string(&persisted).unwrap();
        let back: PersistedState = serde_json::from_str(&json).unwrap();
        let restored = RunState::from(back);

        assert_eq!(restored, state);
    }
}
