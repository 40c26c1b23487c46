//! The barrier: validates and folds a superstep's deltas into state.

use miette::Diagnostic;
use thiserror::Error;

use super::{Append, ConcatText, MergeMap, Overwrite, Reducer};
use crate::channels::Channel;
use crate::node::NodeDelta;
use crate::state::RunState;
use crate::types::{ChannelKey, NodeKind};

/// Barrier failure. Conflicts abort the superstep before any delta lands,
/// so a failed barrier never half-applies a step.
#[derive(Debug, Error, Diagnostic)]
pub enum BarrierError {
    #[error("write conflict on channel `{channel}`: written by {writers:?} in one step")]
    #[diagnostic(
        code(timeloom::barrier::write_conflict),
        help("concat and overwrite channels accept at most one writer per superstep; route fan-out work through append channels instead")
    )]
    WriteConflict {
        channel: ChannelKey,
        writers: Vec<String>,
    },
}

/// What the barrier changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BarrierOutcome {
    /// Channels whose contents (and therefore versions) changed.
    pub updated: Vec<ChannelKey>,
}

/// Fixed mapping of channels to reducers.
///
/// There is no dynamic registration: the channel set is closed, so the
/// registry is a zero-sized dispatcher that exists to keep barrier semantics
/// in one place and testable without an engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReducerRegistry;

impl ReducerRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Validate that no non-fan-out-safe channel has more than one writer
    /// among the step's deltas.
    pub fn validate(&self, deltas: &[(NodeKind, NodeDelta)]) -> Result<(), BarrierError> {
        for channel in ChannelKey::ALL {
            if channel.fan_out_safe() {
                continue;
            }
            let writers: Vec<String> = deltas
                .iter()
                .filter(|(_, delta)| delta.writes(channel))
                .map(|(node, _)| node.encode())
                .collect();
            if writers.len() > 1 {
                return Err(BarrierError::WriteConflict { channel, writers });
            }
        }
        Ok(())
    }

    /// Fold a superstep's deltas into `state` in frontier order.
    ///
    /// Versions bump by one per channel per barrier, and only when the
    /// reducer reports an actual content change.
    pub fn apply_step(
        &self,
        state: &mut RunState,
        deltas: Vec<(NodeKind, NodeDelta)>,
    ) -> Result<BarrierOutcome, BarrierError> {
        self.validate(&deltas)?;

        let mut changed = [false; 7];
        for (_, delta) in deltas {
            if let Some(input) = delta.input {
                changed[0] |= ConcatText.apply(&mut state.input, input);
            }
            if let Some(messages) = delta.messages {
                changed[1] |= Append.apply(&mut state.messages, messages);
            }
            if let Some(results) = delta.results {
                changed[2] |= Append.apply(&mut state.results, results);
            }
            if let Some(extra) = delta.extra {
                changed[3] |= MergeMap.apply(&mut state.extra, extra);
            }
            if let Some(plan) = delta.plan {
                changed[4] |= Overwrite.apply(&mut state.plan, plan);
            }
            if let Some(retry) = delta.retry {
                changed[5] |= Overwrite.apply(&mut state.retry, retry);
            }
            if let Some(errors) = delta.errors {
                changed[6] |= Append.apply(&mut state.errors, errors);
            }
        }

        macro_rules! bump {
            ($ch:expr) => {{
                let v = $ch.version() + 1;
                $ch.set_version(v);
                v
            }};
        }

        let mut outcome = BarrierOutcome::default();
        for (i, key) in ChannelKey::ALL.into_iter().enumerate() {
            if changed[i] {
                let version = match key {
                    ChannelKey::Input => bump!(state.input),
                    ChannelKey::Messages => bump!(state.messages),
                    ChannelKey::Results => bump!(state.results),
                    ChannelKey::Extra => bump!(state.extra),
                    ChannelKey::Plan => bump!(state.plan),
                    ChannelKey::Retry => bump!(state.retry),
                    ChannelKey::Errors => bump!(state.errors),
                };
                tracing::trace!(channel = %key, version, "channel updated");
                outcome.updated.push(key);
            }
        }
        Ok(outcome)
    }
}
