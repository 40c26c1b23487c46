//! Reducers fold node deltas into the versioned channels at the barrier.
//!
//! Each channel has exactly one reducer, fixed at construction. A reducer
//! reports whether it actually changed the channel contents; the barrier
//! bumps the channel version only on change, so version numbers track real
//! updates rather than write attempts.

mod registry;

pub use registry::{BarrierError, BarrierOutcome, ReducerRegistry};

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::channels::{CellChannel, MapChannel, SeqChannel, TextChannel};

/// Folds one update into a channel, returning `true` when contents changed.
pub trait Reducer<Ch, Update>: Send + Sync {
    fn apply(&self, channel: &mut Ch, update: Update) -> bool;
}

/// Append reducer for sequence channels. Empty updates are no-ops.
pub struct Append;

impl<T: Clone> Reducer<SeqChannel<T>, Vec<T>> for Append {
    fn apply(&self, channel: &mut SeqChannel<T>, mut update: Vec<T>) -> bool {
        if update.is_empty() {
            return false;
        }
        channel.get_mut().append(&mut update);
        true
    }
}

/// Shallow merge reducer for the extra channel; incoming keys win.
pub struct MergeMap;

impl Reducer<MapChannel, FxHashMap<String, Value>> for MergeMap {
    fn apply(&self, channel: &mut MapChannel, update: FxHashMap<String, Value>) -> bool {
        if update.is_empty() {
            return false;
        }
        let map = channel.get_mut();
        let mut changed = false;
        for (key, value) in update {
            if map.get(&key) != Some(&value) {
                map.insert(key, value);
                changed = true;
            }
        }
        changed
    }
}

/// String-concat reducer for the input channel.
pub struct ConcatText;

impl Reducer<TextChannel, String> for ConcatText {
    fn apply(&self, channel: &mut TextChannel, update: String) -> bool {
        if update.is_empty() {
            return false;
        }
        channel.concat(&update);
        true
    }
}

/// Overwrite reducer for cell channels.
pub struct Overwrite;

impl<T: Clone + PartialEq> Reducer<CellChannel<T>, T> for Overwrite {
    fn apply(&self, channel: &mut CellChannel<T>, update: T) -> bool {
        if channel.get() == &update {
            return false;
        }
        channel.set(update);
        true
    }
}
