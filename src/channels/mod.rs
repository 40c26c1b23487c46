//! Versioned state channels.
//!
//! Each field of the execution state lives in its own channel with an
//! independent version counter. Reducers mutate channel contents; the
//! barrier bumps versions only when content actually changed, which keeps
//! change detection cheap for checkpointing and event reporting.

pub mod errors;

pub use errors::{ErrorEvent, ErrorScope, Fault};

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::message::Message;
use crate::task::TaskResult;

/// Common behaviour of a versioned channel.
pub trait Channel {
    type Payload: Clone;

    /// Cloned view of the channel contents.
    fn snapshot(&self) -> Self::Payload;
    fn version(&self) -> u32;
    fn set_version(&mut self, version: u32);
}

/// Append-reduced sequence channel.
#[derive(Clone, Debug, PartialEq)]
pub struct SeqChannel<T: Clone> {
    items: Vec<T>,
    version: u32,
}

// Manual impl: the payload type itself needs no Default.
impl<T: Clone> Default for SeqChannel<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            version: 0,
        }
    }
}

impl<T: Clone> SeqChannel<T> {
    pub fn new(items: Vec<T>, version: u32) -> Self {
        Self { items, version }
    }

    pub fn get(&self) -> &Vec<T> {
        &self.items
    }

    pub fn get_mut(&mut self) -> &mut Vec<T> {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone> Channel for SeqChannel<T> {
    type Payload = Vec<T>;

    fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

/// Shallow-merge map channel; later writes win per key.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct MapChannel {
    map: FxHashMap<String, Value>,
    version: u32,
}

impl MapChannel {
    pub fn new(map: FxHashMap<String, Value>, version: u32) -> Self {
        Self { map, version }
    }

    pub fn get(&self) -> &FxHashMap<String, Value> {
        &self.map
    }

    pub fn get_mut(&mut self) -> &mut FxHashMap<String, Value> {
        &mut self.map
    }
}

impl Channel for MapChannel {
    type Payload = FxHashMap<String, Value>;

    fn snapshot(&self) -> FxHashMap<String, Value> {
        self.map.clone()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

/// Overwrite channel: each write replaces the value wholesale.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct CellChannel<T: Clone> {
    value: T,
    version: u32,
}

impl<T: Clone> CellChannel<T> {
    pub fn new(value: T, version: u32) -> Self {
        Self { value, version }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
    }
}

impl<T: Clone> Channel for CellChannel<T> {
    type Payload = T;

    fn snapshot(&self) -> T {
        self.value.clone()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

/// String-concat channel with a blank-line separator.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TextChannel {
    text: String,
    version: u32,
}

impl TextChannel {
    pub fn new(text: String, version: u32) -> Self {
        Self { text, version }
    }

    pub fn get(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Concatenate `addition` onto the text, separated by a blank line.
    /// Empty-safe on both sides: concatenating onto empty text is a plain
    /// assignment and an empty addition is a no-op.
    pub fn concat(&mut self, addition: &str) {
        if addition.is_empty() {
            return;
        }
        if self.text.is_empty() {
            self.text = addition.to_string();
        } else {
            self.text.push_str("\n\n");
            self.text.push_str(addition);
        }
    }

    /// Replace the text wholesale (used by the fork replace-input policy).
    pub fn replace(&mut self, text: String) {
        self.text = text;
    }
}

impl Channel for TextChannel {
    type Payload = String;

    fn snapshot(&self) -> String {
        self.text.clone()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

/// Conversation history channel.
pub type MessagesChannel = SeqChannel<Message>;
/// Executor results channel.
pub type ResultsChannel = SeqChannel<TaskResult>;
/// Error events channel.
pub type ErrorsChannel = SeqChannel<ErrorEvent>;
/// Router plan channel (overwrite).
pub type PlanChannel = CellChannel<Vec<String>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_concat_is_empty_safe() {
        let mut ch = TextChannel::default();
        ch.concat("");
        assert!(ch.is_empty());
        ch.concat("first");
        assert_eq!(ch.get(), "first");
        ch.concat("second");
        assert_eq!(ch.get(), "first\n\nsecond");
        ch.concat("");
        assert_eq!(ch.get(), "first\n\nsecond");
    }
}
