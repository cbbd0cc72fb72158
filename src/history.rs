//! Bounded message history and the dedup-by-last-value tracker.
//!
//! The subscriber is the only writer of a [`SharedHistory`]; TCP handlers only
//! ever take snapshots under the read lock, so a handler never sees a buffer
//! in the middle of an append-and-evict.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{RelayError, Result};
use crate::message::Message;

pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

pub type SharedHistory = Arc<RwLock<HistoryBuffer>>;

/// Remembers the most recent value and reports whether a new one differs.
///
/// Starts empty, so an empty first value is treated as unchanged.
#[derive(Debug, Default, Clone)]
pub struct LastValue {
    last: Message,
}

impl LastValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records `value` if it differs from the last one.
    pub fn update(&mut self, value: &Message) -> bool {
        if self.last == *value {
            return false;
        }
        self.last = value.clone();
        true
    }

    pub fn differs(&self, value: &Message) -> bool {
        self.last != *value
    }

    pub fn get(&self) -> &Message {
        &self.last
    }
}

/// FIFO ring of the most recent messages, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<Message>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(RelayError::Config(
                "history capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    pub fn shared(capacity: usize) -> Result<SharedHistory> {
        Ok(Arc::new(RwLock::new(Self::new(capacity)?)))
    }

    /// Appends a message, evicting and returning the oldest one when full.
    pub fn push(&mut self, message: Message) -> Option<Message> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(message);
        evicted
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Joins a snapshot with newlines, oldest to newest.
pub fn render(entries: &[Message], placeholder: &str) -> String {
    if entries.is_empty() {
        return placeholder.to_string();
    }
    entries
        .iter()
        .map(Message::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}
