//! Bounded message history.
//!
//! The client never retains what it receives; callers that want a scrollback
//! (the CLI, a UI) keep one here. Oldest entries fall off first.

use std::collections::VecDeque;

/// Default number of messages kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// FIFO of the most recent messages.
#[derive(Debug, Clone)]
pub struct MessageLog<M> {
    entries: VecDeque<M>,
    capacity: usize,
}

impl<M> Default for MessageLog<M> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl<M> MessageLog<M> {
    /// Log keeping at most `capacity` messages (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message, evicting the oldest when full.
    pub fn push(&mut self, message: M) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    /// Messages from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &M> {
        self.entries.iter()
    }

    /// Most recent message.
    #[must_use]
    pub fn latest(&self) -> Option<&M> {
        self.entries.back()
    }

    /// Number of messages held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of messages held.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
