//! Bounded FIFO history of admitted frame samples.
//!
//! [`History`] is a queue backed by a growable vector and a movable read
//! offset. Dequeuing only advances the offset; storage is compacted once
//! the discarded prefix is at least as large as the live tail, so a
//! sliding window that grows at the back and shrinks at the front costs
//! amortised O(1) per operation and never holds more than about twice
//! the window's occupancy.

use serde::{Deserialize, Serialize};

// ── Sample ───────────────────────────────────────────────────────

/// One admitted frame: when it was admitted and how large it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    /// Admission time in milliseconds on the recorder clock.
    pub timestamp_ms: u64,
    /// Encoded blob size in bytes.
    pub size_bytes: u64,
}

impl Sample {
    pub fn new(timestamp_ms: u64, size_bytes: u64) -> Self {
        Self {
            timestamp_ms,
            size_bytes,
        }
    }
}

// ── History ──────────────────────────────────────────────────────

/// First-in-first-out queue, iterable from oldest to newest.
#[derive(Debug, Clone)]
pub struct History<T = Sample> {
    /// Slots before `offset` have been dequeued and are always `None`.
    slots: Vec<Option<T>>,
    offset: usize,
}

impl<T> History<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            offset: 0,
        }
    }

    /// Append `item` at the back.
    pub fn enqueue(&mut self, item: T) {
        self.slots.push(Some(item));
    }

    /// Remove and return the oldest item, or `None` when empty.
    pub fn dequeue_oldest(&mut self) -> Option<T> {
        let item = self.slots.get_mut(self.offset)?.take();
        self.offset += 1;
        if self.offset * 2 >= self.slots.len() {
            self.compact();
        }
        item
    }

    /// The oldest item, without removing it.
    pub fn peek_oldest(&self) -> Option<&T> {
        self.slots.get(self.offset).and_then(Option::as_ref)
    }

    /// The newest item, without removing it.
    pub fn peek_newest(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots.last().and_then(Option::as_ref)
    }

    /// Iterate live items from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots[self.offset..].iter().flatten()
    }

    /// Number of live items.
    pub fn len(&self) -> usize {
        self.slots.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every item and release the discarded prefix.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.offset = 0;
    }

    /// Slots currently allocated, live or discarded.
    #[cfg(test)]
    fn storage_len(&self) -> usize {
        self.slots.len()
    }

    fn compact(&mut self) {
        self.slots.drain(..self.offset);
        self.offset = 0;
    }
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> IntoIterator for &'a History<T> {
    type Item = &'a T;
    type IntoIter = std::iter::Flatten<std::slice::Iter<'a, Option<T>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots[self.offset..].iter().flatten()
    }
}

impl History<Sample> {
    /// Sum of `size_bytes` over every live sample.
    pub fn total_bytes(&self) -> u64 {
        self.iter().map(|s| s.size_bytes).sum()
    }
}

// ── Tests ────────────────────────────────────────────────────────
