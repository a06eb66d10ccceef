//! Short-term memory: the last few queries of the session.

use std::collections::VecDeque;

/// Default number of queries kept.
pub const DEFAULT_CAPACITY: usize = 5;

/// A bounded, ordered window of recent queries (oldest first).
#[derive(Debug, Clone)]
pub struct MemoryWindow {
    entries: VecDeque<String>,
    capacity: usize,
}

impl MemoryWindow {
    /// Create an empty window. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a query, evicting the oldest ones past capacity.
    pub fn append(&mut self, query: impl Into<String>) {
        self.entries.push_back(query.into());
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// The window as prompt text: entries in order, joined by newlines.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for MemoryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
