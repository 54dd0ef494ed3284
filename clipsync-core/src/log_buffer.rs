use std::collections::VecDeque;

use crate::model::LogEntry;

pub const LOG_BUFFER_CAPACITY: usize = 2000;

/// Fixed-capacity FIFO of log entries. Pushing at capacity evicts the oldest
/// entry.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(LOG_BUFFER_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Replaces the whole buffer, keeping only the newest `capacity` entries.
    pub fn replace<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = LogEntry>,
    {
        self.entries.clear();
        for entry in entries {
            self.push(entry);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
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

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.line.clone()).collect()
    }
}
