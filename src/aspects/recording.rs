//! In-memory log sink that captures every entry.
//!
//! Handy for assertions and for hosts that want to inspect what the logging
//! aspect produced.

use std::sync::{Arc, Mutex};

use crate::aspects::logging::LogSink;

/// Sink that keeps every written entry in order.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSink {
    entries: Arc<Mutex<Vec<String>>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the entries written so far.
    pub fn entries(&self) -> Vec<String> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every recorded entry.
    pub fn clear(&self) {
        match self.entries.lock() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl LogSink for MemoryLogSink {
    fn write(&self, entry: &str) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry.to_string()),
            Err(poisoned) => poisoned.into_inner().push(entry.to_string()),
        }
    }
}
