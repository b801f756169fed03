//! User-facing trace log: a bounded ring of the last 100 entries, oldest
//! dropped on overflow. Distinct from `tracing` diagnostics; this buffer
//! is what `Client::trace_log` hands back to applications.

use std::collections::VecDeque;

pub const TRACE_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    /// Monotonic position in the trace stream; survives ring eviction.
    pub sequence: u64,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct TraceBuffer {
    entries: VecDeque<TraceEntry>,
    enabled: bool,
    next_sequence: u64,
}

impl TraceBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.enabled = true;
    }

    pub fn stop(&mut self) {
        self.enabled = false;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, text: impl Into<String>) {
        if !self.enabled {
            return;
        }
        if self.entries.len() == TRACE_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(TraceEntry {
            sequence: self.next_sequence,
            text: text.into(),
        });
        self.next_sequence += 1;
    }

    #[must_use]
    pub fn log(&self) -> Vec<TraceEntry> {
        self.entries.iter().cloned().collect()
    }
}
