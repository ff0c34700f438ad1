//! The interface through which executed lines leave the shell core.
//!
//! Persistent history and the next-command suggestion model live outside
//! this crate; they only see lines through [`LineRecorder`].

use std::collections::VecDeque;

/// Receives every line the shell executed, in order.
pub trait LineRecorder {
    /// Adds `line` to the rolling history.
    fn record_line(&mut self, line: &str);

    /// Registers that `current` was run right after `previous`.
    fn record_sequence(&mut self, previous: &str, current: &str);
}

/// Bounded in-memory recorder; the oldest entries are dropped first.
#[derive(Debug, Clone, Default)]
pub struct RollingHistory {
    capacity: usize,
    lines: VecDeque<String>,
    sequences: VecDeque<(String, String)>,
}

impl RollingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity.min(1024)),
            sequences: VecDeque::new(),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn sequences(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sequences
            .iter()
            .map(|(prev, cur)| (prev.as_str(), cur.as_str()))
    }

    fn push_bounded<T>(queue: &mut VecDeque<T>, capacity: usize, item: T) {
        if capacity == 0 {
            return;
        }
        if queue.len() == capacity {
            queue.pop_front();
        }
        queue.push_back(item);
    }
}

impl LineRecorder for RollingHistory {
    fn record_line(&mut self, line: &str) {
        Self::push_bounded(&mut self.lines, self.capacity, line.to_string());
    }

    fn record_sequence(&mut self, previous: &str, current: &str) {
        Self::push_bounded(
            &mut self.sequences,
            self.capacity,
            (previous.to_string(), current.to_string()),
        );
    }
}
