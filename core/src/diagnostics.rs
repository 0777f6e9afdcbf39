//! Bounded diagnostic samples.
//!
//! Large failing runs must not produce unbounded output: a sample keeps
//! the first `max_shown` items and only counts the rest.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticSample<T> {
    max_shown: usize,
    total: usize,
    shown: Vec<T>,
}

impl<T> DiagnosticSample<T> {
    pub fn new(max_shown: usize) -> Self {
        Self {
            max_shown,
            total: 0,
            shown: Vec::new(),
        }
    }

    /// Count an occurrence, building the description only while there is
    /// still room in the sample.
    pub fn record_with(&mut self, describe: impl FnOnce() -> T) {
        self.total += 1;
        if self.shown.len() < self.max_shown {
            self.shown.push(describe());
        }
    }

    pub fn record(&mut self, item: T) {
        self.record_with(|| item);
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn shown(&self) -> &[T] {
        &self.shown
    }

    /// Occurrences counted but not described.
    pub fn hidden(&self) -> usize {
        self.total - self.shown.len()
    }
}
