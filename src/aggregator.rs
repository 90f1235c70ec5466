//! Error aggregation
//!
//! [`DocumentErrors`] is the error list of the one document being checked.
//! [`ErrorAggregator`] counts message text across a run. Workers keep their own
//! aggregator and the runner merges them once every worker has finished.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::{ErrorHandler, ValidationError};

/// Occurrence count per distinct error message.
///
/// Messages are compared by exact text, so two different problems that render the
/// same text share one bucket.
#[derive(Debug, Clone, Default)]
pub struct ErrorAggregator {
    counts: HashMap<String, usize>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `message`
    pub fn record(&mut self, message: &str) {
        match self.counts.get_mut(message) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(message.to_string(), 1);
            }
        }
    }

    /// Fold a partial aggregator into this one
    pub fn merge(&mut self, other: ErrorAggregator) {
        for (message, count) in other.counts {
            *self.counts.entry(message).or_insert(0) += count;
        }
    }

    pub fn count(&self, message: &str) -> usize {
        self.counts.get(message).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn snapshot(&self) -> ErrorFrequencies {
        ErrorFrequencies(self.counts.clone())
    }

    pub fn into_snapshot(self) -> ErrorFrequencies {
        ErrorFrequencies(self.counts)
    }
}

/// Frozen message counts of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorFrequencies(HashMap<String, usize>);

impl ErrorFrequencies {
    pub fn get(&self, message: &str) -> Option<usize> {
        self.0.get(message).copied()
    }

    /// Number of distinct messages
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of recorded errors
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Entries by descending count, ties broken by message text
    pub fn sorted(&self) -> Vec<(&str, usize)> {
        let mut entries: Vec<(&str, usize)> =
            self.0.iter().map(|(m, c)| (m.as_str(), *c)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(m, c)| (m.as_str(), *c))
    }
}

/// Diagnostics collected for a single document.
///
/// Collected errors only reach an [`ErrorAggregator`] through [`Self::commit`], so a
/// document that ends up unreadable never contributes to the run's counts.
#[derive(Debug, Default)]
pub struct DocumentErrors {
    errors: Vec<ValidationError>,
}

impl DocumentErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Record every collected message in `aggregator` and hand back the list
    pub fn commit(self, aggregator: &mut ErrorAggregator) -> Vec<ValidationError> {
        for error in &self.errors {
            aggregator.record(&error.message);
        }
        self.errors
    }
}

impl ErrorHandler for DocumentErrors {
    fn on_warning(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    fn on_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    fn on_fatal_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }
}
