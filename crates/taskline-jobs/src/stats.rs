//! Worker counters.

use serde::{Deserialize, Serialize};

/// Classification of one poll iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tally {
    /// Nothing was available.
    Empty,
    /// The record could not be decoded or its handler is unknown.
    Invalid,
    /// The handler returned an error or panicked.
    Exception,
    /// The handler reported success or nothing.
    Success,
    /// The handler reported failure.
    Failure,
}

impl Tally {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Invalid => "invalid",
            Self::Exception => "exception",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Snapshot of a worker's counters.
///
/// Every completed poll increments `seen` and exactly one other counter,
/// so `seen` always equals the sum of the rest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub seen: u64,
    pub empty: u64,
    pub exception: u64,
    pub invalid: u64,
    pub success: u64,
    pub failure: u64,
}

impl Stats {
    pub(crate) fn record(&mut self, tally: Tally) {
        self.seen += 1;
        match tally {
            Tally::Empty => self.empty += 1,
            Tally::Invalid => self.invalid += 1,
            Tally::Exception => self.exception += 1,
            Tally::Success => self.success += 1,
            Tally::Failure => self.failure += 1,
        }
    }

    /// Whether `seen` matches the sum of the outcome counters.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.seen == self.empty + self.exception + self.invalid + self.success + self.failure
    }
}
