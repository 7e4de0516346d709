//! Order book reconciliation
//!
//! Applies snapshot and incremental events to the state store and exposes
//! the read side used by downstream consumers.

mod incremental;
mod level;
mod query;
mod snapshot;
mod summary;
mod writer;

pub use incremental::{IncrementalReconciler, IncrementalReport};
pub use level::{LevelPricing, PriceLevel};
pub use query::BookQuery;
pub use snapshot::{NormalizedSnapshot, SnapshotReconciler, SnapshotReport};
pub use summary::BookSummary;
pub use writer::{BookWriter, OrphanPolicy};

use serde::{Deserialize, Serialize};

use crate::side::Side;

/// Entries skipped while reconciling one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    /// Unparseable numbers or wrongly shaped entries
    pub malformed: usize,
    /// Unrecognized side tokens
    pub unknown_side: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.malformed + self.unknown_side
    }
}

/// Per-side tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideCounts {
    pub bid: usize,
    pub offer: usize,
}

impl SideCounts {
    pub fn add(&mut self, side: Side) {
        match side {
            Side::Bid => self.bid += 1,
            Side::Offer => self.offer += 1,
        }
    }

    pub fn get(&self, side: Side) -> usize {
        match side {
            Side::Bid => self.bid,
            Side::Offer => self.offer,
        }
    }
}
