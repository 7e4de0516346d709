//! Snapshot reconciliation
//!
//! A snapshot replaces everything known about an instrument: both sides are
//! cleared, then every level with a positive quantity is written afresh.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{BookWriter, LevelPricing, OrphanPolicy, SkipCounts};
use crate::decimal;
use crate::error::{IngestError, Result};
use crate::feed::{Entry, RawLevel, SnapshotEvent};
use crate::record::{BookRecord, RecordId};
use crate::side::Side;
use crate::store::{StateStore, StoreError};

/// Normalized view of an applied snapshot, emitted for auditing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSnapshot {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<BookRecord>,
    pub asks: Vec<BookRecord>,
}

/// Outcome of applying one snapshot
#[derive(Debug, Clone)]
pub struct SnapshotReport {
    pub instrument: String,
    /// Index entries removed before writing
    pub cleared: usize,
    /// Levels written
    pub written: usize,
    /// Entries with zero or negative quantity
    pub ignored: usize,
    pub skipped: SkipCounts,
    pub snapshot: NormalizedSnapshot,
}

/// Rebuilds an instrument's book from a full snapshot
pub struct SnapshotReconciler<S> {
    store: S,
    pricing: LevelPricing,
    orphans: OrphanPolicy,
}

impl<S: StateStore> SnapshotReconciler<S> {
    pub fn new(store: S, pricing: LevelPricing, orphans: OrphanPolicy) -> Self {
        Self {
            store,
            pricing,
            orphans,
        }
    }

    /// Apply a snapshot.
    ///
    /// Malformed entries are logged and skipped. The first store failure
    /// aborts the snapshot and is returned to the caller.
    pub fn apply(&self, event: &SnapshotEvent) -> Result<SnapshotReport> {
        let instrument = event.instrument.as_str();
        let writer = BookWriter::new(&self.store, self.orphans);

        let mut cleared = 0;
        for side in Side::ALL {
            cleared += writer.clear_side(instrument, side).map_err(|e| {
                IngestError::StoreWrite(format!("{} clear {}: {}", instrument, side, e))
            })?;
        }

        let mut report = SnapshotReport {
            instrument: instrument.to_string(),
            cleared,
            written: 0,
            ignored: 0,
            skipped: SkipCounts::default(),
            snapshot: NormalizedSnapshot {
                instrument: instrument.to_string(),
                timestamp: Utc::now(),
                bids: Vec::with_capacity(event.bids.len()),
                asks: Vec::with_capacity(event.asks.len()),
            },
        };

        for (side, entries) in [(Side::Bid, &event.bids), (Side::Offer, &event.asks)] {
            for entry in entries {
                let (price, quantity) = match parse_entry(instrument, side, entry) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!(instrument = %instrument, side = %side, error = %e, "Skipping snapshot entry");
                        report.skipped.malformed += 1;
                        continue;
                    }
                };

                if quantity <= Decimal::ZERO {
                    report.ignored += 1;
                    continue;
                }

                let level = match self.pricing.price_level(instrument, side, price, quantity) {
                    Ok(level) => level,
                    Err(e) => {
                        warn!(instrument = %instrument, side = %side, price = %price, error = %e, "Skipping snapshot entry");
                        report.skipped.malformed += 1;
                        continue;
                    }
                };

                let record = self.pricing.record(&level, RecordId::new());

                let store_err = |e: StoreError| IngestError::StoreWrite(format!("{} {} {}: {}", instrument, side, price, e));

                // Duplicate prices inside one snapshot: the later entry wins
                let replaced = writer.remove_at(instrument, side, price).map_err(store_err)?;
                writer.insert(&level, &record).map_err(store_err)?;

                let written = match side {
                    Side::Bid => &mut report.snapshot.bids,
                    Side::Offer => &mut report.snapshot.asks,
                };
                if !replaced.is_empty() {
                    written.retain(|earlier| !replaced.contains(&earlier.id.key()));
                }
                written.push(record);
            }
        }
        report.written = report.snapshot.bids.len() + report.snapshot.asks.len();

        debug!(
            instrument = %instrument,
            bids = report.snapshot.bids.len(),
            asks = report.snapshot.asks.len(),
            "Snapshot levels written"
        );
        info!(
            instrument = %instrument,
            cleared = report.cleared,
            written = report.written,
            skipped = report.skipped.total(),
            "Snapshot applied"
        );

        Ok(report)
    }
}

fn parse_entry(instrument: &str, side: Side, entry: &Entry<RawLevel>) -> Result<(Decimal, Decimal)> {
    match entry {
        Entry::Valid(level) => {
            let raw = || format!("[{:?}, {:?}]", level.price, level.quantity);
            let price = decimal::parse(&level.price).map_err(|e| IngestError::malformed(instrument, side, &raw(), e))?;
            let quantity =
                decimal::parse(&level.quantity).map_err(|e| IngestError::malformed(instrument, side, &raw(), e))?;
            Ok((price, quantity))
        }
        Entry::Malformed(raw) => Err(IngestError::malformed(instrument, side, raw, "expected [price, quantity]")),
    }
}
