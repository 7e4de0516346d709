//! Incremental reconciliation
//!
//! Each change replaces the level at one (side, price) wholesale: the old
//! index entry goes first, then a new record is written unless the quantity
//! says the level is gone.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::{BookWriter, LevelPricing, OrphanPolicy, SideCounts, SkipCounts};
use crate::decimal;
use crate::error::{IngestError, Result};
use crate::feed::{Entry, IncrementalEvent, RawChange};
use crate::record::RecordId;
use crate::side::{self, Side};
use crate::store::{StateStore, StoreError};

/// Outcome of applying one incremental event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncrementalReport {
    pub instrument: String,
    /// New levels at previously empty prices
    pub inserted: usize,
    /// Levels replaced at an existing price
    pub replaced: usize,
    /// Levels removed by a zero or negative quantity
    pub deleted: usize,
    /// Deletions for prices that were not in the book
    pub absent: usize,
    pub skipped: SkipCounts,
    /// Levels written, per side
    pub written_by_side: SideCounts,
    /// Levels deleted, per side
    pub deleted_by_side: SideCounts,
}

/// A change that passed side and numeric validation
struct ParsedChange {
    side: Side,
    price: Decimal,
    quantity: Decimal,
}

/// Applies point changes to an instrument's book
pub struct IncrementalReconciler<S> {
    store: S,
    pricing: LevelPricing,
    orphans: OrphanPolicy,
}

impl<S: StateStore> IncrementalReconciler<S> {
    pub fn new(store: S, pricing: LevelPricing, orphans: OrphanPolicy) -> Self {
        Self {
            store,
            pricing,
            orphans,
        }
    }

    /// Apply changes strictly in order.
    ///
    /// Unknown sides and malformed numbers skip only their own change. A store
    /// failure stops the event at that change and is returned.
    pub fn apply(&self, event: &IncrementalEvent) -> Result<IncrementalReport> {
        let instrument = event.instrument.as_str();
        let writer = BookWriter::new(&self.store, self.orphans);
        let mut report = IncrementalReport {
            instrument: instrument.to_string(),
            ..Default::default()
        };

        for (index, entry) in event.changes.iter().enumerate() {
            let change = match parse_change(instrument, entry) {
                Ok(change) => change,
                Err(e) => {
                    warn!(instrument = %instrument, change = index, error = %e, "Skipping change");
                    match e {
                        IngestError::UnknownSide { .. } => report.skipped.unknown_side += 1,
                        _ => report.skipped.malformed += 1,
                    }
                    continue;
                }
            };

            // Value the change before touching the store so a skipped change leaves the book as it was
            let replacement = if change.quantity > Decimal::ZERO {
                match self
                    .pricing
                    .price_level(instrument, change.side, change.price, change.quantity)
                {
                    Ok(level) => {
                        let record = self.pricing.record(&level, RecordId::new());
                        Some((level, record))
                    }
                    Err(e) => {
                        warn!(instrument = %instrument, change = index, error = %e, "Skipping change");
                        report.skipped.malformed += 1;
                        continue;
                    }
                }
            } else {
                None
            };

            let store_err = |e: StoreError| {
                IngestError::StoreWrite(format!(
                    "{} change {} ({} {}): {}",
                    instrument, index, change.side, change.price, e
                ))
            };

            let removed = writer
                .remove_at(instrument, change.side, change.price)
                .map_err(store_err)?;

            let Some((level, record)) = replacement else {
                if removed.is_empty() {
                    report.absent += 1;
                } else {
                    report.deleted += 1;
                    report.deleted_by_side.add(change.side);
                }
                debug!(instrument = %instrument, side = %change.side, price = %change.price, "Level deleted");
                continue;
            };

            writer.insert(&level, &record).map_err(store_err)?;
            report.written_by_side.add(change.side);

            if removed.is_empty() {
                report.inserted += 1;
            } else {
                report.replaced += 1;
            }
            debug!(
                instrument = %instrument,
                side = %change.side,
                price = %record.price_primary,
                quantity = %record.quantity,
                record = %record.id,
                "Level written"
            );
        }

        Ok(report)
    }
}

fn parse_change(instrument: &str, entry: &Entry<RawChange>) -> Result<ParsedChange> {
    let change = match entry {
        Entry::Valid(change) => change,
        Entry::Malformed(raw) => {
            return Err(IngestError::MalformedLevel {
                instrument: instrument.to_string(),
                side: String::new(),
                raw: raw.clone(),
                reason: "expected [side, price, quantity]".to_string(),
            })
        }
    };

    let side = side::normalize(instrument, &change.side)?;
    let raw = || format!("[{:?}, {:?}, {:?}]", change.side, change.price, change.quantity);
    let price = decimal::parse(&change.price).map_err(|e| IngestError::malformed(instrument, side, &raw(), e))?;
    let quantity =
        decimal::parse(&change.quantity).map_err(|e| IngestError::malformed(instrument, side, &raw(), e))?;

    Ok(ParsedChange { side, price, quantity })
}
