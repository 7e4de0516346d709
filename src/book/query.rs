//! Read side of the book
//!
//! Reads go straight to the state store, so they see the latest applied
//! reconciliation with whatever consistency the store itself provides.

use rust_decimal::Decimal;
use tracing::warn;

use super::BookSummary;
use crate::decimal;
use crate::error::{IngestError, Result};
use crate::record::{BookRecord, RecordId};
use crate::side::{index_key, Side};
use crate::store::{StateStore, StoreError};

/// Query surface over the persisted book
pub struct BookQuery<S> {
    store: S,
}

impl<S: StateStore> BookQuery<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Live levels from best to worst
    pub fn levels(&self, instrument: &str, side: Side) -> Result<Vec<BookRecord>> {
        self.collect(instrument, side, usize::MAX)
    }

    /// The best `n` levels
    pub fn depth(&self, instrument: &str, side: Side, n: usize) -> Result<Vec<BookRecord>> {
        self.collect(instrument, side, n)
    }

    /// Best level, if the side is not empty
    pub fn best(&self, instrument: &str, side: Side) -> Result<Option<BookRecord>> {
        Ok(self.collect(instrument, side, 1)?.into_iter().next())
    }

    /// Level at exactly `price`
    pub fn level_at(&self, instrument: &str, side: Side, price: Decimal) -> Result<Option<BookRecord>> {
        let score = decimal::to_score(price);
        let members = self
            .store
            .zrange_by_score(&index_key(instrument, side), score, score)
            .map_err(read_err)?;

        for member in members {
            let Some(record) = self.load(&member)? else {
                continue;
            };
            // The score is approximate; the record holds the exact price
            if decimal::parse(&record.price_primary).ok() == Some(price) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Point lookup by record id
    pub fn record(&self, id: &RecordId) -> Result<Option<BookRecord>> {
        let fields = self.store.hgetall(&id.key()).map_err(read_err)?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(BookRecord::from_fields(*id, &fields))
    }

    /// Top-of-book figures for an instrument
    pub fn summary(&self, instrument: &str) -> Result<BookSummary> {
        let bids = self.levels(instrument, Side::Bid)?;
        let asks = self.levels(instrument, Side::Offer)?;
        Ok(BookSummary::from_levels(instrument, &bids, &asks))
    }

    fn collect(&self, instrument: &str, side: Side, limit: usize) -> Result<Vec<BookRecord>> {
        let key = index_key(instrument, side);
        let members = self
            .store
            .zrange(&key, side.best_is_highest())
            .map_err(read_err)?;

        let mut records = Vec::with_capacity(members.len().min(limit));
        for (member, _) in members {
            if records.len() >= limit {
                break;
            }
            match self.load(&member)? {
                Some(record) => records.push(record),
                None => warn!(index = %key, record = %member, "Index entry without a readable record"),
            }
        }
        Ok(records)
    }

    fn load(&self, member: &str) -> Result<Option<BookRecord>> {
        match member.parse::<RecordId>() {
            Ok(id) => self.record(&id),
            Err(_) => Ok(None),
        }
    }
}

fn read_err(err: StoreError) -> IngestError {
    IngestError::StoreRead(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{IncrementalReconciler, LevelPricing, OrphanPolicy, SnapshotReconciler};
    use crate::conversion::CurrencyConverter;
    use crate::feed::{IncrementalEvent, SnapshotEvent};
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn seeded() -> (Arc<MemoryStore>, BookQuery<Arc<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        let pricing = LevelPricing::new(CurrencyConverter::new(dec!(58.0)).unwrap(), "0.0000001", 20);
        SnapshotReconciler::new(store.clone(), pricing, OrphanPolicy::Delete)
            .apply(&SnapshotEvent::new(
                "BTC-USD",
                &[("99.5", "1"), ("100.50", "2"), ("100", "3")],
                &[("102", "1"), ("101.00", "1"), ("103", "2")],
            ))
            .unwrap();
        (store.clone(), BookQuery::new(store))
    }

    fn prices(records: &[BookRecord]) -> Vec<&str> {
        records.iter().map(|r| r.price_primary.as_str()).collect()
    }

    #[test]
    fn test_bids_descending() {
        let (_, query) = seeded();
        let bids = query.levels("BTC-USD", Side::Bid).unwrap();
        assert_eq!(prices(&bids), vec!["100.5", "100", "99.5"]);
    }

    #[test]
    fn test_offers_ascending() {
        let (_, query) = seeded();
        let asks = query.levels("BTC-USD", Side::Offer).unwrap();
        assert_eq!(prices(&asks), vec!["101", "102", "103"]);
        assert_eq!(prices(&query.depth("BTC-USD", Side::Offer, 2).unwrap()), vec!["101", "102"]);
    }

    #[test]
    fn test_best_and_lookup() {
        let (_, query) = seeded();
        let best = query.best("BTC-USD", Side::Bid).unwrap().unwrap();
        assert_eq!(best.quantity, "2");

        let fetched = query.record(&best.id).unwrap().unwrap();
        assert_eq!(fetched, best);

        assert!(query.record(&RecordId::new()).unwrap().is_none());
        assert!(query.best("ETH-USD", Side::Bid).unwrap().is_none());
    }

    #[test]
    fn test_level_at() {
        let (store, query) = seeded();
        let level = query.level_at("BTC-USD", Side::Offer, dec!(101)).unwrap().unwrap();
        assert_eq!(level.quantity, "1");
        assert!(query.level_at("BTC-USD", Side::Offer, dec!(101.5)).unwrap().is_none());

        let pricing = LevelPricing::new(CurrencyConverter::new(dec!(58.0)).unwrap(), "0.0000001", 20);
        IncrementalReconciler::new(store, pricing, OrphanPolicy::Delete)
            .apply(&IncrementalEvent::new("BTC-USD", &[("sell", "101", "0")]))
            .unwrap();
        assert!(query.level_at("BTC-USD", Side::Offer, dec!(101)).unwrap().is_none());
    }

    #[test]
    fn test_summary() {
        let (_, query) = seeded();
        let summary = query.summary("BTC-USD").unwrap();
        assert_eq!(summary.best_bid, Some(dec!(100.5)));
        assert_eq!(summary.best_offer, Some(dec!(101)));
        assert_eq!(summary.bid_levels, 3);
        assert_eq!(summary.bid_depth, dec!(6));
    }
}
