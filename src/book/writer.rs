//! Ordered writes against the state store
//!
//! Every level change is written as: remove old index entry, write record,
//! insert index entry. An interrupted sequence can leave a level missing
//! from the index but never an index entry pointing at a missing record.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use super::PriceLevel;
use crate::decimal;
use crate::error::IngestError;
use crate::record::BookRecord;
use crate::side::{index_key, Side};
use crate::store::{StateStore, StoreResult};

/// What happens to a record once its index entry is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Delete the record together with its index entry
    #[default]
    Delete,
    /// Leave the record for an external retention policy
    Retain,
}

impl FromStr for OrphanPolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Ok(OrphanPolicy::Delete),
            "retain" => Ok(OrphanPolicy::Retain),
            other => Err(IngestError::Config(format!(
                "unknown orphan record policy {:?}",
                other
            ))),
        }
    }
}

/// Applies level writes in the required order
pub struct BookWriter<'a, S> {
    store: &'a S,
    orphans: OrphanPolicy,
}

impl<'a, S: StateStore> BookWriter<'a, S> {
    pub fn new(store: &'a S, orphans: OrphanPolicy) -> Self {
        Self { store, orphans }
    }

    /// Remove the index entries for exactly `price` and return their record keys.
    ///
    /// The score only narrows the candidates; each record's decimal price
    /// decides the match, so distinct prices sharing an f64 score survive.
    /// Entries whose record cannot be read are treated as a match.
    pub fn remove_at(&self, instrument: &str, side: Side, price: Decimal) -> StoreResult<Vec<String>> {
        let key = index_key(instrument, side);
        let score = decimal::to_score(price);

        let mut removed = Vec::new();
        for member in self.store.zrange_by_score(&key, score, score)? {
            let fields = self.store.hgetall(&member)?;
            let stored = fields
                .get("price_primary")
                .and_then(|text| decimal::parse(text).ok());
            if stored.is_some_and(|stored| stored != price) {
                continue;
            }
            self.unlink(&key, &member)?;
            removed.push(member);
        }
        Ok(removed)
    }

    /// Remove every index entry for one side of an instrument
    pub fn clear_side(&self, instrument: &str, side: Side) -> StoreResult<usize> {
        let key = index_key(instrument, side);

        let members = self.store.zrange(&key, false)?;
        for (member, _) in &members {
            self.unlink(&key, member)?;
        }
        Ok(members.len())
    }

    /// Write the record, then point the index at it
    pub fn insert(&self, level: &PriceLevel, record: &BookRecord) -> StoreResult<()> {
        let record_key = record.id.key();
        self.store.hset(&record_key, &record.to_fields())?;
        self.store
            .zadd(&index_key(&level.instrument, level.side), &record_key, level.score())?;
        Ok(())
    }

    fn unlink(&self, key: &str, member: &str) -> StoreResult<()> {
        self.store.zrem(key, member)?;
        if self.orphans == OrphanPolicy::Delete {
            self.store.del(member)?;
        }
        debug!(index = %key, record = %member, "Removed index entry");
        Ok(())
    }
}
