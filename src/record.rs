//! Persisted price-level records and their identifiers

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::side::Side;

const RECORD_PREFIX: &str = "level:";

/// Unique identifier of one persisted price-level record
///
/// Uses UUID v7, so ids sort by creation time. Rendered as `level:{uuid}`,
/// which is also the record's key in the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Allocate a fresh id
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Store key for this record
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", RECORD_PREFIX, self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(RECORD_PREFIX).unwrap_or(s);
        Uuid::parse_str(raw).map(Self)
    }
}

/// Stored representation of one price level at a point in time.
///
/// All decimal fields are pre-formatted strings; the record is the
/// authoritative source of the exact price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: RecordId,
    pub instrument: String,
    pub side: Side,
    pub smallest_unit: String,
    pub price_primary: String,
    pub quantity: String,
    pub notional_primary: String,
    pub price_secondary: String,
    pub notional_secondary: String,
}

impl BookRecord {
    pub const FIELD_NAMES: [&'static str; 8] = [
        "instrument",
        "side",
        "smallest_unit",
        "price_primary",
        "quantity",
        "notional_primary",
        "price_secondary",
        "notional_secondary",
    ];

    /// Field map written to the store
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("instrument".to_string(), self.instrument.clone()),
            ("side".to_string(), self.side.as_str().to_string()),
            ("smallest_unit".to_string(), self.smallest_unit.clone()),
            ("price_primary".to_string(), self.price_primary.clone()),
            ("quantity".to_string(), self.quantity.clone()),
            ("notional_primary".to_string(), self.notional_primary.clone()),
            ("price_secondary".to_string(), self.price_secondary.clone()),
            ("notional_secondary".to_string(), self.notional_secondary.clone()),
        ]
    }

    /// Rebuild a record from a stored field map.
    ///
    /// Returns `None` when a field is missing or the side is unrecognized.
    pub fn from_fields(id: RecordId, fields: &HashMap<String, String>) -> Option<Self> {
        let get = |name: &str| fields.get(name).cloned();

        Some(Self {
            id,
            instrument: get("instrument")?,
            side: Side::from_token(fields.get("side")?)?,
            smallest_unit: get("smallest_unit")?,
            price_primary: get("price_primary")?,
            quantity: get("quantity")?,
            notional_primary: get("notional_primary")?,
            price_secondary: get("price_secondary")?,
            notional_secondary: get("notional_secondary")?,
        })
    }
}
