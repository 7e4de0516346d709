//! Feed events and venue message decoding
//!
//! Venue JSON is decoded exactly once, here, into the closed [`Event`] sum
//! type. Numeric fields stay as the venue's decimal strings; they are parsed
//! per entry by the reconcilers so one bad entry only skips itself.

mod source;

pub use source::{ChannelFeed, FeedSource, ReplayFeed};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A venue entry that either has the expected shape or is kept as raw text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Entry<T> {
    Valid(T),
    Malformed(String),
}

/// Entry types built from a fixed-length array of strings
pub trait FromStrings: Sized {
    const ARITY: usize;

    fn from_strings(fields: Vec<String>) -> Self;
}

impl<'de, T: FromStrings> Deserialize<'de> for Entry<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        let strings = match &value {
            serde_json::Value::Array(items) if items.len() == T::ARITY => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<String>>>(),
            _ => None,
        };

        Ok(match strings {
            Some(fields) => Entry::Valid(T::from_strings(fields)),
            None => Entry::Malformed(value.to_string()),
        })
    }
}

/// One `[price, quantity]` pair from a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawLevel {
    pub price: String,
    pub quantity: String,
}

impl FromStrings for RawLevel {
    const ARITY: usize = 2;

    fn from_strings(mut fields: Vec<String>) -> Self {
        let quantity = fields.pop().unwrap_or_default();
        let price = fields.pop().unwrap_or_default();
        Self { price, quantity }
    }
}

/// One `[side, price, quantity]` change from an incremental message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawChange {
    pub side: String,
    pub price: String,
    pub quantity: String,
}

impl FromStrings for RawChange {
    const ARITY: usize = 3;

    fn from_strings(mut fields: Vec<String>) -> Self {
        let quantity = fields.pop().unwrap_or_default();
        let price = fields.pop().unwrap_or_default();
        let side = fields.pop().unwrap_or_default();
        Self { side, price, quantity }
    }
}

/// Full book statement for one instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotEvent {
    pub instrument: String,
    pub bids: Vec<Entry<RawLevel>>,
    pub asks: Vec<Entry<RawLevel>>,
}

impl SnapshotEvent {
    pub fn new(instrument: &str, bids: &[(&str, &str)], asks: &[(&str, &str)]) -> Self {
        Self {
            instrument: instrument.to_string(),
            bids: valid_levels(bids),
            asks: valid_levels(asks),
        }
    }
}

fn valid_levels(pairs: &[(&str, &str)]) -> Vec<Entry<RawLevel>> {
    pairs
        .iter()
        .map(|(price, quantity)| {
            Entry::Valid(RawLevel {
                price: price.to_string(),
                quantity: quantity.to_string(),
            })
        })
        .collect()
}

/// Ordered point changes for one instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncrementalEvent {
    pub instrument: String,
    pub changes: Vec<Entry<RawChange>>,
    pub time: Option<DateTime<Utc>>,
}

impl IncrementalEvent {
    pub fn new(instrument: &str, changes: &[(&str, &str, &str)]) -> Self {
        Self {
            instrument: instrument.to_string(),
            changes: changes
                .iter()
                .map(|(side, price, quantity)| {
                    Entry::Valid(RawChange {
                        side: side.to_string(),
                        price: price.to_string(),
                        quantity: quantity.to_string(),
                    })
                })
                .collect(),
            time: None,
        }
    }
}

/// Book event handed to the reconcilers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Event {
    Snapshot(SnapshotEvent),
    Incremental(IncrementalEvent),
}

impl Event {
    pub fn instrument(&self) -> &str {
        match self {
            Event::Snapshot(snapshot) => &snapshot.instrument,
            Event::Incremental(update) => &update.instrument,
        }
    }
}

/// Venue level-2 channel message
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum FeedMessage {
    #[serde(rename = "snapshot")]
    Snapshot {
        product_id: String,
        #[serde(default)]
        bids: Vec<Entry<RawLevel>>,
        #[serde(default)]
        asks: Vec<Entry<RawLevel>>,
    },

    #[serde(rename = "l2update")]
    L2Update {
        product_id: String,
        #[serde(default)]
        changes: Vec<Entry<RawChange>>,
        #[serde(default)]
        time: Option<DateTime<Utc>>,
    },

    #[serde(rename = "subscriptions")]
    Subscriptions {
        #[serde(default)]
        channels: serde_json::Value,
    },

    #[serde(rename = "heartbeat")]
    Heartbeat {
        #[serde(default)]
        product_id: Option<String>,
        #[serde(default)]
        sequence: Option<u64>,
    },

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: String,
        #[serde(default)]
        reason: Option<String>,
    },

    #[serde(other)]
    Unknown,
}

impl FeedMessage {
    /// Decode a raw venue message
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Book event carried by this message, if any
    pub fn into_event(self) -> Option<Event> {
        match self {
            FeedMessage::Snapshot {
                product_id,
                bids,
                asks,
            } => Some(Event::Snapshot(SnapshotEvent {
                instrument: product_id,
                bids,
                asks,
            })),
            FeedMessage::L2Update {
                product_id,
                changes,
                time,
            } => Some(Event::Incremental(IncrementalEvent {
                instrument: product_id,
                changes,
                time,
            })),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_snapshot() {
        let raw = r#"{
            "type": "snapshot",
            "product_id": "BTC-USD",
            "bids": [["100.50", "2"], ["100.00", "1.5"]],
            "asks": [["101.00", "1"]]
        }"#;

        let event = FeedMessage::parse(raw).unwrap().into_event().unwrap();
        match event {
            Event::Snapshot(snapshot) => {
                assert_eq!(snapshot.instrument, "BTC-USD");
                assert_eq!(snapshot.bids.len(), 2);
                assert_eq!(
                    snapshot.bids[0],
                    Entry::Valid(RawLevel {
                        price: "100.50".to_string(),
                        quantity: "2".to_string(),
                    })
                );
                assert_eq!(snapshot.asks.len(), 1);
            }
            other => panic!("Expected snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_l2update() {
        let raw = r#"{
            "type": "l2update",
            "product_id": "BTC-USD",
            "time": "2024-12-03T08:27:22.665495Z",
            "changes": [["buy", "100.50", "0"], ["sell", "101.00", "3.25"]]
        }"#;

        let event = FeedMessage::parse(raw).unwrap().into_event().unwrap();
        match event {
            Event::Incremental(update) => {
                assert_eq!(update.instrument, "BTC-USD");
                assert!(update.time.is_some());
                assert_eq!(
                    update.changes[1],
                    Entry::Valid(RawChange {
                        side: "sell".to_string(),
                        price: "101.00".to_string(),
                        quantity: "3.25".to_string(),
                    })
                );
            }
            other => panic!("Expected incremental, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_entries_are_kept() {
        let raw = r#"{
            "type": "snapshot",
            "product_id": "ETH-USD",
            "bids": [["10", "1"], [10.5, "1"], ["11"]],
            "asks": []
        }"#;

        let FeedMessage::Snapshot { bids, .. } = FeedMessage::parse(raw).unwrap() else {
            panic!("Expected snapshot");
        };
        assert!(matches!(bids[0], Entry::Valid(_)));
        assert_eq!(bids[1], Entry::Malformed(r#"[10.5,"1"]"#.to_string()));
        assert_eq!(bids[2], Entry::Malformed(r#"["11"]"#.to_string()));
    }

    #[test]
    fn test_non_book_messages() {
        let heartbeat = r#"{"type": "heartbeat", "product_id": "BTC-USD", "sequence": 90}"#;
        assert!(FeedMessage::parse(heartbeat).unwrap().into_event().is_none());

        let subscriptions = r#"{"type": "subscriptions", "channels": [{"name": "level2"}]}"#;
        assert!(matches!(
            FeedMessage::parse(subscriptions).unwrap(),
            FeedMessage::Subscriptions { .. }
        ));

        let ticker = r#"{"type": "ticker", "price": "1"}"#;
        assert!(matches!(FeedMessage::parse(ticker).unwrap(), FeedMessage::Unknown));
    }

    #[test]
    fn test_missing_type_is_error() {
        assert!(FeedMessage::parse(r#"{"product_id": "BTC-USD"}"#).is_err());
        assert!(FeedMessage::parse("not json").is_err());
    }
}
