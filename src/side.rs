//! Side normalization
//!
//! Venue feeds name book sides differently depending on the message:
//! snapshots use `bids`/`asks`, incremental changes use `buy`/`sell`, and
//! other sessions use `BID`/`ASK`. Everything is folded into [`Side`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IngestError;

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Offer,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Bid, Side::Offer];

    /// Map a venue token onto a side.
    ///
    /// Matching is case-insensitive. Unknown tokens are an error, never a
    /// default side.
    pub fn from_token(token: &str) -> Option<Side> {
        match token.trim().to_ascii_lowercase().as_str() {
            "bid" | "bids" | "buy" => Some(Side::Bid),
            "ask" | "asks" | "sell" | "offer" | "offers" => Some(Side::Offer),
            _ => None,
        }
    }

    /// Canonical name used in store keys and records
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "buy",
            Side::Offer => "sell",
        }
    }

    /// Bids are best at the highest price, offers at the lowest
    pub fn best_is_highest(&self) -> bool {
        matches!(self, Side::Bid)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Side::from_token(s).ok_or_else(|| IngestError::UnknownSide {
            instrument: String::new(),
            token: s.to_string(),
        })
    }
}

/// Normalize a side token in the context of an instrument.
pub fn normalize(instrument: &str, token: &str) -> Result<Side, IngestError> {
    Side::from_token(token).ok_or_else(|| IngestError::UnknownSide {
        instrument: instrument.to_string(),
        token: token.to_string(),
    })
}

/// Ordered-index key for one side of an instrument, e.g. `BTC-USD_buy`
pub fn index_key(instrument: &str, side: Side) -> String {
    format!("{}_{}", instrument, side.as_str())
}
