//! Top-of-book summary figures

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal;
use crate::record::BookRecord;

/// Levels counted for the imbalance figure
const IMBALANCE_LEVELS: usize = 5;

/// Computed figures for one instrument's book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookSummary {
    pub instrument: String,

    pub best_bid: Option<Decimal>,
    pub best_offer: Option<Decimal>,

    /// Mid price (average of best bid and offer)
    pub mid_price: Option<Decimal>,

    /// Spread in basis points
    pub spread_bps: Option<Decimal>,

    /// Simple imbalance over the top levels: (bid_vol - ask_vol) / (bid_vol + ask_vol)
    pub imbalance: Option<Decimal>,

    /// Total bid quantity
    pub bid_depth: Decimal,

    /// Total offer quantity
    pub ask_depth: Decimal,

    pub bid_levels: usize,
    pub ask_levels: usize,
}

impl BookSummary {
    /// Build from levels ordered best to worst
    pub fn from_levels(instrument: &str, bids: &[BookRecord], asks: &[BookRecord]) -> Self {
        let price = |record: &BookRecord| decimal::parse(&record.price_primary).ok();
        let quantities = |records: &[BookRecord]| -> Vec<Decimal> {
            records
                .iter()
                .filter_map(|record| decimal::parse(&record.quantity).ok())
                .collect()
        };

        let best_bid = bids.first().and_then(price);
        let best_offer = asks.first().and_then(price);
        let bid_quantities = quantities(bids);
        let ask_quantities = quantities(asks);

        let mid_price = match (best_bid, best_offer) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        };

        let spread_bps = match (best_bid, best_offer, mid_price) {
            (Some(bid), Some(ask), Some(mid)) if mid > Decimal::ZERO => {
                Some((ask - bid) / mid * Decimal::from(10000))
            }
            _ => None,
        };

        let bid_top: Decimal = bid_quantities.iter().take(IMBALANCE_LEVELS).sum();
        let ask_top: Decimal = ask_quantities.iter().take(IMBALANCE_LEVELS).sum();
        let total = bid_top + ask_top;
        let imbalance = if total > Decimal::ZERO {
            Some((bid_top - ask_top) / total)
        } else {
            None
        };

        Self {
            instrument: instrument.to_string(),
            best_bid,
            best_offer,
            mid_price,
            spread_bps,
            imbalance,
            bid_depth: bid_quantities.iter().sum(),
            ask_depth: ask_quantities.iter().sum(),
            bid_levels: bids.len(),
            ask_levels: asks.len(),
        }
    }

    /// Both sides populated and not crossed
    pub fn is_healthy(&self) -> bool {
        match (self.best_bid, self.best_offer) {
            (Some(bid), Some(ask)) => bid < ask,
            _ => false,
        }
    }
}
