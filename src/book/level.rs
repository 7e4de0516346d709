//! Price level valuation
//!
//! Turns a parsed (price, quantity) pair into the six decimal fields that
//! are persisted with every record.

use rust_decimal::Decimal;

use crate::conversion::CurrencyConverter;
use crate::decimal;
use crate::error::Result;
use crate::record::{BookRecord, RecordId};
use crate::side::Side;

/// A valued price level, exact decimals throughout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevel {
    pub instrument: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub notional_primary: Decimal,
    pub price_secondary: Decimal,
    pub notional_secondary: Decimal,
}

impl PriceLevel {
    /// Ordering score for the index
    pub fn score(&self) -> f64 {
        decimal::to_score(self.price)
    }
}

/// Derives level fields and formats them into records
#[derive(Debug, Clone)]
pub struct LevelPricing {
    converter: CurrencyConverter,
    smallest_unit: String,
    max_fractional_digits: u32,
}

impl LevelPricing {
    pub fn new(converter: CurrencyConverter, smallest_unit: impl Into<String>, max_fractional_digits: u32) -> Self {
        Self {
            converter,
            smallest_unit: smallest_unit.into(),
            max_fractional_digits,
        }
    }

    /// Compute notional and secondary-currency values for a level
    pub fn price_level(&self, instrument: &str, side: Side, price: Decimal, quantity: Decimal) -> Result<PriceLevel> {
        let notional_primary = decimal::multiply(price, quantity)?;
        let price_secondary = self.converter.convert(price)?;
        let notional_secondary = self.converter.convert(notional_primary)?;

        Ok(PriceLevel {
            instrument: instrument.to_string(),
            side,
            price,
            quantity,
            notional_primary,
            price_secondary,
            notional_secondary,
        })
    }

    /// Format a level into the record persisted under `id`
    pub fn record(&self, level: &PriceLevel, id: RecordId) -> BookRecord {
        let fmt = |value: Decimal| decimal::format(value, self.max_fractional_digits);

        BookRecord {
            id,
            instrument: level.instrument.clone(),
            side: level.side,
            smallest_unit: self.smallest_unit.clone(),
            price_primary: fmt(level.price),
            quantity: fmt(level.quantity),
            notional_primary: fmt(level.notional_primary),
            price_secondary: fmt(level.price_secondary),
            notional_secondary: fmt(level.notional_secondary),
        }
    }
}
