//! Secondary-currency conversion at a static rate

use rust_decimal::Decimal;

use crate::decimal;
use crate::error::{IngestError, Result};

/// Converts primary-currency values at a fixed rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrencyConverter {
    rate: Decimal,
}

impl CurrencyConverter {
    /// Create a converter. The rate must be strictly positive.
    pub fn new(rate: Decimal) -> Result<Self> {
        if rate <= Decimal::ZERO {
            return Err(IngestError::Config(format!(
                "conversion rate must be positive, got {}",
                rate
            )));
        }
        Ok(Self { rate })
    }

    /// `primary × rate`, exactly
    pub fn convert(&self, primary: Decimal) -> Result<Decimal> {
        decimal::multiply(primary, self.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_convert() {
        let converter = CurrencyConverter::new(dec!(58.0)).unwrap();
        assert_eq!(converter.convert(dec!(201.00)).unwrap(), dec!(11658));
        assert_eq!(converter.convert(dec!(100.50)).unwrap(), dec!(5829));
    }

    #[test]
    fn test_fractional_rate_is_exact() {
        let converter = CurrencyConverter::new(dec!(58.001)).unwrap();
        assert_eq!(converter.convert(dec!(0.1)).unwrap(), dec!(5.8001));
    }

    #[test]
    fn test_rejects_non_positive_rate() {
        assert!(matches!(
            CurrencyConverter::new(Decimal::ZERO),
            Err(IngestError::Config(_))
        ));
        assert!(CurrencyConverter::new(dec!(-1)).is_err());
    }
}
