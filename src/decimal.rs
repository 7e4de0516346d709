//! Exact decimal helpers
//!
//! Venue prices and quantities arrive as decimal strings. They are parsed
//! straight into [`Decimal`] and never pass through binary floating point,
//! except for [`to_score`], which is only used to order index entries.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{IngestError, Result};

/// Default number of fractional digits kept when formatting
pub const DEFAULT_FRACTIONAL_DIGITS: u32 = 20;

/// Largest scale a [`Decimal`] can carry
const MAX_SCALE: u32 = 28;

/// Parse a base-10 string with optional sign and optional fractional part.
///
/// Exponents, digit separators, whitespace and multiple points are rejected.
/// Values that cannot be held without rounding are rejected as well.
pub fn parse(text: &str) -> Result<Decimal> {
    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        Some(_) => (false, text),
        None => return Err(IngestError::parse(text, "empty string")),
    };

    let (int_part, frac_part) = match body.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (body, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(IngestError::parse(text, "no digits"));
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IngestError::parse(text, "invalid integer part"));
    }
    if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        // Also catches a second decimal point
        return Err(IngestError::parse(text, "invalid fractional part"));
    }

    let mut canonical = String::with_capacity(text.len() + 2);
    if negative {
        canonical.push('-');
    }
    if int_part.is_empty() {
        canonical.push('0');
    } else {
        canonical.push_str(int_part);
    }
    if !frac_part.is_empty() {
        canonical.push('.');
        canonical.push_str(frac_part);
    }

    Decimal::from_str_exact(&canonical).map_err(|e| IngestError::parse(text, e.to_string()))
}

/// Render a decimal with at most `max_fractional_digits` fractional digits,
/// trimming trailing zeros and a dangling decimal point.
pub fn format(value: Decimal, max_fractional_digits: u32) -> String {
    let rounded = value
        .round_dp_with_strategy(max_fractional_digits.min(MAX_SCALE), RoundingStrategy::MidpointNearestEven)
        .normalize();

    if rounded.is_zero() {
        return "0".to_string();
    }

    let text = rounded.to_string();
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

/// Exact product of two decimals. Overflow is reported, not wrapped.
pub fn multiply(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| IngestError::parse(&format!("{} * {}", a, b), "multiplication overflow"))
}

/// Floating point approximation for ordering only.
pub fn to_score(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_valid() {
        assert_eq!(parse("100.50").unwrap(), dec!(100.50));
        assert_eq!(parse("-0.001").unwrap(), dec!(-0.001));
        assert_eq!(parse("+7").unwrap(), dec!(7));
        assert_eq!(parse(".5").unwrap(), dec!(0.5));
        assert_eq!(parse("5.").unwrap(), dec!(5));
        assert_eq!(parse("0.00000001").unwrap(), dec!(0.00000001));
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["", "-", ".", "abc", "1.2.3", "1e5", "1_000", " 1", "1 ", "0x10", "--1"] {
            let err = parse(bad).unwrap_err();
            assert!(matches!(err, IngestError::Parse { .. }), "{bad:?} should fail");
        }
    }

    #[test]
    fn test_parse_preserves_scale() {
        // Scale is kept until formatting
        assert_eq!(parse("2.000").unwrap().scale(), 3);
    }

    #[test]
    fn test_format_trims() {
        assert_eq!(format(dec!(201.0000), 20), "201");
        assert_eq!(format(dec!(100), 20), "100");
        assert_eq!(format(dec!(100.50), 20), "100.5");
        assert_eq!(format(dec!(0.000), 20), "0");
        assert_eq!(format(dec!(-0.000), 20), "0");
        assert_eq!(format(dec!(-12.340), 20), "-12.34");
    }

    #[test]
    fn test_format_rounds_to_max_digits() {
        assert_eq!(format(dec!(1.23456), 2), "1.23");
        assert_eq!(format(dec!(1.235), 2), "1.24");
        assert_eq!(format(dec!(1.225), 2), "1.22");
        assert_eq!(format(dec!(0.004), 2), "0");
        assert_eq!(format(dec!(9.5), 0), "10");
    }

    #[test]
    fn test_multiply_exact() {
        assert_eq!(multiply(dec!(100.50), dec!(2)).unwrap(), dec!(201.00));
        assert_eq!(multiply(dec!(0.1), dec!(0.2)).unwrap(), dec!(0.02));
        assert!(multiply(Decimal::MAX, dec!(2)).is_err());
    }

    #[test]
    fn test_score_orders_like_decimal() {
        assert!(to_score(dec!(100.5)) < to_score(dec!(100.51)));
        assert_eq!(to_score(dec!(101.00)), 101.0);
    }
}
