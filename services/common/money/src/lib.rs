use bigdecimal::{BigDecimal, Signed, ToPrimitive};
use thiserror::Error;

/// Scale used by the catalog's NUMERIC(10,2) price and discount columns.
pub const PRICE_SCALE: i64 = 2;

/// Integer digits left by NUMERIC(10,2): amounts must stay below 10^8.
pub const MAX_AMOUNT_DIGITS: u32 = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: String },
    #[error("{field} must be below 100000000 (got {value})")]
    OutOfRange { field: &'static str, value: String },
}

/// Reduce a decimal to two places. `with_scale` truncates, it does not round.
pub fn normalize_scale(value: &BigDecimal) -> BigDecimal {
    value.with_scale(PRICE_SCALE)
}

/// Lossy float view used by downstream events (search/media consumers expect JSON numbers).
pub fn to_wire_f64(value: &BigDecimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Validate and normalize a price-like amount for persistence.
pub fn checked_amount(field: &'static str, value: &BigDecimal) -> Result<BigDecimal, MoneyError> {
    if value.is_negative() {
        return Err(MoneyError::Negative { field, value: value.to_string() });
    }
    let normalized = normalize_scale(value);
    if normalized >= BigDecimal::from(10u64.pow(MAX_AMOUNT_DIGITS)) {
        return Err(MoneyError::OutOfRange { field, value: value.to_string() });
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn normalize_truncates_to_cents() {
        let v = BigDecimal::from_str("12.3456").unwrap();
        assert_eq!(normalize_scale(&v).to_string(), "12.34");
    }

    #[test]
    fn checked_amount_rejects_negative() {
        let v = BigDecimal::from_str("-0.01").unwrap();
        let err = checked_amount("price", &v).unwrap_err();
        assert!(matches!(err, MoneyError::Negative { field: "price", .. }));
    }

    #[test]
    fn wire_float_matches_decimal() {
        let v = BigDecimal::from_str("19.99").unwrap();
        assert!((to_wire_f64(&v) - 19.99).abs() < 1e-9);
    }

    #[test]
    fn checked_amount_bounds_integer_digits() {
        let max = BigDecimal::from_str("99999999.999").unwrap();
        assert_eq!(checked_amount("price", &max).unwrap().to_string(), "99999999.99");
        let over = BigDecimal::from(100_000_000);
        let err = checked_amount("price", &over).unwrap_err();
        assert!(matches!(err, MoneyError::OutOfRange { field: "price", .. }));
    }
}
