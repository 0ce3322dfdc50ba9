//! Validation primitives shared by the field mapper and the deployment gate
//!
//! Every fee, limit, percentage and amount entered through a form is checked
//! with [`BoundedDecimal`], and every address-shaped field with
//! [`check_address`]. Both paths use these same functions so a value accepted
//! into storage is judged identically when re-checked before deployment.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Most fractional digits a form decimal may carry
pub const FRACTION_DIGITS: u32 = 9;

/// Length of an address including the `0x` prefix
pub const ADDRESS_LEN: usize = 42;

/// Upper bound for percentage collections such as asset allocations
pub const PERCENT_TOTAL: Decimal = Decimal::ONE_HUNDRED;

/// Reasons a decimal string is rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecimalError {
    Empty,
    Malformed(String),
    TooPrecise(String),
    Overflow(String),
}

impl fmt::Display for DecimalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecimalError::Empty => write!(f, "value is empty"),
            DecimalError::Malformed(raw) => {
                write!(f, "{raw:?} is not a non-negative decimal number")
            }
            DecimalError::TooPrecise(raw) => write!(
                f,
                "{raw:?} has more than {FRACTION_DIGITS} fractional digits"
            ),
            DecimalError::Overflow(raw) => write!(f, "{raw:?} is too large"),
        }
    }
}

impl std::error::Error for DecimalError {}

/// Parse `digits[.digits]`; no sign, no exponent, no separators.
///
/// The result is normalized, so `"2.50"` and `"2.5"` compare and print the
/// same.
pub fn parse_decimal(raw: &str) -> Result<Decimal, DecimalError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(DecimalError::Empty);
    }
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    let well_formed = match s.split_once('.') {
        Some((whole, fraction)) => digits(whole) && digits(fraction),
        None => digits(s),
    };
    if !well_formed {
        return Err(DecimalError::Malformed(raw.to_string()));
    }

    let value = Decimal::from_str(s)
        .map_err(|_| DecimalError::Overflow(raw.to_string()))?
        .normalize();
    if value.scale() > FRACTION_DIGITS {
        return Err(DecimalError::TooPrecise(raw.to_string()));
    }
    Ok(value)
}

/// Read a stored JSON number back as a decimal.
///
/// Uses the shortest decimal that round-trips, so a percentage stored from
/// `"33.33"` reads back as exactly `33.33`. Negative and non-finite values
/// give `None`.
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value)
        .filter(|d| !d.is_sign_negative() || d.is_zero())
        .map(|d| d.normalize())
}

/// The JSON number a decimal is stored as
pub fn decimal_to_f64(value: Decimal) -> Option<f64> {
    value.to_f64()
}

/// Inclusive bounds for a numeric-string field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedDecimal {
    pub min: u64,
    /// `None` means no upper bound
    pub max: Option<u64>,
}

/// The reusable `[min, max]` rule for fees, limits and percentages
pub const fn bounded_decimal(min: u64, max: u64) -> BoundedDecimal {
    BoundedDecimal {
        min,
        max: Some(max),
    }
}

/// Any non-negative amount, used for supplies and deposit limits
pub const fn non_negative_decimal() -> BoundedDecimal {
    BoundedDecimal { min: 0, max: None }
}

impl BoundedDecimal {
    /// Check a raw form string.
    ///
    /// Returns `Ok(None)` for an empty string (unset); the caller decides
    /// whether unset is acceptable for the field.
    pub fn check(&self, raw: &str) -> Result<Option<Decimal>, String> {
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let value = parse_decimal(raw).map_err(|e| e.to_string())?;
        self.check_value(value).map(Some)
    }

    /// Same rule applied to an already-coerced storage value
    pub fn check_stored(&self, value: f64) -> Result<Decimal, String> {
        let decimal = decimal_from_f64(value)
            .ok_or_else(|| format!("{value} is not a non-negative decimal number"))?;
        if decimal.scale() > FRACTION_DIGITS {
            return Err(format!(
                "{decimal} has more than {FRACTION_DIGITS} fractional digits"
            ));
        }
        self.check_value(decimal)
    }

    fn check_value(&self, value: Decimal) -> Result<Decimal, String> {
        if value < Decimal::from(self.min) {
            return Err(format!("must be at least {}", self.min));
        }
        if let Some(max) = self.max {
            if value > Decimal::from(max) {
                return Err(format!("must be at most {max}"));
            }
        }
        Ok(value)
    }
}

/// Whether `raw` is `0x` followed by exactly 40 hexadecimal digits
pub fn is_address(raw: &str) -> bool {
    raw.len() == ADDRESS_LEN
        && raw.starts_with("0x")
        && hex::decode(&raw[2..]).is_ok()
}

/// Check an address-shaped form string; empty means unset
pub fn check_address(raw: &str) -> Result<Option<String>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if is_address(trimmed) {
        Ok(Some(trimmed.to_string()))
    } else {
        Err(format!(
            "{trimmed:?} is not a 0x-prefixed {}-digit hexadecimal address",
            ADDRESS_LEN - 2
        ))
    }
}

/// Sum a percentage collection exactly
pub fn allocation_total<I>(percentages: I) -> Result<Decimal, String>
where
    I: IntoIterator<Item = Decimal>,
{
    percentages
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p))
        .ok_or_else(|| "allocation total overflows".to_string())
}

/// The single allocation rule: a percentage collection may not exceed 100.
/// An empty collection sums to zero and passes.
pub fn check_allocation_total<I>(percentages: I) -> Result<Decimal, String>
where
    I: IntoIterator<Item = Decimal>,
{
    let total = allocation_total(percentages)?;
    if total > PERCENT_TOTAL {
        Err(format!("allocations sum to {}%, which exceeds 100%", total.normalize()))
    } else {
        Ok(total)
    }
}

/// Check that a text field is present
pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(raw: &str) -> Decimal {
        parse_decimal(raw).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(dec("0").to_string(), "0");
        assert_eq!(dec("2.50").to_string(), "2.5");
        assert_eq!(dec("100").to_string(), "100");
        assert_eq!(dec("0.000000001").to_string(), "0.000000001");
        assert_eq!(dec(" 12.75 ").to_string(), "12.75");
        assert_eq!(dec("2.50"), dec("2.5"));
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        for raw in ["-1", "1e3", "abc", "1.", ".5", "1.2.3", "+4", "1,000", "1_000"] {
            assert!(parse_decimal(raw).is_err(), "{raw} should be rejected");
        }
        assert_eq!(parse_decimal(""), Err(DecimalError::Empty));
        assert!(matches!(
            parse_decimal("0.0000000001"),
            Err(DecimalError::TooPrecise(_))
        ));
        assert!(matches!(
            parse_decimal("99999999999999999999999999999999"),
            Err(DecimalError::Overflow(_))
        ));
    }

    #[test]
    fn test_bounded_decimal_is_inclusive() {
        let rule = bounded_decimal(0, 100);
        assert_eq!(rule.check("0").unwrap(), Some(Decimal::ZERO));
        assert_eq!(rule.check("100").unwrap(), Some(Decimal::ONE_HUNDRED));
        assert!(rule.check("100.01").is_err());
        assert!(rule.check("abc").is_err());
        assert_eq!(rule.check("").unwrap(), None);
        assert_eq!(rule.check("   ").unwrap(), None);
    }

    #[test]
    fn test_lower_bound_is_enforced() {
        let rule = bounded_decimal(1, 10);
        assert!(rule.check("0.5").unwrap_err().contains("at least 1"));
    }

    #[test]
    fn test_stored_values_are_rechecked_exactly() {
        let rule = bounded_decimal(0, 100);
        assert_eq!(rule.check_stored(33.33).unwrap(), dec("33.33"));
        assert!(rule.check_stored(100.5).is_err());
        assert!(rule.check_stored(-1.0).is_err());
        assert!(rule.check_stored(f64::NAN).is_err());
    }

    #[test]
    fn test_stored_numbers_convert_both_ways() {
        assert_eq!(decimal_to_f64(dec("2.5")), Some(2.5));
        assert_eq!(decimal_from_f64(2.5), Some(dec("2.5")));
        assert_eq!(decimal_from_f64(0.1), Some(dec("0.1")));
        assert_eq!(decimal_from_f64(f64::INFINITY), None);
    }

    #[test]
    fn test_addresses() {
        assert!(is_address("0x1111111111111111111111111111111111111111"));
        assert!(is_address("0xAbCdEf0123456789abcdef0123456789ABCDEF01"));
        assert!(!is_address("1111111111111111111111111111111111111111"));
        assert!(!is_address("0x111111111111111111111111111111111111111"));
        assert!(!is_address("0xZZ11111111111111111111111111111111111111"));
        assert_eq!(check_address("").unwrap(), None);
        assert!(check_address("0x12").is_err());
    }

    #[test]
    fn test_allocation_sums() {
        let exact = [dec("33.33"), dec("33.33"), dec("33.34")];
        assert_eq!(check_allocation_total(exact).unwrap(), PERCENT_TOTAL);

        let over = [dec("50"), dec("50.01")];
        assert!(check_allocation_total(over)
            .unwrap_err()
            .contains("100.01%"));

        assert_eq!(
            check_allocation_total(Vec::<Decimal>::new()).unwrap(),
            Decimal::ZERO
        );
    }
}
