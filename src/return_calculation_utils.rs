use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Number of fractional digits every stored percentage carries.
pub const METRIC_PRECISION_SCALE: u32 = 8;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecimalError {
    #[error("invalid decimal value {value:?}: {reason}")]
    InvalidValue { value: String, reason: String },
}

impl DecimalError {
    fn invalid(value: impl Into<String>, reason: impl Into<String>) -> Self {
        DecimalError::InvalidValue {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Parse a decimal string. Accepts plain (`123.45`) and scientific (`1.2345e2`) notation.
pub fn parse_decimal(value: &str) -> Result<Decimal, DecimalError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DecimalError::invalid(value, "value is required"));
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|e| DecimalError::invalid(value, e.to_string()))
}

pub fn parse_positive_decimal(value: &str, label: &str) -> Result<Decimal, DecimalError> {
    let parsed = parse_decimal(value)?;
    if parsed <= Decimal::ZERO {
        return Err(DecimalError::invalid(value, format!("{} value must be positive", label)));
    }
    Ok(parsed)
}

/// Percentage change from `initial` to `current`: `(current - initial) / initial * 100`,
/// rounded half away from zero to `METRIC_PRECISION_SCALE` digits.
pub fn return_pct(initial: &str, current: &str) -> Result<Decimal, DecimalError> {
    let initial_value = parse_positive_decimal(initial, "initial")?;
    let current_value = parse_positive_decimal(current, "current")?;

    let pct = current_value
        .checked_sub(initial_value)
        .and_then(|diff| diff.checked_mul(Decimal::ONE_HUNDRED))
        .and_then(|scaled| scaled.checked_div(initial_value))
        .ok_or_else(|| DecimalError::invalid(current, "return overflows decimal range"))?;

    Ok(to_fixed_scale(pct))
}

/// Exact `left - right`, used for `vs_benchmark = absolute_return - benchmark_return`.
pub fn subtract(left: Decimal, right: Decimal) -> Result<Decimal, DecimalError> {
    left.checked_sub(right)
        .map(to_fixed_scale)
        .ok_or_else(|| DecimalError::invalid(left.to_string(), "difference overflows decimal range"))
}

/// Round to the metric scale and pin the scale so `Display` always prints 8 fractional digits.
pub fn to_fixed_scale(value: Decimal) -> Decimal {
    let mut fixed = value.round_dp_with_strategy(METRIC_PRECISION_SCALE, RoundingStrategy::MidpointAwayFromZero);
    fixed.rescale(METRIC_PRECISION_SCALE);
    // -0.00000000 would otherwise survive a tiny negative rounding to zero
    if fixed.is_zero() {
        fixed.set_sign_positive(true);
    }
    fixed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;

    #[test]
    fn computes_benchmark_and_pick_returns() {
        let benchmark_return = return_pct("100", "95").unwrap();
        let absolute_return = return_pct("50", "55").unwrap();
        let vs_benchmark = subtract(absolute_return, benchmark_return).unwrap();

        assert_eq!(benchmark_return.to_string(), "-5.00000000");
        assert_eq!(absolute_return.to_string(), "10.00000000");
        assert_eq!(vs_benchmark.to_string(), "15.00000000");
    }

    #[test]
    fn repeating_fractions_round_to_eight_digits() {
        assert_eq!(return_pct("3", "4").unwrap().to_string(), "33.33333333");
        assert_eq!(return_pct("3", "2").unwrap().to_string(), "-33.33333333");
        assert_eq!(return_pct("7", "8").unwrap().to_string(), "14.28571429");
    }

    #[test]
    fn midpoint_rounds_away_from_zero() {
        // 0.0000000004 * 100 / 8 = 0.000000005 exactly
        assert_eq!(return_pct("8", "8.0000000004").unwrap().to_string(), "0.00000001");
        // -0.0000000049999... rounds to zero, which is printed unsigned
        assert_eq!(return_pct("8.0000000004", "8").unwrap().to_string(), "0.00000000");
    }

    #[test]
    fn unchanged_price_is_zero_without_sign() {
        assert_eq!(return_pct("101.25", "101.25").unwrap().to_string(), "0.00000000");
        assert_eq!(to_fixed_scale(dec!(-0.000000001)).to_string(), "0.00000000");
    }

    #[test]
    fn decimal_inputs_with_trailing_zeros_are_exact() {
        assert_eq!(return_pct("95.00", "100.00").unwrap(), dec!(5.26315789));
        assert_eq!(return_pct("45.00", "50.00").unwrap().to_string(), "11.11111111");
    }

    #[test]
    fn rejects_non_positive_and_malformed_inputs() {
        assert!(return_pct("0", "100").is_err());
        assert!(return_pct("-1", "100").is_err());
        assert!(return_pct("100", "-1").is_err());
        assert!(return_pct("100", "0").is_err());
        assert!(return_pct("abc", "100").is_err());
        assert!(return_pct("100", "").is_err());
        assert!(return_pct("100", "   ").is_err());
        assert!(return_pct("NaN", "100").is_err());
        assert!(return_pct("100", "inf").is_err());
    }

    #[test]
    fn error_names_the_offending_value() {
        let err = return_pct("100", "12,5").unwrap_err();
        let DecimalError::InvalidValue { value, .. } = err;
        assert_eq!(value, "12,5");
    }

    #[test]
    fn subtract_keeps_fixed_scale() {
        let diff = subtract(dec!(1.5), dec!(0.25)).unwrap();
        assert_eq!(diff.to_string(), "1.25000000");
    }
}
