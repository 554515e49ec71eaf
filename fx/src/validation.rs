//! Amount precision rules.

use ratekeeper_common::CurrencyDetails;
use rust_decimal::Decimal;
use std::fmt;

/// Why an amount was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountViolation {
    NotFinite,
    Negative,
    TooManyDecimalPlaces { found: u32, max: u32 },
}

impl fmt::Display for AmountViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountViolation::NotFinite => write!(f, "amount is not finite"),
            AmountViolation::Negative => write!(f, "amount is negative"),
            AmountViolation::TooManyDecimalPlaces { found, max } => {
                write!(f, "amount has {found} decimal places, at most {max} allowed")
            }
        }
    }
}

/// Number of significant digits after the decimal point of `amount`.
///
/// Counted on the shortest decimal representation that reads back as the same
/// `f64`, so `10.123` has 3 places and `2.50` has 1.
pub fn fractional_digits(amount: f64) -> u32 {
    // f64's Display is shortest round-trip and never uses an exponent.
    let repr = amount.abs().to_string();
    match repr.split_once('.') {
        Some((_, fraction)) => fraction.trim_end_matches('0').len() as u32,
        None => 0,
    }
}

/// Number of significant digits after the decimal point of `amount`.
pub fn decimal_fractional_digits(amount: Decimal) -> u32 {
    amount.normalize().scale()
}

/// Check an amount against a currency's rules: finite, then non-negative,
/// then within the decimal place limit.
pub fn check_amount(amount: f64, details: CurrencyDetails) -> Result<(), AmountViolation> {
    if !amount.is_finite() {
        return Err(AmountViolation::NotFinite);
    }

    if amount < 0.0 {
        return Err(AmountViolation::Negative);
    }

    check_places(fractional_digits(amount), details)
}

/// [`check_amount`] for decimals, which are always finite.
pub fn check_decimal(amount: Decimal, details: CurrencyDetails) -> Result<(), AmountViolation> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AmountViolation::Negative);
    }

    check_places(decimal_fractional_digits(amount), details)
}

fn check_places(found: u32, details: CurrencyDetails) -> Result<(), AmountViolation> {
    if found > details.max_decimal_places {
        return Err(AmountViolation::TooManyDecimalPlaces {
            found,
            max: details.max_decimal_places,
        });
    }
    Ok(())
}
