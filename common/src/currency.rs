//! Currency codes, per-currency details and rate tables.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CurrencyCodeError;

/// Longest code accepted by [`Currency::parse`].
pub const MAX_CODE_LEN: usize = 8;

/// ISO 4217 currency code, always upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code without validating it.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    /// Parse a currency code, rejecting anything that is not short and
    /// alphanumeric.
    pub fn parse(code: &str) -> Result<Self, CurrencyCodeError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CurrencyCodeError::Empty);
        }
        if code.chars().count() > MAX_CODE_LEN {
            return Err(CurrencyCodeError::TooLong {
                code: code.to_string(),
                max: MAX_CODE_LEN,
            });
        }
        if let Some(c) = code.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(CurrencyCodeError::InvalidCharacter {
                code: code.to_string(),
                character: c,
            });
        }
        Ok(Self::new(code))
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn gbp() -> Self {
        Self::new("GBP")
    }

    pub fn jpy() -> Self {
        Self::new("JPY")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl FromStr for Currency {
    type Err = CurrencyCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// Precision rules for a single currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyDetails {
    /// Maximum number of digits accepted after the decimal point.
    pub max_decimal_places: u32,
}

impl CurrencyDetails {
    pub fn new(max_decimal_places: u32) -> Self {
        Self { max_decimal_places }
    }
}

/// Rates of every quoted currency against one base currency.
///
/// A rate `r` for currency `C` means one unit of the base buys `r` units of `C`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateTable(HashMap<Currency, Decimal>);

impl RateTable {
    /// Create an empty rate table.
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Set the rate for a currency, replacing any previous one.
    pub fn insert(&mut self, currency: Currency, rate: Decimal) -> Option<Decimal> {
        self.0.insert(currency, rate)
    }

    /// Builder-style insert.
    pub fn with_rate(mut self, currency: Currency, rate: Decimal) -> Self {
        self.insert(currency, rate);
        self
    }

    /// Get the rate for a currency.
    pub fn get(&self, currency: &Currency) -> Option<Decimal> {
        self.0.get(currency).copied()
    }

    pub fn contains(&self, currency: &Currency) -> bool {
        self.0.contains_key(currency)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(currency, rate)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&Currency, &Decimal)> {
        self.0.iter()
    }

    /// Currencies quoted in this table, sorted by code.
    pub fn currencies(&self) -> Vec<Currency> {
        let mut currencies: Vec<Currency> = self.0.keys().cloned().collect();
        currencies.sort();
        currencies
    }
}

impl FromIterator<(Currency, Decimal)> for RateTable {
    fn from_iter<I: IntoIterator<Item = (Currency, Decimal)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_normalizes_case() {
        assert_eq!(Currency::new("usd"), Currency::usd());
        assert_eq!(Currency::parse(" eur ").unwrap(), Currency::eur());
    }

    #[test]
    fn test_currency_parse_rejects_bad_codes() {
        assert!(matches!(Currency::parse(""), Err(CurrencyCodeError::Empty)));
        assert!(matches!(
            Currency::parse("US-D"),
            Err(CurrencyCodeError::InvalidCharacter { character: '-', .. })
        ));
        assert!(matches!(
            Currency::parse("ABCDEFGHI"),
            Err(CurrencyCodeError::TooLong { max: MAX_CODE_LEN, .. })
        ));
    }

    #[test]
    fn test_currency_serde_validates() {
        let parsed: Currency = serde_json::from_str("\"gbp\"").unwrap();
        assert_eq!(parsed, Currency::gbp());
        assert!(serde_json::from_str::<Currency>("\"rates-USD\"").is_err());
        assert_eq!(serde_json::to_string(&Currency::jpy()).unwrap(), "\"JPY\"");
    }

    #[test]
    fn test_rate_table_lookup() {
        let table = RateTable::new()
            .with_rate(Currency::usd(), dec!(1))
            .with_rate(Currency::eur(), dec!(0.9));

        assert_eq!(table.get(&Currency::eur()), Some(dec!(0.9)));
        assert_eq!(table.get(&Currency::gbp()), None);
        assert!(table.contains(&Currency::usd()));
        assert_eq!(table.currencies(), vec![Currency::eur(), Currency::usd()]);
    }

    #[test]
    fn test_rate_table_json_shape() {
        let table: RateTable = serde_json::from_str(r#"{"USD": "1", "EUR": "0.9"}"#).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&Currency::eur()), Some(dec!(0.9)));
    }
}
