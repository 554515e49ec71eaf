//! Rate source trait and an in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use ratekeeper_common::{Currency, CurrencyDetails, RateTable};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::ProviderError;

/// Supplier of exchange rates and currency precision rules.
///
/// Implementations usually wrap a remote API. The engine caches every result,
/// so a source does not need to cache on its own.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Get the rates of every quoted currency against `base`.
    async fn get_rates(&self, base: &Currency) -> Result<RateTable, ProviderError>;

    /// Get all currencies this source can quote.
    async fn get_supported_currencies(&self) -> Result<Vec<Currency>, ProviderError>;

    /// Get the precision rules of a currency.
    async fn get_currency_details(
        &self,
        currency: &Currency,
    ) -> Result<CurrencyDetails, ProviderError>;
}

/// A complete set of rates against one base, plus currency details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSnapshot {
    /// Currency every rate in `rates` is quoted against.
    pub base: Currency,
    /// Rates against `base`. Should include `base` itself at 1.
    pub rates: RateTable,
    /// Precision rules per currency.
    #[serde(default)]
    pub details: HashMap<Currency, CurrencyDetails>,
}

impl RateSnapshot {
    /// Create a snapshot without currency details.
    pub fn new(base: Currency, rates: RateTable) -> Self {
        Self {
            base,
            rates,
            details: HashMap::new(),
        }
    }

    /// Builder-style details insert.
    pub fn with_details(mut self, currency: Currency, max_decimal_places: u32) -> Self {
        self.details
            .insert(currency, CurrencyDetails::new(max_decimal_places));
        self
    }

    /// Parse a snapshot from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Derive the rate table for another base by cross division.
    pub fn rates_for(&self, base: &Currency) -> Result<RateTable, StaticSourceError> {
        if base == &self.base {
            return Ok(self.rates.clone());
        }

        let base_rate = self
            .rates
            .get(base)
            .ok_or_else(|| StaticSourceError::UnknownBase(base.clone()))?;

        if base_rate <= Decimal::ZERO {
            return Err(StaticSourceError::NonPositiveRate(base.clone()));
        }

        self.rates
            .iter()
            .map(|(currency, rate)| {
                let cross = if currency == base {
                    Decimal::ONE
                } else {
                    rate.checked_div(base_rate)
                        .ok_or_else(|| StaticSourceError::NonPositiveRate(base.clone()))?
                };
                Ok((currency.clone(), cross))
            })
            .collect()
    }
}

/// Errors produced by [`StaticRateSource`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StaticSourceError {
    /// No rate is known for the requested base.
    #[error("No rates available for base {0}")]
    UnknownBase(Currency),

    /// The base currency's rate cannot be used as a divisor.
    #[error("Rate for {0} is not positive")]
    NonPositiveRate(Currency),

    /// No precision rules are known for the currency.
    #[error("No currency details for {0}")]
    MissingDetails(Currency),
}

/// Number of calls a [`StaticRateSource`] has served, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCallCounts {
    pub rates: u64,
    pub supported_currencies: u64,
    pub currency_details: u64,
}

impl SourceCallCounts {
    pub fn total(&self) -> u64 {
        self.rates + self.supported_currencies + self.currency_details
    }
}

/// In-memory rate source serving a replaceable [`RateSnapshot`].
pub struct StaticRateSource {
    name: String,
    snapshot: RwLock<RateSnapshot>,
    latency: Option<Duration>,
    rates_calls: AtomicU64,
    currencies_calls: AtomicU64,
    details_calls: AtomicU64,
}

impl StaticRateSource {
    /// Create a new static source.
    pub fn new(name: impl Into<String>, snapshot: RateSnapshot) -> Self {
        Self {
            name: name.into(),
            snapshot: RwLock::new(snapshot),
            latency: None,
            rates_calls: AtomicU64::new(0),
            currencies_calls: AtomicU64::new(0),
            details_calls: AtomicU64::new(0),
        }
    }

    /// Delay every call by `latency`, like a remote source would.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replace the served snapshot.
    pub fn set_snapshot(&self, snapshot: RateSnapshot) {
        *self.snapshot.write() = snapshot;
    }

    /// Get the calls served so far.
    pub fn calls(&self) -> SourceCallCounts {
        SourceCallCounts {
            rates: self.rates_calls.load(Ordering::Relaxed),
            supported_currencies: self.currencies_calls.load(Ordering::Relaxed),
            currency_details: self.details_calls.load(Ordering::Relaxed),
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_rates(&self, base: &Currency) -> Result<RateTable, ProviderError> {
        self.rates_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;

        let table = self.snapshot.read().rates_for(base)?;
        debug!(source = %self.name, base = %base, quotes = table.len(), "Served rate table");
        Ok(table)
    }

    async fn get_supported_currencies(&self) -> Result<Vec<Currency>, ProviderError> {
        self.currencies_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;

        Ok(self.snapshot.read().rates.currencies())
    }

    async fn get_currency_details(
        &self,
        currency: &Currency,
    ) -> Result<CurrencyDetails, ProviderError> {
        self.details_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;

        let details = self.snapshot.read().details.get(currency).copied();
        details.ok_or_else(|| StaticSourceError::MissingDetails(currency.clone()).into())
    }
}
