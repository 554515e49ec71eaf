//! Main FX engine implementation.

use std::sync::Arc;

use ratekeeper_common::{Currency, CurrencyDetails, RateTable};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use crate::cache::{CacheStats, ExpiringCache};
use crate::config::FxEngineConfig;
use crate::error::{FxError, FxResult};
use crate::provider::RateSource;
use crate::validation::{self, AmountViolation};

const SUPPORTED_CURRENCIES_KEY: &str = "supportedCurrencies";

fn rates_key(base: &Currency) -> String {
    format!("rates-{}", base.code())
}

fn details_key(currency: &Currency) -> String {
    format!("currencyDetails-{}", currency.code())
}

/// Currency conversion and amount validation on top of a cached
/// [`RateSource`].
///
/// Every rate source result is cached for the configured TTL. Failed fetches
/// are never cached, so the next call goes back to the source.
pub struct FxEngine {
    source: Arc<dyn RateSource>,
    currencies: ExpiringCache<Vec<Currency>>,
    rates: ExpiringCache<RateTable>,
    details: ExpiringCache<CurrencyDetails>,
    config: FxEngineConfig,
}

impl FxEngine {
    /// Create a new FX engine with the given source.
    pub fn new(source: Arc<dyn RateSource>, config: FxEngineConfig) -> Self {
        Self {
            source,
            currencies: ExpiringCache::with_config(config.cache.clone()),
            rates: ExpiringCache::with_config(config.cache.clone()),
            details: ExpiringCache::with_config(config.cache.clone()),
            config,
        }
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &FxEngineConfig {
        &self.config
    }

    /// Get all currencies the rate source can quote.
    #[instrument(skip_all, fields(source = self.source.name()))]
    pub async fn list_supported_currencies(&self) -> FxResult<Vec<Currency>> {
        self.currencies
            .get_or_compute(SUPPORTED_CURRENCIES_KEY, || async {
                self.source
                    .get_supported_currencies()
                    .await
                    .map_err(FxError::provider)
            })
            .await
    }

    /// Check if a currency is in the supported list.
    pub async fn is_supported_currency(&self, currency: &Currency) -> FxResult<bool> {
        let supported = self.list_supported_currencies().await?;
        Ok(supported.contains(currency))
    }

    /// Convert `amount` from one currency to another.
    ///
    /// Uses the rate table quoted against `from`, computing
    /// `amount * rate(to) / rate(from)` in decimal arithmetic.
    #[instrument(skip_all, fields(%amount, %from, %to))]
    pub async fn convert(
        &self,
        amount: Decimal,
        from: &Currency,
        to: &Currency,
    ) -> FxResult<Decimal> {
        let table = self.rate_table(from).await?;

        let rate_to = table
            .get(to)
            .ok_or_else(|| FxError::UnsupportedCurrency(to.clone()))?;
        let rate_from = table
            .get(from)
            .ok_or_else(|| FxError::UnsupportedCurrency(from.clone()))?;

        for (currency, rate) in [(to, rate_to), (from, rate_from)] {
            if rate <= Decimal::ZERO {
                return Err(FxError::provider(format!(
                    "Rate for {currency} against {from} is not positive: {rate}"
                )));
            }
        }

        let result = amount
            .checked_mul(rate_to)
            .and_then(|value| value.checked_div(rate_from))
            .ok_or_else(|| FxError::ConversionOverflow {
                from: from.clone(),
                to: to.clone(),
            })?;

        debug!(%rate_from, %rate_to, %result, "Converted amount");

        Ok(result)
    }

    /// Check that `amount` is a valid amount of `currency`.
    ///
    /// The amount must be finite, non-negative and have no more decimal places
    /// than the currency allows.
    #[instrument(skip_all, fields(amount = amount, %currency))]
    pub async fn assert_valid_amount(&self, amount: f64, currency: &Currency) -> FxResult<()> {
        let details = self.currency_details(currency).await?;

        validation::check_amount(amount, details)
            .map_err(|violation| invalid_amount(amount, currency, details, violation))
    }

    /// [`FxEngine::assert_valid_amount`] for decimal amounts.
    #[instrument(skip_all, fields(%amount, %currency))]
    pub async fn assert_valid_decimal(&self, amount: Decimal, currency: &Currency) -> FxResult<()> {
        let details = self.currency_details(currency).await?;

        validation::check_decimal(amount, details).map_err(|violation| {
            let amount = amount.to_f64().unwrap_or(f64::NAN);
            invalid_amount(amount, currency, details, violation)
        })
    }

    /// Get engine statistics.
    pub fn stats(&self) -> FxEngineStats {
        FxEngineStats {
            currencies: self.currencies.stats(),
            rates: self.rates.stats(),
            details: self.details.stats(),
        }
    }

    /// Drop expired cache entries.
    pub fn cleanup(&self) {
        self.currencies.evict_expired();
        self.rates.evict_expired();
        self.details.evict_expired();
    }

    async fn rate_table(&self, base: &Currency) -> FxResult<RateTable> {
        self.rates
            .get_or_compute(&rates_key(base), || async {
                self.source.get_rates(base).await.map_err(FxError::provider)
            })
            .await
    }

    async fn currency_details(&self, currency: &Currency) -> FxResult<CurrencyDetails> {
        self.details
            .get_or_compute(&details_key(currency), || async {
                self.source
                    .get_currency_details(currency)
                    .await
                    .map_err(FxError::provider)
            })
            .await
    }
}

fn invalid_amount(
    amount: f64,
    currency: &Currency,
    details: CurrencyDetails,
    violation: AmountViolation,
) -> FxError {
    debug!(%violation, "Rejected amount");
    FxError::InvalidAmount {
        amount,
        currency: currency.clone(),
        expected_decimal_places: details.max_decimal_places,
    }
}

/// Engine statistics, per cached key family.
#[derive(Debug, Clone, Default)]
pub struct FxEngineStats {
    pub currencies: CacheStats,
    pub rates: CacheStats,
    pub details: CacheStats,
}

impl FxEngineStats {
    /// Calls answered from cache, all families combined.
    pub fn hits(&self) -> u64 {
        self.currencies.hits + self.rates.hits + self.details.hits
    }

    /// Calls that went to the rate source, all families combined.
    pub fn misses(&self) -> u64 {
        self.currencies.misses + self.rates.misses + self.details.misses
    }
}
