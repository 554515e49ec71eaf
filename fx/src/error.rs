//! FX engine error types.

use ratekeeper_common::Currency;
use thiserror::Error;

/// Failure raised by a rate source, kept as-is so callers can inspect the
/// root cause.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the FX engine.
#[derive(Debug, Error)]
pub enum FxError {
    /// Currency missing from the fetched rate table.
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(Currency),

    /// Amount is not finite, is negative, or carries too many decimal places.
    #[error("Invalid amount {amount} for {currency}: expected a non-negative value with at most {expected_decimal_places} decimal places")]
    InvalidAmount {
        amount: f64,
        currency: Currency,
        expected_decimal_places: u32,
    },

    /// The rate source failed or returned unusable data.
    #[error("Rate provider error: {source}")]
    ProviderFailure {
        #[source]
        source: ProviderError,
    },

    /// Conversion result does not fit in a decimal.
    #[error("Conversion from {from} to {to} overflowed")]
    ConversionOverflow { from: Currency, to: Currency },
}

impl FxError {
    /// Wrap a rate source failure.
    pub fn provider(source: impl Into<ProviderError>) -> Self {
        FxError::ProviderFailure {
            source: source.into(),
        }
    }

    /// Check if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FxError::ProviderFailure { .. })
    }

    /// Get error code for structured reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::UnsupportedCurrency(_) => "UNSUPPORTED_CURRENCY",
            FxError::InvalidAmount { .. } => "INVALID_AMOUNT",
            FxError::ProviderFailure { .. } => "PROVIDER_FAILURE",
            FxError::ConversionOverflow { .. } => "CONVERSION_OVERFLOW",
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
