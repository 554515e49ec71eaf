//! Ratekeeper FX Engine
//!
//! Currency conversion and amount validation on top of a pluggable rate
//! source, with every source result memoized for a fixed TTL.
//!
//! # Features
//!
//! - Generic get-or-compute cache with lazy TTL expiry
//! - Optional miss coalescing and LRU capacity bound
//! - Exact decimal conversion math
//! - Per-currency decimal place validation with structured errors
//!
//! # Example
//!
//! ```rust,ignore
//! use ratekeeper_fx::{FxEngine, FxEngineConfig, RateSnapshot, StaticRateSource};
//! use ratekeeper_common::Currency;
//!
//! let source = Arc::new(StaticRateSource::new("static", snapshot));
//! let engine = FxEngine::new(source, FxEngineConfig::default());
//!
//! let eur = engine.convert(dec!(100), &Currency::usd(), &Currency::eur()).await?;
//! engine.assert_valid_amount(19.99, &Currency::usd()).await?;
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod provider;
pub mod validation;

pub use cache::{CacheStats, ExpiringCache};
pub use config::{CacheConfig, FxEngineConfig};
pub use engine::{FxEngine, FxEngineStats};
pub use error::{FxError, FxResult, ProviderError};
pub use provider::{RateSnapshot, RateSource, SourceCallCounts, StaticRateSource, StaticSourceError};
