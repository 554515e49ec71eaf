//! Time utilities and constants for Ratekeeper.

use chrono::{DateTime, Duration, Utc};

/// Timing constants.
pub mod constants {
    use super::Duration;

    /// Default cache entry lifetime (60 seconds).
    pub const DEFAULT_CACHE_TTL_MS: i64 = 60_000;

    /// Default cache entry lifetime as a duration.
    pub fn default_cache_ttl() -> Duration {
        Duration::milliseconds(DEFAULT_CACHE_TTL_MS)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Check if a timestamp has been reached. An expiry equal to now counts as
/// expired.
pub fn is_expired(expiry: Timestamp) -> bool {
    now() >= expiry
}

/// Calculate expiry time from now. Lifetimes past the representable range
/// saturate to the latest timestamp.
pub fn expires_in(duration: Duration) -> Timestamp {
    let now = now();
    now.checked_add_signed(duration).unwrap_or(if duration < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}
