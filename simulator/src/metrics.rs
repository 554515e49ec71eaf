//! Load run metrics.

use std::collections::BTreeMap;
use std::time::Duration;

use ratekeeper_fx::FxError;

/// Conversion outcomes from a load run. Each worker keeps its own and the
/// controller merges them when the worker finishes.
#[derive(Debug, Clone, Default)]
pub struct LoadMetrics {
    converted: u64,
    /// Failed conversions keyed by [`FxError::error_code`].
    failures: BTreeMap<&'static str, u64>,
    /// Latency of each successful conversion.
    latencies: Vec<Duration>,
}

/// Latency distribution of successful conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub min: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p99: Duration,
    pub max: Duration,
}

impl LoadMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_conversion(&mut self, latency: Duration) {
        self.converted += 1;
        self.latencies.push(latency);
    }

    pub fn record_failure(&mut self, error: &FxError) {
        *self.failures.entry(error.error_code()).or_default() += 1;
    }

    pub fn merge(&mut self, other: LoadMetrics) {
        self.converted += other.converted;
        for (code, count) in other.failures {
            *self.failures.entry(code).or_default() += count;
        }
        self.latencies.extend(other.latencies);
    }

    pub fn converted(&self) -> u64 {
        self.converted
    }

    pub fn failed(&self) -> u64 {
        self.failures.values().sum()
    }

    pub fn total(&self) -> u64 {
        self.converted + self.failed()
    }

    pub fn failures(&self) -> &BTreeMap<&'static str, u64> {
        &self.failures
    }

    /// Nearest-rank latency summary, `None` until a conversion succeeded.
    pub fn latency(&self) -> Option<LatencySummary> {
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();

        let count = sorted.len();
        let (&min, &max) = (sorted.first()?, sorted.last()?);
        let rank = |percentile: usize| sorted[(count * percentile).div_ceil(100).max(1) - 1];
        let total: Duration = sorted.iter().sum();

        Some(LatencySummary {
            min,
            mean: Duration::from_nanos((total.as_nanos() / count as u128) as u64),
            p50: rank(50),
            p99: rank(99),
            max,
        })
    }
}
