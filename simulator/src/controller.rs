//! Load run controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use ratekeeper_common::Currency;
use ratekeeper_fx::FxEngine;

use crate::metrics::LoadMetrics;

/// Settings for a load run.
#[derive(Debug, Clone)]
pub struct LoadSettings {
    /// Concurrent workers.
    pub workers: usize,
    /// Conversions issued by each worker.
    pub requests_per_worker: usize,
    /// Random seed for reproducibility.
    pub seed: Option<u64>,
}

/// Result of a finished load run.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub metrics: LoadMetrics,
    pub elapsed: Duration,
}

impl LoadReport {
    /// Conversions attempted per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.metrics.total() as f64 / secs
    }
}

/// Drives concurrent conversions against a shared engine.
pub struct LoadController {
    engine: Arc<FxEngine>,
    metrics: Arc<RwLock<LoadMetrics>>,
}

impl LoadController {
    /// Create a new load controller.
    pub fn new(engine: Arc<FxEngine>) -> Self {
        Self {
            engine,
            metrics: Arc::new(RwLock::new(LoadMetrics::new())),
        }
    }

    /// Run the load and wait for every worker to finish.
    pub async fn run(&self, settings: &LoadSettings) -> anyhow::Result<LoadReport> {
        let currencies = self.engine.list_supported_currencies().await?;
        if currencies.len() < 2 {
            anyhow::bail!("Need at least two supported currencies, got {}", currencies.len());
        }
        let currencies = Arc::new(currencies);

        info!(
            workers = settings.workers,
            requests_per_worker = settings.requests_per_worker,
            currencies = currencies.len(),
            "Starting load run"
        );

        let base_seed = settings.seed.unwrap_or_else(rand::random);
        let start = Instant::now();

        let handles: Vec<_> = (0..settings.workers)
            .map(|worker| {
                let engine = self.engine.clone();
                let metrics = self.metrics.clone();
                let currencies = currencies.clone();
                let requests = settings.requests_per_worker;
                let rng = StdRng::seed_from_u64(base_seed.wrapping_add(worker as u64));

                tokio::spawn(async move {
                    let local = run_worker(worker, &engine, &currencies, requests, rng).await;
                    metrics.write().await.merge(local);
                })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            result?;
        }

        let elapsed = start.elapsed();
        let metrics = self.metrics.read().await.clone();

        info!(
            total = metrics.total(),
            failed = metrics.failed(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Load run complete"
        );

        Ok(LoadReport { metrics, elapsed })
    }
}

async fn run_worker(
    worker: usize,
    engine: &FxEngine,
    currencies: &[Currency],
    requests: usize,
    mut rng: StdRng,
) -> LoadMetrics {
    let mut metrics = LoadMetrics::new();

    for _ in 0..requests {
        let from = &currencies[rng.gen_range(0..currencies.len())];
        let to = &currencies[rng.gen_range(0..currencies.len())];
        let amount = Decimal::new(rng.gen_range(1..10_000_000), 2);

        let started = Instant::now();
        match engine.convert(amount, from, to).await {
            Ok(converted) => {
                debug!(worker, %amount, %from, %to, %converted, "Conversion succeeded");
                metrics.record_conversion(started.elapsed());
            }
            Err(e) => {
                warn!(
                    worker,
                    error = %e,
                    code = e.error_code(),
                    retryable = e.is_retryable(),
                    "Conversion failed"
                );
                metrics.record_failure(&e);
            }
        }
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::default_snapshot;
    use ratekeeper_fx::{CacheConfig, FxEngineConfig, StaticRateSource};

    #[tokio::test]
    async fn test_load_run() {
        let source = Arc::new(
            StaticRateSource::new("static", default_snapshot())
                .with_latency(Duration::from_millis(5)),
        );
        let config = FxEngineConfig {
            cache: CacheConfig {
                coalesce_misses: true,
                ..Default::default()
            },
        };
        let engine = Arc::new(FxEngine::new(source.clone(), config));
        let controller = LoadController::new(engine);

        let report = controller
            .run(&LoadSettings {
                workers: 4,
                requests_per_worker: 25,
                seed: Some(7),
            })
            .await
            .unwrap();

        assert_eq!(report.metrics.total(), 100);
        assert_eq!(report.metrics.failed(), 0);
        assert!(report.metrics.latency().is_some());
        assert!(report.throughput() > 0.0);
        // At most one fetch per base currency
        assert!(source.calls().rates <= 6);
        assert_eq!(source.calls().supported_currencies, 1);
    }
}
