//! Ratekeeper Simulator
//!
//! Drives the FX engine against a static rate source, either one command at a
//! time or as a concurrent load run.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratekeeper_common::Currency;
use ratekeeper_fx::{CacheConfig, FxEngine, FxEngineConfig, FxError, StaticRateSource};

mod controller;
mod metrics;
mod rates;

use controller::{LoadController, LoadSettings};

/// Ratekeeper Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Ratekeeper FX engine driver and load generator")]
struct Args {
    /// JSON rate snapshot to serve (defaults to a built-in USD snapshot)
    #[arg(long, global = true)]
    rates: Option<PathBuf>,

    /// Cache entry lifetime in milliseconds (overrides FX_CACHE_TTL_MS)
    #[arg(long, global = true)]
    ttl_ms: Option<i64>,

    /// Maximum cached entries per key family (overrides FX_CACHE_MAX_ENTRIES)
    #[arg(long, global = true)]
    max_entries: Option<usize>,

    /// Serve concurrent cache misses from a single fetch
    #[arg(long, global = true)]
    coalesce: bool,

    /// Simulated rate source latency in milliseconds
    #[arg(long, global = true, default_value = "0")]
    latency_ms: u64,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List supported currencies
    Currencies,

    /// Convert an amount between two currencies
    Convert {
        #[arg(allow_negative_numbers = true)]
        amount: Decimal,
        from: Currency,
        to: Currency,
    },

    /// Check an amount against a currency's precision rules
    Validate {
        #[arg(allow_negative_numbers = true)]
        amount: f64,
        currency: Currency,
    },

    /// Run concurrent random conversions and report metrics
    Load {
        /// Number of concurrent workers
        #[arg(short, long, default_value = "8")]
        workers: usize,

        /// Conversions per worker
        #[arg(short, long, default_value = "1000")]
        requests: usize,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn engine_config(args: &Args) -> anyhow::Result<FxEngineConfig> {
    let mut config = FxEngineConfig::from_env();

    if let Some(ttl_ms) = args.ttl_ms {
        config.cache.ttl = CacheConfig::with_ttl_ms(ttl_ms).ttl;
    }
    if args.max_entries.is_some() {
        config.cache.max_entries = args.max_entries;
    }
    if args.coalesce {
        config.cache.coalesce_misses = true;
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.json);

    let config = engine_config(&args)?;
    let snapshot = match &args.rates {
        Some(path) => rates::load_snapshot(path)?,
        None => rates::default_snapshot(),
    };

    let base = snapshot.base.clone();
    let quoted = snapshot.rates.len();

    let mut source = StaticRateSource::new("static", snapshot);
    if args.latency_ms > 0 {
        source = source.with_latency(std::time::Duration::from_millis(args.latency_ms));
    }
    let source = Arc::new(source);
    let engine = Arc::new(FxEngine::new(source.clone(), config));

    let cache = &engine.config().cache;
    info!(
        %base,
        currencies = quoted,
        ttl_ms = cache.ttl.num_milliseconds(),
        max_entries = ?cache.max_entries,
        coalesce = cache.coalesce_misses,
        "Starting Ratekeeper Simulator"
    );

    match args.command {
        Command::Currencies => {
            let currencies = engine.list_supported_currencies().await?;
            for currency in currencies {
                println!("{currency}");
            }
        }
        Command::Convert { amount, from, to } => {
            let converted = engine.convert(amount, &from, &to).await?;
            println!("{amount} {from} = {converted} {to}");
        }
        Command::Validate { amount, currency } => {
            match engine.assert_valid_amount(amount, &currency).await {
                Ok(()) => println!("{amount} {currency} is valid"),
                Err(FxError::InvalidAmount {
                    amount,
                    currency,
                    expected_decimal_places,
                }) => {
                    println!(
                        "{amount} {currency} is invalid: expected a non-negative amount with at most {expected_decimal_places} decimal places"
                    );
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Load {
            workers,
            requests,
            seed,
        } => {
            let controller = LoadController::new(engine.clone());
            let report = controller
                .run(&LoadSettings {
                    workers,
                    requests_per_worker: requests,
                    seed,
                })
                .await?;

            let metrics = &report.metrics;
            let stats = engine.stats();
            let calls = source.calls();

            info!("Total conversions: {}", metrics.total());
            info!("Converted: {}", metrics.converted());
            info!("Failed: {}", metrics.failed());
            for (code, count) in metrics.failures() {
                info!("  {code}: {count}");
            }
            info!("Throughput: {:.0}/s", report.throughput());
            if let Some(latency) = metrics.latency() {
                info!(
                    "Latency min/mean/p50/p99/max: {:?}/{:?}/{:?}/{:?}/{:?}",
                    latency.min, latency.mean, latency.p50, latency.p99, latency.max
                );
            }
            info!("Cache hits: {}, misses: {}", stats.hits(), stats.misses());
            info!(
                "Rate source calls: {} (rates={} currencies={} details={})",
                calls.total(),
                calls.rates,
                calls.supported_currencies,
                calls.currency_details
            );
        }
    }

    Ok(())
}
