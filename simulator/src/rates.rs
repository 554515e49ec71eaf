//! Rate snapshots served by the simulator.

use std::path::Path;

use anyhow::Context;
use ratekeeper_common::{Currency, RateTable};
use ratekeeper_fx::RateSnapshot;
use rust_decimal::Decimal;

/// Built-in USD snapshot, used when no rates file is given.
pub fn default_snapshot() -> RateSnapshot {
    let quotes: [(&str, i64, u32, u32); 6] = [
        // code, rate mantissa, rate scale, max decimal places
        ("USD", 1, 0, 2),
        ("EUR", 92, 2, 2),
        ("GBP", 79, 2, 2),
        ("CHF", 88, 2, 2),
        ("JPY", 1495, 1, 0),
        ("KWD", 307, 3, 3),
    ];

    let rates: RateTable = quotes
        .iter()
        .map(|(code, mantissa, scale, _)| (Currency::new(*code), Decimal::new(*mantissa, *scale)))
        .collect();

    quotes.iter().fold(
        RateSnapshot::new(Currency::usd(), rates),
        |snapshot, (code, _, _, places)| snapshot.with_details(Currency::new(*code), *places),
    )
}

/// Load a snapshot from a JSON file.
pub fn load_snapshot(path: &Path) -> anyhow::Result<RateSnapshot> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rates file {}", path.display()))?;
    let snapshot = RateSnapshot::from_json(&json)
        .with_context(|| format!("Invalid rates file {}", path.display()))?;

    if !snapshot.rates.contains(&snapshot.base) {
        anyhow::bail!(
            "Rates file {} does not quote its base currency {}",
            path.display(),
            snapshot.base
        );
    }

    Ok(snapshot)
}
