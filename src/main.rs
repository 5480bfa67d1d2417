use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use market_advisory::{ingest, init_tracing, latest_prices, AppConfig, PriceQuery};

fn main() -> Result<()> {
    init_tracing("warn");

    let args: Vec<String> = env::args().collect();
    let config = AppConfig::from_env().context("Invalid configuration")?;

    // market-advisory [summary] [csv] [commodities] [markets]
    let rest: &[String] = match args.get(1).map(String::as_str) {
        Some("summary") => &args[2..],
        _ => &args[1..],
    };

    let csv_path = rest
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| config.data_file.clone());
    let query = PriceQuery::from_params(
        rest.get(1).map(String::as_str),
        rest.get(2).map(String::as_str),
    );

    run_summary(&config, &csv_path, &query)
}

fn run_summary(config: &AppConfig, csv_path: &Path, query: &PriceQuery) -> Result<()> {
    println!("📂 Loading price data from {}", csv_path.display());

    let catalog = ingest(csv_path)
        .with_context(|| format!("Failed to load price data: {}", csv_path.display()))?;

    let stats = catalog.stats();
    println!(
        "✓ {} markets, {} observations ({} rows skipped)",
        catalog.markets().len(),
        catalog.observations().len(),
        stats.rows_skipped
    );
    println!("  Regions:    {}", catalog.regions().join(", "));
    println!("  Fingerprint {}", catalog.fingerprint());

    let rows = latest_prices(&catalog, query, config.staleness());
    if rows.is_empty() {
        println!("\nNo prices match the given filters.");
        return Ok(());
    }

    println!(
        "\n{:<16} {:<24} {:>10} {:<4} {:<5} {:<7} {:>7}  {}",
        "MARKET", "PRODUCT", "PRICE", "CUR", "UNIT", "TREND", "%", "UPDATED"
    );
    for row in &rows {
        println!(
            "{:<16} {:<24} {:>10.2} {:<4} {:<5} {:<7} {:>7.1}  {}{}",
            row.market,
            row.product,
            row.price,
            row.currency,
            row.unit,
            row.trend.as_str(),
            row.trend_percent,
            row.last_updated,
            if row.is_stale { " (stale)" } else { "" }
        );
    }

    Ok(())
}
