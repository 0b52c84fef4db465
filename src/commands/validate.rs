//! Data validation command
//!
//! Reads the raw table, so rows the scan loaders silently drop (suspended
//! placeholders, inconsistent prices) are reported here.

use anyhow::{Context, Result};
use kline_screener::config::DataSource;
use kline_screener::data::{load_csv_rows, validate_table};
use kline_screener::{Bar, Config, SqliteStore};
use tracing::{info, warn};

use super::load_config;

fn load_raw_rows(config: &Config) -> Result<Vec<Bar>> {
    match config.data.source {
        DataSource::Csv => {
            let path = config
                .data
                .csv_path
                .as_deref()
                .context("data.csv_path is not set")?;
            info!("Reading raw rows from CSV: {}", path);
            load_csv_rows(path).with_context(|| format!("Failed to read {}", path))
        }
        DataSource::Sqlite => {
            let path = config
                .data
                .sqlite_path
                .as_deref()
                .context("data.sqlite_path is not set")?;
            info!("Reading raw rows from SQLite: {}", path);
            let store = SqliteStore::open(path, config.universe.clone())
                .with_context(|| format!("Failed to open {}", path))?;
            store.all_rows().context("Failed to read stock_detail")
        }
    }
}

pub fn run(config_path: String) -> Result<()> {
    info!("Starting data validation");

    let config = load_config(&config_path)?;
    let rows = config.universe.retain_rows(load_raw_rows(&config)?);
    let total_rows = rows.len();

    let results = validate_table(rows);
    info!("Validated {} rows across {} symbols", total_rows, results.len());

    let mut invalid = 0usize;
    let mut warned = 0usize;
    for (symbol, result) in &results {
        for error in &result.errors {
            warn!("{}: {}", symbol, error);
        }
        for warning in &result.warnings {
            info!("{}: {}", symbol, warning);
        }
        if !result.is_valid() {
            invalid += 1;
        } else if !result.warnings.is_empty() {
            warned += 1;
        }
    }

    println!("\n{}", "=".repeat(60));
    println!("DATA VALIDATION");
    println!("{}", "=".repeat(60));
    println!("Rows:               {}", total_rows);
    println!("Symbols:            {}", results.len());
    println!("With errors:        {}", invalid);
    println!("With warnings:      {}", warned);
    println!("{}", "=".repeat(60));

    info!("Validation completed");
    Ok(())
}
