//! Subcommand implementations and the plumbing they share

pub mod backward;
pub mod forward;
pub mod targets;
pub mod validate;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use kline_screener::config::DataSource;
use kline_screener::data;
use kline_screener::{
    Config, MemoryStore, PatternScanner, ScanMode, ScanReport, SeriesStore, SqliteStore, Symbol,
};
use serde::Serialize;
use std::fs;
use tracing::info;

/// Open the bar store the configuration points at
pub fn open_store(config: &Config) -> Result<Box<dyn SeriesStore>> {
    match config.data.source {
        DataSource::Csv => {
            let path = config
                .data
                .csv_path
                .as_deref()
                .context("data.csv_path is not set")?;
            info!("Loading bars from CSV: {}", path);
            let series = data::load_series(path, &config.universe)
                .with_context(|| format!("Failed to load {}", path))?;
            Ok(Box::new(MemoryStore::from_series(series)))
        }
        DataSource::Sqlite => {
            let path = config
                .data
                .sqlite_path
                .as_deref()
                .context("data.sqlite_path is not set")?;
            info!("Opening SQLite store: {}", path);
            let store = SqliteStore::open(path, config.universe.clone())
                .with_context(|| format!("Failed to open {}", path))?;
            Ok(Box::new(store))
        }
    }
}

/// The comma-separated list from the command line, or every symbol the store serves
pub fn resolve_symbols(store: &dyn SeriesStore, requested: Option<String>) -> Result<Vec<Symbol>> {
    match requested {
        Some(list) => Ok(list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Symbol::new)
            .collect()),
        None => store.symbols().context("Failed to list symbols"),
    }
}

pub fn parse_date_arg(name: &str, value: &str) -> Result<NaiveDate> {
    data::parse_date(value).with_context(|| format!("Invalid --{} date: {}", name, value))
}

pub fn load_config(path: &str) -> Result<Config> {
    let config = Config::load_or_default(path)?;
    info!("Loaded configuration from: {}", path);
    Ok(config)
}

/// Run a scan behind a progress bar, print it, and write JSON when asked to
pub fn run_scan(
    config: &Config,
    symbols: Option<String>,
    mode: ScanMode,
    json_override: Option<String>,
) -> Result<ScanReport> {
    let store = open_store(config)?;
    let symbols = resolve_symbols(store.as_ref(), symbols)?;
    let scanner = PatternScanner::new(config.pattern.clone())?;

    let pb = progress_bar(symbols.len())?;
    let report = scanner.scan_with_progress(store.as_ref(), &symbols, mode, &pb);
    pb.finish_and_clear();

    print_report(&report);

    if let Some(path) = json_override.or_else(|| config.output.json_path.clone()) {
        write_json(&report, &path)?;
        info!("Report written to: {}", path);
        println!("Report written to: {}", path);
    }

    Ok(report)
}

pub fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("🔎 {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}]")?
            .progress_chars("█░ "),
    );
    Ok(pb)
}

pub fn write_json<T: Serialize>(report: &T, path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path))?;
    Ok(())
}

pub fn print_report(report: &ScanReport) {
    let title = match report.mode {
        ScanMode::Forward { start, end } => format!("FORWARD SCAN {} .. {}", start, end),
        ScanMode::Backward { anchor, lookback } => {
            format!("BACKWARD SCAN anchor {} (lookback {})", anchor, lookback)
        }
    };

    println!("\n{}", "=".repeat(100));
    println!("{}", title);
    println!("{}", "=".repeat(100));
    println!(
        "{:<10} {:<12} {:<12} {:>10} {:>16} {:<12} {:>10} {:<12}",
        "Symbol", "Name", "Target", "Close", "Turnover", "Disagree", "MaxPrice", "Confirm"
    );
    println!("{}", "-".repeat(100));
    for m in &report.matches {
        println!(
            "{:<10} {:<12} {:<12} {:>10} {:>16} {:<12} {:>10} {:<12}",
            m.symbol().as_str(),
            m.bar.details.name.as_deref().unwrap_or("-"),
            m.target_date().to_string(),
            m.bar.close.to_string(),
            m.bar.turnover.to_string(),
            m.disagreement_date.to_string(),
            m.disagreement_max_price.to_string(),
            m.confirmation_date.to_string(),
        );
    }
    println!("{}", "-".repeat(100));
    println!("Symbols scanned:    {}", report.symbols_scanned);
    println!("Matches:            {}", report.matches.len());
    println!("Matched symbols:    {}", report.matched_symbols().len());
    println!("Skipped:            {}", report.skipped.len());
    println!("Failed:             {}", report.failures.len());
    for failure in &report.failures {
        let tag = if failure.retryable { "retryable" } else { "permanent" };
        println!("  {} [{}]: {}", failure.symbol, tag, failure.error);
    }
    println!("{}", "=".repeat(100));
}
