//! Forward scan command

use anyhow::{ensure, Result};
use kline_screener::ScanMode;
use tracing::info;

use super::{load_config, parse_date_arg, run_scan};

pub fn run(
    config_path: String,
    start: String,
    end: String,
    symbols: Option<String>,
    json: Option<String>,
) -> Result<()> {
    info!("Starting forward scan");

    let config = load_config(&config_path)?;
    let start = parse_date_arg("start", &start)?;
    let end = parse_date_arg("end", &end)?;
    ensure!(start <= end, "--start {} is after --end {}", start, end);

    let report = run_scan(&config, symbols, ScanMode::Forward { start, end }, json)?;

    info!(
        "Forward scan completed: {} matches",
        report.matches.len()
    );
    Ok(())
}
