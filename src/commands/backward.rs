//! Backward scan command

use anyhow::Result;
use kline_screener::ScanMode;
use tracing::info;

use super::{load_config, parse_date_arg, run_scan};

pub fn run(
    config_path: String,
    anchor: String,
    lookback: Option<usize>,
    symbols: Option<String>,
    json: Option<String>,
) -> Result<()> {
    info!("Starting backward scan");

    let config = load_config(&config_path)?;
    let anchor = parse_date_arg("anchor", &anchor)?;
    let lookback = match lookback {
        Some(days) => {
            info!("Overriding lookback to: {} trading days", days);
            days
        }
        None => config.pattern.lookback_days,
    };

    let report = run_scan(&config, symbols, ScanMode::Backward { anchor, lookback }, json)?;

    info!(
        "Backward scan completed: {} matches",
        report.matches.len()
    );
    Ok(())
}
