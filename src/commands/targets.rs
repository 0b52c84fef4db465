//! Target-day listing command

use anyhow::{ensure, Result};
use kline_screener::{PatternScanner, TargetReport};
use tracing::info;

use super::{load_config, open_store, parse_date_arg, progress_bar, resolve_symbols, write_json};

pub fn run(
    config_path: String,
    start: String,
    end: String,
    symbols: Option<String>,
    json: Option<String>,
) -> Result<()> {
    info!("Starting target-day listing");

    let config = load_config(&config_path)?;
    let start = parse_date_arg("start", &start)?;
    let end = parse_date_arg("end", &end)?;
    ensure!(start <= end, "--start {} is after --end {}", start, end);

    let store = open_store(&config)?;
    let symbols = resolve_symbols(store.as_ref(), symbols)?;
    let scanner = PatternScanner::new(config.pattern.clone())?;

    let pb = progress_bar(symbols.len())?;
    let report = scanner.scan_targets_with_progress(store.as_ref(), &symbols, start, end, &pb);
    pb.finish_and_clear();

    print_targets(&report);

    if let Some(path) = json.or_else(|| config.output.json_path.clone()) {
        write_json(&report, &path)?;
        info!("Target days written to: {}", path);
        println!("Target days written to: {}", path);
    }

    info!("Target listing completed: {} target days", report.targets.len());
    Ok(())
}

fn print_targets(report: &TargetReport) {
    println!("\n{}", "=".repeat(90));
    println!("TARGET DAYS {} .. {}", report.start, report.end);
    println!("{}", "=".repeat(90));
    println!(
        "{:<10} {:<12} {:<12} {:>10} {:>10} {:>16} {:>16}",
        "Symbol", "Name", "Date", "Open", "Close", "Turnover", "Avg5"
    );
    println!("{}", "-".repeat(90));
    for t in &report.targets {
        println!(
            "{:<10} {:<12} {:<12} {:>10} {:>10} {:>16} {:>16}",
            t.bar.symbol.as_str(),
            t.bar.details.name.as_deref().unwrap_or("-"),
            t.bar.date.to_string(),
            t.bar.open.to_string(),
            t.bar.close.to_string(),
            t.bar.turnover.to_string(),
            t.avg_turnover.round_dp(2).to_string(),
        );
    }
    println!("{}", "-".repeat(90));
    println!("Symbols scanned:    {}", report.symbols_scanned);
    println!("Target days:        {}", report.targets.len());
    println!("Skipped:            {}", report.skipped.len());
    println!("Failed:             {}", report.failures.len());
    println!("{}", "=".repeat(90));
}
