//! K-line screener - main entry point
//!
//! This binary provides four subcommands:
//! - forward: scan a date range for complete pattern windows
//! - backward: find patterns confirmed on an anchor date
//! - targets: list every breakout day of a date range
//! - validate: check the configured bar data for inconsistencies

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "kline-screener")]
#[command(about = "Screen daily stock bars for volume-breakout confirmation patterns", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a date range for complete pattern windows
    Forward {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// First trading date (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// Last trading date (YYYY-MM-DD)
        #[arg(long)]
        end: String,

        /// Symbols to scan (comma-separated). Defaults to the whole universe
        #[arg(long)]
        symbols: Option<String>,

        /// Write the scan report as JSON (overrides config)
        #[arg(long)]
        json: Option<String>,
    },

    /// Find patterns whose confirmation day is the anchor date
    Backward {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Confirmation date (YYYY-MM-DD)
        #[arg(long)]
        anchor: String,

        /// Trading days searched beyond the minimum spacing (overrides config)
        #[arg(long)]
        lookback: Option<usize>,

        /// Symbols to scan (comma-separated). Defaults to the whole universe
        #[arg(long)]
        symbols: Option<String>,

        /// Write the scan report as JSON (overrides config)
        #[arg(long)]
        json: Option<String>,
    },

    /// List every breakout (target) day in a date range
    Targets {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// First trading date (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// Last trading date (YYYY-MM-DD)
        #[arg(long)]
        end: String,

        /// Symbols to scan (comma-separated). Defaults to the whole universe
        #[arg(long)]
        symbols: Option<String>,

        /// Write the target days as JSON (overrides config)
        #[arg(long)]
        json: Option<String>,
    },

    /// Validate the configured bar data
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{timestamp}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Scans draw a progress bar; keep the console clean for it
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    }

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());
    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Forward { .. } => ("forward", true),
        Commands::Backward { .. } => ("backward", true),
        Commands::Targets { .. } => ("targets", true),
        Commands::Validate { .. } => ("validate", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Forward {
            config,
            start,
            end,
            symbols,
            json,
        } => commands::forward::run(config, start, end, symbols, json),

        Commands::Backward {
            config,
            anchor,
            lookback,
            symbols,
            json,
        } => commands::backward::run(config, anchor, lookback, symbols, json),

        Commands::Targets {
            config,
            start,
            end,
            symbols,
            json,
        } => commands::targets::run(config, start, end, symbols, json),

        Commands::Validate { config } => commands::validate::run(config),
    }
}
