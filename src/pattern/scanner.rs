//! Pattern scanning
//!
//! [`scan_series`] is the pure per-symbol kernel: bars in, matches out.
//! [`scan_target_days`] is the breakout test alone, without the later stages.
//! [`PatternScanner`] fetches each symbol from a [`SeriesStore`] and runs the
//! kernel over all symbols in parallel. Symbols share nothing, so a failure
//! or a skip for one symbol is recorded and the others carry on.

use chrono::NaiveDate;
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, trace, warn};

use super::detector::{is_target_day, target_days};
use super::disagreement::{resolve_disagreement, Disagreement};
use super::rolling::trailing_turnover_avg;
use super::window::{confirm_at_anchor, confirm_forward};
use super::{Direction, PatternMatch, PatternParams, ScanMode};
use crate::error::{ConfigError, StoreError};
use crate::store::{ensure_ordered, SeriesStore};
use crate::{Bar, Money, Symbol};

/// Why a symbol produced no evaluation at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No bars in the requested window
    EmptySeries,
    /// Backward mode: the symbol has no bar on the anchor date
    AnchorMissing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySeries => write!(f, "no bars in window"),
            Self::AnchorMissing => write!(f, "no bar on anchor date"),
        }
    }
}

// =============================================================================
// Per-symbol kernel
// =============================================================================

/// Evaluate one symbol's date-ordered bars.
///
/// Forward mode only looks at bars dated within `[start, end]`; backward mode
/// only at bars up to and including the anchor. Bars outside those ranges are
/// ignored, so passing a longer series gives the same result as passing the
/// exact window.
pub fn scan_series(
    bars: &[Bar],
    mode: &ScanMode,
    params: &PatternParams,
) -> Result<Vec<PatternMatch>, SkipReason> {
    match *mode {
        ScanMode::Forward { start, end } => {
            let window = date_window(bars, start, end).ok_or(SkipReason::EmptySeries)?;
            Ok(scan_forward_window(window, params))
        }
        ScanMode::Backward { anchor, lookback } => {
            if bars.is_empty() {
                return Err(SkipReason::EmptySeries);
            }
            let anchor_idx = bars
                .binary_search_by_key(&anchor, |bar| bar.date)
                .map_err(|_| SkipReason::AnchorMissing)?;
            Ok(scan_back_from_anchor(&bars[..=anchor_idx], anchor_idx, lookback, params)
                .into_iter()
                .collect())
        }
    }
}

/// A bar that passed the breakout test, with the trailing average it beat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDay {
    pub bar: Bar,
    pub avg_turnover: Money,
}

/// Every target day dated within `[start, end]`.
///
/// Like forward mode, the trailing average starts at `start`: the first
/// `avg_window` bars of the range cannot qualify.
pub fn scan_target_days(
    bars: &[Bar],
    start: NaiveDate,
    end: NaiveDate,
    params: &PatternParams,
) -> Result<Vec<TargetDay>, SkipReason> {
    let window = date_window(bars, start, end).ok_or(SkipReason::EmptySeries)?;
    let avgs = trailing_turnover_avg(window, params.avg_window);

    Ok(target_days(window, &avgs, params.breakout_multiple)
        .into_iter()
        .filter_map(|i| {
            avgs[i].map(|avg| TargetDay {
                bar: window[i].clone(),
                avg_turnover: avg,
            })
        })
        .collect())
}

/// Bars dated within `[start, end]`, or `None` when there are none
fn date_window(bars: &[Bar], start: NaiveDate, end: NaiveDate) -> Option<&[Bar]> {
    let from = bars.partition_point(|bar| bar.date < start);
    let to = bars.partition_point(|bar| bar.date <= end);
    (from < to).then(|| &bars[from..to])
}

/// Every target day in the window, each judged on its own
fn scan_forward_window(bars: &[Bar], params: &PatternParams) -> Vec<PatternMatch> {
    let avgs = trailing_turnover_avg(bars, params.avg_window);

    target_days(bars, &avgs, params.breakout_multiple)
        .into_iter()
        .filter_map(|target| {
            let disagreement = resolve_disagreement(bars, target, params.follow_window)?;
            match confirm_forward(bars, target, &disagreement, params.min_spacing) {
                Ok(confirm) => Some(build_match(
                    &bars[target],
                    &disagreement,
                    bars[confirm].date,
                    Direction::Forward,
                )),
                Err(rejection) => {
                    trace!(
                        symbol = %bars[target].symbol,
                        target = %bars[target].date,
                        "Window rejected: {}",
                        rejection
                    );
                    None
                }
            }
        })
        .collect()
}

/// Nearest qualifying target day before the anchor, if any.
///
/// Candidates run from `anchor - min_spacing` back to
/// `anchor - min_spacing - lookback`, nearest first.
fn scan_back_from_anchor(
    bars: &[Bar],
    anchor: usize,
    lookback: usize,
    params: &PatternParams,
) -> Option<PatternMatch> {
    let nearest = anchor.checked_sub(params.min_spacing)?;
    let farthest = anchor.saturating_sub(params.min_spacing + lookback);
    let avgs = trailing_turnover_avg(bars, params.avg_window);

    (farthest..=nearest).rev().find_map(|candidate| {
        if !is_target_day(&bars[candidate], avgs[candidate], params.breakout_multiple) {
            return None;
        }
        let disagreement = resolve_disagreement(bars, candidate, params.follow_window)?;
        match confirm_at_anchor(
            bars,
            candidate,
            anchor,
            &disagreement,
            params.confirm_turnover_ratio,
        ) {
            Ok(()) => Some(build_match(
                &bars[candidate],
                &disagreement,
                bars[anchor].date,
                Direction::Backward,
            )),
            Err(rejection) => {
                trace!(
                    symbol = %bars[candidate].symbol,
                    target = %bars[candidate].date,
                    "Candidate rejected: {}",
                    rejection
                );
                None
            }
        }
    })
}

fn build_match(
    target: &Bar,
    disagreement: &Disagreement,
    confirmation_date: NaiveDate,
    direction: Direction,
) -> PatternMatch {
    PatternMatch {
        bar: target.clone(),
        direction,
        disagreement_date: disagreement.date,
        disagreement_max_price: disagreement.max_price,
        disagreement_turnover: disagreement.turnover,
        confirmation_date,
    }
}

// =============================================================================
// Scan report
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedSymbol {
    pub symbol: Symbol,
    pub reason: SkipReason,
}

/// A store failure for one symbol; the scan itself never retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolFailure {
    pub symbol: Symbol,
    pub error: String,
    pub retryable: bool,
}

/// Everything one scan produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub mode: ScanMode,
    pub symbols_scanned: usize,
    /// Sorted by symbol, then target date
    pub matches: Vec<PatternMatch>,
    pub skipped: Vec<SkippedSymbol>,
    pub failures: Vec<SymbolFailure>,
}

impl ScanReport {
    /// Distinct symbols with at least one match
    pub fn matched_symbols(&self) -> BTreeSet<Symbol> {
        self.matches.iter().map(|m| m.symbol().clone()).collect()
    }

    /// Symbols whose store failure is worth another attempt
    pub fn retryable_symbols(&self) -> Vec<Symbol> {
        self.failures
            .iter()
            .filter(|f| f.retryable)
            .map(|f| f.symbol.clone())
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Every target day of a date range, without disagreement or confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub symbols_scanned: usize,
    /// Sorted by symbol, then date
    pub targets: Vec<TargetDay>,
    pub skipped: Vec<SkippedSymbol>,
    pub failures: Vec<SymbolFailure>,
}

enum SymbolOutcome<T> {
    Scanned(Vec<T>),
    Skipped(SkipReason),
    Failed(StoreError),
}

struct Collected<T> {
    symbols_scanned: usize,
    found: Vec<T>,
    skipped: Vec<SkippedSymbol>,
    failures: Vec<SymbolFailure>,
}

impl<T> Collected<T> {
    fn from_outcomes(outcomes: Vec<(Symbol, SymbolOutcome<T>)>) -> Self {
        let mut collected = Collected {
            symbols_scanned: outcomes.len(),
            found: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        };

        for (symbol, outcome) in outcomes {
            match outcome {
                SymbolOutcome::Scanned(found) => collected.found.extend(found),
                SymbolOutcome::Skipped(reason) => {
                    collected.skipped.push(SkippedSymbol { symbol, reason })
                }
                SymbolOutcome::Failed(err) => collected.failures.push(SymbolFailure {
                    retryable: err.is_retryable(),
                    error: err.to_string(),
                    symbol,
                }),
            }
        }
        collected
    }
}

// =============================================================================
// Scanner
// =============================================================================

/// Runs the pattern kernel across many symbols
#[derive(Debug, Clone, Default)]
pub struct PatternScanner {
    params: PatternParams,
}

impl PatternScanner {
    pub fn new(params: PatternParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(PatternScanner { params })
    }

    pub fn params(&self) -> &PatternParams {
        &self.params
    }

    /// Every target day in `[start, end]` whose window confirms within the range
    pub fn scan_forward<S: SeriesStore + ?Sized>(
        &self,
        store: &S,
        symbols: &[Symbol],
        start: NaiveDate,
        end: NaiveDate,
    ) -> ScanReport {
        self.scan(store, symbols, ScanMode::Forward { start, end })
    }

    /// At most one match per symbol: the nearest target day confirmed on `anchor`.
    /// `lookback` falls back to the configured `lookback_days`.
    pub fn scan_backward<S: SeriesStore + ?Sized>(
        &self,
        store: &S,
        symbols: &[Symbol],
        anchor: NaiveDate,
        lookback: Option<usize>,
    ) -> ScanReport {
        let lookback = lookback.unwrap_or(self.params.lookback_days);
        self.scan(store, symbols, ScanMode::Backward { anchor, lookback })
    }

    pub fn scan<S: SeriesStore + ?Sized>(
        &self,
        store: &S,
        symbols: &[Symbol],
        mode: ScanMode,
    ) -> ScanReport {
        self.scan_with_progress(store, symbols, mode, &ProgressBar::hidden())
    }

    /// Same as [`scan`](Self::scan), ticking `progress` once per symbol
    pub fn scan_with_progress<S: SeriesStore + ?Sized>(
        &self,
        store: &S,
        symbols: &[Symbol],
        mode: ScanMode,
        progress: &ProgressBar,
    ) -> ScanReport {
        info!("Scanning {} symbols ({} mode)", symbols.len(), mode.name());

        let (start, end) = mode.fetch_window(&self.params);
        let outcomes = fan_out(store, symbols, start, end, progress, |bars| {
            scan_series(bars, &mode, &self.params)
        });
        let collected = Collected::from_outcomes(outcomes);

        let mut matches = collected.found;
        matches.sort_by(|a, b| (a.symbol(), a.target_date()).cmp(&(b.symbol(), b.target_date())));

        let report = ScanReport {
            mode,
            symbols_scanned: collected.symbols_scanned,
            matches,
            skipped: collected.skipped,
            failures: collected.failures,
        };
        info!(
            "Scan complete: {} matches across {} symbols, {} skipped, {} failed",
            report.matches.len(),
            report.matched_symbols().len(),
            report.skipped.len(),
            report.failures.len()
        );
        report
    }

    /// Breakout days alone over `[start, end]`
    pub fn scan_targets<S: SeriesStore + ?Sized>(
        &self,
        store: &S,
        symbols: &[Symbol],
        start: NaiveDate,
        end: NaiveDate,
    ) -> TargetReport {
        self.scan_targets_with_progress(store, symbols, start, end, &ProgressBar::hidden())
    }

    pub fn scan_targets_with_progress<S: SeriesStore + ?Sized>(
        &self,
        store: &S,
        symbols: &[Symbol],
        start: NaiveDate,
        end: NaiveDate,
        progress: &ProgressBar,
    ) -> TargetReport {
        info!("Listing target days of {} symbols", symbols.len());

        let outcomes = fan_out(store, symbols, start, end, progress, |bars| {
            scan_target_days(bars, start, end, &self.params)
        });
        let collected = Collected::from_outcomes(outcomes);

        let mut targets = collected.found;
        targets.sort_by(|a, b| (&a.bar.symbol, a.bar.date).cmp(&(&b.bar.symbol, b.bar.date)));

        info!(
            "Target listing complete: {} target days, {} skipped, {} failed",
            targets.len(),
            collected.skipped.len(),
            collected.failures.len()
        );
        TargetReport {
            start,
            end,
            symbols_scanned: collected.symbols_scanned,
            targets,
            skipped: collected.skipped,
            failures: collected.failures,
        }
    }
}

/// Fetch every symbol's window in parallel and run `kernel` on it
fn fan_out<S, T, F>(
    store: &S,
    symbols: &[Symbol],
    start: NaiveDate,
    end: NaiveDate,
    progress: &ProgressBar,
    kernel: F,
) -> Vec<(Symbol, SymbolOutcome<T>)>
where
    S: SeriesStore + ?Sized,
    T: Send,
    F: Fn(&[Bar]) -> Result<Vec<T>, SkipReason> + Sync,
{
    symbols
        .par_iter()
        .progress_with(progress.clone())
        .map(|symbol| (symbol.clone(), run_symbol(store, symbol, start, end, &kernel)))
        .collect()
}

fn run_symbol<S, T, F>(
    store: &S,
    symbol: &Symbol,
    start: NaiveDate,
    end: NaiveDate,
    kernel: &F,
) -> SymbolOutcome<T>
where
    S: SeriesStore + ?Sized,
    F: Fn(&[Bar]) -> Result<Vec<T>, SkipReason>,
{
    let bars = match store.fetch(symbol, start, end) {
        Ok(bars) => bars,
        Err(e) => {
            warn!("Failed to fetch {}: {}", symbol, e);
            return SymbolOutcome::Failed(e);
        }
    };
    if let Err(e) = ensure_ordered(symbol, &bars) {
        warn!("{}", e);
        return SymbolOutcome::Failed(e);
    }

    match kernel(&bars) {
        Ok(found) => {
            if !found.is_empty() {
                debug!("{}: {} hit(s)", symbol, found.len());
            }
            SymbolOutcome::Scanned(found)
        }
        Err(reason) => {
            debug!("Skipping {}: {}", symbol, reason);
            SymbolOutcome::Skipped(reason)
        }
    }
}
