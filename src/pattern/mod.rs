//! Volume-breakout → disagreement → confirmation pattern
//!
//! Per symbol, the pipeline is:
//! 1. [`rolling`]: trailing turnover average, excluding the current bar
//! 2. [`detector`]: target days (turnover breakout on a bullish candle)
//! 3. [`disagreement`]: heaviest follower within a few sessions, or the target itself
//! 4. [`window`]: confirmation search (forward) or anchor check (backward)
//! 5. [`scanner`]: per-symbol kernel plus the parallel fan-out across symbols
//!
//! Bars are addressed by their index in the symbol's series. Index `i` is
//! trading day rank `i + 1`, so index differences are trading-day distances
//! regardless of weekends and holidays.

pub mod detector;
pub mod disagreement;
pub mod rolling;
pub mod scanner;
pub mod window;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::{Bar, Money, Symbol};

pub use disagreement::Disagreement;
pub use scanner::{
    scan_series, scan_target_days, PatternScanner, ScanReport, SkipReason, TargetDay, TargetReport,
};
pub use window::Rejection;

/// Tunable constants of the pattern rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternParams {
    /// Bars in the trailing turnover average
    pub avg_window: usize,
    /// Target turnover must be strictly above this multiple of the average
    pub breakout_multiple: Decimal,
    /// Bars after the target searched for the disagreement day
    pub follow_window: usize,
    /// Minimum rank distance from target day to confirmation day
    pub min_spacing: usize,
    /// Extra trading days searched beyond `min_spacing` in backward mode
    pub lookback_days: usize,
    /// Backward mode: anchor turnover floor as a share of disagreement turnover
    pub confirm_turnover_ratio: Decimal,
}

impl Default for PatternParams {
    fn default() -> Self {
        PatternParams {
            avg_window: 5,
            breakout_multiple: dec!(3),
            follow_window: 3,
            min_spacing: 3,
            lookback_days: 50,
            confirm_turnover_ratio: dec!(0.67),
        }
    }
}

impl PatternParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.avg_window == 0 {
            return Err(ConfigError::ZeroWindow("avg_window"));
        }
        if self.follow_window == 0 {
            return Err(ConfigError::ZeroWindow("follow_window"));
        }
        if self.min_spacing == 0 {
            return Err(ConfigError::ZeroWindow("min_spacing"));
        }
        if self.breakout_multiple <= Decimal::ZERO {
            return Err(ConfigError::NonPositive {
                name: "breakout_multiple",
                value: self.breakout_multiple.to_string(),
            });
        }
        if self.confirm_turnover_ratio <= Decimal::ZERO {
            return Err(ConfigError::NonPositive {
                name: "confirm_turnover_ratio",
                value: self.confirm_turnover_ratio.to_string(),
            });
        }
        Ok(())
    }

    /// Trading days of history a backward scan needs before its anchor
    pub fn backward_history_bars(&self, lookback: usize) -> usize {
        lookback + self.min_spacing + self.avg_window
    }
}

/// Scan direction, without the mode's parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

/// Which direction a scan runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ScanMode {
    /// Every bar in `[start, end]` is a candidate target day
    Forward { start: NaiveDate, end: NaiveDate },
    /// `anchor` is the confirmation day; search back for its nearest target day
    Backward { anchor: NaiveDate, lookback: usize },
}

/// Calendar slack for exchange holidays when turning trading days into a date span
const HOLIDAY_SLACK_DAYS: i64 = 20;

impl ScanMode {
    pub fn direction(&self) -> Direction {
        match self {
            ScanMode::Forward { .. } => Direction::Forward,
            ScanMode::Backward { .. } => Direction::Backward,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.direction() {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }

    /// Inclusive date window to request from the series store
    pub fn fetch_window(&self, params: &PatternParams) -> (NaiveDate, NaiveDate) {
        match *self {
            ScanMode::Forward { start, end } => (start, end),
            ScanMode::Backward { anchor, lookback } => {
                let trading_days = params.backward_history_bars(lookback) as i64;
                let span = (trading_days * 7 + 4) / 5 + HOLIDAY_SLACK_DAYS;
                let start = anchor
                    .checked_sub_signed(chrono::Duration::days(span))
                    .unwrap_or(NaiveDate::MIN);
                (start, anchor)
            }
        }
    }
}

/// One accepted pattern window.
///
/// `bar` is a full copy of the target day's record; the remaining fields
/// describe how the window was confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub bar: Bar,
    pub direction: Direction,
    pub disagreement_date: NaiveDate,
    pub disagreement_max_price: Money,
    pub disagreement_turnover: Money,
    pub confirmation_date: NaiveDate,
}

impl PatternMatch {
    pub fn symbol(&self) -> &Symbol {
        &self.bar.symbol
    }

    pub fn target_date(&self) -> NaiveDate {
        self.bar.date
    }
}
