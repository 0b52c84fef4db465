//! Target-day detection: a turnover breakout on a bullish candle

use rust_decimal::Decimal;

use crate::{Bar, Money};

/// A bar is a target day when its trailing average exists, its turnover is
/// strictly above `multiple` times that average and it closed above its open.
pub fn is_target_day(bar: &Bar, avg: Option<Money>, multiple: Decimal) -> bool {
    match avg {
        Some(avg) => bar.turnover > avg * multiple && bar.is_bullish(),
        None => false,
    }
}

/// Indices of every target day in a series, given its trailing averages
pub fn target_days(bars: &[Bar], avgs: &[Option<Money>], multiple: Decimal) -> Vec<usize> {
    bars.iter()
        .zip(avgs)
        .enumerate()
        .filter(|(_, (bar, avg))| is_target_day(bar, **avg, multiple))
        .map(|(i, _)| i)
        .collect()
}
