//! Trailing turnover average
//!
//! The average for bar `i` covers bars `i - window .. i` and never includes
//! bar `i` itself. Bars with fewer than `window` predecessors get `None`.

use rust_decimal::Decimal;

use crate::{Bar, Money};

/// Trailing mean of turnover for every bar of one symbol's series.
///
/// Computed as a single pass with a running window sum. Decimal arithmetic
/// keeps the add/subtract sum exact, so no drift accumulates over long series.
pub fn trailing_turnover_avg(bars: &[Bar], window: usize) -> Vec<Option<Money>> {
    if window == 0 {
        return vec![None; bars.len()];
    }

    let divisor = Decimal::from(window as u64);
    let mut result = Vec::with_capacity(bars.len());
    let mut sum = Money::ZERO;

    for (i, bar) in bars.iter().enumerate() {
        // sum holds exactly the `window` bars before i once i >= window
        result.push((i >= window).then(|| sum / divisor));

        sum += bar.turnover;
        if i >= window {
            sum = sum - bars[i - window].turnover;
        }
    }

    result
}
