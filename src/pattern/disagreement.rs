//! Disagreement-day resolution
//!
//! After a target day the market either "disagrees" with heavier turnover in
//! the next few sessions, or it does not and the target day stands in for the
//! disagreement day. The body top of that day is the price a later close has
//! to reclaim.

use chrono::NaiveDate;

use crate::{Bar, Money};

/// The resolved disagreement day of one target day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disagreement {
    /// Index into the series; equals the target index when nothing outtraded it
    pub index: usize,
    pub date: NaiveDate,
    /// Higher of open and close on the disagreement day
    pub max_price: Money,
    pub turnover: Money,
}

impl Disagreement {
    pub fn is_target_day(&self, target: usize) -> bool {
        self.index == target
    }
}

/// Resolve the disagreement day for the target day at `target`.
///
/// Looks at up to `follow_window` bars after the target (fewer near the end of
/// the series). The bar with the largest turnover strictly above the target's
/// wins, the earliest one on ties. Returns `None` only for an out-of-range
/// target index.
pub fn resolve_disagreement(bars: &[Bar], target: usize, follow_window: usize) -> Option<Disagreement> {
    let target_bar = bars.get(target)?;
    let end = target
        .saturating_add(1)
        .saturating_add(follow_window)
        .min(bars.len());

    let mut chosen = target;
    let mut best = target_bar.turnover;
    for (idx, bar) in bars.iter().enumerate().take(end).skip(target + 1) {
        if bar.turnover > best {
            best = bar.turnover;
            chosen = idx;
        }
    }

    let day = &bars[chosen];
    Some(Disagreement {
        index: chosen,
        date: day.date,
        max_price: day.body_top(),
        turnover: day.turnover,
    })
}
