//! Window validation between a target day and its confirmation day
//!
//! Forward mode searches for the confirmation day after the disagreement day.
//! Backward mode is handed the confirmation day (the anchor) and checks it.
//! Both share the premature-breach rule: no close strictly between target
//! and confirmation may sit above the disagreement max price.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt;

use super::disagreement::Disagreement;
use crate::{Bar, Money};

/// Why a candidate window was discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No later close reached the disagreement max price
    NeverConfirmed,
    /// Confirmation came fewer than the required trading days after the target
    TooClose { spacing: usize },
    /// An intermediate close already broke above the disagreement max price
    PrematureBreach { date: NaiveDate, close: Money },
    /// The anchor closed below the disagreement max price
    BelowDisagreementPrice { close: Money, required: Money },
    /// Anchor turnover fell below the required share of disagreement turnover
    TurnoverCollapsed { turnover: Money, required: Money },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeverConfirmed => write!(f, "never confirmed"),
            Self::TooClose { spacing } => write!(f, "confirmed only {} days after target", spacing),
            Self::PrematureBreach { date, close } => {
                write!(f, "close {} on {} broke out early", close, date)
            }
            Self::BelowDisagreementPrice { close, required } => {
                write!(f, "close {} below {}", close, required)
            }
            Self::TurnoverCollapsed { turnover, required } => {
                write!(f, "turnover {} below {}", turnover, required)
            }
        }
    }
}

/// First bar strictly between `after` and `before` whose close exceeds `price`
pub fn first_breach(bars: &[Bar], after: usize, before: usize, price: Money) -> Option<&Bar> {
    if before <= after + 1 {
        return None;
    }
    bars[after + 1..before.min(bars.len())]
        .iter()
        .find(|bar| bar.close > price)
}

fn check_breach(bars: &[Bar], target: usize, confirm: usize, price: Money) -> Result<(), Rejection> {
    match first_breach(bars, target, confirm, price) {
        Some(bar) => Err(Rejection::PrematureBreach {
            date: bar.date,
            close: bar.close,
        }),
        None => Ok(()),
    }
}

/// Forward mode: find and vet the confirmation day of the target at `target`.
///
/// The confirmation day is the first bar after the disagreement day closing
/// at or above the disagreement max price. It must lie at least
/// `min_spacing` trading days after the target, and nothing in between may
/// have closed above that price. Returns the confirmation index.
pub fn confirm_forward(
    bars: &[Bar],
    target: usize,
    disagreement: &Disagreement,
    min_spacing: usize,
) -> Result<usize, Rejection> {
    let confirm = (disagreement.index + 1..bars.len())
        .find(|&i| bars[i].close >= disagreement.max_price)
        .ok_or(Rejection::NeverConfirmed)?;

    let spacing = confirm - target;
    if spacing < min_spacing {
        return Err(Rejection::TooClose { spacing });
    }

    check_breach(bars, target, confirm, disagreement.max_price)?;
    Ok(confirm)
}

/// Backward mode: vet a fixed confirmation day at `anchor` for the target at `target`.
///
/// The anchor must close at or above the disagreement max price, no close
/// between target and anchor may exceed it, and anchor turnover must be at
/// least `turnover_ratio` times the disagreement day's turnover.
pub fn confirm_at_anchor(
    bars: &[Bar],
    target: usize,
    anchor: usize,
    disagreement: &Disagreement,
    turnover_ratio: Decimal,
) -> Result<(), Rejection> {
    let anchor_bar = &bars[anchor];

    if anchor_bar.close < disagreement.max_price {
        return Err(Rejection::BelowDisagreementPrice {
            close: anchor_bar.close,
            required: disagreement.max_price,
        });
    }

    check_breach(bars, target, anchor, disagreement.max_price)?;

    let required = disagreement.turnover * turnover_ratio;
    if anchor_bar.turnover < required {
        return Err(Rejection::TurnoverCollapsed {
            turnover: anchor_bar.turnover,
            required,
        });
    }

    Ok(())
}
