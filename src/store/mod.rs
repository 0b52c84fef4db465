//! Series store: where per-symbol daily bars come from
//!
//! The pattern code only ever sees a `&[Bar]` per symbol. Stores hand those
//! out for an inclusive date window, sorted ascending with no repeated dates.

pub mod sqlite;

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::data::SeriesMap;
use crate::error::StoreError;
use crate::{Bar, Symbol};

pub use sqlite::SqliteStore;

/// Supplier of daily bars.
///
/// Implementations must be shareable across the scanner's worker threads.
pub trait SeriesStore: Send + Sync {
    /// Every symbol the store can serve, in a stable order
    fn symbols(&self) -> Result<Vec<Symbol>, StoreError>;

    /// Bars of `symbol` dated within `[start, end]`, ascending by date.
    /// An empty vector means the symbol did not trade in the window.
    fn fetch(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, StoreError>;
}

/// Reject a series whose dates do not strictly increase
pub fn ensure_ordered(symbol: &Symbol, bars: &[Bar]) -> Result<(), StoreError> {
    match bars.windows(2).find(|pair| pair[1].date <= pair[0].date) {
        Some(pair) => Err(StoreError::Unordered {
            symbol: symbol.clone(),
            date: pair[1].date,
        }),
        None => Ok(()),
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Whole table held in memory, one date-sorted vector per symbol
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    series: BTreeMap<Symbol, Vec<Bar>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of already-grouped series, sorting any that arrive out of order
    pub fn from_series(series: SeriesMap) -> Self {
        let series = series
            .into_iter()
            .map(|(symbol, mut bars)| {
                if ensure_ordered(&symbol, &bars).is_err() {
                    bars.sort_by_key(|bar| bar.date);
                    bars.dedup_by_key(|bar| bar.date);
                }
                (symbol, bars)
            })
            .collect();
        MemoryStore { series }
    }

    /// Append or replace one symbol's series
    pub fn insert(&mut self, symbol: Symbol, mut bars: Vec<Bar>) {
        bars.sort_by_key(|bar| bar.date);
        bars.dedup_by_key(|bar| bar.date);
        self.series.insert(symbol, bars);
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn series(&self, symbol: &Symbol) -> Option<&[Bar]> {
        self.series.get(symbol).map(Vec::as_slice)
    }
}

impl SeriesStore for MemoryStore {
    fn symbols(&self) -> Result<Vec<Symbol>, StoreError> {
        Ok(self.series.keys().cloned().collect())
    }

    fn fetch(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, StoreError> {
        let bars = self
            .series
            .get(symbol)
            .ok_or_else(|| StoreError::UnknownSymbol(symbol.clone()))?;

        let from = bars.partition_point(|bar| bar.date < start);
        let to = bars.partition_point(|bar| bar.date <= end);
        if from >= to {
            return Ok(Vec::new());
        }
        Ok(bars[from..to].to_vec())
    }
}
