//! Data loading and management
//!
//! Reads daily bars from CSV exports of the `stock_detail` table, applies the
//! universe filter and hands back one date-ordered series per symbol.

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::DataError;
use crate::store::ensure_ordered;
use crate::{Bar, BarDetails, Money, Symbol};

/// Per-symbol bar sequences keyed and iterated in symbol order
pub type SeriesMap = BTreeMap<Symbol, Vec<Bar>>;

// =============================================================================
// CSV Data Loading
// =============================================================================

/// One row of the `stock_detail` table as exported to CSV
#[derive(Debug, Deserialize)]
struct BarRow {
    dt: String,
    code: String,
    price_open: String,
    price_close: String,
    price_highest: String,
    price_lowest: String,
    #[serde(default)]
    trade: Option<f64>,
    trade_amount: String,
    #[serde(default)]
    amplitude: Option<f64>,
    #[serde(default)]
    rise: Option<f64>,
    #[serde(default)]
    amount_increase_decrease: Option<f64>,
    #[serde(default)]
    turnover_rate: Option<f64>,
    #[serde(default)]
    stock_code: Option<String>,
    #[serde(default)]
    stock_name: Option<String>,
}

impl BarRow {
    fn into_bar(self, row: usize) -> Result<Bar, DataError> {
        let money = |field: &'static str, value: &str| {
            Money::from_str(value).map_err(|_| DataError::Field {
                row,
                field,
                value: value.to_string(),
            })
        };

        Ok(Bar {
            date: parse_date(&self.dt).ok_or_else(|| DataError::Field {
                row,
                field: "dt",
                value: self.dt.clone(),
            })?,
            open: money("price_open", &self.price_open)?,
            close: money("price_close", &self.price_close)?,
            high: money("price_highest", &self.price_highest)?,
            low: money("price_lowest", &self.price_lowest)?,
            turnover: money("trade_amount", &self.trade_amount)?,
            symbol: Symbol::new(self.code.trim()),
            details: BarDetails {
                name: self.stock_name,
                volume: self.trade,
                amplitude: self.amplitude,
                change_pct: self.rise,
                change_amount: self.amount_increase_decrease,
                turnover_rate: self.turnover_rate,
                listing_code: self.stock_code,
            },
        })
    }
}

/// Parse `YYYY-MM-DD`, also tolerating `YYYY/MM/DD` and `YYYYMMDD`
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    // Datetime exports carry a midnight time component
    let s = s.split_whitespace().next().unwrap_or(s);
    ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Read every row of a CSV file in file order, without dropping anything.
///
/// Malformed rows (unparseable numbers or dates) are an error.
pub fn load_csv_rows(path: impl AsRef<Path>) -> Result<Vec<Bar>, DataError> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|source| DataError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    reader
        .deserialize::<BarRow>()
        .enumerate()
        .map(|(idx, result)| {
            let row = idx + 1;
            let record = result.map_err(|source| DataError::Row { row, source })?;
            record.into_bar(row)
        })
        .collect()
}

/// Load every usable bar from a CSV file.
///
/// Suspended-session placeholders and rows that fail validation are dropped;
/// malformed rows are an error.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Bar>, DataError> {
    let path = path.as_ref();
    let rows = load_csv_rows(path)?;
    let total = rows.len();

    let mut bars = Vec::with_capacity(total);
    let mut suspended = 0usize;
    let mut invalid = 0usize;

    for (idx, bar) in rows.into_iter().enumerate() {
        if bar.is_suspended() {
            suspended += 1;
            continue;
        }
        if let Err(e) = bar.validate() {
            warn!("Row {} ({} {}): {}", idx + 1, bar.symbol, bar.date, e);
            invalid += 1;
            continue;
        }
        bars.push(bar);
    }

    debug!(
        "Read {} bars from {} ({} suspended, {} invalid dropped)",
        bars.len(),
        path.display(),
        suspended,
        invalid
    );

    Ok(bars)
}

/// Split a flat table into per-symbol series sorted by date.
///
/// A repeated date keeps its first row.
pub fn group_by_symbol(bars: Vec<Bar>) -> SeriesMap {
    bars.into_iter()
        .into_group_map_by(|bar| bar.symbol.clone())
        .into_iter()
        .map(|(symbol, mut series)| {
            series.sort_by_key(|bar| bar.date);
            let before = series.len();
            series.dedup_by_key(|bar| bar.date);
            if series.len() != before {
                warn!(
                    "Dropped {} duplicate dates for {}",
                    before - series.len(),
                    symbol
                );
            }
            (symbol, series)
        })
        .collect()
}

/// Load a CSV table and keep only the symbols the universe admits
pub fn load_series(
    path: impl AsRef<Path>,
    universe: &UniverseFilter,
) -> Result<SeriesMap, DataError> {
    let bars = load_csv(path.as_ref())?;
    let total = bars.len();

    let bars = universe.retain_rows(bars);

    let series = group_by_symbol(bars);
    info!(
        "Loaded {} symbols from {} ({} rows before universe filter)",
        series.len(),
        path.as_ref().display(),
        total
    );

    Ok(series)
}

// =============================================================================
// Universe Filter
// =============================================================================

/// Which instruments take part in a scan.
///
/// Defaults leave out the STAR market (`688`), the Beijing exchange (`920`)
/// and special-treatment names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseFilter {
    #[serde(default = "default_excluded_prefixes")]
    pub exclude_code_prefixes: Vec<String>,
    /// Matched case-insensitively anywhere in the display name
    #[serde(default = "default_excluded_keywords")]
    pub exclude_name_keywords: Vec<String>,
}

fn default_excluded_prefixes() -> Vec<String> {
    vec!["688".to_string(), "920".to_string()]
}

fn default_excluded_keywords() -> Vec<String> {
    vec!["ST".to_string()]
}

impl Default for UniverseFilter {
    fn default() -> Self {
        UniverseFilter {
            exclude_code_prefixes: default_excluded_prefixes(),
            exclude_name_keywords: default_excluded_keywords(),
        }
    }
}

impl UniverseFilter {
    /// Admit everything
    pub fn allow_all() -> Self {
        UniverseFilter {
            exclude_code_prefixes: Vec::new(),
            exclude_name_keywords: Vec::new(),
        }
    }

    /// Judge one row on its own code and name.
    ///
    /// A symbol renamed in or out of special treatment keeps only the rows
    /// dated under an admitted name.
    pub fn admits_bar(&self, bar: &Bar) -> bool {
        self.admits(&bar.symbol, bar.details.name.as_deref())
    }

    pub fn retain_rows(&self, bars: Vec<Bar>) -> Vec<Bar> {
        bars.into_iter().filter(|bar| self.admits_bar(bar)).collect()
    }

    pub fn admits(&self, symbol: &Symbol, name: Option<&str>) -> bool {
        if self
            .exclude_code_prefixes
            .iter()
            .any(|prefix| symbol.as_str().starts_with(prefix.as_str()))
        {
            return false;
        }

        match name {
            Some(name) => {
                let name = name.to_lowercase();
                !self
                    .exclude_name_keywords
                    .iter()
                    .any(|kw| name.contains(&kw.to_lowercase()))
            }
            None => true,
        }
    }
}

// =============================================================================
// Data Validation
// =============================================================================

/// Validate one symbol's series for consistency
pub fn validate_bars(bars: &[Bar]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(first) = bars.first() else {
        errors.push("No bars provided".to_string());
        return ValidationResult { errors, warnings };
    };

    for (i, bar) in bars.iter().enumerate() {
        if let Err(e) = bar.validate() {
            errors.push(format!("Bar {} ({}): {}", i, bar.date, e));
        }
        if bar.is_suspended() {
            warnings.push(format!("Bar {} ({}): suspended placeholder", i, bar.date));
        }
        if bar.symbol != first.symbol {
            errors.push(format!(
                "Bar {}: symbol {} differs from {}",
                i, bar.symbol, first.symbol
            ));
        }
    }

    if let Err(e) = ensure_ordered(&first.symbol, bars) {
        errors.push(e.to_string());
    }

    ValidationResult { errors, warnings }
}

/// Validate a raw table per symbol, keeping each symbol's rows in table order
pub fn validate_table(rows: Vec<Bar>) -> BTreeMap<Symbol, ValidationResult> {
    rows.into_iter()
        .into_group_map_by(|bar| bar.symbol.clone())
        .into_iter()
        .map(|(symbol, series)| (symbol, validate_bars(&series)))
        .collect()
}

/// Result of data validation
#[derive(Debug)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
