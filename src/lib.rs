//! K-line Pattern Screener
//!
//! Screens daily bars of many stocks for a volume-breakout pattern: a
//! bullish target day trading well above its recent turnover, a heavier
//! "disagreement" day shortly after, and a later close that reclaims the
//! disagreement day's body top without breaking out early.
//!
//! Scans run forward over a date range or backward from a confirmation date,
//! reading bars from a CSV export or a SQLite `stock_detail` table.

pub mod config;
pub mod data;
pub mod error;
pub mod pattern;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, DataError, StoreError};
pub use pattern::{
    PatternMatch, PatternParams, PatternScanner, ScanMode, ScanReport, TargetDay, TargetReport,
};
pub use store::{MemoryStore, SeriesStore, SqliteStore};
pub use types::*;
