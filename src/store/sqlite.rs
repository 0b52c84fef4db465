//! SQLite-backed series store over the `stock_detail` table
//!
//! Price and turnover columns are stored as text so decimals survive
//! untouched; REAL and INTEGER columns written by other tools are read too.

use chrono::{Datelike, NaiveDate};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::SeriesStore;
use crate::data::{parse_date, UniverseFilter};
use crate::error::StoreError;
use crate::{Bar, BarDetails, Money, Symbol};

const BAR_COLUMNS: &str = "dt, code, price_open, price_close, price_highest, price_lowest, \
     trade, trade_amount, amplitude, rise, amount_increase_decrease, turnover_rate, \
     stock_code, stock_name";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    universe: UniverseFilter,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the table exists
    pub fn open(path: impl AsRef<Path>, universe: UniverseFilter) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let store = Self {
            conn: Mutex::new(conn),
            universe,
        };
        store.create_schema()?;
        info!("SQLite series store opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory(universe: UniverseFilter) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            universe,
        };
        store.create_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS stock_detail (
                dt TEXT NOT NULL,
                code TEXT NOT NULL,
                price_open TEXT NOT NULL,
                price_close TEXT NOT NULL,
                price_highest TEXT NOT NULL,
                price_lowest TEXT NOT NULL,
                trade REAL,
                trade_amount TEXT NOT NULL,
                amplitude REAL,
                rise REAL,
                amount_increase_decrease REAL,
                turnover_rate REAL,
                stock_code TEXT,
                stock_name TEXT,
                PRIMARY KEY (code, dt)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_stock_detail_dt ON stock_detail(dt)",
            [],
        )?;
        debug!("stock_detail schema created/verified");
        Ok(())
    }

    /// Upsert bars in one transaction, returning the number of rows written
    pub fn insert_bars(&self, bars: &[Bar]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO stock_detail ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                BAR_COLUMNS
            ))?;
            for bar in bars {
                stmt.execute(params![
                    bar.date.format("%Y-%m-%d").to_string(),
                    bar.symbol.as_str(),
                    bar.open.to_string(),
                    bar.close.to_string(),
                    bar.high.to_string(),
                    bar.low.to_string(),
                    bar.details.volume,
                    bar.turnover.to_string(),
                    bar.details.amplitude,
                    bar.details.change_pct,
                    bar.details.change_amount,
                    bar.details.turnover_rate,
                    bar.details.listing_code,
                    bar.details.name,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Inserted {} bars into stock_detail", bars.len());
        Ok(bars.len())
    }

    /// Every stored row, unfiltered, ordered by code then date
    pub fn all_rows(&self) -> Result<Vec<Bar>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM stock_detail ORDER BY code, dt",
            BAR_COLUMNS
        ))?;
        let rows = stmt.query_map([], bar_from_row)?;
        let bars = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(bars)
    }
}

impl SeriesStore for SqliteStore {
    fn symbols(&self) -> Result<Vec<Symbol>, StoreError> {
        let conn = self.lock()?;
        // a symbol is served when any of its rows passes the universe filter
        let mut stmt = conn.prepare(
            "SELECT DISTINCT code, stock_name FROM stock_detail ORDER BY code",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut symbols: Vec<Symbol> = Vec::new();
        for row in rows {
            let (code, name) = row?;
            let symbol = Symbol::new(&code);
            if symbols.last() != Some(&symbol) && self.universe.admits(&symbol, name.as_deref()) {
                symbols.push(symbol);
            }
        }
        Ok(symbols)
    }

    fn fetch(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, StoreError> {
        let query_err = |e: rusqlite::Error| StoreError::Query {
            symbol: symbol.clone(),
            message: e.to_string(),
        };

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!(
                "SELECT {} FROM stock_detail WHERE code = ?1 AND dt >= ?2 AND dt <= ?3 ORDER BY dt",
                BAR_COLUMNS
            ))
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    symbol.as_str(),
                    date_key(start),
                    date_key(end),
                ],
                bar_from_row,
            )
            .map_err(query_err)?;

        let mut bars = Vec::new();
        for row in rows {
            let bar = row.map_err(query_err)?;
            if bar.is_suspended() || !self.universe.admits_bar(&bar) {
                continue;
            }
            if let Err(e) = bar.validate() {
                warn!("{} {}: {}", bar.symbol, bar.date, e);
                continue;
            }
            bars.push(bar);
        }
        Ok(bars)
    }
}

/// `dt` is compared as text, so keep keys within four-digit years
fn date_key(date: NaiveDate) -> String {
    match date.year() {
        y if y < 0 => "0000-01-01".to_string(),
        y if y > 9999 => "9999-12-31".to_string(),
        _ => date.format("%Y-%m-%d").to_string(),
    }
}

fn bar_from_row(row: &Row<'_>) -> rusqlite::Result<Bar> {
    let dt: String = row.get(0)?;
    let date = parse_date(&dt).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Text,
            format!("unparseable date '{}'", dt).into(),
        )
    })?;

    Ok(Bar {
        symbol: Symbol::new(row.get::<_, String>(1)?),
        date,
        open: money_at(row, 2)?,
        close: money_at(row, 3)?,
        high: money_at(row, 4)?,
        low: money_at(row, 5)?,
        turnover: money_at(row, 7)?,
        details: BarDetails {
            volume: row.get(6)?,
            amplitude: row.get(8)?,
            change_pct: row.get(9)?,
            change_amount: row.get(10)?,
            turnover_rate: row.get(11)?,
            listing_code: row.get(12)?,
            name: row.get(13)?,
        },
    })
}

fn money_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Money> {
    match row.get_ref(idx)? {
        ValueRef::Integer(v) => Ok(Money::from_i64(v)),
        ValueRef::Real(v) => Ok(Money::from_f64(v)),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })?;
            Money::from_str(text).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        }
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "money".to_string(),
            other.data_type(),
        )),
    }
}
