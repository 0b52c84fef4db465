//! Integration tests for the kline-screener system
//!
//! These tests drive the scanner end to end through the stores with
//! synthetic bar series.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use std::collections::BTreeMap;

use kline_screener::data::{self, UniverseFilter};
use kline_screener::pattern::rolling::trailing_turnover_avg;
use kline_screener::pattern::detector::target_days;
use kline_screener::pattern::scanner::SkipReason;
use kline_screener::pattern::Direction;
use kline_screener::{
    Bar, BarDetails, Config, MemoryStore, Money, PatternParams, PatternScanner, ScanMode,
    SeriesStore, SqliteStore, StoreError, Symbol,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + Duration::days(i as i64)
}

/// Build a series from (open, close, turnover) triples, one calendar day apart
fn generate_series(symbol: &str, rows: &[(i64, i64, i64)]) -> Vec<Bar> {
    rows.iter()
        .enumerate()
        .map(|(i, &(open, close, turnover))| Bar {
            symbol: Symbol::new(symbol),
            date: day(i),
            open: Money::from_i64(open),
            close: Money::from_i64(close),
            high: Money::from_i64(open.max(close) + 1),
            low: Money::from_i64(open.min(close) - 1),
            turnover: Money::from_i64(turnover),
            details: BarDetails {
                name: Some(format!("Name {}", symbol)),
                volume: Some(turnover as f64 / 10.0),
                turnover_rate: Some(1.5),
                ..BarDetails::default()
            },
        })
        .collect()
}

/// Five quiet bars that give a trailing average of 10
fn quiet_start() -> Vec<(i64, i64, i64)> {
    vec![(10, 10, 10); 5]
}

/// Two qualifying target days (index 5 and 11) that both confirm on index 14
fn two_targets_one_anchor() -> Vec<(i64, i64, i64)> {
    let mut rows = quiet_start();
    rows.push((10, 12, 40)); // 5: target A, body top 12
    rows.extend(vec![(11, 11, 5); 5]); // 6..=10
    rows.push((11, 12, 40)); // 11: target B, avg of 6..=10 is 5
    rows.push((11, 11, 5)); // 12
    rows.push((11, 11, 5)); // 13
    rows.push((11, 12, 30)); // 14: anchor, 30 >= 0.67 * 40
    rows
}

fn store_with(series: Vec<Vec<Bar>>) -> MemoryStore {
    let mut store = MemoryStore::new();
    for bars in series {
        let symbol = bars[0].symbol.clone();
        store.insert(symbol, bars);
    }
    store
}

fn forward_all(store: &MemoryStore, symbols: &[Symbol]) -> kline_screener::ScanReport {
    PatternScanner::default().scan_forward(store, symbols, day(0), day(60))
}

/// Delegates to a memory store but fails for chosen symbols
struct FlakyStore {
    inner: MemoryStore,
    broken: Vec<Symbol>,
}

impl SeriesStore for FlakyStore {
    fn symbols(&self) -> Result<Vec<Symbol>, StoreError> {
        self.inner.symbols()
    }

    fn fetch(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, StoreError> {
        if self.broken.contains(symbol) {
            return Err(StoreError::Query {
                symbol: symbol.clone(),
                message: "connection reset".to_string(),
            });
        }
        self.inner.fetch(symbol, start, end)
    }
}

// =============================================================================
// Target Day Tests
// =============================================================================

#[test]
fn test_breakout_on_sixth_bar_is_target_day() {
    let mut rows = quiet_start();
    rows.push((10, 11, 40));
    let bars = generate_series("600000", &rows);

    let avgs = trailing_turnover_avg(&bars, 5);
    assert_eq!(avgs[5], Some(Money::from_i64(10)));
    assert_eq!(
        target_days(&bars, &avgs, PatternParams::default().breakout_multiple),
        vec![5]
    );
}

// =============================================================================
// Forward Scan Tests
// =============================================================================

#[test]
fn test_forward_reports_full_match_record() {
    let bars = generate_series("600000", &two_targets_one_anchor());
    let store = store_with(vec![bars.clone()]);
    let report = forward_all(&store, &[Symbol::new("600000")]);

    assert_eq!(report.matches.len(), 2);
    let first = &report.matches[0];
    assert_eq!(first.bar, bars[5]);
    assert_eq!(first.bar.details.name.as_deref(), Some("Name 600000"));
    assert_eq!(first.direction, Direction::Forward);
    assert_eq!(first.disagreement_date, day(5));
    // index 11 is the first close back at 12
    assert_eq!(first.confirmation_date, day(11));

    let second = &report.matches[1];
    assert_eq!(second.target_date(), day(11));
    assert_eq!(second.confirmation_date, day(14));
}

#[test]
fn test_forward_rejects_spacing_of_two() {
    let mut rows = quiet_start();
    rows.push((10, 12, 40)); // 5: target
    rows.push((11, 11, 5)); // 6
    rows.push((12, 13, 5)); // 7: first close >= 12, only two days on
    rows.push((13, 14, 5)); // 8: a later close does not rescue it
    rows.push((13, 14, 5));
    let store = store_with(vec![generate_series("600000", &rows)]);

    let report = forward_all(&store, &[Symbol::new("600000")]);
    assert!(report.matches.is_empty());
    assert!(report.skipped.is_empty());
}

fn breach_rows(day_after_target_close: i64) -> Vec<(i64, i64, i64)> {
    let mut rows = quiet_start();
    rows.push((10, 12, 40)); // 5: target
    rows.push((12, day_after_target_close, 5)); // 6
    rows.push((15, 14, 90)); // 7: disagreement, body top 15
    rows.push((13, 14, 5)); // 8
    rows.push((13, 14, 5)); // 9
    rows.push((14, 15, 5)); // 10: confirmation
    rows
}

#[test]
fn test_forward_rejects_premature_breach() {
    let store = store_with(vec![
        generate_series("000001", &breach_rows(16)),
        generate_series("000002", &breach_rows(13)),
    ]);
    let report = forward_all(&store, &[Symbol::new("000001"), Symbol::new("000002")]);

    // 000001 closed at 16 above 15 before the disagreement day
    assert_eq!(report.matches.len(), 1);
    let m = &report.matches[0];
    assert_eq!(m.symbol(), &Symbol::new("000002"));
    assert_eq!(m.disagreement_date, day(7));
    assert_eq!(m.disagreement_max_price, Money::from_i64(15));
    assert_eq!(m.disagreement_turnover, Money::from_i64(90));
    assert_eq!(m.confirmation_date, day(10));
}

#[test]
fn test_forward_scan_is_idempotent_and_sorted() {
    let store = store_with(vec![
        generate_series("600003", &two_targets_one_anchor()),
        generate_series("000002", &breach_rows(13)),
        generate_series("300001", &two_targets_one_anchor()),
    ]);
    let symbols = vec![
        Symbol::new("600003"),
        Symbol::new("000002"),
        Symbol::new("300001"),
    ];

    let first = forward_all(&store, &symbols);
    let second = forward_all(&store, &symbols);
    assert_eq!(first.matches, second.matches);

    let keys: Vec<_> = first
        .matches
        .iter()
        .map(|m| (m.symbol().clone(), m.target_date()))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert_eq!(keys.len(), 5);
}

// =============================================================================
// Backward Scan Tests
// =============================================================================

#[test]
fn test_backward_returns_nearest_target_only() {
    let store = store_with(vec![generate_series("600000", &two_targets_one_anchor())]);
    let report = PatternScanner::default().scan_backward(
        &store,
        &[Symbol::new("600000")],
        day(14),
        None,
    );

    assert_eq!(report.matches.len(), 1);
    let m = &report.matches[0];
    assert_eq!(m.target_date(), day(11));
    assert_eq!(m.direction, Direction::Backward);
    assert_eq!(m.confirmation_date, day(14));
}

#[test]
fn test_backward_falls_back_to_earlier_target() {
    // day 13 outtrades target 11, so its anchor turnover floor becomes 67
    let mut rows = two_targets_one_anchor();
    rows[13] = (11, 11, 100);
    let store = store_with(vec![generate_series("600000", &rows)]);
    let scanner = PatternScanner::default();

    let report = scanner.scan_backward(&store, &[Symbol::new("600000")], day(14), None);
    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.matches[0].target_date(), day(5));

    // a lookback of zero only considers the candidate at anchor - 3
    let report = scanner.scan_backward(&store, &[Symbol::new("600000")], day(14), Some(0));
    assert!(report.matches.is_empty());
}

#[test]
fn test_backward_premature_breach_rejects_all_candidates() {
    let mut rows = two_targets_one_anchor();
    rows[12] = (11, 13, 5);
    let store = store_with(vec![generate_series("600000", &rows)]);
    let report = PatternScanner::default().scan_backward(
        &store,
        &[Symbol::new("600000")],
        day(14),
        None,
    );
    assert!(report.matches.is_empty());
}

#[test]
fn test_backward_requires_anchor_turnover() {
    let mut rows = two_targets_one_anchor();
    rows[14] = (11, 12, 26); // below 0.67 * 40
    let store = store_with(vec![generate_series("600000", &rows)]);
    let report = PatternScanner::default().scan_backward(
        &store,
        &[Symbol::new("600000")],
        day(14),
        None,
    );
    assert!(report.matches.is_empty());
}

#[test]
fn test_backward_skips_symbol_without_anchor_bar() {
    let store = store_with(vec![generate_series("600000", &two_targets_one_anchor())]);
    let report = PatternScanner::default().scan_backward(
        &store,
        &[Symbol::new("600000")],
        day(43),
        None,
    );
    assert!(report.matches.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::AnchorMissing);
}

// =============================================================================
// Failure Isolation Tests
// =============================================================================

#[test]
fn test_store_failure_does_not_abort_other_symbols() {
    let store = FlakyStore {
        inner: store_with(vec![
            generate_series("600000", &two_targets_one_anchor()),
            generate_series("600001", &two_targets_one_anchor()),
        ]),
        broken: vec![Symbol::new("600000")],
    };
    let symbols = store.symbols().unwrap();
    let report = PatternScanner::default().scan_forward(&store, &symbols, day(0), day(60));

    assert_eq!(report.symbols_scanned, 2);
    assert_eq!(report.matched_symbols().len(), 1);
    assert!(report.matches.iter().all(|m| m.symbol().as_str() == "600001"));
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].retryable);
    assert_eq!(report.retryable_symbols(), vec![Symbol::new("600000")]);
}

// =============================================================================
// Store Integration Tests
// =============================================================================

/// Textbook breakout at 5 confirmed on 8, traded as "*ST Foo" until day 4
fn renamed_out_of_special_treatment() -> Vec<Bar> {
    let mut rows = quiet_start();
    rows.extend([(10, 12, 40), (12, 11, 5), (11, 11, 5), (11, 12, 30)]);
    generate_series("600002", &rows)
        .into_iter()
        .enumerate()
        .map(|(i, mut bar)| {
            bar.details.name = Some(if i < 5 { "*ST Foo" } else { "Foo" }.to_string());
            bar
        })
        .collect()
}

#[test]
fn test_sqlite_and_memory_stores_agree() {
    let universe = UniverseFilter::default();
    let mut bars = generate_series("600000", &two_targets_one_anchor());
    bars.extend(renamed_out_of_special_treatment());

    // the memory store sees what the CSV loader keeps
    let memory = MemoryStore::from_series(data::group_by_symbol(universe.retain_rows(bars.clone())));
    let sqlite = SqliteStore::open_in_memory(universe).unwrap();
    sqlite.insert_bars(&bars).unwrap();

    let scanner = PatternScanner::default();
    let symbols = sqlite.symbols().unwrap();
    assert_eq!(symbols, vec![Symbol::new("600000"), Symbol::new("600002")]);
    assert_eq!(memory.symbols().unwrap(), symbols);

    for mode in [
        ScanMode::Forward {
            start: day(0),
            end: day(14),
        },
        ScanMode::Backward {
            anchor: day(14),
            lookback: 50,
        },
        ScanMode::Backward {
            anchor: day(8),
            lookback: 50,
        },
    ] {
        let from_sqlite = scanner.scan(&sqlite, &symbols, mode);
        let from_memory = scanner.scan(&memory, &symbols, mode);
        assert_eq!(from_sqlite.matches, from_memory.matches);
        // the renamed symbol lost its average history with the "*ST" rows
        assert!(from_sqlite
            .matches
            .iter()
            .all(|m| m.symbol().as_str() == "600000"));
    }

    let forward = scanner.scan_forward(&sqlite, &symbols, day(0), day(14));
    assert_eq!(forward.matches.len(), 2);
}

#[test]
fn test_target_listing_through_sqlite() {
    let sqlite = SqliteStore::open_in_memory(UniverseFilter::default()).unwrap();
    let mut bars = generate_series("600000", &two_targets_one_anchor());
    bars.extend(renamed_out_of_special_treatment());
    sqlite.insert_bars(&bars).unwrap();

    let symbols = sqlite.symbols().unwrap();
    let report = PatternScanner::default().scan_targets(&sqlite, &symbols, day(0), day(14));

    let listed: Vec<_> = report
        .targets
        .iter()
        .map(|t| (t.bar.symbol.as_str(), t.bar.date))
        .collect();
    assert_eq!(listed, vec![("600000", day(5)), ("600000", day(11))]);
    assert_eq!(report.targets[0].avg_turnover, Money::from_i64(10));
    assert_eq!(report.targets[1].avg_turnover, Money::from_i64(5));
    assert!(report.failures.is_empty());
}

#[test]
fn test_sqlite_raw_rows_report_bad_prices() {
    let mut bars = generate_series("600000", &two_targets_one_anchor());
    { let b = &mut bars[3]; std::mem::swap(&mut b.high, &mut b.low); }
    bars[4].turnover = Money::ZERO;

    let universe = UniverseFilter::default();
    let sqlite = SqliteStore::open_in_memory(universe.clone()).unwrap();
    sqlite.insert_bars(&bars).unwrap();

    // the scan path never sees either row
    let fetched = sqlite.fetch(&Symbol::new("600000"), day(0), day(14)).unwrap();
    assert_eq!(fetched.len(), bars.len() - 2);

    let report = data::validate_table(universe.retain_rows(sqlite.all_rows().unwrap()));
    let result = &report[&Symbol::new("600000")];
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("must be >= low"));
    assert_eq!(result.warnings.len(), 1);
}

#[test]
fn test_csv_load_filters_universe_and_scans() {
    let header = "dt,code,price_open,price_close,price_highest,price_lowest,trade,trade_amount,amplitude,rise,amount_increase_decrease,turnover_rate,stock_code,stock_name";
    let mut body = String::from(header);
    for (code, name) in [("600000", "Pudong Bank"), ("688001", "Chip Maker"), ("000004", "*ST Foo")] {
        for bar in generate_series(code, &two_targets_one_anchor()) {
            body.push_str(&format!(
                "\n{},{},{},{},{},{},,{},,,,,sh{},{}",
                bar.date, code, bar.open, bar.close, bar.high, bar.low, bar.turnover, code, name
            ));
        }
    }
    let path = std::env::temp_dir().join(format!("kline_it_{}.csv", std::process::id()));
    std::fs::write(&path, body).unwrap();

    let series = data::load_series(&path, &UniverseFilter::default()).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(series.keys().cloned().collect::<Vec<_>>(), vec![Symbol::new("600000")]);
    let store = MemoryStore::from_series(series);
    let report = PatternScanner::default().scan_backward(
        &store,
        &store.symbols().unwrap(),
        day(14),
        None,
    );
    assert_eq!(report.matches.len(), 1);
    assert_eq!(
        report.matches[0].bar.details.listing_code.as_deref(),
        Some("sh600000")
    );
}

#[test]
fn test_report_serializes_to_json() {
    let store = store_with(vec![generate_series("600000", &two_targets_one_anchor())]);
    let report = PatternScanner::default().scan_backward(
        &store,
        &[Symbol::new("600000")],
        day(14),
        None,
    );

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["mode"]["mode"], "backward");
    assert_eq!(json["matches"][0]["bar"]["symbol"], "600000");
    assert_eq!(json["matches"][0]["direction"], "backward");
    assert_eq!(json["matches"][0]["disagreement_max_price"], "12");
}

#[test]
fn test_default_config_matches_documented_defaults() {
    let config = Config::default();
    assert_eq!(config.pattern, PatternParams::default());
    assert_eq!(config.pattern.lookback_days, 50);
    assert_eq!(config.universe, UniverseFilter::default());
    assert!(config.validate().is_ok());
}

// =============================================================================
// Property Tests
// =============================================================================

fn bar_rows() -> impl Strategy<Value = Vec<(i64, i64, i64)>> {
    prop::collection::vec((1i64..40, 1i64..40, 1i64..300), 0..60)
}

proptest! {
    #[test]
    fn prop_no_target_day_without_full_average(rows in bar_rows()) {
        let bars = generate_series("600000", &rows);
        let params = PatternParams::default();
        let avgs = trailing_turnover_avg(&bars, params.avg_window);

        for (i, avg) in avgs.iter().enumerate() {
            prop_assert_eq!(avg.is_none(), i < params.avg_window);
        }
        for target in target_days(&bars, &avgs, params.breakout_multiple) {
            prop_assert!(target >= params.avg_window);
        }
    }

    #[test]
    fn prop_forward_scan_is_idempotent(a in bar_rows(), b in bar_rows()) {
        let mut series = Vec::new();
        if !a.is_empty() {
            series.push(generate_series("600000", &a));
        }
        if !b.is_empty() {
            series.push(generate_series("000001", &b));
        }
        let store = store_with(series);
        let symbols = vec![Symbol::new("600000"), Symbol::new("000001")];

        let first = forward_all(&store, &symbols);
        let second = forward_all(&store, &symbols);
        prop_assert_eq!(&first.matches, &second.matches);

        for m in &first.matches {
            prop_assert!(m.confirmation_date > m.target_date());
            prop_assert!((m.confirmation_date - m.target_date()).num_days() >= 3);
        }
    }

    #[test]
    fn prop_backward_at_most_one_match_per_symbol(
        a in bar_rows(),
        b in bar_rows(),
        anchor in 0usize..60,
    ) {
        let mut series = Vec::new();
        if !a.is_empty() {
            series.push(generate_series("600000", &a));
        }
        if !b.is_empty() {
            series.push(generate_series("000001", &b));
        }
        let store = store_with(series);
        let symbols = vec![Symbol::new("600000"), Symbol::new("000001")];

        let report = PatternScanner::default().scan_backward(&store, &symbols, day(anchor), None);

        let mut per_symbol: BTreeMap<Symbol, usize> = BTreeMap::new();
        for m in &report.matches {
            *per_symbol.entry(m.symbol().clone()).or_default() += 1;
            prop_assert_eq!(m.confirmation_date, day(anchor));
        }
        prop_assert!(per_symbol.values().all(|&n| n == 1));
    }
}
