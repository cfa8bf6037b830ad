//! Preparation pipeline against stores: boundary runs, exclude list, Parquet files.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use corrlab_core::data::file_store::{write_daily_bars, write_intraday_series};
use corrlab_core::data::{
    load_exclude_list, FileExcludeList, FileStore, MemoryExcludeList, MemoryStore, RawBar,
    RawFrame, SourceKind,
};
use corrlab_core::{Preparer, Rejection, WINDOW_SIZE};

// ── Helpers ──────────────────────────────────────────────────────────

fn stamps(n: usize) -> Vec<NaiveDateTime> {
    let base = NaiveDate::from_ymd_opt(2021, 1, 4)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..n).map(|i| base + Duration::days(i as i64)).collect()
}

fn wiggle(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.01).collect()
}

fn with_gap(n: usize, start: usize, len: usize) -> Vec<f64> {
    let mut v = wiggle(n);
    for x in &mut v[start..start + len] {
        *x = f64::NAN;
    }
    v
}

fn with_plateau(n: usize, start: usize, len: usize) -> Vec<f64> {
    let mut v = wiggle(n);
    for x in &mut v[start..start + len] {
        *x = 77.0;
    }
    v
}

fn prepare_values(values: Vec<f64>) -> Result<usize, Rejection> {
    let store = MemoryStore::new();
    store.insert(
        "X",
        SourceKind::FileDaily,
        RawFrame::single(stamps(values.len()), "close", values),
    );
    let exclude = MemoryExcludeList::new();
    Preparer::new(&store, &exclude)
        .prepare("X", SourceKind::FileDaily)
        .map(|p| p.len())
}

// ── Boundaries ───────────────────────────────────────────────────────

#[test]
fn gap_one_short_of_window_is_accepted() {
    let prepared = prepare_values(with_gap(60, 20, WINDOW_SIZE - 1)).unwrap();
    // Each missing point kills the difference on both sides of it.
    assert_eq!(prepared, 60 - 1 - WINDOW_SIZE);
}

#[test]
fn gap_of_window_is_rejected() {
    assert!(matches!(
        prepare_values(with_gap(60, 20, WINDOW_SIZE)),
        Err(Rejection::Continuity { .. })
    ));
}

#[test]
fn plateau_one_short_of_window_is_accepted() {
    assert!(prepare_values(with_plateau(60, 5, WINDOW_SIZE - 1)).is_ok());
}

#[test]
fn plateau_of_window_is_rejected() {
    assert!(matches!(
        prepare_values(with_plateau(60, 5, WINDOW_SIZE)),
        Err(Rejection::Repetition { value, .. }) if value == 77.0
    ));
}

// ── Exclude list ─────────────────────────────────────────────────────

#[test]
fn structural_rejects_reach_the_exclude_file() {
    let dir = tempfile::tempdir().unwrap();
    let exclude_path = dir.path().join("files_to_delete.txt");
    let exclude = FileExcludeList::new(&exclude_path);

    let store = MemoryStore::new();
    store.insert("EMPTY", SourceKind::FileDaily, RawFrame::single(vec![], "close", vec![]));
    store.insert(
        "ALLNAN",
        SourceKind::FileDaily,
        RawFrame::single(stamps(15), "close", vec![f64::NAN; 15]),
    );
    store.insert(
        "GOOD",
        SourceKind::FileDaily,
        RawFrame::single(stamps(15), "close", wiggle(15)),
    );

    let preparer = Preparer::new(&store, &exclude);
    for symbol in ["EMPTY", "ALLNAN", "GOOD", "MISSING"] {
        let _ = preparer.prepare(symbol, SourceKind::FileDaily);
    }

    let excluded = load_exclude_list(&exclude_path).unwrap();
    assert_eq!(
        excluded.into_iter().collect::<Vec<_>>(),
        vec!["ALLNAN".to_string(), "EMPTY".to_string()]
    );
}

// ── Parquet files ────────────────────────────────────────────────────

#[test]
fn daily_and_intraday_files_prepare() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path(), NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());

    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let bars: Vec<RawBar> = wiggle(40)
        .into_iter()
        .enumerate()
        .map(|(i, c)| RawBar {
            date: start + Duration::days(i as i64),
            open: c - 0.5,
            high: c + 1.0,
            low: c - 1.0,
            close: c,
            adj_close: c * 0.98,
            volume: 10_000 + i as u64,
        })
        .collect();
    write_daily_bars(&store.daily_path("SPY"), &bars).unwrap();
    write_intraday_series(&store.intraday_path("SPY"), &stamps(25), &wiggle(25)).unwrap();

    let exclude = MemoryExcludeList::new();
    let preparer = Preparer::new(&store, &exclude);

    let daily = preparer.prepare("SPY", SourceKind::FileDaily).unwrap();
    assert_eq!(daily.len(), 39);
    let expected = (bars[1].adj_close - bars[0].adj_close).abs();
    assert!((daily.values()[0].abs() - expected).abs() < 1e-9);

    let intraday = preparer.prepare("SPY", SourceKind::FileIntraday).unwrap();
    assert_eq!(intraday.len(), 24);

    assert!(matches!(
        preparer.prepare("QQQ", SourceKind::FileDaily),
        Err(Rejection::NoData(_))
    ));
    assert!(exclude.symbols().is_empty());
}
