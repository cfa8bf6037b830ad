//! File-backed series store with optional live-download and warehouse backends.
//!
//! Layout:
//! - daily bars:    `{data_dir}/daily/{SYMBOL}.parquet`    (`Date`, `Adj Close`, ...)
//! - intraday bars: `{data_dir}/intraday/{SYMBOL}.parquet` (`timestamp`, `close`, ...)
//!
//! Live downloads are written back to the daily layout atomically (write to
//! `.tmp`, rename into place) so the next run can read them as files.

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::frame::{RawColumn, RawFrame};
use super::provider::{DataError, DataProvider, RawBar};
use super::store::{SeriesStore, SourceKind};
use super::warehouse::WarehouseClient;

const DAILY_TIMESTAMP_COLUMNS: [&str; 3] = ["Date", "date", "timestamp"];
const DAILY_VALUE_COLUMNS: [&str; 2] = ["Adj Close", "adj_close"];
const INTRADAY_TIMESTAMP_COLUMNS: [&str; 2] = ["timestamp", "Datetime"];
const INTRADAY_VALUE_COLUMNS: [&str; 2] = ["close", "Close"];

/// Reads Parquet bar files from a data directory.
pub struct FileStore {
    data_dir: PathBuf,
    provider: Option<Arc<dyn DataProvider>>,
    warehouse: Option<WarehouseClient>,
    download_start: NaiveDate,
    end_date: NaiveDate,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>, end_date: NaiveDate) -> Self {
        Self {
            data_dir: data_dir.into(),
            provider: None,
            warehouse: None,
            download_start: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN),
            end_date,
        }
    }

    /// Enable `SourceKind::LiveDownload` through `provider`.
    pub fn with_provider(mut self, provider: Arc<dyn DataProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Enable `SourceKind::Warehouse`.
    pub fn with_warehouse(mut self, warehouse: WarehouseClient) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn daily_path(&self, symbol: &str) -> PathBuf {
        self.data_dir.join("daily").join(format!("{symbol}.parquet"))
    }

    pub fn intraday_path(&self, symbol: &str) -> PathBuf {
        self.data_dir.join("intraday").join(format!("{symbol}.parquet"))
    }

    fn read_daily(&self, symbol: &str) -> Result<RawFrame, DataError> {
        let path = self.daily_path(symbol);
        let df = read_parquet(symbol, &path)?;
        frame_from_dataframe(&df, &DAILY_TIMESTAMP_COLUMNS, &DAILY_VALUE_COLUMNS)
    }

    fn read_intraday(&self, symbol: &str) -> Result<RawFrame, DataError> {
        let path = self.intraday_path(symbol);
        let df = read_parquet(symbol, &path)?;
        frame_from_dataframe(&df, &INTRADAY_TIMESTAMP_COLUMNS, &INTRADAY_VALUE_COLUMNS)
    }

    fn download(&self, symbol: &str) -> Result<RawFrame, DataError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| DataError::UnsupportedSource(SourceKind::LiveDownload.to_string()))?;
        if !provider.is_available() {
            return Err(DataError::CircuitBreakerTripped);
        }
        debug!(symbol, provider = provider.name(), "downloading daily bars");
        let bars = provider.fetch(symbol, self.download_start, self.end_date)?;

        // A failed write only costs the next run a re-download.
        if let Err(e) = write_daily_bars(&self.daily_path(symbol), &bars) {
            warn!(symbol, error = %e, "could not persist downloaded bars");
        }
        Ok(RawFrame::from_bars(&bars))
    }
}

impl SeriesStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn supports(&self, source: SourceKind) -> bool {
        match source {
            SourceKind::FileDaily | SourceKind::FileIntraday => true,
            SourceKind::LiveDownload => self.provider.is_some(),
            SourceKind::Warehouse => self.warehouse.is_some(),
        }
    }

    fn fetch(&self, symbol: &str, source: SourceKind) -> Result<RawFrame, DataError> {
        match source {
            SourceKind::FileDaily => self.read_daily(symbol),
            SourceKind::FileIntraday => self.read_intraday(symbol),
            SourceKind::LiveDownload => self.download(symbol),
            SourceKind::Warehouse => match &self.warehouse {
                Some(wh) => wh.fetch_series(symbol, self.end_date),
                None => Err(DataError::UnsupportedSource(source.to_string())),
            },
        }
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn read_parquet(symbol: &str, path: &Path) -> Result<DataFrame, DataError> {
    if !path.exists() {
        return Err(DataError::MissingFile {
            symbol: symbol.to_string(),
            path: path.display().to_string(),
        });
    }
    let file = fs::File::open(path)?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::Parquet(format!("read {}: {e}", path.display())))
}

/// Convert a DataFrame into a `RawFrame`.
///
/// The first present name in `ts_names` becomes the index; every other
/// numeric column is carried along so the structural check can see it.
fn frame_from_dataframe(
    df: &DataFrame,
    ts_names: &[&str],
    value_names: &[&str],
) -> Result<RawFrame, DataError> {
    let ts_name = ts_names
        .iter()
        .find(|n| df.column(n).is_ok())
        .ok_or_else(|| DataError::MissingColumn {
            column: ts_names.join("|"),
        })?;
    let value_name = value_names
        .iter()
        .find(|n| df.column(n).is_ok())
        .ok_or_else(|| DataError::MissingColumn {
            column: value_names.join("|"),
        })?;

    let timestamps = timestamp_column(df.column(ts_name).map_err(parquet_err)?)?;

    let mut columns = Vec::new();
    for column in df.get_columns() {
        let name = column.name().as_str();
        if name == *ts_name || !is_numeric(column.dtype()) {
            continue;
        }
        columns.push(RawColumn::new(name, float_column(column)?));
    }

    Ok(RawFrame::new(timestamps, columns, *value_name))
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
    )
}

fn float_column(column: &Column) -> Result<Vec<f64>, DataError> {
    let cast = column.cast(&DataType::Float64).map_err(parquet_err)?;
    let ca = cast.f64().map_err(parquet_err)?;
    Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

fn timestamp_column(column: &Column) -> Result<Vec<NaiveDateTime>, DataError> {
    let millis = column
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .and_then(|c| c.cast(&DataType::Int64))
        .map_err(parquet_err)?;
    let ca = millis.i64().map_err(parquet_err)?;
    ca.into_iter()
        .enumerate()
        .map(|(row, ms)| {
            ms.and_then(chrono::DateTime::from_timestamp_millis)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| DataError::Parquet(format!("null or invalid timestamp at row {row}")))
        })
        .collect()
}

fn parquet_err(e: PolarsError) -> DataError {
    DataError::Parquet(e.to_string())
}

/// Write daily bars in the daily file layout. Atomic: write `.tmp`, then rename.
pub fn write_daily_bars(path: &Path, bars: &[RawBar]) -> Result<(), DataError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let millis: Vec<i64> = bars
        .iter()
        .map(|b| b.date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis())
        .collect();
    let f = |g: fn(&RawBar) -> f64| bars.iter().map(g).collect::<Vec<f64>>();

    let mut df = DataFrame::new(vec![
        Column::new("Date".into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(parquet_err)?,
        Column::new("Open".into(), f(|b| b.open)),
        Column::new("High".into(), f(|b| b.high)),
        Column::new("Low".into(), f(|b| b.low)),
        Column::new("Close".into(), f(|b| b.close)),
        Column::new("Adj Close".into(), f(|b| b.adj_close)),
        Column::new("Volume".into(), bars.iter().map(|b| b.volume).collect::<Vec<u64>>()),
    ])
    .map_err(parquet_err)?;

    write_parquet_atomic(&mut df, path)
}

/// Write an intraday frame (`timestamp`, `close`) in the intraday layout.
pub fn write_intraday_series(
    path: &Path,
    timestamps: &[NaiveDateTime],
    closes: &[f64],
) -> Result<(), DataError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let millis: Vec<i64> = timestamps
        .iter()
        .map(|ts| ts.and_utc().timestamp_millis())
        .collect();
    let mut df = DataFrame::new(vec![
        Column::new("timestamp".into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(parquet_err)?,
        Column::new("close".into(), closes.to_vec()),
    ])
    .map_err(parquet_err)?;
    write_parquet_atomic(&mut df, path)
}

fn write_parquet_atomic(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::Parquet(format!("write {}: {e}", tmp_path.display())))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::Io(e)
    })
}
