//! Data provider trait and structured error types.
//!
//! A `DataProvider` is a remote source of daily bars (Yahoo Finance today).
//! Stores sit above providers: a provider never touches the filesystem.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw daily bar from a data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: u64,
}

/// Structured error types for data retrieval.
///
/// Every variant is a "no data" condition from the engine's point of view:
/// the symbol is skipped and the batch continues.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("no file for '{symbol}' at {path}")]
    MissingFile { symbol: String, path: String },

    #[error("missing column '{column}'")]
    MissingColumn { column: String },

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("warehouse query failed: {0}")]
    Warehouse(String),

    #[error("source '{0}' is not served by this store")]
    UnsupportedSource(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data error: {0}")]
    Other(String),
}

/// Trait for remote bar providers.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily bars for a symbol over a date range.
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<RawBar>, DataError>;

    /// False while the provider refuses requests (rate limit, ban).
    fn is_available(&self) -> bool;
}
