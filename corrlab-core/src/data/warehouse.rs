//! ClickHouse-over-HTTP client for `SourceKind::Warehouse`.
//!
//! Always fetches the full history up to the run's end date, so one cached
//! series serves every window.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::frame::RawFrame;
use super::provider::DataError;

/// Connection settings. `table` must have `symbol`, `timestamp`, `close`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub url: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_table() -> String {
    "bars".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

pub struct WarehouseClient {
    config: WarehouseConfig,
    client: reqwest::blocking::Client,
}

impl WarehouseClient {
    pub fn new(config: WarehouseConfig) -> Result<Self, DataError> {
        if !is_identifier(&config.table) {
            return Err(DataError::Warehouse(format!(
                "invalid table name '{}'",
                config.table
            )));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DataError::Warehouse(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// Build the query text for one symbol.
    pub fn query_for(&self, symbol: &str, end_date: NaiveDate) -> Result<String, DataError> {
        if !is_symbol(symbol) {
            return Err(DataError::Warehouse(format!("refusing symbol '{symbol}'")));
        }
        Ok(format!(
            "SELECT timestamp, close FROM {table} \
             WHERE symbol = '{symbol}' AND timestamp < '{next} 00:00:00' \
             ORDER BY timestamp FORMAT CSVWithNames",
            table = self.config.table,
            next = end_date.succ_opt().unwrap_or(end_date),
        ))
    }

    pub fn fetch_series(&self, symbol: &str, end_date: NaiveDate) -> Result<RawFrame, DataError> {
        let query = self.query_for(symbol, end_date)?;
        let mut req = self.client.post(&self.config.url).body(query);
        if let Some(user) = &self.config.user {
            req = req.basic_auth(user, self.config.password.as_ref());
        }
        let resp = req
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| DataError::Warehouse(format!("read body: {e}")))?;
        if !status.is_success() {
            return Err(DataError::Warehouse(format!(
                "HTTP {status}: {}",
                body.lines().next().unwrap_or_default()
            )));
        }

        let frame = parse_csv_response(&body)?;
        debug!(symbol, rows = frame.height(), "warehouse rows fetched");
        if frame.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(frame)
    }
}

/// Parse a `CSVWithNames` body with `timestamp` and `close` columns.
/// Empty cells become `NaN`.
pub fn parse_csv_response(body: &str) -> Result<RawFrame, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| DataError::Warehouse(format!("csv header: {e}")))?
        .clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DataError::MissingColumn {
                column: name.to_string(),
            })
    };
    let ts_idx = position("timestamp")?;
    let close_idx = position("close")?;

    let mut timestamps = Vec::new();
    let mut closes = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| DataError::Warehouse(format!("csv row {row}: {e}")))?;
        let ts_raw = record.get(ts_idx).unwrap_or_default();
        timestamps.push(parse_timestamp(ts_raw).ok_or_else(|| {
            DataError::Warehouse(format!("row {row}: bad timestamp '{ts_raw}'"))
        })?);
        let close = record.get(close_idx).unwrap_or_default();
        closes.push(if close.is_empty() || close == "\\N" {
            f64::NAN
        } else {
            close
                .parse()
                .map_err(|_| DataError::Warehouse(format!("row {row}: bad close '{close}'")))?
        });
    }

    Ok(RawFrame::single(timestamps, "close", closes))
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn is_symbol(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=' | '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> WarehouseClient {
        WarehouseClient::new(WarehouseConfig {
            url: "http://localhost:8123".into(),
            table: "market.bars".into(),
            user: None,
            password: None,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn parses_csv_with_names() {
        let body = "timestamp,close\n2024-01-02 14:30:00,187.5\n2024-01-02 14:45:00,\n2024-01-02 15:00:00,188\n";
        let frame = parse_csv_response(body).unwrap();
        assert_eq!(frame.height(), 3);
        let values = &frame.value().unwrap().values;
        assert_eq!(values[0], 187.5);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 188.0);
    }

    #[test]
    fn missing_close_column_is_reported() {
        assert!(matches!(
            parse_csv_response("timestamp,price\n2024-01-02,1\n"),
            Err(DataError::MissingColumn { .. })
        ));
    }

    #[test]
    fn query_is_bounded_by_end_date_only() {
        let q = client()
            .query_for("BRK.B", NaiveDate::from_ymd_opt(2024, 6, 30).unwrap())
            .unwrap();
        assert!(q.contains("FROM market.bars"));
        assert!(q.contains("symbol = 'BRK.B'"));
        assert!(q.contains("timestamp < '2024-07-01 00:00:00'"));
        assert!(!q.contains("timestamp >="));
    }

    #[test]
    fn quoting_characters_in_symbols_are_refused() {
        let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        assert!(client().query_for("X' OR 1=1 --", end).is_err());
    }
}
