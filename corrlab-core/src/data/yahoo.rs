//! Yahoo Finance chart API, used for `SourceKind::LiveDownload`.
//!
//! Requests go through a shared `CircuitBreaker`; retries back off
//! exponentially. A symbol Yahoo does not know is `SymbolNotFound`, which the
//! preparer treats as "no data".

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, DataProvider, RawBar};

const CHART_BASE: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartSeries>>,
    error: Option<ChartFault>,
}

#[derive(Debug, Deserialize)]
struct ChartFault {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartSeries {
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<Quote>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    adjclose: Vec<Option<f64>>,
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) corrlab")
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("http client: {e}")))?;
        Ok(Self {
            client,
            breaker,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = end
            .succ_opt()
            .unwrap_or(end)
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();
        format!(
            "{CHART_BASE}/{symbol}?period1={period1}&period2={period2}\
             &interval=1d&includeAdjustedClose=true"
        )
    }

    fn get_once(&self, url: &str, symbol: &str) -> Result<Vec<RawBar>, Attempt> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    Attempt::Retry(DataError::NetworkUnreachable(e.to_string()))
                } else {
                    Attempt::Fatal(DataError::NetworkUnreachable(e.to_string()))
                }
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            self.breaker.trip();
            return Err(Attempt::Fatal(DataError::CircuitBreakerTripped));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.breaker.record_failure();
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Err(Attempt::Retry(DataError::RateLimited { retry_after_secs }));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Attempt::Fatal(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            }));
        }
        if !status.is_success() {
            self.breaker.record_failure();
            return Err(Attempt::Retry(DataError::Other(format!(
                "HTTP {status} for {symbol}"
            ))));
        }

        let body = resp
            .text()
            .map_err(|e| Attempt::Fatal(DataError::NetworkUnreachable(e.to_string())))?;
        let bars = parse_chart(symbol, &body).map_err(Attempt::Fatal)?;
        self.breaker.record_success();
        Ok(bars)
    }
}

enum Attempt {
    Retry(DataError),
    Fatal(DataError),
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<RawBar>, DataError> {
        let url = Self::chart_url(symbol, start, end);
        let mut last = DataError::Other("no attempt made".into());

        for attempt in 0..=self.max_retries {
            if !self.breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }
            if attempt > 0 {
                std::thread::sleep(self.base_delay * 2u32.pow(attempt - 1));
            }
            match self.get_once(&url, symbol) {
                Ok(bars) => {
                    debug!(symbol, bars = bars.len(), "yahoo download complete");
                    return Ok(bars);
                }
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Retry(e)) => {
                    warn!(symbol, attempt, error = %e, "yahoo request failed, retrying");
                    last = e;
                }
            }
        }
        Err(last)
    }

    fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }
}

/// Parse a chart API body into daily bars. Rows with no quote at all
/// (exchange holidays) are dropped.
pub fn parse_chart(symbol: &str, body: &str) -> Result<Vec<RawBar>, DataError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|e| DataError::ResponseFormatChanged(format!("{symbol}: {e}")))?;

    let series = match (envelope.chart.result, envelope.chart.error) {
        (Some(result), _) => result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("empty result array".into()))?,
        (None, Some(fault)) if fault.code == "Not Found" => {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
        }
        (None, Some(fault)) => {
            return Err(DataError::ResponseFormatChanged(format!(
                "{}: {}",
                fault.code, fault.description
            )))
        }
        (None, None) => {
            return Err(DataError::ResponseFormatChanged(
                "neither result nor error".into(),
            ))
        }
    };

    let timestamps = series.timestamp.unwrap_or_default();
    let quote = series.indicators.quote.into_iter().next().unwrap_or_default();
    let adj = series
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let at = |v: &[Option<f64>], i: usize| v.get(i).copied().flatten();
    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.into_iter().enumerate() {
        let date = DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("bad timestamp {ts}")))?;
        let close = at(&quote.close, i);
        let adj_close = at(&adj, i).or(close);
        if close.is_none() && adj_close.is_none() {
            continue;
        }
        bars.push(RawBar {
            date,
            open: at(&quote.open, i).unwrap_or(f64::NAN),
            high: at(&quote.high, i).unwrap_or(f64::NAN),
            low: at(&quote.low, i).unwrap_or(f64::NAN),
            close: close.unwrap_or(f64::NAN),
            adj_close: adj_close.unwrap_or(f64::NAN),
            volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
        });
    }

    if bars.is_empty() {
        return Err(DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        });
    }
    Ok(bars)
}
