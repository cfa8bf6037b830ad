//! Deterministic synthetic price series for dev runs and benches.
//!
//! Each symbol's walk is seeded from BLAKE3(seed, symbol), so a symbol's
//! series does not depend on which other symbols were generated or in what
//! order. Every walk loads on a shared market factor with a per-symbol beta,
//! which gives the correlation pass a realistic spread of results.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::frame::RawFrame;
use super::provider::DataError;
use super::store::{SeriesStore, SourceKind};
use crate::domain::{SeriesError, TimeSeries};

const MARKET_KEY: &str = "__market__";

/// Derive a per-key seed: BLAKE3 over the master seed and the key.
pub fn sub_seed(seed: u64, key: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(key.as_bytes());
    let hash = hasher.finalize();
    let mut first = [0u8; 8];
    first.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(first)
}

/// Weekdays in `[start, end]`.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

/// Zero-mean, unit-variance draw (Irwin-Hall with 12 uniforms).
fn standard_draw(rng: &mut StdRng) -> f64 {
    (0..12).map(|_| rng.gen::<f64>()).sum::<f64>() - 6.0
}

fn shocks(seed: u64, key: &str, n: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(sub_seed(seed, key));
    (0..n).map(|_| standard_draw(&mut rng)).collect()
}

/// Generator for factor-loaded geometric random walks.
#[derive(Debug, Clone)]
pub struct SyntheticMarket {
    seed: u64,
    days: Vec<NaiveDate>,
    market: Vec<f64>,
    volatility: f64,
}

impl SyntheticMarket {
    pub fn new(seed: u64, start: NaiveDate, end: NaiveDate) -> Self {
        let days = business_days(start, end);
        let market = shocks(seed, MARKET_KEY, days.len());
        Self {
            seed,
            days,
            market,
            volatility: 0.015,
        }
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    /// Beta on the market factor, in `[-1, 1]`.
    pub fn beta(&self, symbol: &str) -> f64 {
        let mut rng = StdRng::seed_from_u64(sub_seed(self.seed, &format!("beta:{symbol}")));
        rng.gen_range(-1.0..=1.0)
    }

    /// Price path for `symbol`, starting near 100.
    pub fn prices(&self, symbol: &str) -> Vec<f64> {
        let beta = self.beta(symbol);
        let idio = shocks(self.seed, symbol, self.days.len());
        let idio_weight = (1.0 - beta * beta).max(0.0).sqrt();

        let mut price = 100.0;
        self.market
            .iter()
            .zip(&idio)
            .map(|(m, e)| {
                let shock = beta * m + idio_weight * e;
                price *= (self.volatility * shock).exp();
                price
            })
            .collect()
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.days.iter().map(|d| d.and_time(NaiveTime::MIN)).collect()
    }

    pub fn series(&self, symbol: &str) -> Result<TimeSeries, SeriesError> {
        TimeSeries::new(self.timestamps(), self.prices(symbol))
    }
}

/// A `SeriesStore` that answers every source with a synthetic daily walk.
#[derive(Debug, Clone)]
pub struct SyntheticStore {
    market: SyntheticMarket,
}

impl SyntheticStore {
    pub fn new(market: SyntheticMarket) -> Self {
        Self { market }
    }

    pub fn market(&self) -> &SyntheticMarket {
        &self.market
    }
}

impl SeriesStore for SyntheticStore {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn supports(&self, _source: SourceKind) -> bool {
        true
    }

    fn fetch(&self, symbol: &str, _source: SourceKind) -> Result<RawFrame, DataError> {
        if symbol.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: String::new(),
            });
        }
        Ok(RawFrame::single(
            self.market.timestamps(),
            "close",
            self.market.prices(symbol),
        ))
    }
}
