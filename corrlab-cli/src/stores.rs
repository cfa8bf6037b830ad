//! Store and sink construction from a run configuration.

use anyhow::{Context, Result};
use chrono::Datelike;
use std::sync::Arc;

use corrlab_core::data::{
    CircuitBreaker, ExcludeListSink, FileExcludeList, FileStore, SeriesStore, SyntheticMarket,
    SyntheticStore, WarehouseClient, YahooProvider,
};
use corrlab_runner::RunConfig;

pub const DEFAULT_SEED: u64 = 42;

/// Parquet files (plus live download and warehouse when configured), or a
/// synthetic market covering every window when `synthetic` is set.
pub fn build_store(config: &RunConfig, synthetic: Option<u64>) -> Result<Arc<dyn SeriesStore>> {
    if let Some(seed) = synthetic {
        let first_year = config
            .run
            .windows
            .iter()
            .map(|w| w.start_year())
            .min()
            .unwrap_or_else(|| config.data.end_date.year());
        let start = chrono::NaiveDate::from_ymd_opt(first_year - 1, 1, 1)
            .context("window start year out of range")?;
        let market = SyntheticMarket::new(seed, start, config.data.end_date);
        return Ok(Arc::new(SyntheticStore::new(market)));
    }

    let mut store = FileStore::new(&config.data.data_dir, config.data.end_date);
    if config.data.download {
        let breaker = Arc::new(CircuitBreaker::default_provider());
        store = store.with_provider(Arc::new(YahooProvider::new(breaker)?));
    }
    if let Some(warehouse) = &config.warehouse {
        store = store.with_warehouse(WarehouseClient::new(warehouse.clone())?);
    }
    Ok(Arc::new(store))
}

pub fn build_exclude(config: &RunConfig) -> Arc<dyn ExcludeListSink> {
    Arc::new(FileExcludeList::new(config.exclude_list_path()))
}
