//! Building main securities from a run configuration.
//!
//! Every main goes through the same preparation as a candidate. Market mains
//! are fetched from the run's store; FRED series are loaded from CSV and fed
//! through an in-memory store so the same checks apply. The full prepared
//! history is then sliced per window.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

use corrlab_core::data::{
    ExcludeListSink, MemoryStore, NullExcludeList, SeriesStore, SourceKind,
};
use corrlab_core::domain::{MainSecurity, TimeSeries, Window};
use corrlab_core::Preparer;

use crate::config::{MainSpec, RunConfig};
use crate::fred_md::{load_fred_csv, load_fred_md_metadata, FredMdDataset, FredMdMeta};

/// Prepare `series` as if it came from a store, then slice it per window.
/// `None` (with a warning) when the series is rejected.
pub fn main_from_series(
    mut main: MainSecurity,
    series: &TimeSeries,
    windows: &[Window],
    end_date: NaiveDate,
) -> Option<MainSecurity> {
    let store = MemoryStore::new();
    store.insert_series(main.identity(), SourceKind::FileDaily, series);
    match Preparer::new(&store, &NullExcludeList).prepare(main.identity(), SourceKind::FileDaily) {
        Ok(prepared) => {
            main.load_windows(&prepared, windows, end_date);
            Some(main)
        }
        Err(rejection) => {
            warn!(main = main.identity(), kind = rejection.kind(), %rejection, "main rejected");
            None
        }
    }
}

/// Build every configured main. Mains whose data is rejected are skipped;
/// missing FRED files are errors.
pub fn build_mains(
    config: &RunConfig,
    store: &dyn SeriesStore,
    exclude: &dyn ExcludeListSink,
    source: SourceKind,
) -> Result<Vec<MainSecurity>> {
    let windows = &config.run.windows;
    let end_date = config.data.end_date;
    let preparer = Preparer::new(store, exclude);
    let fred = FredMd::load(config)?;

    let mut mains = Vec::with_capacity(config.mains.len());
    for spec in &config.mains {
        let built = match spec {
            MainSpec::Security { symbol } => match preparer.prepare(symbol, source) {
                Ok(prepared) => {
                    let mut main = MainSecurity::security(symbol.clone());
                    main.load_windows(&prepared, windows, end_date);
                    Some(main)
                }
                Err(rejection) => {
                    warn!(main = %symbol, kind = rejection.kind(), %rejection, "main rejected");
                    None
                }
            },
            MainSpec::FredMd { fred_md_id } => {
                let Some(fred) = fred.as_ref() else {
                    anyhow::bail!("fred_md main '{fred_md_id}' configured without [fred_md]");
                };
                let series = fred.dataset.series(fred_md_id)?;
                main_from_series(fred.main_for(fred_md_id), &series, windows, end_date)
            }
            MainSpec::FredApi {
                series_id,
                title,
                csv,
            } => {
                let path = csv
                    .clone()
                    .unwrap_or_else(|| fred_api_path(config, series_id));
                let series = load_fred_csv(&path)?;
                main_from_series(
                    MainSecurity::fred_api(series_id.clone(), title.clone()),
                    &series,
                    windows,
                    end_date,
                )
            }
        };
        mains.extend(built);
    }

    info!(
        configured = config.mains.len(),
        built = mains.len(),
        "mains prepared"
    );
    Ok(mains)
}

/// `{data_dir}/fred/{series_id}.csv`
pub fn fred_api_path(config: &RunConfig, series_id: &str) -> PathBuf {
    config
        .data
        .data_dir
        .join("fred")
        .join(format!("{series_id}.csv"))
}

struct FredMd {
    dataset: FredMdDataset,
    meta: BTreeMap<String, FredMdMeta>,
}

impl FredMd {
    fn load(config: &RunConfig) -> Result<Option<Self>> {
        let needed = config
            .mains
            .iter()
            .any(|m| matches!(m, MainSpec::FredMd { .. }));
        let Some(fred) = config.fred_md.as_ref().filter(|_| needed) else {
            return Ok(None);
        };
        let dataset = FredMdDataset::from_csv(&fred.csv)?;
        let meta = match &fred.metadata {
            Some(path) => load_fred_md_metadata(path)
                .context("Failed to load FRED-MD metadata")?
                .into_iter()
                .map(|m| (m.fred_md_id.clone(), m))
                .collect(),
            None => BTreeMap::new(),
        };
        Ok(Some(Self { dataset, meta }))
    }

    /// Metadata fills in what it can; the dataset's transform row backs up `tcode`.
    fn main_for(&self, id: &str) -> MainSecurity {
        match self.meta.get(id) {
            Some(m) => MainSecurity::fred_md(
                id,
                m.api_id.clone(),
                m.title.clone(),
                m.tcode.or_else(|| self.dataset.tcode(id)),
                m.frequency.clone(),
            ),
            None => MainSecurity::fred_md(id, None, id, self.dataset.tcode(id), None),
        }
    }
}
