//! Serializable run configuration.
//!
//! A run file looks like:
//!
//! ```toml
//! [data]
//! data_dir = "data"
//! source = "file_daily"
//! end_date = "2023-12-31"
//!
//! [universe]
//! file = "universe.toml"
//!
//! [[mains]]
//! type = "security"
//! symbol = "SPY"
//!
//! [run]
//! windows = [2023, 2022, 2021]
//! mode = "thread"
//! ```

use chrono::NaiveDate;
use corrlab_core::data::{SourceKind, WarehouseConfig};
use corrlab_core::domain::{default_windows, Window};
use corrlab_core::DEFAULT_TOP_K;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::ExecutionMode;

/// Content hash of a run configuration.
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub data: DataConfig,

    #[serde(default)]
    pub warehouse: Option<WarehouseConfig>,

    #[serde(default)]
    pub universe: UniverseConfig,

    #[serde(default)]
    pub mains: Vec<MainSpec>,

    #[serde(default)]
    pub fred_md: Option<FredMdConfig>,

    #[serde(default)]
    pub run: RunSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Source identifier; parsed when the pass starts so a bad value is
    /// reported as an unknown source rather than a parse error.
    #[serde(default = "default_source")]
    pub source: String,

    /// Fetch fresh daily bars instead of reading files. Overrides `source`.
    #[serde(default)]
    pub download: bool,

    /// Query the warehouse. Overrides `source`; `download` wins over it.
    #[serde(default)]
    pub use_warehouse: bool,

    pub end_date: NaiveDate,

    /// Structurally unusable symbols are appended here.
    #[serde(default)]
    pub exclude_list: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_source() -> String {
    SourceKind::FileDaily.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UniverseConfig {
    /// Sector TOML or plain symbol list.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Inline symbols, appended after the file's.
    #[serde(default)]
    pub symbols: Vec<String>,

    /// Use the small built-in universe instead of `file`/`symbols`.
    #[serde(default)]
    pub debug: bool,
}

/// One main series to find correlated peers for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MainSpec {
    Security {
        symbol: String,
    },
    FredMd {
        fred_md_id: String,
    },
    /// A single FRED series downloaded as CSV to `{data_dir}/fred/{series_id}.csv`
    /// unless `csv` says otherwise.
    FredApi {
        series_id: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        csv: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FredMdConfig {
    pub csv: PathBuf,
    #[serde(default)]
    pub metadata: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default = "default_windows")]
    pub windows: Vec<Window>,

    #[serde(default)]
    pub mode: ExecutionMode,

    /// Defaults to a quarter of the available cores.
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Where ranked main objects are saved.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output/securities")
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            mode: ExecutionMode::default(),
            workers: None,
            top_k: DEFAULT_TOP_K,
            output_dir: default_output_dir(),
        }
    }
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        config.resolve_paths(path.parent().unwrap_or_else(|| Path::new(".")));
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mains.is_empty() {
            return Err(ConfigError::Invalid("no [[mains]] configured".into()));
        }
        if self.run.windows.is_empty() {
            return Err(ConfigError::Invalid("run.windows is empty".into()));
        }
        if self.run.top_k == 0 {
            return Err(ConfigError::Invalid("run.top_k must be at least 1".into()));
        }
        if self.run.workers == Some(0) {
            return Err(ConfigError::Invalid("run.workers must be at least 1".into()));
        }
        if self.data.use_warehouse && !self.data.download && self.warehouse.is_none() {
            return Err(ConfigError::Invalid(
                "data.use_warehouse is set but [warehouse] is missing".into(),
            ));
        }
        let needs_fred_md = self
            .mains
            .iter()
            .any(|m| matches!(m, MainSpec::FredMd { .. }));
        if needs_fred_md && self.fred_md.is_none() {
            return Err(ConfigError::Invalid(
                "fred_md mains configured but [fred_md] is missing".into(),
            ));
        }
        if !self.universe.debug && self.universe.file.is_none() && self.universe.symbols.is_empty()
        {
            return Err(ConfigError::Invalid(
                "universe needs a file, inline symbols, or debug = true".into(),
            ));
        }
        Ok(())
    }

    /// Make relative paths relative to the config file's directory.
    fn resolve_paths(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.data.data_dir);
        if let Some(p) = self.data.exclude_list.as_mut() {
            fix(p);
        }
        if let Some(p) = self.universe.file.as_mut() {
            fix(p);
        }
        if let Some(fred) = self.fred_md.as_mut() {
            fix(&mut fred.csv);
            if let Some(p) = fred.metadata.as_mut() {
                fix(p);
            }
        }
        for main in &mut self.mains {
            if let MainSpec::FredApi { csv: Some(p), .. } = main {
                fix(p);
            }
        }
        fix(&mut self.run.output_dir);
    }

    /// Exclude list location: configured, or `{data_dir}/files_to_delete.txt`.
    pub fn exclude_list_path(&self) -> PathBuf {
        self.data
            .exclude_list
            .clone()
            .unwrap_or_else(|| self.data.data_dir.join("files_to_delete.txt"))
    }

    /// Deterministic BLAKE3 hash of the configuration.
    pub fn run_id(&self) -> RunId {
        // Every field is a plain value, so serialization cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [data]
        end_date = "2023-12-31"

        [universe]
        debug = true

        [[mains]]
        type = "security"
        symbol = "SPY"
    "#;

    #[test]
    fn defaults_fill_in() {
        let config = RunConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.data.source, "file_daily");
        assert_eq!(config.run.windows, default_windows());
        assert_eq!(config.run.top_k, 100);
        assert_eq!(config.run.mode, ExecutionMode::Sequential);
        assert_eq!(
            config.exclude_list_path(),
            PathBuf::from("data").join("files_to_delete.txt")
        );
    }

    #[test]
    fn full_config_parses() {
        let config = RunConfig::from_toml(
            r#"
            [data]
            data_dir = "/srv/bars"
            source = "file_intraday"
            use_warehouse = true
            end_date = "2024-06-30"

            [warehouse]
            url = "http://ch:8123"
            table = "market.bars"

            [universe]
            symbols = ["AAPL", "MSFT"]

            [[mains]]
            type = "fred_md"
            fred_md_id = "INDPRO"

            [[mains]]
            type = "fred_api"
            series_id = "DGS10"
            title = "10-Year Treasury"

            [fred_md]
            csv = "fred/current.csv"

            [run]
            windows = [2024, 2023]
            mode = "process"
            workers = 3
            top_k = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.mains.len(), 2);
        assert_eq!(config.run.mode, ExecutionMode::Process);
        assert_eq!(config.run.windows, vec![Window::starting(2024), Window::starting(2023)]);
        assert_eq!(config.warehouse.unwrap().table, "market.bars");
    }

    #[test]
    fn run_id_is_deterministic_and_sensitive() {
        let a = RunConfig::from_toml(MINIMAL).unwrap();
        let mut b = a.clone();
        assert_eq!(a.run_id(), b.run_id());
        assert_eq!(a.run_id().len(), 64);
        b.run.top_k = 10;
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn missing_pieces_are_rejected() {
        let no_mains = r#"
            [data]
            end_date = "2023-12-31"
            [universe]
            debug = true
        "#;
        assert!(matches!(
            RunConfig::from_toml(no_mains),
            Err(ConfigError::Invalid(_))
        ));

        let fred_without_csv = MINIMAL.replace(
            "type = \"security\"\n        symbol = \"SPY\"",
            "type = \"fred_md\"\n        fred_md_id = \"RPI\"",
        );
        assert!(matches!(
            RunConfig::from_toml(&fred_without_csv),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn relative_paths_follow_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = RunConfig::from_file(&path).unwrap();
        assert_eq!(config.data.data_dir, dir.path().join("data"));
        assert_eq!(config.run.output_dir, dir.path().join("output/securities"));
    }
}
