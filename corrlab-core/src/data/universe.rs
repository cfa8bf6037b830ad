//! Candidate universe: the symbols each main is correlated against.
//!
//! Two on-disk forms are accepted:
//! - TOML with sectors: `[sectors]` table of `name = ["AAPL", ...]`
//! - a plain symbol list, one per line (`#` comments and blanks ignored)
//!
//! Symbols on the exclude list are dropped when the candidate list is built.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use thiserror::Error;

/// Small fixed universe for quick runs.
pub const DEBUG_SYMBOLS: [&str; 11] = [
    "AAPL", "MSFT", "GME", "UNH", "SHEL", "FNV", "DIS", "NFLX", "VZ", "TMUS", "INTC",
];

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("read universe file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("parse universe TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Universe {
    #[serde(default)]
    pub sectors: BTreeMap<String, Vec<String>>,
}

impl Universe {
    /// Load from a file. `.toml` files are sector tables; anything else is
    /// read as a symbol list.
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path).map_err(|source| UniverseError::Read {
            path: path.display().to_string(),
            source,
        })?;
        if path.extension().is_some_and(|e| e == "toml") {
            Self::from_toml(&content)
        } else {
            Ok(Self::from_symbol_list(&content))
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        Ok(toml::from_str(content)?)
    }

    /// Symbol list text, one symbol per line, under a single `all` sector.
    pub fn from_symbol_list(content: &str) -> Self {
        let symbols = content
            .lines()
            .map(|l| l.split('#').next().unwrap_or_default().trim())
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Self::from_symbols(symbols)
    }

    pub fn from_symbols(symbols: Vec<String>) -> Self {
        let mut sectors = BTreeMap::new();
        sectors.insert("all".to_string(), symbols);
        Self { sectors }
    }

    pub fn debug() -> Self {
        Self::from_symbols(DEBUG_SYMBOLS.iter().map(|s| s.to_string()).collect())
    }

    /// Every symbol across sectors, first occurrence wins.
    pub fn all_tickers(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.sectors
            .values()
            .flatten()
            .map(String::as_str)
            .filter(|t| seen.insert(*t))
            .collect()
    }

    pub fn ticker_count(&self) -> usize {
        self.all_tickers().len()
    }

    /// The candidate list for a run: unique, in file order, minus `exclude`.
    pub fn candidates(&self, exclude: &BTreeSet<String>) -> Vec<String> {
        self.all_tickers()
            .into_iter()
            .filter(|t| !exclude.contains(*t))
            .map(str::to_string)
            .collect()
    }
}
