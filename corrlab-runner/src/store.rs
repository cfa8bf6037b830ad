//! Persisted main securities.
//!
//! Each ranked main is written as pretty JSON to `{dir}/{identity}.json`,
//! alongside the run id that produced it. Loading re-checks the ranked-list
//! invariants so a hand-edited or truncated file is caught at read time.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use corrlab_core::domain::MainSecurity;

use crate::config::RunId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMain {
    pub run_id: RunId,
    pub saved_at: DateTime<Utc>,
    pub top_k: usize,
    pub main: MainSecurity,
}

#[derive(Debug, Clone)]
pub struct SecurityStore {
    dir: PathBuf,
}

impl SecurityStore {
    /// Opens the store, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create store directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.path_for(identity).exists()
    }

    pub fn save(&self, main: &MainSecurity, run_id: &RunId, top_k: usize) -> Result<PathBuf> {
        let path = self.path_for(main.identity());
        let stored = StoredMain {
            run_id: run_id.clone(),
            saved_at: Utc::now(),
            top_k,
            main: main.clone(),
        };
        let json = serde_json::to_string_pretty(&stored).context("Failed to serialize main")?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).context("Failed to write main")?;
        std::fs::rename(&tmp, &path).context("Failed to move main into place")?;
        Ok(path)
    }

    /// `None` when nothing was saved for `identity`.
    pub fn load(&self, identity: &str) -> Result<Option<StoredMain>> {
        let path = self.path_for(identity);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let stored: StoredMain = serde_json::from_str(&json)
            .with_context(|| format!("Failed to deserialize {}", path.display()))?;
        if let Err(violation) = stored.main.check_invariants(stored.top_k) {
            bail!("{}: {violation}", path.display());
        }
        Ok(Some(stored))
    }

    /// Identities of every saved main, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json")
            })
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn path_for(&self, identity: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(identity)))
    }
}

/// Identities are tickers or FRED ids; anything else is flattened to `_`.
fn file_stem(identity: &str) -> String {
    identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '^' | '=') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use corrlab_core::domain::{CorrelatedEntity, Window};

    fn ranked_main() -> MainSecurity {
        let mut m = MainSecurity::security("SPY");
        let w = Window::starting(2023);
        m.positive_correlations.insert(
            w,
            vec![CorrelatedEntity::new("QQQ", 0.9), CorrelatedEntity::new("IWM", 0.7)],
        );
        m.negative_correlations.insert(
            w,
            vec![CorrelatedEntity::new("TLT", -0.4), CorrelatedEntity::new("GLD", 0.1)],
        );
        m
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecurityStore::new(dir.path().join("securities")).unwrap();
        assert!(store.is_empty().unwrap());

        let main = ranked_main();
        store.save(&main, &"abc".to_string(), 100).unwrap();
        assert!(store.contains("SPY"));
        assert_eq!(store.list().unwrap(), vec!["SPY"]);

        let loaded = store.load("SPY").unwrap().unwrap();
        assert_eq!(loaded.main, main);
        assert_eq!(loaded.run_id, "abc");
        assert!(store.load("QQQ").unwrap().is_none());
    }

    #[test]
    fn load_rejects_broken_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecurityStore::new(dir.path()).unwrap();
        let mut main = ranked_main();
        main.positive_correlations
            .get_mut(&Window::starting(2023))
            .unwrap()
            .reverse();
        store.save(&main, &"abc".to_string(), 100).unwrap();
        assert!(store.load("SPY").is_err());
    }

    #[test]
    fn odd_identities_get_safe_file_names() {
        assert_eq!(file_stem("BRK/B"), "BRK_B");
        assert_eq!(file_stem("^GSPC"), "^GSPC");
    }
}
