//! Exclude list: symbols whose data is structurally unusable.
//!
//! The preparer appends to it; later runs read it back to shrink the
//! universe. The file is one symbol per line, append-only.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Where rejected symbols are reported.
///
/// Appends are fire-and-forget: a sink that cannot write logs and carries on.
pub trait ExcludeListSink: Send + Sync {
    fn append(&self, symbol: &str);
}

/// Appends `SYMBOL\n` to a text file, creating it (and its directory) on first use.
#[derive(Debug)]
pub struct FileExcludeList {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileExcludeList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, symbol: &str) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{symbol}")
    }
}

impl ExcludeListSink for FileExcludeList {
    fn append(&self, symbol: &str) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.write_line(symbol) {
            warn!(symbol, path = %self.path.display(), error = %e, "exclude list append failed");
        }
    }
}

/// Collects appends in memory.
#[derive(Debug, Default)]
pub struct MemoryExcludeList {
    symbols: Mutex<Vec<String>>,
}

impl MemoryExcludeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appended symbols in order, duplicates kept.
    pub fn symbols(&self) -> Vec<String> {
        self.symbols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ExcludeListSink for MemoryExcludeList {
    fn append(&self, symbol: &str) {
        self.symbols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(symbol.to_string());
    }
}

/// Discards appends.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExcludeList;

impl ExcludeListSink for NullExcludeList {
    fn append(&self, _symbol: &str) {}
}

/// Read an exclude file. A missing file is an empty list.
pub fn load_exclude_list(path: &Path) -> std::io::Result<BTreeSet<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_list_appends_and_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("files_to_delete.txt");
        let list = FileExcludeList::new(&path);
        list.append("BAD1");
        list.append("BAD2");
        list.append("BAD1");

        assert_eq!(fs::read_to_string(&path).unwrap(), "BAD1\nBAD2\nBAD1\n");
        let loaded = load_exclude_list(&path).unwrap();
        assert_eq!(loaded.into_iter().collect::<Vec<_>>(), vec!["BAD1", "BAD2"]);
    }

    #[test]
    fn missing_file_is_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_exclude_list(&dir.path().join("absent.txt"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn memory_list_keeps_order() {
        let list = MemoryExcludeList::new();
        list.append("B");
        list.append("A");
        assert_eq!(list.symbols(), vec!["B", "A"]);
    }
}
