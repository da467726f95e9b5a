//! Token persistence for the command line.
//!
//! `FileStorage` plays the role of the browser's `localStorage`: a small
//! JSON object of string keys and values in one file. The credential marker
//! has nothing to gate between runs, so it lives in a `MemoryCookieJar`.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use digisaathi::token::{LocalStorage, MemoryCookieJar, StorageError};
use digisaathi::{MarkerConfig, TokenStore};

pub type CliStore = TokenStore<FileStorage, MemoryCookieJar>;

#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| StorageError::Unavailable(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StorageError::Unavailable(format!("{}: {e}", self.path.display()))),
        }
    }

    fn store(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let write_error = |e: &dyn std::fmt::Display| StorageError::Write(format!("{}: {e}", self.path.display()));
        if items.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(write_error(&e)),
                _ => Ok(()),
            };
        }
        let raw = serde_json::to_string_pretty(items).map_err(|e| write_error(&e))?;
        std::fs::write(&self.path, raw).map_err(|e| write_error(&e))
    }
}

impl LocalStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.load()?;
        items.insert(key.to_owned(), value.to_owned());
        self.store(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.load()?;
        if items.remove(key).is_none() {
            return Ok(());
        }
        self.store(&items)
    }
}

pub fn token_store(path: impl Into<PathBuf>, marker: MarkerConfig) -> CliStore {
    TokenStore::new(FileStorage::new(path), MemoryCookieJar::new(), marker)
}
