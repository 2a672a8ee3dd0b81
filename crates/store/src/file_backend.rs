//! File-based store: persistent JSON-lines storage.
//!
//! Each line is one versioned entry:
//! `{"collection": "research", "key": "research-…", "version": 3, "value": {…}}`
//!
//! Storage location: `~/.deepdive/research.json` unless configured otherwise.
//! Entries are loaded on creation and the whole file is rewritten on every
//! write while the write lock is held, so the file never lags the map.

use async_trait::async_trait;
use deepdive_core::error::StoreError;
use deepdive_core::store::{Collection, StateStore, Versioned};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::in_memory::Tables;

#[derive(Serialize, Deserialize)]
struct Line {
    collection: Collection,
    key: String,
    version: u64,
    value: serde_json::Value,
}

/// A file-backed state store using JSONL.
pub struct FileStore {
    path: PathBuf,
    tables: Arc<RwLock<Tables>>,
}

impl FileStore {
    /// Open the store at `path`, loading existing entries.
    ///
    /// A missing file starts empty; it is created on first write.
    pub fn new(path: PathBuf) -> Self {
        let tables = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = tables.len(), "File store loaded");
        Self {
            path,
            tables: Arc::new(RwLock::new(tables)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Tables {
        let mut tables = Tables::default();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return tables,
        };

        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<Line>(line) {
                Ok(entry) => tables.insert(
                    entry.collection,
                    entry.key,
                    Versioned {
                        value: entry.value,
                        version: entry.version,
                    },
                ),
                Err(e) => warn!(error = %e, "Skipping corrupted store entry"),
            }
        }
        tables
    }

    /// Rewrite the file from `tables`. Callers hold the write lock.
    fn flush(&self, tables: &Tables) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Storage(format!("Failed to create store directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for (collection, key, entry) in tables.iter() {
            let line = serde_json::to_string(&Line {
                collection,
                key: key.to_string(),
                version: entry.version,
                value: entry.value.clone(),
            })
            .map_err(|e| StoreError::Storage(format!("Failed to serialize store entry: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(&self.path, &content)
            .map_err(|e| StoreError::Storage(format!("Failed to write store file: {e}")))
    }
}

#[async_trait]
impl StateStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Versioned>, StoreError> {
        Ok(self.tables.read().await.get(collection, key))
    }

    async fn set(
        &self,
        collection: Collection,
        key: &str,
        value: serde_json::Value,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        let version = next.set(collection, key, value);
        self.flush(&next)?;
        *tables = next;
        Ok(version)
    }

    async fn compare_and_set(
        &self,
        collection: Collection,
        key: &str,
        expected_version: u64,
        value: serde_json::Value,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        let version = next.compare_and_set(collection, key, expected_version, value)?;
        self.flush(&next)?;
        *tables = next;
        Ok(version)
    }
}
