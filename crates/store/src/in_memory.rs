//! In-memory backend: useful for testing and ephemeral runs.

use async_trait::async_trait;
use deepdive_core::error::StoreError;
use deepdive_core::store::{Collection, StateStore, Versioned, version_conflict};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Versioned entries keyed by collection and key.
///
/// Shared by the in-memory and file backends; callers hold the lock around
/// each operation so the version check and the write are atomic.
#[derive(Debug, Default, Clone)]
pub(crate) struct Tables {
    entries: HashMap<(Collection, String), Versioned>,
}

impl Tables {
    pub(crate) fn get(&self, collection: Collection, key: &str) -> Option<Versioned> {
        self.entries.get(&(collection, key.to_string())).cloned()
    }

    pub(crate) fn set(&mut self, collection: Collection, key: &str, value: serde_json::Value) -> u64 {
        let slot = self
            .entries
            .entry((collection, key.to_string()))
            .or_insert(Versioned {
                value: serde_json::Value::Null,
                version: 0,
            });
        slot.value = value;
        slot.version += 1;
        slot.version
    }

    pub(crate) fn compare_and_set(
        &mut self,
        collection: Collection,
        key: &str,
        expected_version: u64,
        value: serde_json::Value,
    ) -> Result<u64, StoreError> {
        let actual = self
            .entries
            .get(&(collection, key.to_string()))
            .map_or(0, |v| v.version);
        if actual != expected_version {
            return Err(version_conflict(collection, key, expected_version, actual));
        }
        Ok(self.set(collection, key, value))
    }

    /// Restore an entry exactly as persisted.
    pub(crate) fn insert(&mut self, collection: Collection, key: String, entry: Versioned) {
        self.entries.insert((collection, key), entry);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Collection, &str, &Versioned)> {
        self.entries
            .iter()
            .map(|((collection, key), entry)| (*collection, key.as_str(), entry))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A store that keeps every collection in a process-local map.
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
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
        Ok(self.tables.write().await.set(collection, key, value))
    }

    async fn compare_and_set(
        &self,
        collection: Collection,
        key: &str,
        expected_version: u64,
        value: serde_json::Value,
    ) -> Result<u64, StoreError> {
        self.tables
            .write()
            .await
            .compare_and_set(collection, key, expected_version, value)
    }
}
