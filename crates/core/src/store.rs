//! State store trait: versioned key-value persistence.
//!
//! Values live in named collections and carry a monotonically increasing
//! per-key version. `compare_and_set` rejects a write whose expected version
//! is stale, so read-modify-write cycles never silently clobber each other.
//! Version `0` means "absent".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::research::Stage;

/// The collections the pipeline reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    #[serde(rename = "research")]
    Records,
    #[serde(rename = "research-plans")]
    Plans,
    #[serde(rename = "research-findings")]
    Findings,
    #[serde(rename = "research-analysis")]
    Analysis,
    #[serde(rename = "research-reports")]
    Reports,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Records,
        Collection::Plans,
        Collection::Findings,
        Collection::Analysis,
        Collection::Reports,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Records => "research",
            Collection::Plans => "research-plans",
            Collection::Findings => "research-findings",
            Collection::Analysis => "research-analysis",
            Collection::Reports => "research-reports",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// The independent artifact slot written by `stage`.
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Planning => Collection::Plans,
            Stage::Gathering => Collection::Findings,
            Stage::Analysis => Collection::Analysis,
            Stage::Synthesis => Collection::Reports,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A stored value together with its version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned {
    pub value: serde_json::Value,
    pub version: u64,
}

/// The core StateStore trait.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// A human-readable backend name (e.g., "in_memory", "sqlite").
    fn name(&self) -> &str;

    /// Fetch a value, or `None` if the key was never written.
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Versioned>, StoreError>;

    /// Write unconditionally. Returns the new version.
    async fn set(
        &self,
        collection: Collection,
        key: &str,
        value: serde_json::Value,
    ) -> Result<u64, StoreError>;

    /// Write only if the current version equals `expected_version`
    /// (`0` = key must not exist). Returns the new version or
    /// [`StoreError::VersionConflict`].
    async fn compare_and_set(
        &self,
        collection: Collection,
        key: &str,
        expected_version: u64,
        value: serde_json::Value,
    ) -> Result<u64, StoreError>;
}

/// Build the conflict error backends return from `compare_and_set`.
pub fn version_conflict(collection: Collection, key: &str, expected: u64, actual: u64) -> StoreError {
    StoreError::VersionConflict {
        collection: collection.name().to_string(),
        key: key.to_string(),
        expected,
        actual,
    }
}
