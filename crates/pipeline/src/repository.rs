//! Typed access to research records and their artifact slots.
//!
//! Records are written with compare-and-set. [`ResearchRepository::update`]
//! re-reads and re-applies the mutation when another writer got there first,
//! so a concurrent update is either merged or rejected by the record's own
//! transition rules, never overwritten.

use std::sync::Arc;

use deepdive_core::error::{PipelineError, StoreError, TransitionError};
use deepdive_core::research::{ResearchRecord, StageArtifact};
use deepdive_core::store::{Collection, StateStore};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Attempts made by [`ResearchRepository::update`] before giving up on contention.
pub const MAX_UPDATE_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct ResearchRepository {
    store: Arc<dyn StateStore>,
}

impl ResearchRepository {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Persist a brand-new record. Fails if the id is already taken.
    pub async fn create(&self, record: &ResearchRecord) -> Result<(), PipelineError> {
        record.check_invariants()?;
        let value = serde_json::to_value(record)?;
        self.store
            .compare_and_set(Collection::Records, &record.id, 0, value)
            .await?;
        debug!(research_id = %record.id, "Research record created");
        Ok(())
    }

    /// Fetch a record with its current version.
    pub async fn load(&self, id: &str) -> Result<Option<(ResearchRecord, u64)>, PipelineError> {
        let Some(entry) = self.store.get(Collection::Records, id).await? else {
            return Ok(None);
        };
        let record = serde_json::from_value(entry.value)?;
        Ok(Some((record, entry.version)))
    }

    /// Read-modify-write a record.
    ///
    /// `mutate` is re-applied to a fresh copy after every version conflict.
    /// The mutated record must still satisfy its invariants before it is
    /// written.
    pub async fn update<F>(&self, id: &str, mut mutate: F) -> Result<ResearchRecord, PipelineError>
    where
        F: FnMut(&mut ResearchRecord) -> Result<(), TransitionError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (mut record, version) = self
                .load(id)
                .await?
                .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;

            mutate(&mut record)?;
            record.check_invariants()?;

            let value = serde_json::to_value(&record)?;
            match self
                .store
                .compare_and_set(Collection::Records, id, version, value)
                .await
            {
                Ok(_) => return Ok(record),
                Err(conflict @ StoreError::VersionConflict { .. }) => {
                    if attempt >= MAX_UPDATE_ATTEMPTS {
                        return Err(conflict.into());
                    }
                    warn!(research_id = %id, attempt, "Concurrent record update, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Write a stage artifact to its independent slot.
    pub async fn write_artifact(&self, id: &str, artifact: &StageArtifact) -> Result<(), PipelineError> {
        let collection = Collection::for_stage(artifact.stage());
        self.store.set(collection, id, artifact.to_value()?).await?;
        debug!(research_id = %id, collection = %collection, "Artifact slot written");
        Ok(())
    }

    /// Read an artifact slot. A slot that no longer parses is logged and skipped.
    pub async fn read_slot<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<T>, PipelineError> {
        let Some(entry) = self.store.get(collection, id).await? else {
            return Ok(None);
        };
        match serde_json::from_value(entry.value) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(research_id = %id, collection = %collection, error = %e, "Ignoring unreadable artifact slot");
                Ok(None)
            }
        }
    }
}
