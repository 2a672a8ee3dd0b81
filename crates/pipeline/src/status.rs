//! Read-only status assembly.
//!
//! For a completed workflow the independent artifact slots are authoritative:
//! each slot that is present replaces the copy embedded in the record.

use deepdive_core::error::PipelineError;
use deepdive_core::research::{Analysis, Finding, Report, ResearchPlan, ResearchRecord, ResearchStatus};
use deepdive_core::store::Collection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::repository::ResearchRepository;

/// What a status query returns: the record, hydrated from its slots when
/// the workflow has completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchView {
    #[serde(flatten)]
    pub record: ResearchRecord,
}

impl ResearchView {
    pub fn into_record(self) -> ResearchRecord {
        self.record
    }
}

pub struct StatusAssembler {
    repository: ResearchRepository,
}

impl StatusAssembler {
    pub fn new(repository: ResearchRepository) -> Self {
        Self { repository }
    }

    pub async fn status(&self, research_id: &str) -> Result<ResearchView, PipelineError> {
        let (mut record, _) = self
            .repository
            .load(research_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(research_id.to_string()))?;

        if record.status == ResearchStatus::Completed {
            let repo = &self.repository;
            if let Some(plan) = repo.read_slot::<ResearchPlan>(Collection::Plans, research_id).await? {
                record.plan = Some(plan);
            }
            if let Some(findings) = repo.read_slot::<Vec<Finding>>(Collection::Findings, research_id).await? {
                record.findings = Some(findings);
            }
            if let Some(analysis) = repo.read_slot::<Analysis>(Collection::Analysis, research_id).await? {
                record.analysis = Some(analysis);
            }
            if let Some(report) = repo.read_slot::<Report>(Collection::Reports, research_id).await? {
                record.report = Some(report);
            }
        }

        info!(research_id, status = %record.status, "Status retrieved");
        Ok(ResearchView { record })
    }
}
