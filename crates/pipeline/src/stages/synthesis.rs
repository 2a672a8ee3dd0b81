use async_trait::async_trait;
use chrono::Utc;
use deepdive_core::error::PipelineError;
use deepdive_core::event::DomainEvent;
use deepdive_core::research::{Report, Stage, StageArtifact};
use tracing::info;

use crate::parse::parse_structured;
use crate::prompts;
use crate::stage::{StageContext, StageHandler, StageOutput};

/// `analysis.completed` → `report.completed`
///
/// Completing this stage completes the whole record.
pub struct SynthesisStage;

#[async_trait]
impl StageHandler for SynthesisStage {
    fn stage(&self) -> Stage {
        Stage::Synthesis
    }

    async fn process(&self, ctx: &StageContext, event: &DomainEvent) -> Result<StageOutput, PipelineError> {
        let DomainEvent::AnalysisCompleted {
            research_id,
            query,
            findings,
            analysis,
        } = event
        else {
            return Err(super::unexpected(self.stage(), event));
        };

        let now = Utc::now().to_rfc3339();
        let reply = ctx
            .generate(
                research_id,
                self.stage(),
                prompts::synthesis(query, analysis, findings.len(), &now),
            )
            .await?;
        let mut report: Report = parse_structured(self.stage(), &reply)?;
        if report.generated_at.is_none() {
            report.generated_at = Some(now);
        }

        info!(research_id = %research_id, title = %report.title, "Report generated");

        Ok(StageOutput {
            artifact: StageArtifact::Report(report.clone()),
            next: DomainEvent::ReportCompleted {
                research_id: research_id.clone(),
                query: query.clone(),
                report,
            },
        })
    }
}
