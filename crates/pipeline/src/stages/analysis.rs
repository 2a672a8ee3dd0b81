use async_trait::async_trait;
use deepdive_core::error::PipelineError;
use deepdive_core::event::DomainEvent;
use deepdive_core::research::{Analysis, Stage, StageArtifact};
use tracing::info;

use crate::parse::parse_structured;
use crate::prompts;
use crate::stage::{StageContext, StageHandler, StageOutput};

/// `findings.completed` → `analysis.completed`
pub struct AnalysisStage;

#[async_trait]
impl StageHandler for AnalysisStage {
    fn stage(&self) -> Stage {
        Stage::Analysis
    }

    async fn process(&self, ctx: &StageContext, event: &DomainEvent) -> Result<StageOutput, PipelineError> {
        let DomainEvent::FindingsCompleted {
            research_id,
            query,
            findings,
            ..
        } = event
        else {
            return Err(super::unexpected(self.stage(), event));
        };

        let reply = ctx
            .generate(research_id, self.stage(), prompts::analysis(query, findings))
            .await?;
        let analysis: Analysis = parse_structured(self.stage(), &reply)?;

        info!(
            research_id = %research_id,
            insights = analysis.key_insights.len(),
            confidence = ?analysis.confidence_score,
            "Analysis completed"
        );

        Ok(StageOutput {
            artifact: StageArtifact::Analysis(analysis.clone()),
            next: DomainEvent::AnalysisCompleted {
                research_id: research_id.clone(),
                query: query.clone(),
                findings: findings.clone(),
                analysis,
            },
        })
    }
}
