use async_trait::async_trait;
use deepdive_core::error::PipelineError;
use deepdive_core::event::DomainEvent;
use deepdive_core::research::{ResearchPlan, Stage, StageArtifact};
use tracing::info;

use crate::parse::parse_structured;
use crate::prompts;
use crate::stage::{StageContext, StageHandler, StageOutput};

/// `research.started` → `plan.completed`
pub struct PlanningStage;

#[async_trait]
impl StageHandler for PlanningStage {
    fn stage(&self) -> Stage {
        Stage::Planning
    }

    async fn process(&self, ctx: &StageContext, event: &DomainEvent) -> Result<StageOutput, PipelineError> {
        let DomainEvent::ResearchStarted {
            research_id,
            query,
            depth,
        } = event
        else {
            return Err(super::unexpected(self.stage(), event));
        };

        let reply = ctx
            .generate(research_id, self.stage(), prompts::planning(query, *depth))
            .await?;
        let plan: ResearchPlan = parse_structured(self.stage(), &reply)?;

        info!(research_id = %research_id, topics = plan.research_topics.len(), "Research plan created");

        Ok(StageOutput {
            artifact: StageArtifact::Plan(plan.clone()),
            next: DomainEvent::PlanCompleted {
                research_id: research_id.clone(),
                query: query.clone(),
                depth: *depth,
                plan,
            },
        })
    }
}
