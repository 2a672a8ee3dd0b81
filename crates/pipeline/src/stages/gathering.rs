use async_trait::async_trait;
use deepdive_core::error::PipelineError;
use deepdive_core::event::DomainEvent;
use deepdive_core::research::{Finding, Stage, StageArtifact};
use tracing::info;

use crate::parse::parse_structured;
use crate::prompts;
use crate::stage::{StageContext, StageHandler, StageOutput};

/// `plan.completed` → `findings.completed`
///
/// Researches the first `depth.topic_count()` plan topics one after another,
/// pausing for the courtesy delay between calls.
pub struct GatheringStage;

#[async_trait]
impl StageHandler for GatheringStage {
    fn stage(&self) -> Stage {
        Stage::Gathering
    }

    async fn process(&self, ctx: &StageContext, event: &DomainEvent) -> Result<StageOutput, PipelineError> {
        let DomainEvent::PlanCompleted {
            research_id,
            query,
            depth,
            plan,
        } = event
        else {
            return Err(super::unexpected(self.stage(), event));
        };

        let topics: Vec<&String> = plan.research_topics.iter().take(depth.topic_count()).collect();
        if topics.is_empty() {
            return Err(PipelineError::EmptyPlan);
        }

        let mut findings = Vec::with_capacity(topics.len());
        for (i, topic) in topics.iter().enumerate() {
            if i > 0 && !ctx.courtesy_delay.is_zero() {
                tokio::time::sleep(ctx.courtesy_delay).await;
            }

            info!(research_id = %research_id, topic = %topic, "Researching topic");
            let reply = ctx
                .generate(research_id, self.stage(), prompts::gathering(query, topic))
                .await?;
            let mut finding: Finding = parse_structured(self.stage(), &reply)?;
            if finding.topic.trim().is_empty() {
                finding.topic = topic.to_string();
            }
            findings.push(finding);
        }

        info!(research_id = %research_id, findings = findings.len(), "Research completed");

        Ok(StageOutput {
            artifact: StageArtifact::Findings(findings.clone()),
            next: DomainEvent::FindingsCompleted {
                research_id: research_id.clone(),
                query: query.clone(),
                plan: plan.clone(),
                findings,
            },
        })
    }
}
