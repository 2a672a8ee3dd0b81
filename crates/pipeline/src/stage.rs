//! The shared stage pattern.
//!
//! Every stage follows the same skeleton, implemented once in [`run_stage`]:
//!
//! 1. Drop the delivery unless the record exists, is `initiated`, and the
//!    stage is still `pending` with its predecessor completed.
//! 2. Let the [`StageHandler`] do its remote work and produce an artifact plus
//!    the outbound event.
//! 3. On success: merge the artifact into the record (compare-and-set), write
//!    the artifact slot, publish the outbound event.
//! 4. On any error, including a failed record read: mark the record `failed`
//!    with a user-facing message and [`ErrorDetails`], publish `stage.failed`,
//!    publish nothing else.
//!
//! Handlers never panic and never propagate errors back to the bus.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deepdive_core::error::PipelineError;
use deepdive_core::event::{DomainEvent, EventBus};
use deepdive_core::provider::{GenerateRequest, Provider};
use deepdive_core::research::{ErrorDetails, Stage, StageArtifact};
use deepdive_core::retry::{RetryConfig, RetryExecutor};
use tracing::{error, info, warn};

use crate::repository::ResearchRepository;

pub const DAILY_QUOTA_MESSAGE: &str =
    "Daily API quota exceeded. Please try again after midnight Pacific Time.";

pub const DAILY_QUOTA_SUGGESTION: &str = "Quota resets at midnight Pacific Time. Consider using depth: \"quick\" (3 topics instead of 5) to stay within limits.";

pub const DEFAULT_SUGGESTION: &str = "Please check the logs for more details.";

/// Everything a stage needs to do its work.
pub struct StageContext {
    pub provider: Arc<dyn Provider>,
    pub repository: ResearchRepository,
    pub bus: Arc<EventBus>,
    pub model: String,
    pub retry: RetryConfig,
    /// Pause between successive remote calls within one stage
    pub courtesy_delay: Duration,
}

impl StageContext {
    /// One retried generation call on behalf of `stage`.
    ///
    /// Every scheduled retry is published as a `retry.scheduled` event.
    pub async fn generate(
        &self,
        research_id: &str,
        stage: Stage,
        prompt: String,
    ) -> Result<String, PipelineError> {
        let bus = self.bus.clone();
        let id = research_id.to_string();
        let executor = RetryExecutor::new(self.retry.clone()).with_observer(move |attempt| {
            bus.publish(DomainEvent::RetryScheduled {
                research_id: id.clone(),
                stage,
                attempt: attempt.attempt,
                max_retries: attempt.max_retries,
                wait_ms: attempt.wait.as_millis() as u64,
                error_preview: attempt.error_preview.clone(),
                timestamp: Utc::now(),
            });
        });

        let request = GenerateRequest::new(&self.model, prompt);
        let text = executor
            .execute(|| self.provider.generate(request.clone()))
            .await?;
        Ok(text)
    }
}

/// What a stage hands back on success.
pub struct StageOutput {
    pub artifact: StageArtifact,
    /// Published once the record update has been persisted
    pub next: DomainEvent,
}

/// One processing stage: consumes one event topic, produces one artifact.
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> Stage;

    /// Do the stage's remote work for `event`.
    async fn process(&self, ctx: &StageContext, event: &DomainEvent) -> Result<StageOutput, PipelineError>;
}

/// The user-facing failure text stored in the record's `error` field.
pub fn user_message(err: &PipelineError) -> String {
    let text = err.to_string();
    if err.is_daily_quota() || text.contains("RequestsPerDay") {
        DAILY_QUOTA_MESSAGE.to_string()
    } else {
        text
    }
}

pub fn error_details(err: &PipelineError) -> ErrorDetails {
    let message = err.to_string();
    let suggestion = if err.is_daily_quota() || message.contains("RequestsPerDay") {
        DAILY_QUOTA_SUGGESTION
    } else {
        DEFAULT_SUGGESTION
    };
    ErrorDetails {
        message,
        timestamp: Utc::now(),
        suggestion: suggestion.to_string(),
    }
}

/// Run `handler` for one delivered event.
pub async fn run_stage(ctx: &StageContext, handler: &dyn StageHandler, event: &DomainEvent) {
    let stage = handler.stage();
    let research_id = event.research_id();

    if event.consumer() != Some(stage) {
        warn!(research_id, stage = %stage, topic = event.topic(), "Event routed to the wrong stage, dropping");
        return;
    }

    match ctx.repository.load(research_id).await {
        Ok(Some((record, _))) => {
            if let Err(reason) = record.ensure_can_run(stage) {
                info!(research_id, stage = %stage, reason = %reason, "Dropping duplicate or late delivery");
                return;
            }
        }
        Ok(None) => {
            warn!(research_id, stage = %stage, "Research record not found, dropping event");
            return;
        }
        Err(e) => {
            error!(research_id, stage = %stage, error = %e, "Failed to load research record");
            fail(ctx, research_id, stage, &e).await;
            return;
        }
    }

    info!(research_id, stage = %stage, "Stage started");

    let output = match handler.process(ctx, event).await {
        Ok(output) => output,
        Err(e) => {
            fail(ctx, research_id, stage, &e).await;
            return;
        }
    };

    let StageOutput { artifact, next } = output;
    let update = ctx
        .repository
        .update(research_id, |record| record.complete_stage(artifact.clone()))
        .await;

    match update {
        Ok(_) => {}
        Err(PipelineError::Transition(reason)) => {
            // Another delivery finished (or failed) this stage meanwhile.
            info!(research_id, stage = %stage, reason = %reason, "Stage result superseded, discarding");
            return;
        }
        Err(e) => {
            fail(ctx, research_id, stage, &e).await;
            return;
        }
    }

    if let Err(e) = ctx.repository.write_artifact(research_id, &artifact).await {
        error!(research_id, stage = %stage, error = %e, "Failed to write artifact slot");
    }

    info!(research_id, stage = %stage, next = next.topic(), "Stage completed");
    ctx.bus.publish(next);
}

async fn fail(ctx: &StageContext, research_id: &str, stage: Stage, err: &PipelineError) {
    error!(research_id, stage = %stage, error = %err, "Stage failed");

    let message = user_message(err);
    let details = error_details(err);
    let persisted = ctx
        .repository
        .update(research_id, |record| {
            record.fail_stage(stage, message.clone(), details.clone())
        })
        .await;

    match persisted {
        Ok(_) => {}
        Err(PipelineError::Transition(reason)) => {
            info!(research_id, stage = %stage, reason = %reason, "Record already moved on, failure not recorded");
            return;
        }
        Err(e) => {
            error!(research_id, stage = %stage, error = %e, "Failed to persist stage failure");
        }
    }

    ctx.bus.publish(DomainEvent::StageFailed {
        research_id: research_id.to_string(),
        stage,
        error: message,
        timestamp: Utc::now(),
    });
}
