//! The research pipeline runtime: entry trigger, event dispatch, status.

use std::sync::Arc;
use std::time::Duration;

use deepdive_config::AppConfig;
use deepdive_core::error::PipelineError;
use deepdive_core::event::{DomainEvent, EventBus};
use deepdive_core::provider::Provider;
use deepdive_core::research::{Depth, ResearchRecord, Stage};
use deepdive_core::retry::RetryConfig;
use deepdive_core::store::StateStore;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::repository::ResearchRepository;
use crate::stage::{StageContext, StageHandler, run_stage};
use crate::stages::{AnalysisStage, GatheringStage, PlanningStage, SynthesisStage};
use crate::status::{ResearchView, StatusAssembler};

/// Tunables for a pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: String,
    pub retry: RetryConfig,
    pub courtesy_delay: Duration,
    pub event_capacity: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            retry: config.pipeline.retry.clone(),
            courtesy_delay: Duration::from_millis(config.pipeline.courtesy_delay_ms),
            event_capacity: config.pipeline.event_capacity,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Wires the stage handlers to the event bus.
///
/// Cheap to clone; clones share the bus, store, and provider.
#[derive(Clone)]
pub struct ResearchPipeline {
    ctx: Arc<StageContext>,
    handlers: Arc<[Arc<dyn StageHandler>; 4]>,
}

impl ResearchPipeline {
    pub fn new(provider: Arc<dyn Provider>, store: Arc<dyn StateStore>, settings: PipelineSettings) -> Self {
        let ctx = StageContext {
            provider,
            repository: ResearchRepository::new(store),
            bus: Arc::new(EventBus::new(settings.event_capacity)),
            model: settings.model,
            retry: settings.retry,
            courtesy_delay: settings.courtesy_delay,
        };
        let handlers: [Arc<dyn StageHandler>; 4] = [
            Arc::new(PlanningStage),
            Arc::new(GatheringStage),
            Arc::new(AnalysisStage),
            Arc::new(SynthesisStage),
        ];
        Self {
            ctx: Arc::new(ctx),
            handlers: Arc::new(handlers),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.ctx.bus
    }

    pub fn repository(&self) -> &ResearchRepository {
        &self.ctx.repository
    }

    fn handler(&self, stage: Stage) -> Arc<dyn StageHandler> {
        let index = match stage {
            Stage::Planning => 0,
            Stage::Gathering => 1,
            Stage::Analysis => 2,
            Stage::Synthesis => 3,
        };
        self.handlers[index].clone()
    }

    /// Entry trigger: create and persist a record, then publish `research.started`.
    pub async fn start_research(&self, query: impl Into<String>, depth: Depth) -> Result<String, PipelineError> {
        let record = ResearchRecord::new(query, depth);
        self.ctx.repository.create(&record).await?;

        info!(research_id = %record.id, query = %record.query, depth = %depth, "Research started");

        self.ctx.bus.publish(DomainEvent::ResearchStarted {
            research_id: record.id.clone(),
            query: record.query.clone(),
            depth,
        });
        Ok(record.id)
    }

    pub async fn status(&self, research_id: &str) -> Result<ResearchView, PipelineError> {
        StatusAssembler::new(self.ctx.repository.clone())
            .status(research_id)
            .await
    }

    /// Route one event: spawn its consuming stage, or log a completion.
    pub fn dispatch(&self, event: Arc<DomainEvent>) -> Option<JoinHandle<()>> {
        if let DomainEvent::ReportCompleted { .. } = event.as_ref() {
            log_completion(&event);
            return None;
        }

        let stage = event.consumer()?;
        let ctx = self.ctx.clone();
        let handler = self.handler(stage);
        Some(tokio::spawn(async move {
            run_stage(&ctx, handler.as_ref(), &event).await;
        }))
    }

    /// Start the bus listener. Each delivered stage event runs in its own task.
    pub fn spawn(&self) -> JoinHandle<()> {
        let mut rx = self.ctx.bus.subscribe();
        let pipeline = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        debug!(topic = event.topic(), research_id = %event.research_id(), "Event received");
                        pipeline.dispatch(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Pipeline listener lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Start a workflow and wait until it completes or fails.
    ///
    /// Requires a running listener (see [`ResearchPipeline::spawn`]).
    pub async fn run(&self, query: impl Into<String>, depth: Depth) -> Result<ResearchView, PipelineError> {
        let mut rx = self.ctx.bus.subscribe();
        let research_id = self.start_research(query, depth).await?;

        loop {
            match rx.recv().await {
                Ok(event) if event.research_id() == research_id && event.is_terminal() => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Run waiter lagged, checking record");
                    if self.status(&research_id).await?.record.status.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }

        self.status(&research_id).await
    }
}

/// Completion logger: reports a finished workflow.
fn log_completion(event: &DomainEvent) {
    if let DomainEvent::ReportCompleted {
        research_id,
        query,
        report,
    } = event
    {
        info!(
            research_id = %research_id,
            query = %query,
            report_title = %report.title,
            confidence_level = %report.confidence_level,
            "Research workflow completed successfully"
        );
    }
}
