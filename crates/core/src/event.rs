//! Domain event system: the transport between pipeline stages.
//!
//! Each stage subscribes to exactly one stage topic and, on success, publishes
//! the next one. Observability events (`retry.scheduled`, `stage.failed`)
//! ride the same bus but never trigger a stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::research::{Analysis, Depth, Finding, Report, ResearchPlan, Stage};

/// Topic names carried on the bus.
pub mod topics {
    pub const RESEARCH_STARTED: &str = "research.started";
    pub const PLAN_COMPLETED: &str = "plan.completed";
    pub const FINDINGS_COMPLETED: &str = "findings.completed";
    pub const ANALYSIS_COMPLETED: &str = "analysis.completed";
    pub const REPORT_COMPLETED: &str = "report.completed";
    pub const RETRY_SCHEDULED: &str = "retry.scheduled";
    pub const STAGE_FAILED: &str = "stage.failed";
}

/// All domain events in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "data")]
pub enum DomainEvent {
    /// A research record was created; triggers planning.
    #[serde(rename = "research.started")]
    ResearchStarted {
        research_id: String,
        query: String,
        depth: Depth,
    },

    /// Planning finished; triggers gathering.
    #[serde(rename = "plan.completed")]
    PlanCompleted {
        research_id: String,
        query: String,
        depth: Depth,
        plan: ResearchPlan,
    },

    /// Gathering finished; triggers analysis.
    #[serde(rename = "findings.completed")]
    FindingsCompleted {
        research_id: String,
        query: String,
        plan: ResearchPlan,
        findings: Vec<Finding>,
    },

    /// Analysis finished; triggers synthesis.
    #[serde(rename = "analysis.completed")]
    AnalysisCompleted {
        research_id: String,
        query: String,
        findings: Vec<Finding>,
        analysis: Analysis,
    },

    /// Synthesis finished; end of the chain.
    #[serde(rename = "report.completed")]
    ReportCompleted {
        research_id: String,
        query: String,
        report: Report,
    },

    /// A remote call failed transiently and will be retried.
    #[serde(rename = "retry.scheduled")]
    RetryScheduled {
        research_id: String,
        stage: Stage,
        attempt: u32,
        max_retries: u32,
        wait_ms: u64,
        error_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage terminated its workflow with a failure.
    #[serde(rename = "stage.failed")]
    StageFailed {
        research_id: String,
        stage: Stage,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::ResearchStarted { .. } => topics::RESEARCH_STARTED,
            DomainEvent::PlanCompleted { .. } => topics::PLAN_COMPLETED,
            DomainEvent::FindingsCompleted { .. } => topics::FINDINGS_COMPLETED,
            DomainEvent::AnalysisCompleted { .. } => topics::ANALYSIS_COMPLETED,
            DomainEvent::ReportCompleted { .. } => topics::REPORT_COMPLETED,
            DomainEvent::RetryScheduled { .. } => topics::RETRY_SCHEDULED,
            DomainEvent::StageFailed { .. } => topics::STAGE_FAILED,
        }
    }

    pub fn research_id(&self) -> &str {
        match self {
            DomainEvent::ResearchStarted { research_id, .. }
            | DomainEvent::PlanCompleted { research_id, .. }
            | DomainEvent::FindingsCompleted { research_id, .. }
            | DomainEvent::AnalysisCompleted { research_id, .. }
            | DomainEvent::ReportCompleted { research_id, .. }
            | DomainEvent::RetryScheduled { research_id, .. }
            | DomainEvent::StageFailed { research_id, .. } => research_id,
        }
    }

    /// The stage that consumes this event, if any.
    pub fn consumer(&self) -> Option<Stage> {
        match self {
            DomainEvent::ResearchStarted { .. } => Some(Stage::Planning),
            DomainEvent::PlanCompleted { .. } => Some(Stage::Gathering),
            DomainEvent::FindingsCompleted { .. } => Some(Stage::Analysis),
            DomainEvent::AnalysisCompleted { .. } => Some(Stage::Synthesis),
            _ => None,
        }
    }

    /// Whether this event ends a workflow (successfully or not).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DomainEvent::ReportCompleted { .. } | DomainEvent::StageFailed { .. }
        )
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Subscribers receive every event and filter for the topics they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        debug!(topic = event.topic(), research_id = %event.research_id(), "Publishing event");
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
