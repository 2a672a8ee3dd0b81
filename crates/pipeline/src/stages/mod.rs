//! The four stage handlers.

mod analysis;
mod gathering;
mod planning;
mod synthesis;

pub use analysis::AnalysisStage;
pub use gathering::GatheringStage;
pub use planning::PlanningStage;
pub use synthesis::SynthesisStage;

use deepdive_core::error::PipelineError;
use deepdive_core::event::DomainEvent;
use deepdive_core::research::Stage;

fn unexpected(stage: Stage, event: &DomainEvent) -> PipelineError {
    PipelineError::UnexpectedEvent {
        stage,
        topic: event.topic().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ResearchRepository;
    use crate::stage::{StageContext, StageHandler};
    use crate::test_helpers::{ScriptedProvider, finding_json, report_json, settings, ANALYSIS_JSON};
    use deepdive_core::event::EventBus;
    use deepdive_core::research::{Depth, ResearchPlan, StageArtifact};
    use deepdive_store::InMemoryStore;
    use std::sync::Arc;

    fn context(provider: Arc<ScriptedProvider>) -> StageContext {
        let settings = settings();
        StageContext {
            provider,
            repository: ResearchRepository::new(Arc::new(InMemoryStore::new())),
            bus: Arc::new(EventBus::new(16)),
            model: settings.model,
            retry: settings.retry,
            courtesy_delay: settings.courtesy_delay,
        }
    }

    fn plan(topics: &[&str]) -> ResearchPlan {
        ResearchPlan {
            research_topics: topics.iter().map(|t| t.to_string()).collect(),
            key_questions: vec![],
            approach: "survey".into(),
            estimated_time: None,
        }
    }

    #[tokio::test]
    async fn handlers_reject_foreign_events() {
        let ctx = context(Arc::new(ScriptedProvider::new(vec![])));
        let event = DomainEvent::ResearchStarted {
            research_id: "r".into(),
            query: "q".into(),
            depth: Depth::Quick,
        };
        let err = match GatheringStage.process(&ctx, &event).await {
            Err(e) => e,
            Ok(_) => panic!("gathering accepted research.started"),
        };
        assert!(err.to_string().contains("gathering cannot consume a research.started"));
    }

    #[tokio::test]
    async fn planning_carries_depth_forward() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            r#"{"research_topics": ["x"], "key_questions": [], "approach": "a"}"#.into(),
        )]));
        let ctx = context(provider.clone());
        let event = DomainEvent::ResearchStarted {
            research_id: "r".into(),
            query: "What is CRDT?".into(),
            depth: Depth::Deep,
        };

        let output = PlanningStage.process(&ctx, &event).await.unwrap();
        assert_eq!(output.artifact, StageArtifact::Plan(plan(&["x"])));
        match output.next {
            DomainEvent::PlanCompleted { depth, .. } => assert_eq!(depth, Depth::Deep),
            other => panic!("Expected PlanCompleted, got: {other:?}"),
        }
        assert!(provider.prompts()[0].contains("What is CRDT?"));
    }

    #[tokio::test]
    async fn gathering_fills_missing_topic_names() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(r#"{"topic": "", "summary": "s"}"#.into()),
            Ok(r#"{"summary": "no topic key at all", "key_points": ["k"]}"#.into()),
        ]));
        let ctx = context(provider.clone());
        let event = DomainEvent::PlanCompleted {
            research_id: "r".into(),
            query: "q".into(),
            depth: Depth::Standard,
            plan: plan(&["first", "second"]),
        };

        let output = GatheringStage.process(&ctx, &event).await.unwrap();
        let StageArtifact::Findings(findings) = output.artifact else {
            panic!("Expected findings");
        };
        assert_eq!(findings[0].topic, "first");
        assert_eq!(findings[1].topic, "second");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn analysis_and_synthesis_chain() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(ANALYSIS_JSON.into()), Ok(report_json())]));
        let ctx = context(provider.clone());

        let findings_event = DomainEvent::FindingsCompleted {
            research_id: "r".into(),
            query: "q".into(),
            plan: plan(&["a"]),
            findings: vec![serde_json::from_str(&finding_json("a")).unwrap()],
        };
        let analysed = AnalysisStage.process(&ctx, &findings_event).await.unwrap();
        assert_eq!(analysed.next.consumer(), Some(Stage::Synthesis));

        let reported = SynthesisStage.process(&ctx, &analysed.next).await.unwrap();
        let StageArtifact::Report(report) = reported.artifact else {
            panic!("Expected report");
        };
        assert_eq!(report.confidence_level, "high");
        assert!(report.generated_at.is_some());
        assert!(reported.next.is_terminal());
        assert!(provider.prompts()[1].contains("Number of findings: 1"));
    }
}
