//! End-to-end tests for the DeepDive research pipeline.
//!
//! These run whole workflows through real store backends, with a mock
//! provider that answers each stage's prompt with a canned reply.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deepdive_config::StoreConfig;
use deepdive_core::error::ProviderError;
use deepdive_core::event::DomainEvent;
use deepdive_core::provider::{GenerateRequest, Provider};
use deepdive_core::research::{Depth, ResearchStatus, Stage, StageState};
use deepdive_core::retry::RetryConfig;
use deepdive_core::store::{Collection, StateStore};
use deepdive_pipeline::{PipelineSettings, ResearchPipeline, ResearchRepository, StatusAssembler};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that recognises which stage a prompt belongs to and
/// replies accordingly. Safe to share between concurrent workflows.
struct StageAwareProvider {
    failures: HashMap<Stage, ProviderError>,
    calls: Mutex<HashMap<Stage, usize>>,
}

impl StageAwareProvider {
    fn healthy() -> Self {
        Self {
            failures: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn failing(stage: Stage, error: ProviderError) -> Self {
        let mut provider = Self::healthy();
        provider.failures.insert(stage, error);
        provider
    }

    fn calls(&self, stage: Stage) -> usize {
        self.calls.lock().unwrap().get(&stage).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

fn stage_of(prompt: &str) -> Stage {
    if prompt.contains("research planning AI agent") {
        Stage::Planning
    } else if prompt.contains("Research Topic:") {
        Stage::Gathering
    } else if prompt.contains("analysis AI agent") {
        Stage::Analysis
    } else {
        Stage::Synthesis
    }
}

fn quoted_after<'a>(prompt: &'a str, label: &str) -> &'a str {
    prompt
        .split(label)
        .nth(1)
        .and_then(|rest| rest.split('"').nth(1))
        .unwrap_or("unknown")
}

#[async_trait::async_trait]
impl Provider for StageAwareProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, ProviderError> {
        let stage = stage_of(&request.prompt);
        *self.calls.lock().unwrap().entry(stage).or_default() += 1;

        if let Some(error) = self.failures.get(&stage) {
            return Err(error.clone());
        }

        let query = quoted_after(&request.prompt, "Query:");
        let reply = match stage {
            Stage::Planning => format!(
                "```json\n{{\"research_topics\": [\"{query} history\", \"{query} design\", \"{query} tradeoffs\", \"{query} future\", \"{query} tooling\"], \"key_questions\": [\"why?\"], \"approach\": \"literature survey\", \"estimated_time\": 20}}\n```"
            ),
            Stage::Gathering => {
                let topic = quoted_after(&request.prompt, "Research Topic:");
                format!(
                    "{{\"topic\": \"{topic}\", \"summary\": \"Notes on {topic}.\", \"key_points\": [\"k1\"], \"sources\": [\"s1\"], \"confidence\": 0.7}}"
                )
            }
            Stage::Analysis => "{\"overall_assessment\": \"Coherent.\", \"key_insights\": [\"i1\", \"i2\"], \"patterns_identified\": [], \"gaps\": [\"g1\"], \"confidence_score\": 0.75, \"recommendations\": [\"r1\"]}".to_string(),
            Stage::Synthesis => format!(
                "```json\n{{\"title\": \"Research Report: {query}\", \"executive_summary\": \"Summary.\", \"methodology\": \"Survey.\", \"findings_summary\": \"Findings.\", \"key_takeaways\": [\"t1\"], \"conclusions\": \"Done.\", \"next_steps\": [], \"confidence_level\": \"medium\"}}\n```"
            ),
        };
        Ok(reply)
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        model: "e2e-model".into(),
        retry: RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 4,
            backoff_multiplier: 2.0,
        },
        courtesy_delay: Duration::ZERO,
        event_capacity: 256,
    }
}

async fn file_store(dir: &tempfile::TempDir) -> Arc<dyn StateStore> {
    let config = StoreConfig {
        backend: "file".into(),
        path: Some(dir.path().join("research.json")),
    };
    deepdive_store::open(&config).await.unwrap()
}

// ── E2E: Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_quick_research_completes_and_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(StageAwareProvider::healthy());
    let pipeline = ResearchPipeline::new(provider.clone(), file_store(&dir).await, settings());
    let listener = pipeline.spawn();

    let view = pipeline.run("Rust async runtimes", Depth::Quick).await.unwrap();
    listener.abort();

    let record = view.record;
    assert_eq!(record.status, ResearchStatus::Completed);
    assert!(record.stage_progress.all_completed());
    assert_eq!(record.findings.as_ref().unwrap().len(), 3);
    assert_eq!(record.report.as_ref().unwrap().title, "Research Report: Rust async runtimes");
    assert_eq!(provider.calls(Stage::Planning), 1);
    assert_eq!(provider.calls(Stage::Gathering), 3);
    assert_eq!(provider.total_calls(), 6);

    // A fresh process sees the same outcome.
    let reopened = file_store(&dir).await;
    for collection in [Collection::Plans, Collection::Findings, Collection::Analysis, Collection::Reports] {
        assert!(reopened.get(collection, &record.id).await.unwrap().is_some());
    }
    let again = StatusAssembler::new(ResearchRepository::new(reopened))
        .status(&record.id)
        .await
        .unwrap();
    assert_eq!(again.record.status, ResearchStatus::Completed);
    assert_eq!(again.record.report, record.report);
}

#[tokio::test]
async fn e2e_depth_controls_topic_count() {
    let provider = Arc::new(StageAwareProvider::healthy());
    let pipeline = ResearchPipeline::new(
        provider.clone(),
        Arc::new(deepdive_store::InMemoryStore::new()),
        settings(),
    );
    let _listener = pipeline.spawn();

    let deep = pipeline.run("Vector databases", Depth::Deep).await.unwrap();
    assert_eq!(deep.record.findings.unwrap().len(), 5);

    let standard = pipeline.run("Vector databases", Depth::Standard).await.unwrap();
    assert_eq!(standard.record.findings.unwrap().len(), 4);

    assert_eq!(provider.calls(Stage::Gathering), 9);
}

#[tokio::test]
async fn e2e_concurrent_workflows_do_not_interfere() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(StageAwareProvider::healthy());
    let pipeline = ResearchPipeline::new(provider.clone(), file_store(&dir).await, settings());
    let _listener = pipeline.spawn();

    let (a, b, c) = tokio::join!(
        pipeline.run("Consensus protocols", Depth::Quick),
        pipeline.run("Columnar storage", Depth::Standard),
        pipeline.run("Garbage collectors", Depth::Deep),
    );
    let (a, b, c) = (a.unwrap().record, b.unwrap().record, c.unwrap().record);

    for (record, topics) in [(&a, 3), (&b, 4), (&c, 5)] {
        assert_eq!(record.status, ResearchStatus::Completed);
        let findings = record.findings.as_ref().unwrap();
        assert_eq!(findings.len(), topics);
        assert!(findings.iter().all(|f| f.topic.starts_with(&record.query)));
    }
    assert_ne!(a.id, b.id);
    assert_eq!(provider.calls(Stage::Synthesis), 3);
}

// ── E2E: Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_persistent_overload_fails_gathering() {
    let provider = Arc::new(StageAwareProvider::failing(
        Stage::Gathering,
        ProviderError::ApiError {
            status_code: 503,
            message: "The model is overloaded. Please try again later.".into(),
        },
    ));
    let pipeline = ResearchPipeline::new(
        provider.clone(),
        Arc::new(deepdive_store::InMemoryStore::new()),
        settings(),
    );
    let mut events = pipeline.bus().subscribe();
    let _listener = pipeline.spawn();

    let record = pipeline.run("Edge computing", Depth::Quick).await.unwrap().record;

    assert_eq!(record.status, ResearchStatus::Failed);
    assert_eq!(record.stage_progress.get(Stage::Planning), StageState::Completed);
    assert_eq!(record.stage_progress.get(Stage::Gathering), StageState::Failed);
    assert_eq!(record.stage_progress.get(Stage::Analysis), StageState::Pending);
    assert_eq!(record.stage_progress.get(Stage::Synthesis), StageState::Pending);
    assert!(record.error.unwrap().contains("Max retries (3)"));
    assert_eq!(provider.calls(Stage::Gathering), 4);
    assert_eq!(provider.calls(Stage::Analysis), 0);

    let mut topics = Vec::new();
    while let Ok(event) = events.try_recv() {
        topics.push(event.topic());
    }
    assert_eq!(
        topics,
        vec![
            "research.started",
            "plan.completed",
            "retry.scheduled",
            "retry.scheduled",
            "retry.scheduled",
            "stage.failed",
        ]
    );
}

#[tokio::test]
async fn e2e_daily_quota_stops_planning_after_one_call() {
    let provider = Arc::new(StageAwareProvider::failing(
        Stage::Planning,
        ProviderError::ApiError {
            status_code: 429,
            message: "Quota exceeded for quota metric 'GenerateRequestsPerDayPerProjectPerModel-FreeTier'. Please retry in 41.2s.".into(),
        },
    ));
    let pipeline = ResearchPipeline::new(
        provider.clone(),
        Arc::new(deepdive_store::InMemoryStore::new()),
        settings(),
    );
    let mut events = pipeline.bus().subscribe();
    let _listener = pipeline.spawn();

    let record = pipeline.run("Quantum error correction", Depth::Standard).await.unwrap().record;

    assert_eq!(provider.total_calls(), 1);
    assert_eq!(record.status, ResearchStatus::Failed);
    assert_eq!(record.stage_progress.get(Stage::Planning), StageState::Failed);
    assert!(record.error.as_deref().unwrap().starts_with("Daily API quota exceeded"));
    assert!(record.error_details.unwrap().suggestion.contains("midnight Pacific"));

    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event.as_ref(), DomainEvent::RetryScheduled { .. }),
            "daily quota must not be retried"
        );
    }
}

#[tokio::test]
async fn e2e_authentication_failure_is_not_retried() {
    let provider = Arc::new(StageAwareProvider::failing(
        Stage::Analysis,
        ProviderError::AuthenticationFailed("API key not valid".into()),
    ));
    let pipeline = ResearchPipeline::new(
        provider.clone(),
        Arc::new(deepdive_store::InMemoryStore::new()),
        settings(),
    );
    let _listener = pipeline.spawn();

    let record = pipeline.run("Formal verification", Depth::Quick).await.unwrap().record;

    assert_eq!(record.status, ResearchStatus::Failed);
    assert_eq!(record.stage_progress.get(Stage::Analysis), StageState::Failed);
    assert_eq!(provider.calls(Stage::Analysis), 1);
    assert!(record.findings.is_some());
    assert!(record.analysis.is_none());
    assert!(record.error.unwrap().contains("API key not valid"));
}

// ── E2E: SQLite backend ──────────────────────────────────────────────────

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn e2e_sqlite_backend_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        backend: "sqlite".into(),
        path: Some(dir.path().join("nested").join("research.db")),
    };
    let store = deepdive_store::open(&config).await.unwrap();
    assert_eq!(store.name(), "sqlite");

    let provider = Arc::new(StageAwareProvider::healthy());
    let pipeline = ResearchPipeline::new(provider, store.clone(), settings());
    let _listener = pipeline.spawn();

    let record = pipeline.run("Log-structured merge trees", Depth::Quick).await.unwrap().record;
    assert_eq!(record.status, ResearchStatus::Completed);

    let slot = store.get(Collection::Reports, &record.id).await.unwrap().unwrap();
    assert_eq!(slot.value["confidence_level"], "medium");
}
