//! Shared test helpers for pipeline tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use deepdive_core::error::ProviderError;
use deepdive_core::provider::{GenerateRequest, Provider};
use deepdive_core::retry::RetryConfig;

use crate::pipeline::PipelineSettings;

pub const PLAN_JSON: &str = r#"```json
{"research_topics": ["a", "b"], "key_questions": ["what?"], "approach": "survey", "estimated_time": 15}
```"#;

pub const ANALYSIS_JSON: &str = r#"{"overall_assessment": "Consistent picture.", "key_insights": ["i1"], "patterns_identified": ["p1"], "gaps": [], "confidence_score": 0.8, "recommendations": ["r1"]}"#;

pub fn finding_json(topic: &str) -> String {
    format!(
        r#"{{"topic": "{topic}", "summary": "About {topic}.", "key_points": ["k1", "k2"], "sources": ["s1"], "confidence": 0.9}}"#
    )
}

pub fn report_json() -> String {
    r#"{"title": "Research Report: B-trees", "executive_summary": "Summary.", "methodology": "Survey.", "findings_summary": "All good.", "key_takeaways": ["t1"], "conclusions": "Done.", "next_steps": ["n1"], "confidence_level": "high"}"#.to_string()
}

/// Fast settings: no courtesy delay, three retries starting at one second.
pub fn settings() -> PipelineSettings {
    PipelineSettings {
        model: "test-model".into(),
        retry: RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
        },
        courtesy_delay: Duration::ZERO,
        event_capacity: 64,
    }
}

/// A provider that replays a script of replies in order.
///
/// Once the script runs out it keeps returning the fallback, or an
/// `InvalidResponse` error when there is none.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: Option<Result<String, ProviderError>>,
    call_count: Mutex<usize>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            call_count: Mutex::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, reply: Result<String, ProviderError>) -> Self {
        self.fallback = Some(reply);
        self
    }

    pub fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    #[allow(dead_code)]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, ProviderError> {
        *self.call_count.lock().unwrap() += 1;
        self.prompts.lock().unwrap().push(request.prompt);

        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(reply), _) => reply,
            (None, Some(fallback)) => fallback.clone(),
            (None, None) => Err(ProviderError::InvalidResponse(
                "scripted provider has no more replies".into(),
            )),
        }
    }
}
