//! Google Gemini provider (Generative Language REST API).
//!
//! - Endpoint: `{base}/models/{model}:generateContent`
//! - Model discovery: `{base}/models`, filtered to models that support
//!   `generateContent`
//! - Auth: `x-goog-api-key` header, never the query string
//!
//! Error bodies are passed through untouched so quota metric names such as
//! `GenerateRequestsPerDayPerProjectPerModel` reach the retry executor.

use async_trait::async_trait;
use deepdive_core::error::ProviderError;
use deepdive_core::provider::{GenerateRequest, Provider};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            client: http::client(),
        }
    }

    /// Point at a different endpoint (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn generate_url(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.base_url)
    }

    fn request_body(request: &GenerateRequest) -> ApiRequest {
        let generation_config = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(ApiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            })
        } else {
            None
        };

        ApiRequest {
            contents: vec![ApiContent {
                role: Some("user".into()),
                parts: vec![ApiPart {
                    text: Some(request.prompt.clone()),
                }],
            }],
            generation_config,
        }
    }

    /// Concatenate the text parts of the first candidate.
    fn extract_text(response: ApiResponse) -> Result<String, ProviderError> {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::InvalidResponse(format!(
                "Prompt blocked by Gemini: {reason}"
            )));
        }

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("Empty 'candidates' array in response".into()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::InvalidResponse(format!(
                "Candidate contained no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }

    fn generation_models(list: ApiModelList) -> Vec<String> {
        list.models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
            })
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect()
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "gemini: no API key (set GEMINI_API_KEY or api_key in config)".into(),
            ));
        }

        debug!(provider = "gemini", model = %request.model, "Sending generateContent request");

        let response = self
            .client
            .post(self.generate_url(&request.model))
            .header(API_KEY_HEADER, &self.api_key)
            .header("Content-Type", "application/json")
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(http::transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = http::retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(http::status_error("gemini", status, retry_after, body));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        Self::extract_text(api_response)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self
            .client
            .get(self.models_url())
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(http::transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = http::retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(http::status_error("gemini", status, retry_after, body));
        }

        let list: ApiModelList = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse model list: {e}")))?;

        Ok(Self::generation_models(list))
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let response = self
            .client
            .get(self.models_url())
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(http::transport_error)?;
        Ok(response.status().is_success())
    }
}

// --- Gemini API types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<ApiGenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct ApiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Serialize, Deserialize)]
struct ApiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<ApiPromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    #[serde(default)]
    content: Option<ApiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiModelList {
    #[serde(default)]
    models: Vec<ApiModel>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> Result<String, ProviderError> {
        GeminiProvider::extract_text(serde_json::from_value(json).unwrap())
    }

    #[test]
    fn endpoint_urls_never_carry_key() {
        let provider = GeminiProvider::new("k123");
        assert_eq!(
            provider.generate_url("gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            provider.generate_url("models/gemini-2.5-flash"),
            provider.generate_url("gemini-2.5-flash")
        );
        assert!(provider.models_url().ends_with("/models"));
        assert!(!provider.models_url().contains("k123"));

        let proxied = GeminiProvider::new("k").with_base_url("http://localhost:9000/v1beta/");
        assert!(proxied.generate_url("m").starts_with("http://localhost:9000/v1beta/models/m:"));
    }

    #[test]
    fn request_body_shape() {
        let req = GenerateRequest::new("gemini-2.5-flash", "Plan research on WAL").with_temperature(0.4);
        let body = serde_json::to_value(GeminiProvider::request_body(&req)).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Plan research on WAL");
        assert_eq!(body["generationConfig"]["temperature"], 0.4f32 as f64);
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());

        let plain = serde_json::to_value(GeminiProvider::request_body(&GenerateRequest::new("m", "p"))).unwrap();
        assert!(plain.get("generationConfig").is_none());
    }

    #[test]
    fn text_parts_are_concatenated() {
        let text = parse(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "```json\n{"}, {"text": "}\n```"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(text, "```json\n{}\n```");
    }

    #[test]
    fn empty_or_blocked_responses_are_errors() {
        assert!(parse(serde_json::json!({"candidates": []})).is_err());

        let err = parse(serde_json::json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("SAFETY"));

        let err = parse(serde_json::json!({
            "promptFeedback": {"blockReason": "OTHER"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("blocked"));
    }

    #[test]
    fn model_list_keeps_generation_models() {
        let list: ApiModelList = serde_json::from_value(serde_json::json!({
            "models": [
                {"name": "models/gemini-2.5-flash", "supportedGenerationMethods": ["generateContent", "countTokens"]},
                {"name": "models/text-embedding-004", "supportedGenerationMethods": ["embedContent"]},
                {"name": "models/gemini-2.0-flash", "supportedGenerationMethods": ["generateContent"]}
            ]
        }))
        .unwrap();
        assert_eq!(
            GeminiProvider::generation_models(list),
            vec!["gemini-2.5-flash", "gemini-2.0-flash"]
        );
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let provider = GeminiProvider::new("");
        let err = provider
            .generate(GenerateRequest::new("gemini-2.5-flash", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn transport_failures_do_not_leak_key() {
        let provider = GeminiProvider::new("AIzaSy-secret-test-key").with_base_url("http://127.0.0.1:1/v1beta");
        let err = provider
            .generate(GenerateRequest::new("gemini-2.5-flash", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Network(_) | ProviderError::Timeout(_)));
        assert!(!err.to_string().contains("AIzaSy-secret-test-key"));
    }
}
