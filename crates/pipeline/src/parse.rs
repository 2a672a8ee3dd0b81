//! Parsing of structured model replies.

use deepdive_core::error::PipelineError;
use deepdive_core::research::Stage;
use serde::de::DeserializeOwned;

/// Remove Markdown code-fence delimiters (```` ```json ```` and ```` ``` ````)
/// along with the newline that follows each one.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json\n", "")
        .replace("```json", "")
        .replace("```\n", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parse a model reply as JSON after stripping code fences.
pub fn parse_structured<T: DeserializeOwned>(stage: Stage, text: &str) -> Result<T, PipelineError> {
    let clean = strip_code_fences(text);
    serde_json::from_str(&clean).map_err(|e| PipelineError::Parse {
        stage,
        reason: e.to_string(),
    })
}
