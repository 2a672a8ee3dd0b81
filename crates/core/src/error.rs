//! Error types for the DeepDive domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `Error` rolls them up.

use thiserror::Error;

use crate::research::{ResearchStatus, Stage, StageState};

/// The top-level error type for all DeepDive operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Pipeline errors ---
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(", retry in {secs}s"),
        None => String::new(),
    }
}

/// Errors raised by a remote generative service.
///
/// The rendered message is the only signal the retry executor classifies on,
/// so variants keep the provider's status code and body text in their display.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    /// The hint is rendered only when the provider sent one.
    #[error("Rate limited by provider (429){}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Version conflict on {collection}/{key}: expected v{expected}, found v{actual}")]
    VersionConflict {
        collection: String,
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Terminal outcomes of the retry executor.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The error did not match any transient pattern.
    #[error("{0}")]
    NonRetryable(E),

    /// A per-day quota was hit; waiting within the same day does not help.
    #[error(
        "Daily API quota exceeded. The provider enforces a per-day request limit for this model. \
         Quota resets at midnight Pacific Time. \
         Consider: 1) Wait until quota resets, 2) Reduce research depth, or 3) Upgrade to a paid tier. \
         Original error: {last_error}"
    )]
    DailyQuotaExceeded { last_error: E },

    #[error("Max retries ({retries}) reached after {attempts} attempts. Last error: {last_error}")]
    RetriesExhausted {
        retries: u32,
        attempts: u32,
        last_error: E,
    },
}

impl<E> RetryError<E> {
    /// The underlying error from the last attempt.
    pub fn last_error(&self) -> &E {
        match self {
            Self::NonRetryable(e) => e,
            Self::DailyQuotaExceeded { last_error } => last_error,
            Self::RetriesExhausted { last_error, .. } => last_error,
        }
    }

    pub fn is_daily_quota(&self) -> bool {
        matches!(self, Self::DailyQuotaExceeded { .. })
    }
}

/// A research record refused a state change.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("Research is already {status}")]
    Terminal { status: ResearchStatus },

    #[error("Stage {stage} is {state}, expected pending")]
    StageNotPending { stage: Stage, state: StageState },

    #[error("Stage {stage} cannot run before {prerequisite} has completed")]
    OutOfOrder { stage: Stage, prerequisite: Stage },

    #[error("Record invariant violated: {0}")]
    InvariantViolated(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Research not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Remote(#[from] RetryError<ProviderError>),

    #[error("Malformed {stage} response: {reason}")]
    Parse { stage: Stage, reason: String },

    #[error("Research plan contains no topics to gather")]
    EmptyPlan,

    #[error("Stage {stage} cannot consume a {topic} event")]
    UnexpectedEvent { stage: Stage, topic: String },

    #[error("Invalid state transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether this failure came from an exhausted daily quota.
    pub fn is_daily_quota(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_daily_quota())
    }
}
