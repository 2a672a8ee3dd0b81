//! Retry executor: exponential backoff around fallible remote calls.
//!
//! Remote generative services only expose textual errors, so classification
//! works on the rendered error message. The patterns are kept as named
//! predicates so they can be tested without a live provider.
//!
//! | Class            | Matches                           | Handling              |
//! |------------------|-----------------------------------|-----------------------|
//! | daily quota      | `RequestsPerDay`                  | fail immediately      |
//! | rate limit       | `429`, `quota`, `rate limit`      | back off and retry    |
//! | server           | `500`, `503`                      | back off and retry    |
//! | anything else    |                                   | fail immediately      |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::RetryError;

/// Maximum characters of error text carried in a retry notification.
const ERROR_PREVIEW_CHARS: usize = 100;

static RETRY_IN: LazyLock<Option<regex_lite::Regex>> =
    LazyLock::new(|| regex_lite::Regex::new(r"(?i)retry in (\d+(?:\.\d+)?)").ok());

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (total calls = max_retries + 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Cap applied to every wait, including provider-suggested ones
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_retries() -> u32 {
    5
}
fn default_initial_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Grow `delay` by the multiplier, saturating at the max delay.
    ///
    /// Computed in float milliseconds so that huge or non-finite multipliers
    /// clamp instead of overflowing `Duration`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let millis = delay.as_millis() as f64 * self.backoff_multiplier;
        if !millis.is_finite() || millis >= self.max_delay_ms as f64 {
            self.max_delay()
        } else {
            Duration::from_millis(millis.max(0.0) as u64)
        }
    }

    /// Exponential delay before retry `attempt` (1-based), ignoring provider hints.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max_delay_ms as f64) as u64)
    }
}

// ── Classification ──────────────────────────────────────────────────────────

/// How a failed attempt should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    RateLimited,
    ServerError,
    DailyQuotaExhausted,
    NonRetryable,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::RateLimited | ErrorClass::ServerError)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::ServerError => "server_error",
            ErrorClass::DailyQuotaExhausted => "daily_quota_exhausted",
            ErrorClass::NonRetryable => "non_retryable",
        })
    }
}

/// HTTP 429, a quota mention, or rate-limit wording.
pub fn is_rate_limited(message: &str) -> bool {
    message.contains("429") || message.contains("quota") || message.contains("rate limit")
}

/// HTTP 500 or 503.
pub fn is_server_error(message: &str) -> bool {
    message.contains("500") || message.contains("503")
}

/// A per-day request ceiling (as opposed to a per-minute one).
pub fn is_daily_quota_exhausted(message: &str) -> bool {
    message.contains("RequestsPerDay")
}

/// Provider-suggested wait embedded as "retry in N" (seconds, fractional allowed).
pub fn suggested_retry_delay(message: &str) -> Option<Duration> {
    let caps = RETRY_IN.as_ref()?.captures(message)?;
    let secs: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some(Duration::from_millis((secs * 1000.0).ceil() as u64))
}

pub fn classify(message: &str) -> ErrorClass {
    if is_daily_quota_exhausted(message) {
        ErrorClass::DailyQuotaExhausted
    } else if is_rate_limited(message) {
        ErrorClass::RateLimited
    } else if is_server_error(message) {
        ErrorClass::ServerError
    } else {
        ErrorClass::NonRetryable
    }
}

// ── Executor ────────────────────────────────────────────────────────────────

/// Notification emitted before each backoff sleep.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    /// The attempt that just failed (1-based)
    pub attempt: u32,
    pub max_retries: u32,
    pub wait: Duration,
    pub class: ErrorClass,
    pub error_preview: String,
}

type RetryObserver = Arc<dyn Fn(&RetryAttempt) + Send + Sync>;

/// Runs fallible async operations with classification and exponential backoff.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    observer: Option<RetryObserver>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    /// Attach a sink that is told about every scheduled retry.
    pub fn with_observer(mut self, observer: impl Fn(&RetryAttempt) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, hits a fatal error, or runs out of retries.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_delay = self.config.max_delay();
        let mut delay = self.config.initial_delay().min(max_delay);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let message = error.to_string();
            let class = classify(&message);
            match class {
                ErrorClass::NonRetryable => {
                    debug!(attempt, error = %message, "Non-retryable error");
                    return Err(RetryError::NonRetryable(error));
                }
                ErrorClass::DailyQuotaExhausted => {
                    warn!(attempt, error = %message, "Daily quota exhausted, not retrying");
                    return Err(RetryError::DailyQuotaExceeded { last_error: error });
                }
                ErrorClass::RateLimited | ErrorClass::ServerError => {}
            }

            if attempt > self.config.max_retries {
                warn!(attempts = attempt, error = %message, "Retries exhausted");
                return Err(RetryError::RetriesExhausted {
                    retries: self.config.max_retries,
                    attempts: attempt,
                    last_error: error,
                });
            }

            let wait = suggested_retry_delay(&message).unwrap_or(delay).min(max_delay);
            let notice = RetryAttempt {
                attempt,
                max_retries: self.config.max_retries,
                wait,
                class,
                error_preview: message.chars().take(ERROR_PREVIEW_CHARS).collect(),
            };

            warn!(
                attempt,
                max = self.config.max_retries,
                wait_ms = wait.as_millis() as u64,
                class = %class,
                error = %notice.error_preview,
                "Retrying after transient error"
            );
            if let Some(observer) = &self.observer {
                observer(&notice);
            }

            tokio::time::sleep(wait).await;
            delay = self.config.next_delay(delay);
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
