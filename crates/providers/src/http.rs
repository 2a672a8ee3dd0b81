//! HTTP plumbing shared by the REST providers.

use deepdive_core::error::ProviderError;
use std::time::Duration;
use tracing::warn;

/// Request timeout for a single generation call.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// The request URL is stripped first: it can carry credentials.
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    let e = e.without_url();
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Map a non-success response to a [`ProviderError`].
///
/// The body text is kept verbatim for 429 and 5xx responses: it carries the
/// quota metric name and any "retry in N" hint the retry executor reads.
pub(crate) fn status_error(
    provider: &str,
    status: u16,
    retry_after: Option<u64>,
    body: String,
) -> ProviderError {
    warn!(provider, status, body = %body, "Provider returned error");
    match status {
        401 | 403 => ProviderError::AuthenticationFailed(format!(
            "{provider} rejected the API key (status: {status})"
        )),
        404 => ProviderError::ModelNotFound(body),
        429 if body.trim().is_empty() => ProviderError::RateLimited {
            retry_after_secs: retry_after,
        },
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
