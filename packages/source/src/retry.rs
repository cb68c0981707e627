//! HTTP retry helpers for transient errors.
//!
//! Fetchers call [`send_json`] instead of `reqwest::RequestBuilder::send()`
//! so every page request retries with exponential backoff on connection
//! failures, timeouts, HTTP 429 and HTTP 5xx. Other 4xx responses are
//! permanent and returned immediately.

use std::time::Duration;

use crate::SourceError;

/// Maximum number of retry attempts after the first request.
///
/// Backoff doubles from 2s, so five retries wait 62 seconds in total.
pub const MAX_RETRIES: u32 = 5;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Delay before retry `attempt` (1-based): 2s, 4s, 8s, ...
#[must_use]
pub const fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt)
}

/// Sends a request and parses the body as JSON, retrying transient
/// failures.
///
/// `build_request` is called on each attempt because builders are consumed
/// by `.send()`. A body that fails to parse is re-fetched through the same
/// retry budget, since truncated responses are the common cause.
///
/// # Errors
///
/// Returns [`SourceError`] if the request still fails after
/// [`MAX_RETRIES`] retries, the server returns a non-retryable status, or
/// the body never parses.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            log::warn!("  retry {attempt}/{MAX_RETRIES} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        let error = match build_request().send().await {
            Err(e) if is_transient(&e) => SourceError::Http(e),
            Err(e) => return Err(SourceError::Http(e)),
            Ok(response) => {
                let status = response.status();
                if is_retryable_status(status) {
                    SourceError::Status {
                        status,
                        message: format!("{} after {attempt} retries", response.url()),
                    }
                } else if !status.is_success() {
                    return Err(SourceError::Status {
                        status,
                        message: response.url().to_string(),
                    });
                } else {
                    let url = response.url().to_string();
                    match response.text().await {
                        Ok(text) => match serde_json::from_str(&text) {
                            Ok(value) => return Ok(value),
                            Err(e) => {
                                let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
                                log::warn!(
                                    "JSON parse failed ({} bytes) for {url}: {e}\n  \
                                     body preview: {preview}",
                                    text.len()
                                );
                                SourceError::Json(e)
                            }
                        },
                        Err(e) => SourceError::Http(e),
                    }
                }
            }
        };

        if attempt >= MAX_RETRIES {
            log::error!("Giving up after {MAX_RETRIES} retries: {error}");
            return Err(error);
        }
        log::warn!("  transient error: {error}");
        attempt += 1;
    }
}

/// Returns `true` for statuses worth retrying: 429 and any 5xx.
#[must_use]
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
