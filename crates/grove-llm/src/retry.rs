use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;

use crate::error::LlmError;

/// Longest body excerpt carried in [`LlmError::Backend`].
const DETAIL_LIMIT: usize = 300;

/// How a backend request is re-sent when the server pushes back.
///
/// Only 429 and 503 are retried. Both arrive before any answer text, so a retry
/// never duplicates output.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) attempts: u32,
    pub(crate) base_delay: Duration,
    pub(crate) max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Wait before attempt `attempt + 1`. A server-provided `Retry-After` wins,
    /// clamped to `max_delay`.
    fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = retry_after.unwrap_or_else(|| {
            self.base_delay
                .saturating_mul(2u32.saturating_pow(attempt.min(16)))
        });
        computed.min(self.max_delay)
    }

    /// Send the request built by `build`, re-sending on throttling statuses.
    ///
    /// Any other response, successful or not, goes through [`ensure_success`].
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Transport`] when the request cannot be sent,
    /// [`LlmError::Throttled`] when every attempt was throttled, and
    /// [`LlmError::Backend`] for other non-success statuses.
    pub(crate) async fn send<F, Fut>(
        &self,
        provider: &'static str,
        mut build: F,
    ) -> Result<reqwest::Response, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            let response = build().await?;
            let status = response.status();
            if !is_throttled(status) {
                return ensure_success(provider, response).await;
            }

            attempt += 1;
            if attempt >= attempts {
                return Err(LlmError::Throttled {
                    provider,
                    attempts,
                    status: status.as_u16(),
                });
            }
            let wait = self.delay(attempt - 1, retry_after(&response));
            tracing::warn!(
                provider,
                status = status.as_u16(),
                attempt,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "backend throttled request"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

fn is_throttled(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    let secs = response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    Some(Duration::from_secs(secs))
}

/// Pass successful responses through, turn the rest into [`LlmError::Backend`].
pub(crate) async fn ensure_success(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = excerpt(&body);
    tracing::error!(provider, status = status.as_u16(), %detail, "backend rejected request");
    Err(LlmError::Backend {
        provider,
        status: status.as_u16(),
        detail,
    })
}

fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "<empty body>".into();
    }
    match body.char_indices().nth(DETAIL_LIMIT) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_owned(),
    }
}
