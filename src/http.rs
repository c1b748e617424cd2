//! JSON-over-HTTP helpers shared by the embedding and generation providers.
//!
//! Retry policy:
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - backoff 1s, 2s, 4s … capped at 32s

use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Delay before retry `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

/// Whether a failed status is worth retrying.
pub fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST `body` to `url` and decode the JSON response, retrying transient
/// failures up to `max_retries` times. `service` names the backend in errors.
pub async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_retries: u32,
    service: &str,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            debug!(service, attempt, delay_secs = delay.as_secs(), "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if is_retryable(status) {
                    last_err = Some(anyhow!("{} API error {}: {}", service, status, body_text));
                    continue;
                }
                bail!("{} API error {}: {}", service, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error ({}): {}", service, url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", service)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(6), Duration::from_secs(32));
        assert_eq!(backoff_delay(20), Duration::from_secs(32));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(reqwest::StatusCode::UNAUTHORIZED));
        assert!(!is_retryable(reqwest::StatusCode::BAD_REQUEST));
    }
}
