//! Shared HTTP plumbing for the provider adapters.
//!
//! Every provider call goes through [`post_json`]: a per-request timeout
//! set on the client, and a bounded retry with exponential backoff
//! (1s, 2s, 4s, … capped at 32s) on network errors, HTTP 429 and 5xx.
//! Other 4xx responses fail immediately. Final failures are reported as
//! [`TutorError::Provider`].

use anyhow::Result;
use std::time::Duration;

use tutor_harness_core::TutorError;

/// Build a client with the given per-request timeout.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

/// POST `body` as JSON to `url` and return the decoded JSON response.
///
/// `label` names the provider in error messages (e.g. `"OpenAI"`).
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err: Option<String> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff(attempt)).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json::<serde_json::Value>().await.map_err(|e| {
                        TutorError::Provider(format!("{} returned invalid JSON: {}", label, e))
                            .into()
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let message = format!("{} API error {}: {}", label, status, body_text);

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(message);
                    continue;
                }

                return Err(TutorError::Provider(message).into());
            }
            Err(e) => {
                last_err = Some(format!("{} connection error ({}): {}", label, url, e));
                continue;
            }
        }
    }

    Err(TutorError::Provider(
        last_err.unwrap_or_else(|| format!("{} request failed after retries", label)),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
        assert_eq!(backoff(3), Duration::from_secs(4));
        assert_eq!(backoff(10), Duration::from_secs(32));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_provider_error() {
        let client = client(1).unwrap();
        let err = post_json(
            &client,
            "http://127.0.0.1:9/v1/embeddings",
            None,
            &serde_json::json!({}),
            0,
            "Test",
        )
        .await
        .unwrap_err();
        assert!(matches!(TutorError::find(&err), Some(TutorError::Provider(_))));
    }
}
