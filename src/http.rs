//! JSON-over-HTTP helper shared by the embedding and chat backends.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;

pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST `body` to `url` and parse the JSON response, retrying transient
/// failures up to `max_retries` times. `service` labels error messages.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    service: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(service, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut req = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        service,
                        status,
                        body_text
                    ));
                    continue;
                }

                bail!("{} API error {}: {}", service, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!(
                    "{} connection error ({}): {}",
                    service,
                    url,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", service)))
}

/// GET `url`, failing on any non-success status.
pub async fn get_ok(client: &reqwest::Client, url: &str, bearer: Option<&str>) -> Result<serde_json::Value> {
    let mut req = client.get(url);
    if let Some(token) = bearer {
        req = req.header("Authorization", format!("Bearer {}", token));
    }
    let response = req.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("GET {} returned {}: {}", url, status, body_text);
    }
    Ok(response.json().await?)
}

pub fn openai_api_key() -> Result<String> {
    std::env::var("OPENAI_API_KEY")
        .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))
}
