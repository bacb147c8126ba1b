//! Callback delivery with bounded exponential-backoff retry.
//!
//! Delivery is at-least-once best-effort: the notifier retries transient
//! failures up to the attempt budget and never propagates an error to its
//! caller. The synchronous task response does not depend on delivery.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::github::PublishResult;
use crate::task::TaskSubmission;

/// Result payload posted to the evaluation URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}

impl CallbackPayload {
    /// Assemble the payload from the submission and the publish outcome.
    pub fn new(submission: &TaskSubmission, publish: &PublishResult) -> Self {
        Self {
            email: submission.email.clone(),
            task: submission.task.clone(),
            round: submission.round,
            nonce: submission.nonce.clone(),
            repo_url: publish.repo_url.clone(),
            commit_sha: publish.commit_sha.clone(),
            pages_url: publish.pages_url.clone(),
        }
    }
}

/// Trait for result notifiers.
#[async_trait]
pub trait ResultNotifier: Send + Sync {
    /// Post the payload to `url`. Failure is logged, never raised.
    async fn notify(&self, url: &str, payload: &CallbackPayload);
}

/// HTTP notifier posting the payload as JSON.
///
/// An attempt succeeds only on HTTP 200; any other status or transport
/// failure is retried. The delay before retry k doubles starting at
/// `base_delay` (1, 2, 4, 8, 16 with the default one-second base), with no
/// delay before the first attempt.
pub struct CallbackNotifier {
    client: Client,
    max_attempts: u32,
    base_delay: Duration,
}

impl CallbackNotifier {
    /// Default policy: 6 total attempts, one-second base delay. The client
    /// timeout is deliberately long: callback endpoints may themselves be
    /// slow.
    pub fn new() -> Self {
        Self::with_policy(6, Duration::from_secs(1))
    }

    /// Custom attempt budget and base delay.
    pub fn with_policy(max_attempts: u32, base_delay: Duration) -> Self {
        let client = Client::builder()
            .user_agent(concat!("pageforge/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(600))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Execute one delivery attempt; `Ok(())` only on an exact 200.
    async fn attempt(&self, url: &str, payload: &CallbackPayload) -> Result<(), String> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| format!("request error: {}", e))?;

        if response.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(format!("unexpected status {}", response.status()))
        }
    }
}

impl Default for CallbackNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultNotifier for CallbackNotifier {
    async fn notify(&self, url: &str, payload: &CallbackPayload) {
        let mut delay = self.base_delay;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }

            match self.attempt(url, payload).await {
                Ok(()) => {
                    tracing::info!("Posted results to evaluation URL: {}", url);
                    return;
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!("Callback attempt {} to {} failed: {}", attempt, url, e);
                }
                Err(e) => {
                    tracing::error!(
                        "Giving up on callback to {} after {} attempts: {}",
                        url,
                        self.max_attempts,
                        e
                    );
                }
            }
        }
    }
}
