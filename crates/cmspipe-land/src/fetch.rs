//! HTTP fetch with a bounded retry budget.
//!
//! Transport faults and 5xx responses retry with doubling backoff;
//! 4xx responses are the publisher telling us the file is gone, which
//! no retry will fix. Redirects are followed, no credentials are
//! ever attached.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use tracing::warn;

use cmspipe_types::{PipelineError, SourceError, TransportError};

use crate::source::{ReleaseDescriptor, SourceFile, SourceProvider};

/// HTTPS provider for CMS-published releases.
pub struct HttpProvider {
    descriptor: ReleaseDescriptor,
    client: reqwest::Client,
    timeout_secs: u64,
    attempts: u32,
    backoff_initial: Duration,
}

impl HttpProvider {
    /// Build a provider with the standard fetch budget: `attempts`
    /// tries, backoff starting at `backoff_initial_secs` and
    /// doubling, `timeout_secs` per request.
    pub fn new(
        descriptor: ReleaseDescriptor,
        timeout_secs: u64,
        attempts: u32,
        backoff_initial_secs: u64,
    ) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(Policy::limited(10))
            .build()
            .map_err(|e| PipelineError::Internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            descriptor,
            client,
            timeout_secs,
            attempts: attempts.max(1),
            backoff_initial: Duration::from_secs(backoff_initial_secs.max(1)),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::Transport(TransportError::Timeout {
                    url: url.to_string(),
                    seconds: self.timeout_secs,
                })
            } else {
                PipelineError::Transport(TransportError::Http {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
        })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(SourceError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(TransportError::Http {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            }
            .into());
        }
        let bytes = response.bytes().await.map_err(|e| {
            PipelineError::Transport(TransportError::Http {
                url: url.to_string(),
                reason: e.to_string(),
            })
        })?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SourceProvider for HttpProvider {
    fn describe(&self) -> ReleaseDescriptor {
        self.descriptor.clone()
    }

    async fn fetch(&self, file: &SourceFile) -> Result<Vec<u8>, PipelineError> {
        let mut delay = self.backoff_initial;
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            match self.fetch_once(&file.url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() => {
                    warn!(url = %file.url, attempt, error = %e, "fetch attempt failed, will retry");
                    last_error = e.to_string();
                    if attempt < self.attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
                Err(fatal) => return Err(fatal),
            }
        }

        Err(TransportError::RetriesExhausted {
            url: file.url.clone(),
            attempts: self.attempts,
            last_error,
        }
        .into())
    }
}

/// The backoff schedule for a given budget, exposed so the retry
/// policy is testable without a network.
#[must_use]
pub fn backoff_schedule(attempts: u32, initial_secs: u64) -> Vec<Duration> {
    let mut delays = Vec::new();
    let mut delay = Duration::from_secs(initial_secs.max(1));
    for _ in 1..attempts {
        delays.push(delay);
        delay *= 2;
    }
    delays
}
