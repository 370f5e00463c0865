//! Bounded retries with exponential backoff around a [`Transport`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::client::{HttpResponse, Transport, process_error_response};
use crate::error::{Error, Result};
use crate::models;
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUEST_RETRIES, CLIENT_REQUESTS,
    CLIENT_RETRY_BACKOFF,
};
use crate::types::ChatRequest;

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Pause for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after each further failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// The delay after failed attempt `attempt` (zero-based): `base_delay * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

#[derive(Debug)]
enum RetryState {
    Attempting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Succeeded(HttpResponse),
    Failed(Error),
}

/// Sends requests through a [`Transport`], retrying transient failures.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl RequestExecutor {
    /// An executor with the default policy and the tokio timer.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_parts(transport, Arc::new(TokioSleeper), RetryPolicy::default())
    }

    /// An executor with every part supplied.
    pub fn with_parts(
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    /// The retry policy in force.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `request`, returning the first successful response.
    ///
    /// The per-attempt timeout comes from the model table for the request's
    /// model and reasoning effort.
    pub async fn execute(&self, request: &ChatRequest) -> Result<HttpResponse> {
        let timeout = models::timeout_for(&request.model, request.reasoning_effort);
        let mut state = RetryState::Attempting { attempt: 0 };
        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    self.attempt(request, attempt, timeout).await
                }
                RetryState::Backoff { attempt, delay } => {
                    debug!(attempt, ?delay, "backing off before retry");
                    self.sleeper.sleep(delay).await;
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                RetryState::Succeeded(response) => return Ok(response),
                RetryState::Failed(err) => {
                    CLIENT_REQUEST_ERRORS.click();
                    error!("API request failed: {err}");
                    return Err(err);
                }
            };
        }
    }

    async fn attempt(&self, request: &ChatRequest, attempt: u32, timeout: Duration) -> RetryState {
        CLIENT_REQUESTS.click();
        info!(
            model = %request.model,
            attempt = attempt + 1,
            max_attempts = self.policy.max_attempts,
            timeout_secs = timeout.as_secs(),
            "sending API request"
        );
        let start = Instant::now();
        let outcome = self.transport.post(request, timeout).await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        match outcome {
            Ok(response) if response.is_success() => RetryState::Succeeded(response),
            Ok(response) => match response.status {
                401 => RetryState::Failed(Error::authentication("Invalid API key")),
                403 => RetryState::Failed(Error::permission("API access forbidden")),
                429 | 500..=599 => {
                    let status = response.status;
                    let err = process_error_response(response).await;
                    warn!(status, "API returned a retryable status: {err}");
                    self.retry_or_fail(attempt, err, timeout)
                }
                _ => RetryState::Failed(process_error_response(response).await),
            },
            Err(err) if err.is_retryable() => {
                warn!("API request attempt {} failed: {err}", attempt + 1);
                self.retry_or_fail(attempt, err, timeout)
            }
            Err(err) => RetryState::Failed(err),
        }
    }

    fn retry_or_fail(&self, attempt: u32, err: Error, timeout: Duration) -> RetryState {
        if attempt + 1 < self.policy.max_attempts {
            let delay = self.policy.backoff(attempt);
            CLIENT_REQUEST_RETRIES.click();
            CLIENT_RETRY_BACKOFF.add(delay.as_secs_f64());
            info!(?delay, "retrying API request");
            return RetryState::Backoff { attempt, delay };
        }
        if err.is_timeout() {
            RetryState::Failed(Error::timeout(
                format!(
                    "Request timed out after {}s. Try reducing reasoning effort.",
                    timeout.as_secs()
                ),
                Some(timeout.as_secs_f64()),
            ))
        } else if err.is_connection() {
            RetryState::Failed(err)
        } else {
            RetryState::Failed(Error::retries_exhausted(self.policy.max_attempts, Some(err)))
        }
    }
}
