//! Retry policies and the retrying HTTP client
//!
//! A [`RetryPolicy`] decides how long to wait after a failed attempt and
//! when to give up. [`RetryHttpClient`] wraps an [`HttpTransport`] and
//! applies the policy to every request.
//!
//! An attempt counts as failed when the transport reports a retryable
//! [`TransportError`] (connect failure, timeout) or when the server answers
//! with a transient status: any 5xx, 408 or 429. Every other response ends
//! the loop immediately, and so does a transient status whose body reports
//! Data API errors.
//!
//! # Built-in Policies
//!
//! - **FixedDelay**: the same delay after every failure
//! - **ExponentialBackoff**: doubling delays, capped, with optional jitter
//!
//! # Examples
//!
//! ```rust
//! use datapi_client::{ExponentialBackoff, RetryPolicy};
//! use std::time::Duration;
//!
//! // 100ms, 200ms, 400ms, ... up to 2s, five attempts in total
//! let policy = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(2), 5);
//! assert_eq!(policy.next_delay(3), Some(Duration::from_millis(400)));
//! assert_eq!(policy.next_delay(5), None);
//! ```

use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::options::HttpClientOptions;
use datapi_core::{Error, Result, TransportError};
use std::sync::Arc;
use std::time::Duration;

/// Decides whether and when to retry
///
/// `failures` is the number of attempts that have failed so far, starting
/// at 1 after the first failure.
pub trait RetryPolicy: Send + Sync {
    /// Delay before the next attempt, or `None` to give up
    fn next_delay(&self, failures: u32) -> Option<Duration>;

    /// Total attempts allowed, including the first
    fn max_attempts(&self) -> u32;
}

/// Constant delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: u32,
}

impl FixedDelay {
    /// Wait `delay` between at most `max_attempts` attempts
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: max_attempts.max(1),
        }
    }
}

impl RetryPolicy for FixedDelay {
    fn next_delay(&self, failures: u32) -> Option<Duration> {
        if failures >= self.max_attempts {
            return None;
        }
        Some(self.delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Exponentially growing delay with optional jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Start at `initial_delay` and double up to `max_delay`
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts: max_attempts.max(1),
            jitter: false,
        }
    }

    /// Add a random 0-25% to every delay
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures >= self.max_attempts {
            return None;
        }

        // initial_delay * 2^(failures - 1)
        let factor = 2u32.checked_pow(failures - 1).unwrap_or(u32::MAX);
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if self.jitter {
            use rand::Rng;
            let millis = delay.as_millis() as u64;
            let jitter_ms = rand::thread_rng().gen_range(0..=(millis / 4));
            return Some(delay + Duration::from_millis(jitter_ms));
        }
        Some(delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Whether a response status is worth another attempt
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

/// Result of [`RetryHttpClient::execute`]
#[derive(Debug, Clone)]
pub struct HttpOutcome {
    /// Attempts made, at least one
    pub attempts: u32,
    /// Final response or terminal error
    pub result: Result<HttpResponse>,
}

/// HTTP client retrying transient failures
#[derive(Clone)]
pub struct RetryHttpClient {
    transport: Arc<dyn HttpTransport>,
    options: HttpClientOptions,
    policy: Arc<dyn RetryPolicy>,
}

impl RetryHttpClient {
    /// Wrap `transport` with the policy described by `options`
    pub fn new(transport: Arc<dyn HttpTransport>, options: HttpClientOptions) -> Self {
        let policy = options.retry_policy();
        Self {
            transport,
            options,
            policy,
        }
    }

    /// Replace the retry policy
    pub fn with_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Options this client was built from
    pub fn options(&self) -> &HttpClientOptions {
        &self.options
    }

    /// Send `request`, retrying as the policy allows
    ///
    /// A non-retryable transport error ends the loop with
    /// [`Error::Transport`]; running out of attempts ends it with
    /// [`Error::RetriesExhausted`] holding the last failure.
    pub async fn execute(&self, request: &HttpRequest) -> HttpOutcome {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let failure = match self.transport.send(request).await {
                Ok(response)
                    if is_retryable_status(response.status) && !reports_api_errors(&response.body) =>
                {
                    TransportError::status(response.status, response.body)
                }
                Ok(response) => {
                    return HttpOutcome {
                        attempts,
                        result: Ok(response),
                    };
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => {
                    tracing::error!(url = %request.url, attempts, error = %e, "Request failed");
                    return HttpOutcome {
                        attempts,
                        result: Err(Error::Transport(e)),
                    };
                }
            };

            match self.policy.next_delay(attempts) {
                Some(delay) => {
                    tracing::warn!(
                        url = %request.url,
                        attempt = attempts,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!(
                        url = %request.url,
                        attempts,
                        error = %failure,
                        "Request failed, giving up"
                    );
                    return HttpOutcome {
                        attempts,
                        result: Err(Error::RetriesExhausted {
                            attempts,
                            last_error: failure,
                        }),
                    };
                }
            }
        }
    }
}

/// Whether `body` is a Data API envelope with a non-empty `errors` list
///
/// Such a response is final whatever its status.
fn reports_api_errors(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|envelope| {
            envelope
                .get("errors")
                .and_then(serde_json::Value::as_array)
                .map(|errors| !errors.is_empty())
        })
        .unwrap_or(false)
}

impl std::fmt::Debug for RetryHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryHttpClient")
            .field("options", &self.options)
            .field("max_attempts", &self.policy.max_attempts())
            .finish()
    }
}
