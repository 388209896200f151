//! HTTP transport for management-controller endpoints.
//!
//! Performs GET requests against `base_url + path` with optional basic
//! authentication, a per-request timeout, bounded retries with exponential
//! backoff, and prompt cancellation.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Default request timeout (10 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of attempts per request (first try plus three retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Default upper bound for the retry delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(2);

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff() -> Duration {
    DEFAULT_INITIAL_BACKOFF
}

fn default_max_backoff() -> Duration {
    DEFAULT_MAX_BACKOFF
}

/// Errors returned by [`Transport::get`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level failure that persisted through every attempt.
    #[error("network error after {attempts} attempt(s): {source}")]
    Network {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Endpoint answered with a non-success status.
    #[error("unexpected HTTP status {code}")]
    Status { code: u16 },

    /// Cancellation was requested.
    #[error("request canceled")]
    Canceled,

    /// The joined request URL is invalid.
    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// HTTP basic-auth credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bounded retry policy for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Upper bound for the retry delay.
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set the attempt bound.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the backoff range.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }
}

/// Exponential backoff schedule for one request.
#[derive(Debug)]
struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    fn new(policy: &RetryPolicy) -> Self {
        let max = policy.max_backoff.max(policy.initial_backoff);
        Self {
            current: policy.initial_backoff,
            max,
        }
    }

    /// Delay before the next retry.
    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

/// Transport construction options.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Accept self-signed or otherwise invalid TLS certificates.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            accept_invalid_certs: false,
        }
    }
}

/// Retrying HTTP GET client.
///
/// Cheap to share behind an `Arc`; the inner `reqwest::Client` pools
/// connections across concurrent calls.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    retry: RetryPolicy,
}

/// Outcome of a single attempt that did not succeed.
enum AttemptError {
    Network(reqwest::Error),
    Status(u16),
}

impl Transport {
    /// Build a transport.
    ///
    /// # Errors
    /// Returns the `reqwest` builder error if the client cannot be built.
    pub fn new(config: &TransportConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            retry: RetryPolicy {
                max_attempts: config.retry.max_attempts.max(1),
                ..config.retry
            },
        })
    }

    /// Retry policy in effect.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch `base_url + path`.
    ///
    /// Network failures and transient statuses (`429`, `5xx` except `501`) are
    /// retried until the attempt bound is reached. Credentials, when present,
    /// are sent with every attempt. Cancellation interrupts both in-flight
    /// requests and backoff sleeps.
    ///
    /// # Errors
    /// - `TransportError::Status` for a non-success status (the last one seen
    ///   when retries are exhausted)
    /// - `TransportError::Network` when every attempt failed at network level
    /// - `TransportError::Canceled` once `cancel` fires
    /// - `TransportError::InvalidUrl` if the joined URL does not parse
    pub async fn get(
        &self,
        base_url: &Url,
        path: &str,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<Bytes, TransportError> {
        let url = join_url(base_url, path)?;
        let mut backoff = Backoff::new(&self.retry);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Canceled);
            }
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Canceled),
                outcome = self.attempt(&url, credentials) => outcome,
            };

            let failure = match outcome {
                Ok(body) => return Ok(body),
                Err(AttemptError::Status(code)) if !is_retryable_status(code) => {
                    return Err(TransportError::Status { code });
                }
                Err(failure) => failure,
            };

            if attempt >= self.retry.max_attempts {
                return Err(match failure {
                    AttemptError::Status(code) => TransportError::Status { code },
                    AttemptError::Network(source) => TransportError::Network {
                        attempts: attempt,
                        source,
                    },
                });
            }

            let delay = backoff.next_delay();
            match &failure {
                AttemptError::Status(code) => tracing::debug!(
                    url = %url,
                    attempt,
                    status = code,
                    delay_ms = delay.as_millis(),
                    "Retrying after transient status"
                ),
                AttemptError::Network(e) => tracing::debug!(
                    url = %url,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "Retrying after network error"
                ),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Canceled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        credentials: Option<&Credentials>,
    ) -> Result<Bytes, AttemptError> {
        let mut request = self.client.get(url.clone());
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = request.send().await.map_err(AttemptError::Network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status.as_u16()));
        }
        response.bytes().await.map_err(AttemptError::Network)
    }
}

/// Statuses worth another attempt.
fn is_retryable_status(code: u16) -> bool {
    code == 429 || ((500..600).contains(&code) && code != 501)
}

/// Append `path` to `base`, keeping any path prefix the base already carries.
fn join_url(base: &Url, path: &str) -> Result<Url, TransportError> {
    let base = base.as_str().trim_end_matches('/');
    let joined = if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    };
    Url::parse(&joined).map_err(|source| TransportError::InvalidUrl {
        url: joined,
        source,
    })
}
