use crate::config::HttpConfig;
use crate::error::{Result, TriageError};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded retry with linear backoff.
///
/// `max_attempts` counts the first try: `1` means no retries, `3` means up to
/// two retries. Attempt `n` (1-indexed) that fails transiently sleeps
/// `n * backoff` before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

/// Outcome of a single failed attempt.
#[derive(Debug)]
pub enum AttemptError {
    /// Worth another try (timeout, connection reset, 429, 5xx).
    Transient(TriageError),
    /// Retrying would get the same answer.
    Permanent(TriageError),
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(cfg: &HttpConfig) -> Self {
        Self::new(cfg.max_attempts, cfg.backoff())
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    /// `op` receives the 1-indexed attempt number.
    pub fn run<T>(
        &self,
        mut op: impl FnMut(u32) -> std::result::Result<T, AttemptError>,
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(v) => return Ok(v),
                Err(AttemptError::Permanent(e)) => return Err(e),
                Err(AttemptError::Transient(e)) => {
                    if attempt >= self.max_attempts {
                        return Err(e);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(attempt, max = self.max_attempts, ?delay, "retrying after: {e}");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

// ---------------------------------------------------------------------------
// HttpClient
// ---------------------------------------------------------------------------

/// Blocking JSON-over-HTTP client shared by the upstream API clients.
///
/// Only issues GET requests.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::blocking::Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(cfg: &HttpConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(cfg.timeout())
            .user_agent(concat!("sheriff-triage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TriageError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            retry: RetryPolicy::from_config(cfg),
        })
    }

    /// GET `url` and decode the JSON body.
    ///
    /// Returns `Ok(None)` on 404 so callers can tell "does not exist" apart
    /// from "could not ask".
    pub fn get_json<T: DeserializeOwned>(
        &self,
        service: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        self.retry.run(|attempt| {
            debug!(service, url, attempt, "GET");
            let resp = self
                .client
                .get(url)
                .query(query)
                .send()
                .map_err(|e| classify_send_error(service, attempt, e))?;

            let status = resp.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                return Err(AttemptError::Transient(fetch_error(service, status)));
            }
            if !status.is_success() {
                return Err(AttemptError::Permanent(fetch_error(service, status)));
            }

            let body = resp
                .text()
                .map_err(|e| classify_send_error(service, attempt, e))?;
            serde_json::from_str(&body).map(Some).map_err(|e| {
                AttemptError::Permanent(TriageError::MalformedResponse {
                    service: service.to_string(),
                    message: e.to_string(),
                })
            })
        })
    }
}

fn fetch_error(service: &str, status: StatusCode) -> TriageError {
    TriageError::SignalFetchError {
        service: service.to_string(),
        message: format!("HTTP {status}"),
    }
}

fn classify_send_error(service: &str, attempt: u32, e: reqwest::Error) -> AttemptError {
    if e.is_timeout() {
        return AttemptError::Transient(TriageError::SignalFetchTimeout {
            service: service.to_string(),
            attempts: attempt,
        });
    }
    let err = TriageError::SignalFetchError {
        service: service.to_string(),
        message: e.to_string(),
    };
    if e.is_connect() || e.is_request() || e.is_body() {
        AttemptError::Transient(err)
    } else {
        AttemptError::Permanent(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
