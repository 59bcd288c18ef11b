//! Rate-limited HTTP fetching with exponential backoff.
//!
//! This module is the only place that talks to the network. Upstream sources
//! in [`crate::sources`] hand it a URL and a body parser and get back either
//! parsed data or a classified [`FetchError`].
//!
//! # Architecture
//!
//! - [`Transport`]: Minimal async GET abstraction
//! - [`ReqwestTransport`]: Production transport with a per-request timeout
//! - [`RateLimiter`]: Enforces a minimum gap between consecutive calls
//! - [`BackoffPolicy`]: Attempt ceiling and jittered exponential delays
//! - [`Fetcher`]: Combines the three and classifies every response
//!
//! # Retry Strategy
//!
//! | Response | Handling |
//! |----------|----------|
//! | 2xx, body parses | returned |
//! | 2xx, body does not parse | retried (upstream sometimes serves HTML) |
//! | 429 | retried after `Retry-After`, or backoff when absent |
//! | 5xx, transport error | retried with backoff |
//! | other 4xx | returned immediately as [`FetchError::Rejected`] |
//!
//! Backoff for attempt `k` is `base * 2^(k-1)` scaled by a random factor in
//! `[0.8, 1.3]` and capped at `max_delay`.

use chrono::{DateTime, Utc};
use rand::{rng, Rng};
use std::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, instrument, warn};

use crate::utils::truncate_for_log;

/// Lower bound of the backoff jitter multiplier.
pub const JITTER_MIN: f64 = 0.8;
/// Upper bound of the backoff jitter multiplier.
pub const JITTER_MAX: f64 = 1.3;

/// Why a fetch did not produce data.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("upstream server error (HTTP {0})")]
    Server(u16),
    #[error("upstream rejected request (HTTP {0})")]
    Rejected(u16),
    #[error("malformed response body: {0}")]
    Malformed(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited | FetchError::Server(_) | FetchError::Malformed(_) | FetchError::Transport(_)
        )
    }
}

/// The parts of an HTTP response the fetcher looks at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    /// Raw `Retry-After` header value, if any.
    pub retry_after: Option<String>,
    pub body: String,
}

/// Async GET abstraction so tests can script upstream behaviour.
pub trait Transport {
    /// Issue a GET and return the reply, or a transport-level error.
    async fn get(&self, url: &str) -> Result<HttpReply, FetchError>;
}

impl<T: Transport> Transport for Arc<T> {
    async fn get(&self, url: &str) -> Result<HttpReply, FetchError> {
        self.as_ref().get(url).await
    }
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client where every request carries `timeout`.
    pub fn new(timeout: StdDuration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpReply, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(HttpReply {
            status,
            retry_after,
            body,
        })
    }
}

/// Gate enforcing a minimum interval between consecutive calls.
///
/// Every request through a [`Fetcher`] awaits this first, including retries
/// and requests for different topics.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: StdDuration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: StdDuration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until the minimum interval since the previous call has passed.
    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                debug!(wait_ms = (ready_at - now).as_millis() as u64, "Throttling request");
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Retry ceiling and delay schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt, before jitter.
    pub base_delay: StdDuration,
    /// Upper bound on any single wait, including `Retry-After` hints.
    pub max_delay: StdDuration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: StdDuration::from_secs(2),
            max_delay: StdDuration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Delay after failed attempt `attempt` (1-based) for a given jitter factor.
    pub fn delay_for(&self, attempt: u32, jitter: f64) -> StdDuration {
        let exponent = attempt.saturating_sub(1).min(20);
        let raw = self.base_delay.saturating_mul(1u32 << exponent);
        raw.mul_f64(jitter.clamp(JITTER_MIN, JITTER_MAX)).min(self.max_delay)
    }

    /// [`Self::delay_for`] with a random jitter factor.
    pub fn jittered_delay(&self, attempt: u32) -> StdDuration {
        self.delay_for(attempt, rng().random_range(JITTER_MIN..=JITTER_MAX))
    }
}

/// Interpret a `Retry-After` header: delta-seconds or an HTTP-date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<StdDuration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(StdDuration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(StdDuration::ZERO))
}

/// Throttled, retrying GET client for one upstream.
pub struct Fetcher<T> {
    transport: T,
    limiter: RateLimiter,
    policy: BackoffPolicy,
}

impl<T> fmt::Debug for Fetcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("limiter", &self.limiter)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T> Fetcher<T>
where
    T: Transport,
{
    pub fn new(transport: T, limiter: RateLimiter, policy: BackoffPolicy) -> Self {
        Self {
            transport,
            limiter,
            policy,
        }
    }

    /// GET `url` and run `parse` on a successful body.
    ///
    /// A parse failure counts as a transient error and is retried like a
    /// 5xx. Never retries past `policy.max_attempts`.
    ///
    /// # Arguments
    ///
    /// * `url` - Fully built request URL
    /// * `parse` - Body parser; an `Err` marks the reply as malformed
    ///
    /// # Returns
    ///
    /// The parsed body, [`FetchError::Rejected`] for a non-retryable status,
    /// or [`FetchError::Exhausted`] carrying the last failure once the
    /// attempt ceiling is reached.
    #[instrument(level = "info", skip_all, fields(url = %truncate_for_log(url, 160)))]
    pub async fn get_parsed<R, E, F>(&self, url: &str, parse: F) -> Result<R, FetchError>
    where
        F: Fn(&str) -> Result<R, E>,
        E: fmt::Display,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.limiter.acquire().await;

            let (err, hint) = match self.transport.get(url).await {
                Ok(reply) => match reply.status {
                    200..=299 => match parse(&reply.body) {
                        Ok(parsed) => {
                            debug!(attempt, bytes = reply.body.len(), "Fetched and parsed response");
                            return Ok(parsed);
                        }
                        Err(e) => (
                            FetchError::Malformed(format!(
                                "{}; body starts {:?}",
                                e,
                                truncate_for_log(&reply.body, 120)
                            )),
                            None,
                        ),
                    },
                    429 => (
                        FetchError::RateLimited,
                        reply
                            .retry_after
                            .as_deref()
                            .and_then(|v| parse_retry_after(v, Utc::now())),
                    ),
                    status @ 500..=599 => (FetchError::Server(status), None),
                    status => (FetchError::Rejected(status), None),
                },
                Err(e) => (e, None),
            };

            if !err.is_retryable() {
                warn!(attempt, error = %err, "Upstream rejected request; not retrying");
                return Err(err);
            }

            let total_dt = total_t0.elapsed();
            if attempt >= self.policy.max_attempts {
                error!(
                    attempt,
                    max = self.policy.max_attempts,
                    elapsed_ms_total = total_dt.as_millis() as u64,
                    error = %err,
                    "Fetch exhausted retries"
                );
                return Err(FetchError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = match hint {
                Some(hinted) => hinted.min(self.policy.max_delay),
                None => self.policy.jittered_delay(attempt),
            };
            warn!(
                attempt,
                max = self.policy.max_attempts,
                elapsed_ms_total = total_dt.as_millis() as u64,
                ?delay,
                retry_after = hint.is_some(),
                error = %err,
                "Fetch attempt failed; backing off"
            );
            sleep(delay).await;
        }
    }
}
