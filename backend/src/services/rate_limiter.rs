//! Rate limiting and retry logic for catalog requests
//!
//! Provides a rate-limited HTTP client and a bounded retry helper so that a
//! slow or flaky catalog never stalls the playback pipeline for long.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, Response, header};
use tracing::{debug, warn};

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: u32,
    /// Burst capacity (allows short bursts above the rate)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1,
            burst_size: 3,
        }
    }
}

/// A rate-limited HTTP client wrapper
pub struct RateLimitedClient {
    client: Client,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    name: String,
}

impl RateLimitedClient {
    /// Create a new rate-limited client with a per-request timeout
    pub fn new(
        name: &str,
        config: RateLimitConfig,
        user_agent: &str,
        request_timeout: Duration,
    ) -> Result<Self> {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        let limiter = Arc::new(RateLimiter::direct(quota));

        let mut headers = header::HeaderMap::new();
        if !user_agent.is_empty() {
            match user_agent.parse() {
                Ok(v) => {
                    headers.insert(header::USER_AGENT, v);
                }
                Err(e) => {
                    warn!(client = %name, error = %e, "Failed to parse user agent header, using default");
                }
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .gzip(true)
            .cookie_store(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            limiter,
            name: name.to_string(),
        })
    }

    /// Client for the aspect-ratio catalog. Scraping a public site, so be conservative.
    pub fn for_catalog(user_agent: &str, request_timeout: Duration) -> Result<Self> {
        Self::new("catalog", RateLimitConfig::default(), user_agent, request_timeout)
    }

    /// Wait for rate limit and make a GET request
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, url = %url, "Making rate-limited GET request");

        self.client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")
    }

    /// GET a page and return its body, failing on any non-success status
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;

        if response.is_rate_limited() {
            anyhow::bail!("Rate limited (429)");
        }
        if !response.status().is_success() {
            anyhow::bail!("Request failed with status: {}", response.status());
        }

        response.text().await.context("Failed to read response body")
    }

    /// Wait for a rate limit permit
    pub async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_interval: Duration,
    /// Maximum backoff duration
    pub max_interval: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create an ExponentialBackoff from this config
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            max_elapsed_time: Some(self.max_interval * self.max_attempts.max(1)),
            ..Default::default()
        }
    }
}

/// Run `operation` until it succeeds or `config.max_attempts` runs out.
///
/// Waits between attempts follow `config.to_backoff()`. The last error is
/// returned once the attempts or the backoff's elapsed-time budget are spent.
pub async fn retry_async<T, E, Fut, F>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;

    backoff::future::retry_notify(
        config.to_backoff(),
        || {
            attempt += 1;
            let current = attempt;
            let pending = operation();
            async move {
                pending.await.map_err(|e| {
                    if current < max_attempts {
                        return backoff::Error::transient(e);
                    }
                    warn!(
                        operation = %operation_name,
                        attempts = current,
                        error = %e,
                        "Giving up"
                    );
                    backoff::Error::permanent(e)
                })
            }
        },
        |e: E, wait: Duration| {
            debug!(
                operation = %operation_name,
                error = %e,
                wait_ms = wait.as_millis() as u64,
                "Attempt failed, backing off"
            );
        },
    )
    .await
}

/// Helper trait for classifying HTTP responses
pub trait ResponseExt {
    /// Check if the response indicates rate limiting (429)
    fn is_rate_limited(&self) -> bool;
}

impl ResponseExt for Response {
    fn is_rate_limited(&self) -> bool {
        self.status().as_u16() == 429
    }
}
