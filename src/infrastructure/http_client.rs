//! HTTP client for the vendor catalog with rate limiting and retry policy
//!
//! Wraps a single `reqwest::Client` (connection pool shared by every clone),
//! an optional `governor` rate limiter and a status-aware retry loop.

#![allow(clippy::uninlined_format_args)]

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{Client, Response, StatusCode, header};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub use crate::infrastructure::config::HttpConfig;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 10_000;
const MAX_RETRY_AFTER_SECS: u64 = 30;

/// Rate limited HTTP client; cheap to clone
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: Option<Arc<DirectRateLimiter>>,
    config: HttpConfig,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .context("Failed to create HTTP client")?;

        let rate_limiter = NonZeroU32::new(config.max_requests_per_second)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Ok(Self { client, rate_limiter, config })
    }

    /// GET with retries on network errors and retryable statuses.
    /// Non-retryable statuses fail immediately.
    pub async fn fetch_response(&self, url: &str) -> Result<Response> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 1..=max_attempts {
            if let Some(limiter) = &self.rate_limiter {
                limiter.until_ready().await;
            }

            debug!("🌐 HTTP GET (attempt {}/{}): {}", attempt, max_attempts, url);
            match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    if !is_retryable_status(status) || attempt == max_attempts {
                        return Err(anyhow!("HTTP error {}: {}", status, url));
                    }
                    let delay = retry_after(resp.headers())
                        .map_or_else(|| backoff_delay(attempt), |d| d.max(backoff_delay(attempt)));
                    warn!("⚠️ HTTP {} on attempt {}, retrying in {:?}: {}", status, attempt, delay, url);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!("⚠️ Network error on attempt {}: {}", attempt, e);
                    last_err = Some(anyhow!("HTTP request failed for {}: {}", url, e));
                    if attempt < max_attempts {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Unknown HTTP error for {}", url)))
    }

    /// GET and return the body as text
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.fetch_response(url).await?;
        response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))
    }

    /// Stream a response body to `dest`. The body is written to a `.part`
    /// sibling first and renamed into place, so `dest` is never partial.
    pub async fn download_to_file(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self.fetch_response(url).await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let mut part_name = dest.as_os_str().to_owned();
        part_name.push(".part");
        let part_path = std::path::PathBuf::from(part_name);

        let written = match write_body(response, &part_path).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&part_path, dest)
            .await
            .with_context(|| format!("Failed to move download into place at {:?}", dest))?;
        Ok(written)
    }
}

async fn write_body(response: Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {:?}", path))?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Download interrupted")?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Statuses worth retrying: timeouts, throttling and transient server errors
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Exponential backoff with ±25% jitter
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let delay = BASE_BACKOFF_MS.saturating_mul(1 << exp).min(MAX_BACKOFF_MS);
    let jitter_range = delay / 4;
    let jitter = fastrand::u64(0..=jitter_range * 2);
    Duration::from_millis((delay + jitter).saturating_sub(jitter_range))
}

/// `Retry-After` in delta-seconds form, capped
fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}
