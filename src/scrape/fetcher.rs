//! HTTP fetcher for storefront pages
//!
//! This module handles all page requests for the sync pipeline:
//! - Building an HTTP client with realistic browser headers (the storefront
//!   serves different markup, or nothing at all, to obvious bots)
//! - Paced GET requests with a hard minimum delay between them
//! - Retry with backoff for transient failures
//! - Error classification
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 5xx | Retry up to max-retries, doubling backoff |
//! | HTTP 429 | Retry up to max-retries, doubling backoff |
//! | Timeout | Retry up to max-retries, doubling backoff |
//! | HTTP 4xx (other) | Immediate failure |
//! | Connection refused / TLS | Immediate failure |
//! | Non-HTML Content-Type | Immediate failure |
//! | Malformed URL | Immediate failure |

use crate::config::FetchConfig;
use crate::scrape::pacer::RequestPacer;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

const BROWSER_ACCEPT_LANGUAGE: &str = "es-ES,es;q=0.9,en;q=0.8";

/// Transport-level failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("expected HTML from {url}, got '{content_type}'")]
    ContentType { url: String, content_type: String },

    #[error("giving up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("failed to read body from {url}: {message}")]
    Body { url: String, message: String },
}

impl FetchError {
    /// Whether retrying this failure could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Builds the HTTP client used for page fetches and image downloads
///
/// The header set mirrors a desktop browser so the storefront serves its
/// normal markup. Compression is negotiated; redirects follow the client
/// default policy.
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE),
    );
    headers.insert(
        "Upgrade-Insecure-Requests",
        HeaderValue::from_static("1"),
    );

    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Issues paced, retried page requests against the storefront
///
/// All page fetches within a sync go through one `Fetcher`, so the pacer
/// sees every request and the minimum inter-request delay holds across
/// category, listing, and detail pages alike.
pub struct Fetcher {
    client: Client,
    pacer: RequestPacer,
    max_retries: u32,
    retry_backoff: Duration,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(config)?, config))
    }

    /// Wraps an already-built client; the caller may keep sharing it with
    /// other consumers (the asset downloader)
    pub fn with_client(client: Client, config: &FetchConfig) -> Self {
        Self {
            client,
            pacer: RequestPacer::new(Duration::from_millis(config.request_delay_ms)),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Fetches a page and returns its HTML body
    ///
    /// Transient failures are retried with doubling backoff; the pacer runs
    /// before every attempt, retries included.
    pub async fn fetch_page(&mut self, url: &str) -> Result<String, FetchError> {
        if let Err(e) = url::Url::parse(url) {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                message: e.to_string(),
            });
        }

        let mut attempt = 0;
        loop {
            self.pacer.pace().await;

            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let backoff = self.retry_backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "Transient failure for {} (attempt {}/{}): {}; retrying in {:?}",
                        url,
                        attempt,
                        self.max_retries,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(FetchError::RetriesExhausted {
                        url: url.to_string(),
                        attempts: attempt + 1,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                return Err(if e.is_timeout() {
                    FetchError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    FetchError::Connect {
                        url: url.to_string(),
                        message: e.to_string(),
                    }
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        // An empty Content-Type is tolerated; an explicit non-HTML one is not.
        if !content_type.is_empty() && !content_type.contains("text/html") {
            return Err(FetchError::ContentType {
                url: url.to_string(),
                content_type,
            });
        }

        response.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
