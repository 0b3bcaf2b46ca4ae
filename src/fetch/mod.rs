//! Rate-limited, retrying page retrieval
//!
//! This module provides:
//! - The `Fetcher` seam used by TOC resolution, probing and discovery
//! - An HTTP implementation with token-interval rate limiting
//! - Exponential backoff with jitter for 5xx/429 and network failures
//! - Cooperative cancellation at every suspension point

mod rate_limit;
mod retry;

pub use rate_limit::*;
pub use retry::*;

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A fetched page: final URL, HTTP status and decoded body
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx page into `Error::Status`
    pub fn into_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Status {
                url: self.url,
                status: self.status,
            })
        }
    }
}

/// Page retrieval contract
///
/// Implementations return non-retryable statuses (e.g. 404) as a page so that
/// callers such as the division prober can interpret them. Retryable
/// failures are retried internally and surface as `Error::Transport` once
/// the attempt budget is spent.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;

    /// Fetch and require a 2xx status
    async fn fetch_ok(&self, url: &str) -> Result<FetchedPage> {
        self.fetch(url).await?.into_success()
    }
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: Client,
    limiter: RequestRateLimiter,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl HttpFetcher {
    /// Create a new fetcher
    pub fn new(config: &FetchConfig, cancel: CancellationToken) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            limiter: RequestRateLimiter::new(config.requests_per_second),
            policy: RetryPolicy::from_config(config),
            cancel,
        })
    }

    async fn attempt(&self, url: &str) -> std::result::Result<FetchedPage, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok(FetchedPage {
            url: final_url,
            status,
            body,
        })
    }

    async fn backoff(&self, attempt: u32) -> Result<()> {
        let delay = self.policy.delay_for(attempt);
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let max = self.policy.max_attempts;
        let mut last_reason = String::new();

        for attempt in 0..max {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                _ = self.limiter.wait() => {}
            }

            debug!(url, attempt = attempt + 1, "Fetching");

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                r = self.attempt(url) => r,
            };

            match outcome {
                Ok(page) if is_retryable_status(page.status) => {
                    last_reason = format!("HTTP {}", page.status);
                }
                Ok(page) => return Ok(page),
                Err(e) => {
                    last_reason = e.to_string();
                }
            }

            if attempt + 1 < max {
                warn!(
                    url,
                    attempt = attempt + 1,
                    max,
                    "Fetch failed ({}), retrying",
                    last_reason
                );
                self.backoff(attempt).await?;
            }
        }

        Err(Error::Transport {
            url: url.to_string(),
            attempts: max,
            reason: last_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config(max_attempts: u32) -> FetchConfig {
        FetchConfig {
            requests_per_second: 100.0,
            max_attempts,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>ok</p>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&fast_config(5), CancellationToken::new()).unwrap();
        let page = fetcher.fetch(&format!("{}/page", server.uri())).await.unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.body, "<p>ok</p>");
    }

    #[tokio::test]
    async fn test_rate_limit_status_is_retried_until_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&fast_config(3), CancellationToken::new()).unwrap();
        let err = fetcher
            .fetch(&format!("{}/busy", server.uri()))
            .await
            .unwrap_err();
        match err {
            Error::Transport { attempts, reason, .. } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("429"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_not_found_is_returned_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&fast_config(5), CancellationToken::new()).unwrap();
        let url = format!("{}/missing", server.uri());
        let page = fetcher.fetch(&url).await.unwrap();
        assert_eq!(page.status, 404);
        assert!(matches!(
            fetcher.fetch_ok(&url).await,
            Err(Error::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let fetcher = HttpFetcher::new(&fast_config(5), cancel).unwrap();
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
