use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::parser;
use crate::types::{
    FetchConfig, FetchError, FetchedFeed, InitializationError, PlanetError, Result,
};

/// Pluggable strategy that retrieves and parses one feed into normalized
/// entries. Implementations hold no per-call mutable state so the
/// orchestrator can fetch different subscriptions concurrently, and the
/// active implementation can be swapped at runtime.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, feed_url: &str) -> std::result::Result<FetchedFeed, FetchError>;
}

pub type FetcherFactory = Box<dyn Fn(&FetchConfig) -> Result<Arc<dyn FeedFetcher>> + Send + Sync>;

/// Explicit name-to-constructor mapping, resolved once at startup. This is
/// how a deployment selects its fetcher without any runtime class loading.
pub struct FetcherRegistry {
    factories: HashMap<String, FetcherFactory>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in `http` fetcher.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(HTTP_FETCHER_NAME, |config| {
            Ok(Arc::new(HttpFeedFetcher::new(config)?) as Arc<dyn FeedFetcher>)
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&FetchConfig) -> Result<Arc<dyn FeedFetcher>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn resolve(&self, name: &str, config: &FetchConfig) -> Result<Arc<dyn FeedFetcher>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            PlanetError::from(InitializationError::UnknownImplementation(name.to_string()))
        })?;

        factory(config).map_err(|e| match e {
            init @ PlanetError::Initialization(_) => init,
            other => InitializationError::Construction {
                name: name.to_string(),
                reason: other.to_string(),
            }
            .into(),
        })
    }
}

impl Default for FetcherRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

pub const HTTP_FETCHER_NAME: &str = "http";

/// Default fetcher: HTTP GET with compression, bounded redirects and
/// exponential-backoff retries on transient failures, then RSS/Atom
/// normalization.
pub struct HttpFeedFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFeedFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| InitializationError::Construction {
                name: HTTP_FETCHER_NAME.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn fetch_document(&self, url: &str) -> std::result::Result<String, FetchError> {
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut last_error = FetchError::transient("no attempt completed");

        for attempt in 0..=self.config.max_retries {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        match response.text().await {
                            Ok(body) => return Ok(body),
                            Err(e) => {
                                last_error = FetchError::transient(format!(
                                    "error reading response body: {}",
                                    e
                                ));
                            }
                        }
                    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = FetchError::transient(format!("HTTP {}", status));
                    } else {
                        // Remaining 4xx responses will not get better on retry.
                        return Err(FetchError::permanent(format!("HTTP {}", status)));
                    }
                }
                Err(e) => {
                    last_error = if e.is_timeout() {
                        FetchError::transient(format!("request timed out: {}", e))
                    } else {
                        FetchError::transient(format!("request failed: {}", e))
                    };
                }
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!(
                        "attempt {} failed for {}: {}, retrying in {:?}",
                        attempt + 1,
                        url,
                        last_error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        Err(last_error)
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, feed_url: &str) -> std::result::Result<FetchedFeed, FetchError> {
        let parsed = Url::parse(feed_url)
            .map_err(|e| FetchError::permanent(format!("invalid feed URL {}: {}", feed_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::permanent(format!(
                "unsupported scheme for feed URL {}",
                feed_url
            )));
        }

        debug!("fetching feed: {}", feed_url);
        let body = self.fetch_document(feed_url).await?;
        let feed = parser::parse_feed(&body)?;

        info!(
            "fetched {} ({} entries, {} skipped)",
            feed_url,
            feed.entries.len(),
            feed.skipped
        );
        Ok(feed)
    }
}
