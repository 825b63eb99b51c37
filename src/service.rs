use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::fetcher::{FeedFetcher, FetcherRegistry};
use crate::persistence::PersistenceUnit;
use crate::properties::{self, PropertiesStore};
use crate::registry::SubscriptionRegistry;
use crate::types::{
    Entry, FetchConfig, Group, InitializationError, Planet, PlanetError, RefreshOptions,
    RefreshSummary, Result,
};

/// Resolves display URLs for planet entities. Held by the service for its
/// callers; the refresh logic itself never invokes it.
pub trait UrlStrategy: Send + Sync {
    fn planet_url(&self, planet: &Planet) -> String;
    fn group_url(&self, planet: &Planet, group: &Group) -> String;
    fn entry_permalink(&self, entry: &Entry) -> String;
}

/// Path-style URLs under a fixed base.
pub struct DefaultUrlStrategy {
    base: String,
}

impl DefaultUrlStrategy {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

impl UrlStrategy for DefaultUrlStrategy {
    fn planet_url(&self, planet: &Planet) -> String {
        format!("{}/{}", self.base, planet.handle)
    }

    fn group_url(&self, planet: &Planet, group: &Group) -> String {
        format!("{}/{}/group/{}", self.base, planet.handle, group.handle)
    }

    fn entry_permalink(&self, entry: &Entry) -> String {
        entry
            .permalink
            .clone()
            .unwrap_or_else(|| format!("{}/entry/{}", self.base, entry.id))
    }
}

/// Composition root for the aggregation engine: binds the persistence
/// unit, the registry and the configuration store, and plugs in the feed
/// fetcher selected by configuration. Constructed once per process;
/// unusable after `shutdown`.
pub struct PlanetService {
    unit: Arc<dyn PersistenceUnit>,
    registry: Arc<SubscriptionRegistry>,
    properties: Arc<dyn PropertiesStore>,
    fetcher: RwLock<Arc<dyn FeedFetcher>>,
    url_strategy: RwLock<Arc<dyn UrlStrategy>>,
    terminal: AtomicBool,
}

impl PlanetService {
    /// Construct with the built-in fetcher registry. Fails fast when no
    /// fetcher is configured or the configured one cannot be built; no
    /// persistence context is left open in that case.
    pub fn new(
        unit: Arc<dyn PersistenceUnit>,
        registry: Arc<SubscriptionRegistry>,
        properties: Arc<dyn PropertiesStore>,
    ) -> Result<Self> {
        Self::with_fetchers(unit, registry, properties, &FetcherRegistry::with_defaults())
    }

    /// Construct against a caller-supplied fetcher registry, for
    /// deployments that register their own implementations.
    pub fn with_fetchers(
        unit: Arc<dyn PersistenceUnit>,
        registry: Arc<SubscriptionRegistry>,
        properties: Arc<dyn PropertiesStore>,
        fetchers: &FetcherRegistry,
    ) -> Result<Self> {
        let name = properties
            .get(properties::FEED_FETCHER_KEY)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(InitializationError::NotConfigured)?;

        let fetch_config = FetchConfig::from_properties(properties.as_ref());
        let fetcher = fetchers.resolve(&name, &fetch_config)?;
        info!("using feed fetcher: {}", name);

        let url_strategy: Arc<dyn UrlStrategy> = Arc::new(DefaultUrlStrategy::new("/planet"));

        Ok(Self {
            unit,
            registry,
            properties,
            fetcher: RwLock::new(fetcher),
            url_strategy: RwLock::new(url_strategy),
            terminal: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self, op: &'static str) -> Result<()> {
        if self.terminal.load(Ordering::SeqCst) {
            Err(PlanetError::IllegalState(op))
        } else {
            Ok(())
        }
    }

    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        self.registry.clone()
    }

    pub fn properties(&self) -> Arc<dyn PropertiesStore> {
        self.properties.clone()
    }

    pub async fn feed_fetcher(&self) -> Arc<dyn FeedFetcher> {
        self.fetcher.read().await.clone()
    }

    /// Swap the active fetcher. The swap is immediate for subsequent
    /// cycles; a cycle already in flight keeps the handle it captured.
    pub async fn set_feed_fetcher(&self, fetcher: Arc<dyn FeedFetcher>) -> Result<()> {
        self.ensure_open("set_feed_fetcher")?;
        *self.fetcher.write().await = fetcher;
        info!("feed fetcher swapped");
        Ok(())
    }

    pub async fn url_strategy(&self) -> Arc<dyn UrlStrategy> {
        self.url_strategy.read().await.clone()
    }

    pub async fn set_url_strategy(&self, strategy: Arc<dyn UrlStrategy>) -> Result<()> {
        self.ensure_open("set_url_strategy")?;
        *self.url_strategy.write().await = strategy;
        Ok(())
    }

    /// Run one refresh cycle with the currently plugged-in fetcher.
    pub async fn refresh_all(&self, options: &RefreshOptions) -> Result<RefreshSummary> {
        self.ensure_open("refresh_all")?;
        let fetcher = self.feed_fetcher().await;
        self.registry.refresh_all(fetcher, options).await
    }

    /// Commit everything mutated through the registry since the last
    /// flush or release.
    pub async fn flush(&self) -> Result<()> {
        self.ensure_open("flush")?;
        self.unit.flush().await
    }

    /// Release the persistence context, discarding uncommitted work.
    /// Idempotent, and still allowed after shutdown.
    pub async fn release(&self) {
        self.unit.release().await;
    }

    /// Cooperative shutdown: waits for an in-flight cycle, releases the
    /// persistence context, and makes every further mutating call fail.
    pub async fn shutdown(&self) {
        if self.terminal.swap(true, Ordering::SeqCst) {
            return;
        }
        self.registry.wait_idle().await;
        self.unit.release().await;
        info!("planet service shut down");
    }
}
