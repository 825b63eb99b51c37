#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use planet_aggregator::{
    properties, FeedFetcher, FetchError, FetchedEntry, FetchedFeed, MemoryProperties, MemoryStore,
    PlanetService, PropertiesStore, RefreshConfig, SubscriptionRegistry, HTTP_FETCHER_NAME,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

/// Properties with the built-in HTTP fetcher configured, the baseline for
/// a constructible service.
pub fn default_props() -> MemoryProperties {
    MemoryProperties::new().with(properties::FEED_FETCHER_KEY, HTTP_FETCHER_NAME)
}

pub fn build_service(
    props: MemoryProperties,
) -> planet_aggregator::Result<(Arc<MemoryStore>, Arc<SubscriptionRegistry>, PlanetService)> {
    let props: Arc<dyn PropertiesStore> = Arc::new(props);
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(SubscriptionRegistry::new(
        store.clone(),
        RefreshConfig::from_properties(props.as_ref()),
    ));
    let service = PlanetService::new(store.clone(), registry.clone(), props)?;
    Ok((store, registry, service))
}

/// Construction that is expected to fail; panics if it does not.
pub fn build_service_err(props: MemoryProperties) -> planet_aggregator::PlanetError {
    match build_service(props) {
        Ok(_) => panic!("service construction unexpectedly succeeded"),
        Err(e) => e,
    }
}

/// What a scripted fetcher does when asked for a given URL.
#[derive(Clone)]
pub enum Script {
    Feed(FetchedFeed),
    Fail(FetchError),
    /// Sleep past the orchestrator deadline; used for timeout scenarios.
    Hang(Duration),
}

/// Test fetcher that answers each URL from a fixed script. URLs without a
/// script fail permanently, which keeps typos loud.
pub struct ScriptedFetcher {
    scripts: HashMap<String, Script>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
        }
    }

    pub fn with(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    pub fn into_arc(self) -> Arc<dyn FeedFetcher> {
        Arc::new(self)
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFetcher {
    async fn fetch(&self, feed_url: &str) -> Result<FetchedFeed, FetchError> {
        match self.scripts.get(feed_url) {
            Some(Script::Feed(feed)) => Ok(feed.clone()),
            Some(Script::Fail(error)) => Err(error.clone()),
            Some(Script::Hang(duration)) => {
                tokio::time::sleep(*duration).await;
                Err(FetchError::transient("hung fetch finally gave up"))
            }
            None => Err(FetchError::permanent(format!(
                "no script for {}",
                feed_url
            ))),
        }
    }
}

pub fn entry(guid: &str, title: &str) -> FetchedEntry {
    entry_at(guid, title, Utc::now())
}

pub fn entry_at(guid: &str, title: &str, published: DateTime<Utc>) -> FetchedEntry {
    FetchedEntry {
        guid: guid.to_string(),
        permalink: Some(format!("https://example.com/{}", guid)),
        title: title.to_string(),
        summary: Some(format!("summary of {}", title)),
        content: Some(format!("content of {}", title)),
        author: Some("tester".to_string()),
        published_at: Some(published),
        updated_at: None,
        categories: Vec::new(),
    }
}

pub fn feed(entries: Vec<FetchedEntry>) -> FetchedFeed {
    FetchedFeed {
        title: Some("Example Feed".to_string()),
        site_url: Some("https://example.com".to_string()),
        entries,
        skipped: 0,
    }
}
