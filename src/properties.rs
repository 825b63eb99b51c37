use std::collections::HashMap;
use std::env;

/// Name of the fetcher implementation to plug in at startup. Construction
/// fails fast when this is unset.
pub const FEED_FETCHER_KEY: &str = "feedfetcher.name";

pub const FETCHER_TIMEOUT_KEY: &str = "fetcher.timeout.secs";
pub const FETCHER_USER_AGENT_KEY: &str = "fetcher.useragent";
pub const FETCHER_MAX_RETRIES_KEY: &str = "fetcher.max.retries";
pub const FETCHER_RETRY_DELAY_KEY: &str = "fetcher.retry.delay.secs";
pub const FETCHER_MAX_REDIRECTS_KEY: &str = "fetcher.max.redirects";

pub const REFRESH_INTERVAL_KEY: &str = "refresh.interval.mins";
pub const REFRESH_CONCURRENCY_KEY: &str = "refresh.concurrency";
pub const REFRESH_FETCH_TIMEOUT_KEY: &str = "refresh.fetch.timeout.secs";

pub const ENTRIES_CAP_KEY: &str = "planet.entries.cap";

/// Key/value configuration lookup. The engine only ever reads through this
/// interface; where the values live is the deployment's business.
pub trait PropertiesStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key)?.trim().parse().ok()
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)?.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

/// In-memory properties, seeded programmatically. The primary store for
/// tests and embedded callers.
#[derive(Debug, Clone, Default)]
pub struct MemoryProperties {
    values: HashMap<String, String>,
}

impl MemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }
}

impl PropertiesStore for MemoryProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Environment overlay: `refresh.concurrency` resolves from
/// `PLANET_REFRESH_CONCURRENCY` first, then from the fallback store.
pub struct EnvProperties<P> {
    fallback: P,
}

impl<P: PropertiesStore> EnvProperties<P> {
    pub fn new(fallback: P) -> Self {
        Self { fallback }
    }

    fn env_key(key: &str) -> String {
        let mut name = String::with_capacity(key.len() + 7);
        name.push_str("PLANET_");
        for c in key.chars() {
            match c {
                '.' | '-' => name.push('_'),
                _ => name.push(c.to_ascii_uppercase()),
            }
        }
        name
    }
}

impl<P: PropertiesStore> PropertiesStore for EnvProperties<P> {
    fn get(&self, key: &str) -> Option<String> {
        env::var(Self::env_key(key))
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.fallback.get(key))
    }
}
