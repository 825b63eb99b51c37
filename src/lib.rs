pub mod fetcher;
pub mod parser;
pub mod persistence;
pub mod properties;
pub mod registry;
pub mod service;
pub mod types;

pub use fetcher::{FeedFetcher, FetcherRegistry, HttpFeedFetcher, HTTP_FETCHER_NAME};
pub use persistence::{MemoryStore, PersistenceUnit, PlanetStore};
pub use properties::{EnvProperties, MemoryProperties, PropertiesStore};
pub use registry::SubscriptionRegistry;
pub use service::{DefaultUrlStrategy, PlanetService, UrlStrategy};
pub use types::*;
