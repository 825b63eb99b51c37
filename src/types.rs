use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::properties::{self, PropertiesStore};

/// Aggregation root for one deployment. Owns groups, which in turn
/// reference subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Planet {
    pub id: Uuid,
    pub handle: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Planet {
    pub fn new(handle: impl Into<String>, title: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            handle: handle.into(),
            title,
            created_at: Utc::now(),
        }
    }
}

/// A named collection of subscriptions (a blogroll). Membership is
/// many-to-many: the same subscription may appear in several groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub planet_id: Uuid,
    pub handle: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub subscriptions: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(planet_id: Uuid, handle: impl Into<String>, title: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            planet_id,
            handle: handle.into(),
            title,
            description: None,
            subscriptions: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Per-subscription refresh state machine. `FailedPermanent` subscriptions
/// are excluded from refresh cycles until explicitly re-enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionState {
    Pending,
    Fetching,
    Updated,
    FailedTransient,
    FailedPermanent,
}

/// A remote feed source tracked for periodic refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub feed_url: String,
    pub site_url: Option<String>,
    pub title: Option<String>,
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub last_fetch_error: Option<String>,
    /// Minutes between refreshes. `None` falls back to the configured
    /// deployment default.
    pub refresh_interval_mins: Option<u32>,
    pub state: SubscriptionState,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            feed_url: feed_url.into(),
            site_url: None,
            title: None,
            last_fetch_time: None,
            last_fetch_error: None,
            refresh_interval_mins: None,
            state: SubscriptionState::Pending,
            created_at: Utc::now(),
        }
    }
}

/// One normalized feed item, owned exclusively by its subscription.
/// Identity is (subscription_id, guid).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub guid: String,
    pub permalink: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub fn from_fetched(subscription_id: Uuid, fetched: &FetchedEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id,
            guid: fetched.guid.clone(),
            permalink: fetched.permalink.clone(),
            title: fetched.title.clone(),
            summary: fetched.summary.clone(),
            content: fetched.content.clone(),
            author: fetched.author.clone(),
            published_at: fetched.published_at,
            updated_at: fetched.updated_at,
            categories: fetched.categories.clone(),
            created_at: Utc::now(),
        }
    }

    /// Fold a re-fetched item into this entry. Returns true when any field
    /// actually changed, so unchanged remote content produces zero writes.
    pub fn merge_fetched(&mut self, fetched: &FetchedEntry) -> bool {
        let changed = self.permalink != fetched.permalink
            || self.title != fetched.title
            || self.summary != fetched.summary
            || self.content != fetched.content
            || self.author != fetched.author
            || self.published_at != fetched.published_at
            || self.updated_at != fetched.updated_at
            || self.categories != fetched.categories;

        if changed {
            self.permalink = fetched.permalink.clone();
            self.title = fetched.title.clone();
            self.summary = fetched.summary.clone();
            self.content = fetched.content.clone();
            self.author = fetched.author.clone();
            self.published_at = fetched.published_at;
            self.updated_at = fetched.updated_at;
            self.categories = fetched.categories.clone();
        }

        changed
    }
}

/// A feed as returned by a fetcher: normalized entries in wire order plus
/// a count of malformed items that were skipped rather than aborting.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub title: Option<String>,
    pub site_url: Option<String>,
    pub entries: Vec<FetchedEntry>,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct FetchedEntry {
    pub guid: String,
    pub permalink: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
}

/// Tuning for the default HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "planet-aggregator/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 5,
            max_redirects: 5,
        }
    }
}

impl FetchConfig {
    pub fn from_properties(props: &dyn PropertiesStore) -> Self {
        let defaults = Self::default();
        Self {
            user_agent: props
                .get(properties::FETCHER_USER_AGENT_KEY)
                .unwrap_or(defaults.user_agent),
            timeout_seconds: props
                .get_u64(properties::FETCHER_TIMEOUT_KEY)
                .unwrap_or(defaults.timeout_seconds),
            max_retries: props
                .get_u64(properties::FETCHER_MAX_RETRIES_KEY)
                .map(|v| v as u32)
                .unwrap_or(defaults.max_retries),
            retry_delay_seconds: props
                .get_u64(properties::FETCHER_RETRY_DELAY_KEY)
                .unwrap_or(defaults.retry_delay_seconds),
            max_redirects: props
                .get_u64(properties::FETCHER_MAX_REDIRECTS_KEY)
                .map(|v| v as usize)
                .unwrap_or(defaults.max_redirects),
        }
    }
}

/// Tuning for the refresh orchestration.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Fallback interval for subscriptions without their own hint.
    pub default_interval_mins: u32,
    /// Cap on simultaneous outbound fetches within one cycle.
    pub concurrency: usize,
    /// Orchestrator-side deadline per fetch; elapsing is a transient
    /// failure for that subscription only.
    pub fetch_timeout_seconds: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            default_interval_mins: 60,
            concurrency: 8,
            fetch_timeout_seconds: 90,
        }
    }
}

impl RefreshConfig {
    pub fn from_properties(props: &dyn PropertiesStore) -> Self {
        let defaults = Self::default();
        Self {
            default_interval_mins: props
                .get_u64(properties::REFRESH_INTERVAL_KEY)
                .map(|v| v as u32)
                .unwrap_or(defaults.default_interval_mins),
            concurrency: props
                .get_u64(properties::REFRESH_CONCURRENCY_KEY)
                .map(|v| (v as usize).max(1))
                .unwrap_or(defaults.concurrency),
            fetch_timeout_seconds: props
                .get_u64(properties::REFRESH_FETCH_TIMEOUT_KEY)
                .unwrap_or(defaults.fetch_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RefreshOptions {
    /// Refresh every enabled subscription regardless of its interval.
    pub force: bool,
}

/// Outcome of one refresh cycle. A cycle always completes and reports,
/// even under partial failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub subscriptions_succeeded: usize,
    pub subscriptions_failed: usize,
    pub subscriptions_skipped: usize,
    pub entries_inserted: usize,
    pub entries_updated: usize,
    pub entries_unchanged: usize,
    /// Malformed items dropped by fetchers across the cycle.
    pub entries_skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Worth retrying on the next scheduled cycle (timeout, 5xx, connect
    /// failure).
    Transient,
    /// Requires operator intervention (404, feed never parseable); the
    /// subscription is disabled until re-enabled.
    Permanent,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FetchErrorKind::Transient
    }
}

/// Construction-time failures. All of these mean the process should not
/// start; the sub-kinds stay distinguishable for callers that care whether
/// the fetcher was absent or merely broken.
#[derive(Debug, thiserror::Error)]
pub enum InitializationError {
    #[error("no feed fetcher configured")]
    NotConfigured,

    #[error("unknown feed fetcher implementation: {0}")]
    UnknownImplementation(String),

    #[error("feed fetcher {name} could not be constructed: {reason}")]
    Construction { name: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PlanetError {
    #[error("initialization failed: {0}")]
    Initialization(#[from] InitializationError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("service is shut down: {0}")]
    IllegalState(&'static str),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("a subscription already tracks {0}")]
    DuplicateSubscription(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, PlanetError>;
