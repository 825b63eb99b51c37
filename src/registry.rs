use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as Interval, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::fetcher::FeedFetcher;
use crate::persistence::PlanetStore;
use crate::types::{
    Entry, FetchError, FetchedFeed, Group, Planet, PlanetError, RefreshConfig, RefreshOptions,
    RefreshSummary, Result, Subscription, SubscriptionState,
};

/// Owns planets, groups, subscriptions and entries, and runs the refresh
/// cycle across them. All mutations go through the injected store;
/// committing is the caller's decision via the persistence unit.
pub struct SubscriptionRegistry {
    store: Arc<dyn PlanetStore>,
    config: RefreshConfig,
    // Held for a whole cycle so cycles never overlap on one registry.
    cycle_lock: Mutex<()>,
}

#[derive(Debug, Default)]
struct MergeCounts {
    inserted: usize,
    updated: usize,
    unchanged: usize,
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<dyn PlanetStore>, config: RefreshConfig) -> Self {
        Self {
            store,
            config,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Resolves once any in-flight refresh cycle has finished.
    pub async fn wait_idle(&self) {
        let _guard = self.cycle_lock.lock().await;
    }

    // ---- planet / group CRUD ----

    pub async fn create_planet(
        &self,
        handle: impl Into<String>,
        title: Option<String>,
    ) -> Result<Planet> {
        let planet = Planet::new(handle, title);
        self.store.put_planet(planet.clone()).await?;
        info!("created planet {}", planet.handle);
        Ok(planet)
    }

    pub async fn get_planet(&self, id: Uuid) -> Result<Planet> {
        self.store
            .get_planet(id)
            .await?
            .ok_or(PlanetError::NotFound { kind: "planet", id })
    }

    /// Deletes the planet and its groups. Subscriptions survive; they are
    /// independent of any one grouping.
    pub async fn delete_planet(&self, id: Uuid) -> Result<()> {
        let planet = self.get_planet(id).await?;
        for group in self.store.list_groups().await? {
            if group.planet_id == id {
                self.store.delete_group(group.id).await?;
            }
        }
        self.store.delete_planet(id).await?;
        info!("deleted planet {}", planet.handle);
        Ok(())
    }

    pub async fn create_group(
        &self,
        planet_id: Uuid,
        handle: impl Into<String>,
        title: Option<String>,
    ) -> Result<Group> {
        self.get_planet(planet_id).await?;
        let group = Group::new(planet_id, handle, title);
        self.store.put_group(group.clone()).await?;
        info!("created group {}", group.handle);
        Ok(group)
    }

    pub async fn get_group(&self, id: Uuid) -> Result<Group> {
        self.store
            .get_group(id)
            .await?
            .ok_or(PlanetError::NotFound { kind: "group", id })
    }

    pub async fn list_groups(&self, planet_id: Uuid) -> Result<Vec<Group>> {
        let groups = self.store.list_groups().await?;
        Ok(groups.into_iter().filter(|g| g.planet_id == planet_id).collect())
    }

    /// Removes the group only; member subscriptions are untouched.
    pub async fn delete_group(&self, id: Uuid) -> Result<()> {
        self.get_group(id).await?;
        self.store.delete_group(id).await?;
        Ok(())
    }

    // ---- subscription / entry CRUD ----

    pub async fn add_subscription(
        &self,
        feed_url: impl Into<String>,
        title: Option<String>,
    ) -> Result<Subscription> {
        let feed_url = feed_url.into();
        Url::parse(&feed_url)?;

        if self.store.find_subscription_by_url(&feed_url).await?.is_some() {
            return Err(PlanetError::DuplicateSubscription(feed_url));
        }

        let mut subscription = Subscription::new(feed_url);
        subscription.title = title;
        self.store.put_subscription(subscription.clone()).await?;
        info!("added subscription {}", subscription.feed_url);
        Ok(subscription)
    }

    pub async fn get_subscription(&self, id: Uuid) -> Result<Subscription> {
        self.store
            .get_subscription(id)
            .await?
            .ok_or(PlanetError::NotFound {
                kind: "subscription",
                id,
            })
    }

    pub async fn find_subscription_by_url(&self, feed_url: &str) -> Result<Option<Subscription>> {
        self.store.find_subscription_by_url(feed_url).await
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.store.list_subscriptions().await
    }

    pub async fn save_subscription(&self, subscription: Subscription) -> Result<()> {
        self.get_subscription(subscription.id).await?;
        self.store.put_subscription(subscription).await
    }

    /// Deletes the subscription, its entries, and every group membership
    /// that references it.
    pub async fn delete_subscription(&self, id: Uuid) -> Result<()> {
        let subscription = self.get_subscription(id).await?;

        for entry in self.store.list_entries(id).await? {
            self.store.delete_entry(entry.id).await?;
        }

        for mut group in self.store.list_groups().await? {
            if group.subscriptions.contains(&id) {
                group.subscriptions.retain(|s| *s != id);
                self.store.put_group(group).await?;
            }
        }

        self.store.delete_subscription(id).await?;
        info!("deleted subscription {}", subscription.feed_url);
        Ok(())
    }

    pub async fn add_to_group(&self, group_id: Uuid, subscription_id: Uuid) -> Result<()> {
        let mut group = self.get_group(group_id).await?;
        self.get_subscription(subscription_id).await?;
        if !group.subscriptions.contains(&subscription_id) {
            group.subscriptions.push(subscription_id);
            self.store.put_group(group).await?;
        }
        Ok(())
    }

    /// Drops the membership only. The subscription itself stays, whether
    /// or not other groups still reference it.
    pub async fn remove_from_group(&self, group_id: Uuid, subscription_id: Uuid) -> Result<()> {
        let mut group = self.get_group(group_id).await?;
        group.subscriptions.retain(|s| *s != subscription_id);
        self.store.put_group(group).await
    }

    pub async fn group_subscriptions(&self, group_id: Uuid) -> Result<Vec<Subscription>> {
        let group = self.get_group(group_id).await?;
        let mut subs = Vec::with_capacity(group.subscriptions.len());
        for id in group.subscriptions {
            subs.push(self.get_subscription(id).await?);
        }
        Ok(subs)
    }

    /// Entries for one subscription, newest first.
    pub async fn get_entries(&self, subscription_id: Uuid) -> Result<Vec<Entry>> {
        self.get_subscription(subscription_id).await?;
        self.store.list_entries(subscription_id).await
    }

    /// Clears a permanent failure so the subscription rejoins the next
    /// cycle.
    pub async fn re_enable_subscription(&self, id: Uuid) -> Result<()> {
        let mut subscription = self.get_subscription(id).await?;
        subscription.state = SubscriptionState::Pending;
        subscription.last_fetch_error = None;
        self.store.put_subscription(subscription).await?;
        info!("re-enabled subscription {}", id);
        Ok(())
    }

    /// Retention: keep the newest `cap` entries, delete the rest
    /// oldest-first. Returns how many were removed.
    pub async fn prune_entries(&self, subscription_id: Uuid, cap: usize) -> Result<usize> {
        let entries = self.get_entries(subscription_id).await?;
        if entries.len() <= cap {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in entries.into_iter().skip(cap) {
            self.store.delete_entry(entry.id).await?;
            removed += 1;
        }
        info!(
            "pruned {} entries from subscription {}",
            removed, subscription_id
        );
        Ok(removed)
    }

    // ---- refresh orchestration ----

    fn is_due(&self, subscription: &Subscription, now: DateTime<Utc>) -> bool {
        match subscription.last_fetch_time {
            None => true,
            Some(last) => {
                let mins = subscription
                    .refresh_interval_mins
                    .unwrap_or(self.config.default_interval_mins);
                now - last >= Interval::minutes(mins as i64)
            }
        }
    }

    /// One refresh cycle: select due subscriptions, fetch them on a bounded
    /// worker pool, merge results through a single writer. One
    /// subscription's failure never aborts the batch; the cycle always
    /// completes and reports a summary.
    pub async fn refresh_all(
        &self,
        fetcher: Arc<dyn FeedFetcher>,
        options: &RefreshOptions,
    ) -> Result<RefreshSummary> {
        let _cycle = self.cycle_lock.lock().await;

        let now = Utc::now();
        let mut summary = RefreshSummary::default();

        let mut due = Vec::new();
        for subscription in self.store.list_subscriptions().await? {
            if subscription.state == SubscriptionState::FailedPermanent {
                debug!(
                    "skipping permanently failed subscription {}",
                    subscription.feed_url
                );
                summary.subscriptions_skipped += 1;
            } else if options.force || self.is_due(&subscription, now) {
                due.push(subscription);
            } else {
                summary.subscriptions_skipped += 1;
            }
        }

        info!(
            "refresh cycle starting: {} due, {} skipped",
            due.len(),
            summary.subscriptions_skipped
        );

        for subscription in &due {
            let mut marked = subscription.clone();
            marked.state = SubscriptionState::Fetching;
            self.store.put_subscription(marked).await?;
        }

        let deadline = Duration::from_secs(self.config.fetch_timeout_seconds);
        let results: Vec<(Subscription, DateTime<Utc>, std::result::Result<FetchedFeed, FetchError>)> =
            stream::iter(due)
                .map(|subscription| {
                    let fetcher = fetcher.clone();
                    async move {
                        let started = Utc::now();
                        let outcome =
                            match tokio::time::timeout(deadline, fetcher.fetch(&subscription.feed_url))
                                .await
                            {
                                Ok(result) => result,
                                Err(_) => Err(FetchError::transient(format!(
                                    "fetch exceeded {}s deadline",
                                    deadline.as_secs()
                                ))),
                            };
                        (subscription, started, outcome)
                    }
                })
                .buffer_unordered(self.config.concurrency)
                .collect()
                .await;

        // Single writer: every merge happens serially on this task.
        for (subscription, started, outcome) in results {
            match outcome {
                Ok(feed) => {
                    let counts = self.merge_feed(&subscription, &feed).await?;
                    summary.entries_inserted += counts.inserted;
                    summary.entries_updated += counts.updated;
                    summary.entries_unchanged += counts.unchanged;
                    summary.entries_skipped += feed.skipped;

                    let mut updated = subscription;
                    if feed.title.is_some() {
                        updated.title = feed.title.clone();
                    }
                    if feed.site_url.is_some() {
                        updated.site_url = feed.site_url.clone();
                    }
                    // Fetch start time, so slow fetches do not skew the
                    // interval.
                    updated.last_fetch_time = Some(started);
                    updated.last_fetch_error = None;
                    updated.state = SubscriptionState::Updated;
                    self.store.put_subscription(updated).await?;
                    summary.subscriptions_succeeded += 1;
                }
                Err(e) => {
                    warn!("fetch failed for {}: {}", subscription.feed_url, e);
                    let mut failed = subscription;
                    failed.last_fetch_error = Some(e.to_string());
                    failed.state = if e.is_transient() {
                        SubscriptionState::FailedTransient
                    } else {
                        SubscriptionState::FailedPermanent
                    };
                    self.store.put_subscription(failed).await?;
                    summary.subscriptions_failed += 1;
                }
            }
        }

        info!(
            "refresh cycle finished: {} succeeded, {} failed, {} skipped, {} inserted, {} updated",
            summary.subscriptions_succeeded,
            summary.subscriptions_failed,
            summary.subscriptions_skipped,
            summary.entries_inserted,
            summary.entries_updated
        );

        Ok(summary)
    }

    /// Upsert each fetched entry by (subscription, guid). Unchanged remote
    /// content produces zero writes, which is what makes refresh
    /// idempotent.
    async fn merge_feed(
        &self,
        subscription: &Subscription,
        feed: &FetchedFeed,
    ) -> Result<MergeCounts> {
        let mut counts = MergeCounts::default();

        for fetched in &feed.entries {
            match self
                .store
                .get_entry_by_guid(subscription.id, &fetched.guid)
                .await?
            {
                None => {
                    self.store
                        .put_entry(Entry::from_fetched(subscription.id, fetched))
                        .await?;
                    counts.inserted += 1;
                }
                Some(mut existing) => {
                    if existing.merge_fetched(fetched) {
                        self.store.put_entry(existing).await?;
                        counts.updated += 1;
                    } else {
                        counts.unchanged += 1;
                    }
                }
            }
        }

        debug!(
            "merged {}: {} inserted, {} updated, {} unchanged",
            subscription.feed_url, counts.inserted, counts.updated, counts.unchanged
        );
        Ok(counts)
    }
}
