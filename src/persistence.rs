use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{Entry, Group, Planet, PlanetError, Result, Subscription};

/// Transactional context around the backing store. Mutations made through
/// the registry stay pending until `flush` commits them; `release` discards
/// whatever was not committed and may be called any number of times.
#[async_trait]
pub trait PersistenceUnit: Send + Sync {
    async fn flush(&self) -> Result<()>;

    async fn release(&self);
}

/// The narrow entity interface the registry drives. Cascade rules live in
/// the registry, not here; implementations only move rows.
#[async_trait]
pub trait PlanetStore: PersistenceUnit {
    async fn put_planet(&self, planet: Planet) -> Result<()>;
    async fn get_planet(&self, id: Uuid) -> Result<Option<Planet>>;
    async fn delete_planet(&self, id: Uuid) -> Result<()>;

    async fn put_group(&self, group: Group) -> Result<()>;
    async fn get_group(&self, id: Uuid) -> Result<Option<Group>>;
    async fn list_groups(&self) -> Result<Vec<Group>>;
    async fn delete_group(&self, id: Uuid) -> Result<()>;

    async fn put_subscription(&self, subscription: Subscription) -> Result<()>;
    async fn get_subscription(&self, id: Uuid) -> Result<Option<Subscription>>;
    async fn find_subscription_by_url(&self, feed_url: &str) -> Result<Option<Subscription>>;
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;
    async fn delete_subscription(&self, id: Uuid) -> Result<()>;

    async fn put_entry(&self, entry: Entry) -> Result<()>;
    async fn get_entry_by_guid(&self, subscription_id: Uuid, guid: &str)
        -> Result<Option<Entry>>;
    async fn list_entries(&self, subscription_id: Uuid) -> Result<Vec<Entry>>;
    async fn delete_entry(&self, id: Uuid) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
struct Tables {
    planets: HashMap<Uuid, Planet>,
    groups: HashMap<Uuid, Group>,
    subscriptions: HashMap<Uuid, Subscription>,
    entries: HashMap<Uuid, Entry>,
}

#[derive(Debug, Default)]
struct UnitState {
    committed: Tables,
    working: Tables,
    fail_next_flush: bool,
}

/// In-memory unit-of-work store. Writes land in a working overlay;
/// `flush` promotes the overlay to the committed image and `release`
/// resets the overlay back to it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<UnitState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the next `flush` to fail, to exercise commit-failure handling.
    pub async fn fail_next_flush(&self) {
        self.state.write().await.fail_next_flush = true;
    }

    /// Count of committed entries across all subscriptions.
    pub async fn committed_entry_count(&self) -> usize {
        self.state.read().await.committed.entries.len()
    }
}

#[async_trait]
impl PersistenceUnit for MemoryStore {
    async fn flush(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_next_flush {
            state.fail_next_flush = false;
            return Err(PlanetError::Persistence(
                "commit rejected by backing store".to_string(),
            ));
        }
        state.committed = state.working.clone();
        info!(
            subscriptions = state.committed.subscriptions.len(),
            entries = state.committed.entries.len(),
            "flushed persistence context"
        );
        Ok(())
    }

    async fn release(&self) {
        let mut state = self.state.write().await;
        let discarded = state.working.entries.len() != state.committed.entries.len()
            || state.working.subscriptions.len() != state.committed.subscriptions.len();
        state.working = state.committed.clone();
        if discarded {
            debug!("released persistence context, uncommitted work discarded");
        } else {
            debug!("released persistence context");
        }
    }
}

#[async_trait]
impl PlanetStore for MemoryStore {
    async fn put_planet(&self, planet: Planet) -> Result<()> {
        self.state.write().await.working.planets.insert(planet.id, planet);
        Ok(())
    }

    async fn get_planet(&self, id: Uuid) -> Result<Option<Planet>> {
        Ok(self.state.read().await.working.planets.get(&id).cloned())
    }

    async fn delete_planet(&self, id: Uuid) -> Result<()> {
        self.state.write().await.working.planets.remove(&id);
        Ok(())
    }

    async fn put_group(&self, group: Group) -> Result<()> {
        self.state.write().await.working.groups.insert(group.id, group);
        Ok(())
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<Group>> {
        Ok(self.state.read().await.working.groups.get(&id).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        let state = self.state.read().await;
        let mut groups: Vec<Group> = state.working.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(groups)
    }

    async fn delete_group(&self, id: Uuid) -> Result<()> {
        self.state.write().await.working.groups.remove(&id);
        Ok(())
    }

    async fn put_subscription(&self, subscription: Subscription) -> Result<()> {
        self.state
            .write()
            .await
            .working
            .subscriptions
            .insert(subscription.id, subscription);
        Ok(())
    }

    async fn get_subscription(&self, id: Uuid) -> Result<Option<Subscription>> {
        Ok(self.state.read().await.working.subscriptions.get(&id).cloned())
    }

    async fn find_subscription_by_url(&self, feed_url: &str) -> Result<Option<Subscription>> {
        let state = self.state.read().await;
        Ok(state
            .working
            .subscriptions
            .values()
            .find(|s| s.feed_url == feed_url)
            .cloned())
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let state = self.state.read().await;
        let mut subs: Vec<Subscription> =
            state.working.subscriptions.values().cloned().collect();
        subs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(subs)
    }

    async fn delete_subscription(&self, id: Uuid) -> Result<()> {
        self.state.write().await.working.subscriptions.remove(&id);
        Ok(())
    }

    async fn put_entry(&self, entry: Entry) -> Result<()> {
        self.state.write().await.working.entries.insert(entry.id, entry);
        Ok(())
    }

    async fn get_entry_by_guid(
        &self,
        subscription_id: Uuid,
        guid: &str,
    ) -> Result<Option<Entry>> {
        let state = self.state.read().await;
        Ok(state
            .working
            .entries
            .values()
            .find(|e| e.subscription_id == subscription_id && e.guid == guid)
            .cloned())
    }

    async fn list_entries(&self, subscription_id: Uuid) -> Result<Vec<Entry>> {
        let state = self.state.read().await;
        let mut entries: Vec<Entry> = state
            .working
            .entries
            .values()
            .filter(|e| e.subscription_id == subscription_id)
            .cloned()
            .collect();
        // Newest first; entries without a published date sort last.
        entries.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(entries)
    }

    async fn delete_entry(&self, id: Uuid) -> Result<()> {
        self.state.write().await.working.entries.remove(&id);
        Ok(())
    }
}
