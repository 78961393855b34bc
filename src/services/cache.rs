use std::sync::Arc;
use std::time::Duration;

use crate::models::{Profile, UserId};
use crate::services::store::{MatchStore, StoreResult};

/// Read-through TTL cache for profiles.
///
/// Profiles change rarely and are read once per match on the matches
/// screen, so lookups go through a bounded in-memory cache in front of
/// the store. Misses are not cached.
#[derive(Clone)]
pub struct ProfileCache {
    store: Arc<dyn MatchStore>,
    profiles: moka::future::Cache<UserId, Profile>,
}

impl ProfileCache {
    pub fn new(store: Arc<dyn MatchStore>, capacity: u64, ttl_secs: u64) -> Self {
        let profiles = moka::future::CacheBuilder::new(capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { store, profiles }
    }

    /// Get a profile (cache first, then the store)
    pub async fn get(&self, id: UserId) -> StoreResult<Option<Profile>> {
        if let Some(profile) = self.profiles.get(&id).await {
            tracing::trace!("Profile cache hit: {}", id);
            return Ok(Some(profile));
        }

        let found = self.store.get_profile(id).await?;
        if let Some(profile) = &found {
            self.profiles.insert(id, profile.clone()).await;
        }
        Ok(found)
    }

    /// Drop a cached profile after its owner edited it
    pub async fn invalidate(&self, id: UserId) {
        self.profiles.invalidate(&id).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.profiles.entry_count()
    }
}
