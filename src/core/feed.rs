use std::collections::HashSet;
use std::sync::Arc;

use crate::core::error::CoreResult;
use crate::models::{Profile, UserId};
use crate::services::MatchStore;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Profiles not in `exclude`, newest first, capped at `limit`.
///
/// Shared by store adapters that filter client-side.
pub fn filter_candidates<I>(profiles: I, exclude: &[UserId], limit: usize) -> Vec<Profile>
where
    I: IntoIterator<Item = Profile>,
{
    let excluded: HashSet<&UserId> = exclude.iter().collect();
    let mut candidates: Vec<Profile> = profiles
        .into_iter()
        .filter(|p| !excluded.contains(&p.id))
        .collect();

    candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    candidates.truncate(limit);
    candidates
}

/// Pages of profiles the viewer has not decided on yet
#[derive(Clone)]
pub struct CandidateFeed {
    store: Arc<dyn MatchStore>,
    max_limit: usize,
}

impl CandidateFeed {
    pub fn new(store: Arc<dyn MatchStore>, max_limit: usize) -> Self {
        Self { store, max_limit }
    }

    /// The viewer's own id plus everyone they swiped on, in either direction
    pub async fn exclusion_set(&self, viewer: UserId) -> CoreResult<Vec<UserId>> {
        let mut exclude = self.store.swiped_ids(viewer).await?;
        exclude.push(viewer);
        Ok(exclude)
    }

    /// Next page for `viewer`. An empty page means no more candidates.
    pub async fn next_candidates(
        &self,
        viewer: UserId,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Profile>> {
        let exclude = self.exclusion_set(viewer).await?;
        self.candidates_excluding(&exclude, limit).await
    }

    /// Page of profiles outside an explicit exclusion set
    pub async fn candidates_excluding(
        &self,
        exclude: &[UserId],
        limit: Option<usize>,
    ) -> CoreResult<Vec<Profile>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).min(self.max_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let profiles = self.store.list_profiles_excluding(exclude, limit).await?;

        tracing::debug!(
            "Candidate page: {} profiles ({} excluded)",
            profiles.len(),
            exclude.len()
        );

        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, NewSwipe};
    use crate::services::{MemoryStore, StoreOp};
    use crate::testing::seed_profile;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn profile_at(minutes_ago: i64) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            name: format!("User {}", minutes_ago),
            school: None,
            major: None,
            bio: None,
            photo_url: None,
            subjects: vec![],
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_filter_orders_newest_first() {
        let old = profile_at(30);
        let new = profile_at(1);
        let mid = profile_at(10);

        let page = filter_candidates(vec![old.clone(), new.clone(), mid.clone()], &[], 10);

        let ids: Vec<_> = page.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![new.id, mid.id, old.id]);
    }

    #[test]
    fn test_filter_applies_exclusions_and_limit() {
        let profiles: Vec<Profile> = (0..10).map(profile_at).collect();
        let excluded = profiles[0].id;

        let page = filter_candidates(profiles, &[excluded], 3);

        assert_eq!(page.len(), 3);
        assert!(page.iter().all(|p| p.id != excluded));
    }

    #[tokio::test]
    async fn test_feed_hides_self_and_swiped() {
        let store = Arc::new(MemoryStore::new());
        let feed = CandidateFeed::new(store.clone(), 100);
        let a = seed_profile(&store, "Ada").await;
        let b = seed_profile(&store, "Bo").await;
        let c = seed_profile(&store, "Cy").await;
        store
            .insert_swipe(&NewSwipe {
                swiper_id: a,
                swiped_id: b,
                direction: Direction::Pass,
            })
            .await
            .unwrap();

        let page = feed.next_candidates(a, None).await.unwrap();

        let ids: Vec<_> = page.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![c]);
    }

    #[tokio::test]
    async fn test_empty_feed_is_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let feed = CandidateFeed::new(store.clone(), 100);
        let a = seed_profile(&store, "Ada").await;

        assert!(feed.next_candidates(a, Some(5)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_limit_is_capped() {
        let store = Arc::new(MemoryStore::new());
        let feed = CandidateFeed::new(store.clone(), 2);
        let viewer = seed_profile(&store, "Viewer").await;
        for i in 0..5 {
            seed_profile(&store, &format!("P{}", i)).await;
        }

        let page = feed.next_candidates(viewer, Some(50)).await.unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_distinct_from_empty() {
        let store = Arc::new(MemoryStore::new());
        let feed = CandidateFeed::new(store.clone(), 100);
        let a = seed_profile(&store, "Ada").await;
        store.fail_next(StoreOp::ListProfiles, 1).await;

        assert!(feed.next_candidates(a, None).await.is_err());
    }
}
