use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use thiserror::Error;

use crate::models::{
    Direction, Match, MatchId, Message, NewMessage, NewSwipe, PairKey, Profile, Swipe, UserId,
};

/// Errors that can occur when talking to the backing store
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The row, or a row it references, does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    /// Injected by `MemoryStore` fault plans
    #[error("Injected failure: {0}")]
    Injected(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Live feed of messages inserted into one match
pub type MessageStream = BoxStream<'static, Message>;

/// Remote structured-data collaborator: profiles, swipes, matches and messages.
///
/// Implementations must enforce the persisted schema's constraints:
/// one swipe per ordered pair, one match per canonical pair and messages
/// only for existing matches.
#[async_trait]
pub trait MatchStore: Send + Sync {
    // --- Profiles ---
    async fn get_profile(&self, id: UserId) -> StoreResult<Option<Profile>>;

    /// Insert a new profile, `Conflict` if the id is taken.
    async fn insert_profile(&self, profile: &Profile) -> StoreResult<Profile>;

    /// Replace the mutable fields of an existing profile, `NotFound` if absent.
    async fn update_profile(&self, profile: &Profile) -> StoreResult<Profile>;

    /// Profiles whose id is not in `exclude`, newest first, at most `limit`.
    async fn list_profiles_excluding(
        &self,
        exclude: &[UserId],
        limit: usize,
    ) -> StoreResult<Vec<Profile>>;

    // --- Swipes ---
    /// `Conflict` on a duplicate ordered pair, `NotFound` if a profile is missing.
    async fn insert_swipe(&self, swipe: &NewSwipe) -> StoreResult<Swipe>;

    async fn swiped_ids(&self, swiper: UserId) -> StoreResult<Vec<UserId>>;

    async fn find_swipe(
        &self,
        swiper: UserId,
        swiped: UserId,
        direction: Option<Direction>,
    ) -> StoreResult<Option<Swipe>>;

    /// Delete the swipe of `swiper` about `swiped`, returns rows removed.
    async fn delete_swipe(&self, swiper: UserId, swiped: UserId) -> StoreResult<u64>;

    // --- Matches ---
    async fn get_match(&self, id: MatchId) -> StoreResult<Option<Match>>;

    async fn find_match(&self, pair: PairKey) -> StoreResult<Option<Match>>;

    /// `Conflict` when the canonical pair already has a row.
    async fn insert_match(&self, pair: PairKey) -> StoreResult<Match>;

    /// Matches `user` participates in, newest first.
    async fn matches_for(&self, user: UserId) -> StoreResult<Vec<Match>>;

    async fn delete_match(&self, id: MatchId) -> StoreResult<bool>;

    // --- Messages ---
    /// `NotFound` when the match no longer exists.
    async fn insert_message(&self, message: &NewMessage) -> StoreResult<Message>;

    /// Messages of a match in ascending creation order, strictly after `after` when given.
    async fn messages(
        &self,
        match_id: MatchId,
        after: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Message>>;

    async fn latest_message(&self, match_id: MatchId) -> StoreResult<Option<Message>>;

    async fn delete_messages(&self, match_id: MatchId) -> StoreResult<u64>;

    // --- Realtime ---
    /// Best-effort insert notifications for one match.
    async fn subscribe_messages(&self, _match_id: MatchId) -> StoreResult<MessageStream> {
        Err(StoreError::Unsupported("message subscriptions"))
    }

    /// Cheap liveness check
    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }
}
