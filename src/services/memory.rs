use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::{broadcast, Mutex, RwLock};
use uuid::Uuid;

use crate::core::feed::filter_candidates;
use crate::models::{
    Direction, Match, MatchId, Message, NewMessage, NewSwipe, PairKey, Profile, Swipe, UserId,
};
use crate::services::store::{MatchStore, MessageStream, StoreError, StoreResult};

const FEED_CAPACITY: usize = 256;

/// Store operations that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetProfile,
    ListProfiles,
    InsertSwipe,
    SwipedIds,
    FindSwipe,
    DeleteSwipe,
    GetMatch,
    FindMatch,
    InsertMatch,
    MatchesFor,
    DeleteMatch,
    InsertMessage,
    Messages,
    LatestMessage,
    DeleteMessages,
}

#[derive(Default)]
struct Tables {
    profiles: HashMap<UserId, Profile>,
    swipes: HashMap<(UserId, UserId), Swipe>,
    matches: HashMap<MatchId, Match>,
    messages: Vec<Message>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Tables {
    /// Server clock; strictly increasing so creation order is total.
    fn now(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }
}

/// In-process store with the same constraints as the persisted schema.
///
/// Used for local development and as the test double for the core. Push
/// notifications go through a broadcast channel and can be switched off to
/// exercise the poll-only path.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    feed: broadcast::Sender<Message>,
    push_enabled: bool,
    faults: Mutex<HashMap<StoreOp, u32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            tables: RwLock::new(Tables::default()),
            feed,
            push_enabled: true,
            faults: Mutex::new(HashMap::new()),
        }
    }

    /// A store whose subscriptions always fail to establish
    pub fn without_push() -> Self {
        Self {
            push_enabled: false,
            ..Self::new()
        }
    }

    /// Make the next `times` calls of `op` fail
    pub async fn fail_next(&self, op: StoreOp, times: u32) {
        *self.faults.lock().await.entry(op).or_insert(0) += times;
    }

    async fn check_fault(&self, op: StoreOp) -> StoreResult<()> {
        let mut faults = self.faults.lock().await;
        match faults.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Injected(format!("{:?}", op)))
            }
            _ => Ok(()),
        }
    }

    /// Store a message stamped `lag` before the server clock without
    /// notifying subscribers, the way a transaction that commits after a
    /// newer message shows up to readers
    pub async fn insert_late_message(
        &self,
        message: &NewMessage,
        lag: Duration,
    ) -> StoreResult<Message> {
        let mut tables = self.tables.write().await;
        if !tables.matches.contains_key(&message.match_id) {
            return Err(StoreError::NotFound(format!("match {}", message.match_id)));
        }
        let stored = Message {
            id: Uuid::new_v4(),
            match_id: message.match_id,
            sender_id: message.sender_id,
            text: message.text.clone(),
            created_at: tables.now() - lag,
        };
        tables.messages.push(stored.clone());
        Ok(stored)
    }

    /// Number of stored swipes, for assertions
    pub async fn swipe_count(&self) -> usize {
        self.tables.read().await.swipes.len()
    }

    /// Number of stored matches, for assertions
    pub async fn match_count(&self) -> usize {
        self.tables.read().await.matches.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn get_profile(&self, id: UserId) -> StoreResult<Option<Profile>> {
        self.check_fault(StoreOp::GetProfile).await?;
        Ok(self.tables.read().await.profiles.get(&id).cloned())
    }

    async fn insert_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        let mut tables = self.tables.write().await;
        if tables.profiles.contains_key(&profile.id) {
            return Err(StoreError::Conflict(format!("profile {} exists", profile.id)));
        }
        let mut stored = profile.clone();
        stored.created_at = tables.now();
        tables.profiles.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .profiles
            .get_mut(&profile.id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", profile.id)))?;
        let created_at = existing.created_at;
        *existing = Profile {
            created_at,
            ..profile.clone()
        };
        Ok(existing.clone())
    }

    async fn list_profiles_excluding(
        &self,
        exclude: &[UserId],
        limit: usize,
    ) -> StoreResult<Vec<Profile>> {
        self.check_fault(StoreOp::ListProfiles).await?;
        let tables = self.tables.read().await;
        Ok(filter_candidates(
            tables.profiles.values().cloned(),
            exclude,
            limit,
        ))
    }

    async fn insert_swipe(&self, swipe: &NewSwipe) -> StoreResult<Swipe> {
        self.check_fault(StoreOp::InsertSwipe).await?;
        let mut tables = self.tables.write().await;
        for id in [swipe.swiper_id, swipe.swiped_id] {
            if !tables.profiles.contains_key(&id) {
                return Err(StoreError::NotFound(format!("profile {}", id)));
            }
        }
        let key = (swipe.swiper_id, swipe.swiped_id);
        if tables.swipes.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "swipe {} -> {} exists",
                swipe.swiper_id, swipe.swiped_id
            )));
        }
        let stored = Swipe {
            id: Uuid::new_v4(),
            swiper_id: swipe.swiper_id,
            swiped_id: swipe.swiped_id,
            direction: swipe.direction,
            created_at: tables.now(),
        };
        tables.swipes.insert(key, stored.clone());
        Ok(stored)
    }

    async fn swiped_ids(&self, swiper: UserId) -> StoreResult<Vec<UserId>> {
        self.check_fault(StoreOp::SwipedIds).await?;
        let tables = self.tables.read().await;
        Ok(tables
            .swipes
            .keys()
            .filter(|(from, _)| *from == swiper)
            .map(|(_, to)| *to)
            .collect())
    }

    async fn find_swipe(
        &self,
        swiper: UserId,
        swiped: UserId,
        direction: Option<Direction>,
    ) -> StoreResult<Option<Swipe>> {
        self.check_fault(StoreOp::FindSwipe).await?;
        let tables = self.tables.read().await;
        Ok(tables
            .swipes
            .get(&(swiper, swiped))
            .filter(|s| direction.map_or(true, |d| s.direction == d))
            .cloned())
    }

    async fn delete_swipe(&self, swiper: UserId, swiped: UserId) -> StoreResult<u64> {
        self.check_fault(StoreOp::DeleteSwipe).await?;
        let mut tables = self.tables.write().await;
        Ok(tables.swipes.remove(&(swiper, swiped)).map_or(0, |_| 1))
    }

    async fn get_match(&self, id: MatchId) -> StoreResult<Option<Match>> {
        self.check_fault(StoreOp::GetMatch).await?;
        Ok(self.tables.read().await.matches.get(&id).cloned())
    }

    async fn find_match(&self, pair: PairKey) -> StoreResult<Option<Match>> {
        self.check_fault(StoreOp::FindMatch).await?;
        let tables = self.tables.read().await;
        Ok(tables.matches.values().find(|m| m.pair() == pair).cloned())
    }

    async fn insert_match(&self, pair: PairKey) -> StoreResult<Match> {
        self.check_fault(StoreOp::InsertMatch).await?;
        let mut tables = self.tables.write().await;
        if tables.matches.values().any(|m| m.pair() == pair) {
            return Err(StoreError::Conflict(format!(
                "match {} / {} exists",
                pair.low(),
                pair.high()
            )));
        }
        let stored = Match {
            id: Uuid::new_v4(),
            user1_id: pair.low(),
            user2_id: pair.high(),
            created_at: tables.now(),
        };
        tables.matches.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn matches_for(&self, user: UserId) -> StoreResult<Vec<Match>> {
        self.check_fault(StoreOp::MatchesFor).await?;
        let tables = self.tables.read().await;
        let mut found: Vec<Match> = tables
            .matches
            .values()
            .filter(|m| m.is_participant(user))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn delete_match(&self, id: MatchId) -> StoreResult<bool> {
        self.check_fault(StoreOp::DeleteMatch).await?;
        let mut tables = self.tables.write().await;
        let removed = tables.matches.remove(&id).is_some();
        if removed {
            // Cascade, mirrors the foreign key on messages.match_id
            tables.messages.retain(|m| m.match_id != id);
        }
        Ok(removed)
    }

    async fn insert_message(&self, message: &NewMessage) -> StoreResult<Message> {
        self.check_fault(StoreOp::InsertMessage).await?;
        let stored = {
            let mut tables = self.tables.write().await;
            if !tables.matches.contains_key(&message.match_id) {
                return Err(StoreError::NotFound(format!("match {}", message.match_id)));
            }
            let stored = Message {
                id: Uuid::new_v4(),
                match_id: message.match_id,
                sender_id: message.sender_id,
                text: message.text.clone(),
                created_at: tables.now(),
            };
            tables.messages.push(stored.clone());
            stored
        };

        if self.push_enabled {
            // No receivers is fine
            let _ = self.feed.send(stored.clone());
        }
        Ok(stored)
    }

    async fn messages(
        &self,
        match_id: MatchId,
        after: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Message>> {
        self.check_fault(StoreOp::Messages).await?;
        let tables = self.tables.read().await;
        let mut found: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.match_id == match_id)
            .filter(|m| after.map_or(true, |t| m.created_at > t))
            .cloned()
            .collect();
        found.sort_by_key(Message::order_key);
        Ok(found)
    }

    async fn latest_message(&self, match_id: MatchId) -> StoreResult<Option<Message>> {
        self.check_fault(StoreOp::LatestMessage).await?;
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.match_id == match_id)
            .max_by_key(|m| m.order_key())
            .cloned())
    }

    async fn delete_messages(&self, match_id: MatchId) -> StoreResult<u64> {
        self.check_fault(StoreOp::DeleteMessages).await?;
        let mut tables = self.tables.write().await;
        let before = tables.messages.len();
        tables.messages.retain(|m| m.match_id != match_id);
        Ok((before - tables.messages.len()) as u64)
    }

    async fn subscribe_messages(&self, match_id: MatchId) -> StoreResult<MessageStream> {
        if !self.push_enabled {
            return Err(StoreError::Unsupported("message subscriptions"));
        }

        let rx = self.feed.subscribe();
        let stream = futures::stream::unfold(rx, move |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(message) if message.match_id == match_id => return Some((message, rx)),
                    Ok(_) => continue,
                    // The poll path covers anything skipped here
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Message feed lagged, skipped {} inserts", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }
}
