use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::core::conversation::{ConversationSession, ConversationStore, NewMessageEvent, SessionConfig};
use crate::core::error::CoreResult;
use crate::core::feed::CandidateFeed;
use crate::core::matcher::{MatchDetector, SettlePolicy};
use crate::core::profiles::ProfileService;
use crate::core::swipes::SwipeRecorder;
use crate::core::unmatch::{UnmatchCoordinator, UnmatchReport};
use crate::core::unread::{unread_count, UnreadPoller};
use crate::models::{Direction, Match, MatchId, MatchSummary, Message, Profile, UserId};
use crate::services::{MatchStore, ProfileCache};

/// Tunables for the core components
#[derive(Debug, Clone, Copy)]
pub struct MatchmakerConfig {
    pub settle: SettlePolicy,
    pub feed_max_limit: usize,
    pub session: SessionConfig,
    pub unread_poll_interval: Duration,
    pub profile_cache_size: u64,
    pub profile_cache_ttl_secs: u64,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            settle: SettlePolicy::default(),
            feed_max_limit: 100,
            session: SessionConfig::default(),
            unread_poll_interval: Duration::from_secs(10),
            profile_cache_size: 1000,
            profile_cache_ttl_secs: 300,
        }
    }
}

/// Result of a swipe
#[derive(Debug, Clone, PartialEq)]
pub struct SwipeOutcome {
    /// `false` when the pair already had a decision
    pub recorded: bool,
    pub matched: Option<Match>,
}

/// Entry point bundling the matching and chat components over one store
#[derive(Clone)]
pub struct Matchmaker {
    store: Arc<dyn MatchStore>,
    swipes: SwipeRecorder,
    detector: MatchDetector,
    feed: CandidateFeed,
    conversations: ConversationStore,
    unmatcher: UnmatchCoordinator,
    profiles: ProfileService,
    config: MatchmakerConfig,
}

impl Matchmaker {
    pub fn new(store: Arc<dyn MatchStore>, config: MatchmakerConfig) -> Self {
        let cache = ProfileCache::new(
            store.clone(),
            config.profile_cache_size,
            config.profile_cache_ttl_secs,
        );

        Self {
            swipes: SwipeRecorder::new(store.clone()),
            detector: MatchDetector::new(store.clone(), config.settle),
            feed: CandidateFeed::new(store.clone(), config.feed_max_limit),
            conversations: ConversationStore::new(store.clone()),
            unmatcher: UnmatchCoordinator::new(store.clone()),
            profiles: ProfileService::new(store.clone(), cache),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn MatchStore> {
        &self.store
    }

    pub fn profiles(&self) -> &ProfileService {
        &self.profiles
    }

    pub fn config(&self) -> &MatchmakerConfig {
        &self.config
    }

    pub async fn next_candidates(
        &self,
        viewer: UserId,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Profile>> {
        self.feed.next_candidates(viewer, limit).await
    }

    /// Record a decision and, for a like, wait for the match to settle.
    ///
    /// A repeated like re-runs detection, so a swipe whose detection failed
    /// can simply be retried.
    pub async fn swipe(
        &self,
        actor: UserId,
        target: UserId,
        direction: Direction,
    ) -> CoreResult<SwipeOutcome> {
        self.profiles.require_profile(actor).await?;

        let recorded = match self.swipes.record_swipe(actor, target, direction).await {
            Ok(_) => true,
            Err(e) if e.is_benign() => {
                tracing::warn!("Swipe {} -> {} already recorded", actor, target);
                false
            }
            Err(e) => return Err(e),
        };

        let liked = if recorded {
            direction.is_like()
        } else {
            // Go by the stored decision, not the repeated one
            self.store
                .find_swipe(actor, target, Some(Direction::Like))
                .await?
                .is_some()
        };
        if !liked {
            return Ok(SwipeOutcome {
                recorded,
                matched: None,
            });
        }

        let matched = self.detector.confirm_match(actor, target).await?.into_match();
        Ok(SwipeOutcome { recorded, matched })
    }

    /// The viewer's matches, newest first, with the other profile and last message
    pub async fn list_matches(&self, viewer: UserId) -> CoreResult<Vec<MatchSummary>> {
        let matches = self.store.matches_for(viewer).await?;
        let mut summaries = Vec::with_capacity(matches.len());

        for matched in matches {
            let other_profile = match matched.other_participant(viewer) {
                Some(other) => self.profiles.get_profile(other).await?,
                None => None,
            };
            let last_message = self.store.latest_message(matched.id).await?;
            summaries.push(MatchSummary {
                matched,
                other_profile,
                last_message,
            });
        }

        Ok(summaries)
    }

    pub async fn send_message(
        &self,
        match_id: MatchId,
        sender: UserId,
        text: &str,
    ) -> CoreResult<Message> {
        self.conversations.send_message(match_id, sender, text).await
    }

    /// Reconciliation read: full history, or messages strictly after `after`
    pub async fn messages(
        &self,
        match_id: MatchId,
        viewer: UserId,
        after: Option<DateTime<Utc>>,
    ) -> CoreResult<Vec<Message>> {
        self.conversations.history(match_id, viewer, after).await
    }

    pub async fn open_conversation(
        &self,
        match_id: MatchId,
        viewer: UserId,
    ) -> CoreResult<(ConversationSession, mpsc::UnboundedReceiver<NewMessageEvent>)> {
        ConversationSession::open(self.store.clone(), match_id, viewer, self.config.session).await
    }

    pub async fn unmatch(&self, match_id: MatchId, requester: UserId) -> CoreResult<UnmatchReport> {
        self.unmatcher.unmatch(match_id, requester).await
    }

    pub async fn unread_count(&self, viewer: UserId) -> CoreResult<usize> {
        unread_count(self.store.as_ref(), viewer).await
    }

    pub fn watch_unread(&self, viewer: UserId) -> (UnreadPoller, watch::Receiver<usize>) {
        UnreadPoller::spawn(self.store.clone(), viewer, self.config.unread_poll_interval)
    }
}
