use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::core::error::{CoreError, CoreResult};
use crate::models::{Direction, Match, PairKey, UserId};
use crate::services::{MatchStore, StoreError};

/// Floor for every wait between match checks
pub const MIN_SETTLE_DELAY: Duration = Duration::from_millis(1);

/// Result of a single match check
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched(Match),
    NotYet,
}

impl MatchOutcome {
    pub fn into_match(self) -> Option<Match> {
        match self {
            MatchOutcome::Matched(m) => Some(m),
            MatchOutcome::NotYet => None,
        }
    }
}

/// Backoff schedule for confirming a match after a like.
///
/// The reciprocal state may not be visible yet, so the check is repeated
/// starting at `initial`, doubling up to `max_backoff`, until `deadline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub initial: Duration,
    pub max_backoff: Duration,
    pub deadline: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max_backoff: Duration::from_millis(800),
            deadline: Duration::from_secs(2),
        }
    }
}

impl SettlePolicy {
    pub fn first_delay(&self) -> Duration {
        self.initial.max(MIN_SETTLE_DELAY)
    }

    pub fn next_delay(&self, previous: Duration) -> Duration {
        (previous * 2).min(self.max_backoff).max(MIN_SETTLE_DELAY)
    }
}

/// Turns two reciprocal likes into one canonical match
#[derive(Clone)]
pub struct MatchDetector {
    store: Arc<dyn MatchStore>,
    policy: SettlePolicy,
}

impl MatchDetector {
    pub fn new(store: Arc<dyn MatchStore>, policy: SettlePolicy) -> Self {
        Self { store, policy }
    }

    /// Check once whether `actor` and `target` now form a match.
    ///
    /// Only meaningful after `actor` liked `target`. Creates the canonical
    /// match row when the reciprocal like exists; losing an insert race to
    /// the other participant still yields `Matched`.
    pub async fn try_form_match(&self, actor: UserId, target: UserId) -> CoreResult<MatchOutcome> {
        let pair = PairKey::new(actor, target)
            .ok_or_else(|| CoreError::Validation("cannot match with yourself".to_string()))?;

        if let Some(existing) = self.store.find_match(pair).await? {
            return Ok(MatchOutcome::Matched(existing));
        }

        let reciprocal = self
            .store
            .find_swipe(target, actor, Some(Direction::Like))
            .await?;
        if reciprocal.is_none() {
            return Ok(MatchOutcome::NotYet);
        }

        match self.store.insert_match(pair).await {
            Ok(created) => {
                tracing::info!("Match formed: {} <-> {} ({})", pair.low(), pair.high(), created.id);
                Ok(MatchOutcome::Matched(created))
            }
            Err(StoreError::Conflict(_)) => {
                tracing::debug!("Concurrent match insert for {} / {}", pair.low(), pair.high());
                match self.store.find_match(pair).await? {
                    Some(existing) => Ok(MatchOutcome::Matched(existing)),
                    // Row was removed between the conflict and the re-read
                    None => Ok(MatchOutcome::NotYet),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Poll `try_form_match` with backoff until matched or the deadline passes.
    ///
    /// Not finding a match by the deadline is `NotYet`, not an error.
    pub async fn confirm_match(&self, actor: UserId, target: UserId) -> CoreResult<MatchOutcome> {
        let deadline = Instant::now() + self.policy.deadline;
        let mut delay = self.policy.first_delay();

        loop {
            if let MatchOutcome::Matched(m) = self.try_form_match(actor, target).await? {
                return Ok(MatchOutcome::Matched(m));
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::debug!("No match yet for {} -> {}", actor, target);
                return Ok(MatchOutcome::NotYet);
            }

            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = self.policy.next_delay(delay);
        }
    }
}
