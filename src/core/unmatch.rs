use std::sync::Arc;

use crate::core::error::{CoreError, CoreResult};
use crate::models::{MatchId, UserId};
use crate::services::MatchStore;

/// What an unmatch removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchReport {
    pub match_id: MatchId,
    pub messages_deleted: u64,
    /// `false` when swipe cleanup failed; the pair reappears in feeds later
    pub swipes_cleared: bool,
}

/// Retires a match: messages, the match row, then both swipes
#[derive(Clone)]
pub struct UnmatchCoordinator {
    store: Arc<dyn MatchStore>,
}

impl UnmatchCoordinator {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self { store }
    }

    /// Dissolve `match_id` on behalf of either participant.
    ///
    /// Message and match deletion are fatal on failure and must be retried
    /// by the caller. Swipe deletion is best-effort and only logged.
    pub async fn unmatch(&self, match_id: MatchId, requester: UserId) -> CoreResult<UnmatchReport> {
        let matched = self
            .store
            .get_match(match_id)
            .await?
            .ok_or_else(|| CoreError::ReferenceGone(format!("match {}", match_id)))?;

        let other = matched.other_participant(requester).ok_or_else(|| {
            CoreError::Validation(format!("user {} is not part of match {}", requester, match_id))
        })?;

        let messages_deleted = self.store.delete_messages(match_id).await.map_err(|e| {
            tracing::error!("Failed to delete messages of match {}: {}", match_id, e);
            CoreError::from(e)
        })?;

        let removed = self.store.delete_match(match_id).await.map_err(|e| {
            tracing::error!(
                "Deleted {} messages but failed to delete match {}: {}",
                messages_deleted,
                match_id,
                e
            );
            CoreError::from(e)
        })?;
        if !removed {
            // Lost a race with the other participant's unmatch
            tracing::debug!("Match {} already deleted", match_id);
        }

        let mut swipes_cleared = true;
        for (swiper, swiped) in [(requester, other), (other, requester)] {
            if let Err(e) = self.store.delete_swipe(swiper, swiped).await {
                tracing::warn!("Failed to delete swipe {} -> {}: {}", swiper, swiped, e);
                swipes_cleared = false;
            }
        }

        tracing::info!(
            "Unmatched {} (requested by {}, {} messages deleted)",
            match_id,
            requester,
            messages_deleted
        );

        Ok(UnmatchReport {
            match_id,
            messages_deleted,
            swipes_cleared,
        })
    }
}
