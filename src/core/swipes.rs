use std::sync::Arc;

use crate::core::error::{CoreError, CoreResult};
use crate::models::{Direction, NewSwipe, Swipe, UserId};
use crate::services::MatchStore;

/// Persists one like/pass decision per ordered (actor, target) pair
#[derive(Clone)]
pub struct SwipeRecorder {
    store: Arc<dyn MatchStore>,
}

impl SwipeRecorder {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self { store }
    }

    /// Record `actor`'s decision about `target`.
    ///
    /// Does not look for reciprocity. A repeated decision on the same pair
    /// fails with `CoreError::Conflict`, which callers treat as benign.
    pub async fn record_swipe(
        &self,
        actor: UserId,
        target: UserId,
        direction: Direction,
    ) -> CoreResult<Swipe> {
        if actor == target {
            return Err(CoreError::Validation("cannot swipe on yourself".to_string()));
        }

        let swipe = self
            .store
            .insert_swipe(&NewSwipe {
                swiper_id: actor,
                swiped_id: target,
                direction,
            })
            .await?;

        tracing::debug!("Recorded swipe: {} -> {} ({})", actor, target, direction);

        Ok(swipe)
    }
}
