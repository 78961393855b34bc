use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::error::CoreResult;
use crate::models::UserId;
use crate::services::MatchStore;

/// Number of the viewer's matches whose latest message came from the other side
pub async fn unread_count(store: &dyn MatchStore, viewer: UserId) -> CoreResult<usize> {
    let mut unread = 0;
    for m in store.matches_for(viewer).await? {
        if let Some(latest) = store.latest_message(m.id).await? {
            if latest.sender_id != viewer {
                unread += 1;
            }
        }
    }
    Ok(unread)
}

/// Background refresh of the unread badge.
///
/// Polling ends on `stop`, when the poller is dropped, or once every
/// receiver of the badge is gone.
pub struct UnreadPoller {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl UnreadPoller {
    /// Start polling every `interval`; the first count is taken immediately.
    ///
    /// A failed cycle is logged and the previous value is kept.
    pub fn spawn(
        store: Arc<dyn MatchStore>,
        viewer: UserId,
        interval: Duration,
    ) -> (Self, watch::Receiver<usize>) {
        let (tx, rx) = watch::channel(0);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tx.closed() => break,
                    _ = ticker.tick() => match unread_count(store.as_ref(), viewer).await {
                        Ok(count) => {
                            tx.send_if_modified(|current| {
                                let changed = *current != count;
                                *current = count;
                                changed
                            });
                        }
                        Err(e) => tracing::warn!("Unread count for {} failed: {}", viewer, e),
                    },
                }
            }
        });

        (
            Self {
                cancel,
                task: Some(task),
            },
            rx,
        )
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Stop polling and wait for the task to exit
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Unread poller ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for UnreadPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
