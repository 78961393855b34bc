use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::error::{CoreError, CoreResult};
use crate::models::{Match, MatchId, Message, MessageId, NewMessage, UserId};
use crate::services::{MatchStore, StoreError};

/// Path a message arrived through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Live insert notification
    Push,
    /// Reconciliation fetch
    Poll,
    /// Echo of a message this session just sent
    Local,
}

/// Local, replaceable cache of one match's messages.
///
/// Ordered by `(created_at, id)` and keyed by message id: merging a message
/// that is already present is a no-op. Only poll results advance the
/// watermark, so a push that overtakes an older insert never hides it from
/// the next reconciliation fetch.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
    watermark: Option<DateTime<Utc>>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Lower bound for the next reconciliation fetch, `None` means full history
    pub fn poll_watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// Merge messages from any path; returns the ones that were new, in log order.
    pub fn merge<I>(&mut self, incoming: I, source: Delivery) -> Vec<Message>
    where
        I: IntoIterator<Item = Message>,
    {
        let mut added = Vec::new();

        for message in incoming {
            if source == Delivery::Poll {
                self.watermark = self.watermark.max(Some(message.created_at));
            }
            if !self.ids.insert(message.id) {
                continue;
            }

            let key = message.order_key();
            let at = self.messages.partition_point(|m| m.order_key() < key);
            self.messages.insert(at, message.clone());
            added.push(message);
        }

        added.sort_by_key(Message::order_key);
        added
    }

    /// Replace the whole log with authoritative history
    pub fn replace(&mut self, mut history: Vec<Message>) {
        history.sort_by_key(Message::order_key);
        history.dedup_by_key(|m| m.id);
        self.ids = history.iter().map(|m| m.id).collect();
        self.watermark = history.last().map(|m| m.created_at);
        self.messages = history;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
        self.watermark = None;
    }
}

/// Fired once per merged message from the other participant
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessageEvent {
    pub match_id: MatchId,
    pub message: Message,
}

/// Append-only message log scoped to a match
#[derive(Clone)]
pub struct ConversationStore {
    store: Arc<dyn MatchStore>,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self { store }
    }

    /// Load a match and check that `user` takes part in it
    pub async fn participant_match(&self, match_id: MatchId, user: UserId) -> CoreResult<Match> {
        let found = self
            .store
            .get_match(match_id)
            .await?
            .ok_or_else(|| CoreError::ReferenceGone(format!("match {}", match_id)))?;

        if !found.is_participant(user) {
            return Err(CoreError::Validation(format!(
                "user {} is not part of match {}",
                user, match_id
            )));
        }
        Ok(found)
    }

    /// Append a message to a match and return the stored record
    pub async fn send_message(
        &self,
        match_id: MatchId,
        sender: UserId,
        text: &str,
    ) -> CoreResult<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::Validation("message text is empty".to_string()));
        }

        self.participant_match(match_id, sender)
            .await
            .map_err(|e| match e {
                CoreError::Transient(source) => CoreError::SendFailed(source),
                other => other,
            })?;

        let result = self
            .store
            .insert_message(&NewMessage {
                match_id,
                sender_id: sender,
                text: text.to_string(),
            })
            .await;

        match result {
            Ok(message) => {
                tracing::debug!("Message {} sent in match {}", message.id, match_id);
                Ok(message)
            }
            // Unmatched while the send was in flight
            Err(StoreError::NotFound(msg)) => Err(CoreError::ReferenceGone(msg)),
            Err(e) => {
                tracing::error!("Failed to send message in match {}: {}", match_id, e);
                Err(CoreError::SendFailed(e))
            }
        }
    }

    /// Ordered history visible to `viewer`, strictly after `after` when given
    pub async fn history(
        &self,
        match_id: MatchId,
        viewer: UserId,
        after: Option<DateTime<Utc>>,
    ) -> CoreResult<Vec<Message>> {
        self.participant_match(match_id, viewer).await?;
        Ok(self.store.messages(match_id, after).await?)
    }
}

/// Timing of a conversation session's background delivery
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// How far below the watermark each poll reaches back, so inserts that
    /// commit out of timestamp order are still picked up
    pub poll_lookback: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            poll_timeout: Duration::from_secs(5),
            poll_lookback: Duration::from_secs(2),
        }
    }
}

/// Lower bound for a reconciliation fetch given the log's watermark.
///
/// Returns `None` (full history) when there is no watermark yet or the
/// lookback reaches past the representable range.
pub fn poll_floor(watermark: Option<DateTime<Utc>>, lookback: Duration) -> Option<DateTime<Utc>> {
    let lookback = chrono::Duration::from_std(lookback).ok()?;
    watermark?.checked_sub_signed(lookback)
}

/// One viewer's live view of a match.
///
/// Messages arrive through a best-effort push subscription and a periodic
/// reconciliation poll; both merge into the same `ConversationLog`. The poll
/// alone is enough for complete delivery.
pub struct ConversationSession {
    matched: Match,
    viewer: UserId,
    store: Arc<dyn MatchStore>,
    conversations: ConversationStore,
    log: Arc<Mutex<ConversationLog>>,
    events: mpsc::UnboundedSender<NewMessageEvent>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ConversationSession {
    /// Load history and start the push and poll tasks.
    ///
    /// The receiver yields a `NewMessageEvent` for every message from the
    /// other participant merged after the initial load.
    pub async fn open(
        store: Arc<dyn MatchStore>,
        match_id: MatchId,
        viewer: UserId,
        config: SessionConfig,
    ) -> CoreResult<(Self, mpsc::UnboundedReceiver<NewMessageEvent>)> {
        let conversations = ConversationStore::new(store.clone());
        let matched = conversations.participant_match(match_id, viewer).await?;

        let mut log = ConversationLog::new();
        log.replace(store.messages(match_id, None).await?);
        let log = Arc::new(Mutex::new(log));

        let (events, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let push = tokio::spawn(run_push(
            store.clone(),
            match_id,
            viewer,
            log.clone(),
            events.clone(),
            cancel.clone(),
        ));
        let poll = tokio::spawn(run_poll(
            store.clone(),
            match_id,
            viewer,
            log.clone(),
            events.clone(),
            cancel.clone(),
            config,
        ));

        tracing::info!("Conversation session opened: match {} viewer {}", match_id, viewer);

        Ok((
            Self {
                matched,
                viewer,
                store,
                conversations,
                log,
                events,
                cancel,
                tasks: vec![push, poll],
            },
            rx,
        ))
    }

    pub fn match_info(&self) -> &Match {
        &self.matched
    }

    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    /// Copy of the local log
    pub async fn snapshot(&self) -> Vec<Message> {
        self.log.lock().await.messages().to_vec()
    }

    /// Send as the viewer and merge the stored record locally
    pub async fn send(&self, text: &str) -> CoreResult<Message> {
        let message = self
            .conversations
            .send_message(self.matched.id, self.viewer, text)
            .await?;
        absorb(
            &self.log,
            &self.events,
            self.viewer,
            vec![message.clone()],
            Delivery::Local,
        )
        .await;
        Ok(message)
    }

    /// Merge the store's full history into the local log.
    ///
    /// Messages first seen here notify like any other delivery, and messages
    /// already in the log are never announced twice. Clears the log and fails
    /// with `ReferenceGone` once the match is deleted.
    pub async fn reload(&self) -> CoreResult<Vec<Message>> {
        if self.store.get_match(self.matched.id).await?.is_none() {
            self.log.lock().await.clear();
            return Err(CoreError::ReferenceGone(format!("match {}", self.matched.id)));
        }

        let history = self.store.messages(self.matched.id, None).await?;
        absorb(&self.log, &self.events, self.viewer, history, Delivery::Poll).await;
        Ok(self.snapshot().await)
    }

    /// Stop background delivery and wait for both tasks to finish
    pub async fn close(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!("Conversation task ended abnormally: {}", e);
            }
        }
        tracing::info!("Conversation session closed: match {}", self.matched.id);
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Merge a batch and notify for new messages not sent by the viewer
async fn absorb(
    log: &Mutex<ConversationLog>,
    events: &mpsc::UnboundedSender<NewMessageEvent>,
    viewer: UserId,
    batch: Vec<Message>,
    source: Delivery,
) {
    let added = log.lock().await.merge(batch, source);

    for message in added.into_iter().filter(|m| m.sender_id != viewer) {
        tracing::debug!("New message {} via {:?}", message.id, source);
        // Receiver gone means nobody is listening for notifications
        let _ = events.send(NewMessageEvent {
            match_id: message.match_id,
            message,
        });
    }
}

async fn run_push(
    store: Arc<dyn MatchStore>,
    match_id: MatchId,
    viewer: UserId,
    log: Arc<Mutex<ConversationLog>>,
    events: mpsc::UnboundedSender<NewMessageEvent>,
    cancel: CancellationToken,
) {
    let mut feed = match store.subscribe_messages(match_id).await {
        Ok(feed) => feed,
        Err(e) => {
            tracing::warn!("Push unavailable for match {}, relying on poll: {}", match_id, e);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = feed.next() => match next {
                Some(message) => absorb(&log, &events, viewer, vec![message], Delivery::Push).await,
                None => {
                    tracing::warn!("Push feed ended for match {}", match_id);
                    break;
                }
            },
        }
    }
}

async fn run_poll(
    store: Arc<dyn MatchStore>,
    match_id: MatchId,
    viewer: UserId,
    log: Arc<Mutex<ConversationLog>>,
    events: mpsc::UnboundedSender<NewMessageEvent>,
    cancel: CancellationToken,
    config: SessionConfig,
) {
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // History was just loaded, skip the immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let after = poll_floor(log.lock().await.poll_watermark(), config.poll_lookback);
                match tokio::time::timeout(config.poll_timeout, store.messages(match_id, after)).await {
                    Ok(Ok(batch)) if batch.is_empty() => {}
                    Ok(Ok(batch)) => absorb(&log, &events, viewer, batch, Delivery::Poll).await,
                    Ok(Err(e)) => tracing::warn!("Poll for match {} failed: {}", match_id, e),
                    Err(_) => tracing::warn!("Poll for match {} timed out", match_id),
                }
            }
        }
    }
}
