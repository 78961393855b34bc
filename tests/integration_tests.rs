// Integration tests for StudyMatch matching flows

use std::sync::Arc;
use std::time::Duration;

use studymatch::core::{CoreError, Matchmaker, MatchmakerConfig, SessionConfig, SettlePolicy};
use studymatch::models::{Direction, ProfileDraft, UserId};
use studymatch::services::{MatchStore, MemoryStore, StoreOp};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

fn quick_config() -> MatchmakerConfig {
    MatchmakerConfig {
        settle: SettlePolicy {
            initial: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            deadline: Duration::from_millis(200),
        },
        session: SessionConfig {
            poll_interval: Duration::from_millis(25),
            poll_timeout: Duration::from_millis(500),
            ..SessionConfig::default()
        },
        ..MatchmakerConfig::default()
    }
}

fn matchmaker(store: &Arc<MemoryStore>) -> Matchmaker {
    let store: Arc<dyn MatchStore> = store.clone();
    Matchmaker::new(store, quick_config())
}

async fn join(mm: &Matchmaker, name: &str) -> UserId {
    let id = Uuid::new_v4();
    let draft = ProfileDraft {
        name: name.to_string(),
        subjects: vec!["Calculus".to_string()],
        ..Default::default()
    };
    mm.profiles().create_profile(id, &draft).await.unwrap();
    id
}

#[tokio::test]
async fn test_mutual_likes_form_one_match_in_either_order() {
    for first_is_a in [true, false] {
        let store = Arc::new(MemoryStore::new());
        let mm = matchmaker(&store);
        let a = join(&mm, "Ada").await;
        let b = join(&mm, "Bo").await;
        let (first, second) = if first_is_a { (a, b) } else { (b, a) };

        let opening = mm.swipe(first, second, Direction::Like).await.unwrap();
        assert!(opening.recorded);
        assert!(opening.matched.is_none());

        let closing = mm.swipe(second, first, Direction::Like).await.unwrap();
        let matched = closing.matched.expect("reciprocal like should match");

        assert!(matched.is_participant(a) && matched.is_participant(b));
        assert!(matched.user1_id < matched.user2_id);
        assert_eq!(store.match_count().await, 1);
    }
}

#[tokio::test]
async fn test_like_and_pass_never_match() {
    let store = Arc::new(MemoryStore::new());
    let mm = matchmaker(&store);
    let a = join(&mm, "Ada").await;
    let b = join(&mm, "Bo").await;
    let c = join(&mm, "Cy").await;

    mm.swipe(a, b, Direction::Like).await.unwrap();
    let outcome = mm.swipe(b, a, Direction::Pass).await.unwrap();
    assert!(outcome.matched.is_none());

    mm.swipe(c, a, Direction::Pass).await.unwrap();
    let outcome = mm.swipe(a, c, Direction::Like).await.unwrap();
    assert!(outcome.matched.is_none());

    assert_eq!(store.match_count().await, 0);
    assert!(mm.list_matches(a).await.unwrap().is_empty());

    // Neither side sees the other again
    let a_feed = mm.next_candidates(a, None).await.unwrap();
    let b_feed = mm.next_candidates(b, None).await.unwrap();
    assert!(a_feed.iter().all(|p| p.id != b));
    assert!(b_feed.iter().all(|p| p.id != a));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_likes_share_one_match() {
    let store = Arc::new(MemoryStore::new());
    let mm = matchmaker(&store);
    let a = join(&mm, "Ada").await;
    let b = join(&mm, "Bo").await;

    let (left, right) = tokio::join!(
        mm.swipe(a, b, Direction::Like),
        mm.swipe(b, a, Direction::Like)
    );
    let left = assert_ok!(left);
    let right = assert_ok!(right);

    assert_eq!(store.match_count().await, 1);
    let left = left.matched.expect("both sides settle on the match");
    let right = right.matched.expect("both sides settle on the match");
    assert_eq!(left.id, right.id);
}

#[tokio::test]
async fn test_repeated_swipe_is_benign() {
    let store = Arc::new(MemoryStore::new());
    let mm = matchmaker(&store);
    let a = join(&mm, "Ada").await;
    let b = join(&mm, "Bo").await;

    mm.swipe(a, b, Direction::Pass).await.unwrap();
    let again = assert_ok!(mm.swipe(a, b, Direction::Like).await);

    assert!(!again.recorded);
    assert!(again.matched.is_none());
    assert_eq!(store.swipe_count().await, 1);
}

#[tokio::test]
async fn test_retry_after_failed_detection_matches() {
    let store = Arc::new(MemoryStore::new());
    let mm = matchmaker(&store);
    let a = join(&mm, "Ada").await;
    let b = join(&mm, "Bo").await;
    mm.swipe(a, b, Direction::Like).await.unwrap();

    store.fail_next(StoreOp::FindMatch, 1).await;
    let err = assert_err!(mm.swipe(b, a, Direction::Like).await);
    assert!(matches!(err, CoreError::Transient(_)));

    let retry = mm.swipe(b, a, Direction::Like).await.unwrap();
    assert!(!retry.recorded);
    assert!(retry.matched.is_some());
}

#[tokio::test]
async fn test_swipe_requires_profile() {
    let store = Arc::new(MemoryStore::new());
    let mm = matchmaker(&store);
    let b = join(&mm, "Bo").await;

    let err = mm.swipe(Uuid::new_v4(), b, Direction::Like).await.unwrap_err();

    assert!(matches!(err, CoreError::ReferenceGone(_)));
    assert_eq!(store.swipe_count().await, 0);
}

#[tokio::test]
async fn test_feed_excludes_self_and_swiped() {
    let store = Arc::new(MemoryStore::new());
    let mm = matchmaker(&store);
    let me = join(&mm, "Me").await;
    let liked = join(&mm, "Liked").await;
    let passed = join(&mm, "Passed").await;
    let fresh = join(&mm, "Fresh").await;

    mm.swipe(me, liked, Direction::Like).await.unwrap();
    mm.swipe(me, passed, Direction::Pass).await.unwrap();

    let feed = mm.next_candidates(me, None).await.unwrap();
    let ids: Vec<UserId> = feed.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![fresh]);

    mm.swipe(me, fresh, Direction::Pass).await.unwrap();
    assert!(mm.next_candidates(me, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_feed_is_newest_first_and_capped() {
    let store = Arc::new(MemoryStore::new());
    let mm = matchmaker(&store);
    let me = join(&mm, "Me").await;
    let mut others = Vec::new();
    for i in 0..5 {
        others.push(join(&mm, &format!("User {}", i)).await);
    }

    let page = mm.next_candidates(me, Some(3)).await.unwrap();

    let ids: Vec<UserId> = page.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![others[4], others[3], others[2]]);
    assert!(mm.next_candidates(me, Some(0)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unmatch_tears_down_and_restores_feed() {
    let store = Arc::new(MemoryStore::new());
    let mm = matchmaker(&store);
    let a = join(&mm, "Ada").await;
    let b = join(&mm, "Bo").await;
    mm.swipe(a, b, Direction::Like).await.unwrap();
    let matched = mm
        .swipe(b, a, Direction::Like)
        .await
        .unwrap()
        .matched
        .unwrap();
    mm.send_message(matched.id, a, "hi").await.unwrap();
    mm.send_message(matched.id, b, "hey").await.unwrap();

    let report = mm.unmatch(matched.id, b).await.unwrap();

    assert_eq!(report.messages_deleted, 2);
    assert!(report.swipes_cleared);
    assert_eq!(store.match_count().await, 0);
    assert_eq!(store.swipe_count().await, 0);
    assert!(store.messages(matched.id, None).await.unwrap().is_empty());

    let err = mm.send_message(matched.id, a, "still there?").await.unwrap_err();
    assert!(matches!(err, CoreError::ReferenceGone(_)));

    // Both users can meet again
    let a_feed: Vec<UserId> = mm.next_candidates(a, None).await.unwrap().iter().map(|p| p.id).collect();
    let b_feed: Vec<UserId> = mm.next_candidates(b, None).await.unwrap().iter().map(|p| p.id).collect();
    assert_eq!(a_feed, vec![b]);
    assert_eq!(b_feed, vec![a]);

    mm.swipe(a, b, Direction::Like).await.unwrap();
    let rematch = mm.swipe(b, a, Direction::Like).await.unwrap();
    assert!(rematch.matched.is_some());
}

#[tokio::test]
async fn test_unmatch_survives_swipe_cleanup_failure() {
    let store = Arc::new(MemoryStore::new());
    let mm = matchmaker(&store);
    let a = join(&mm, "Ada").await;
    let b = join(&mm, "Bo").await;
    mm.swipe(a, b, Direction::Like).await.unwrap();
    let matched = mm
        .swipe(b, a, Direction::Like)
        .await
        .unwrap()
        .matched
        .unwrap();

    store.fail_next(StoreOp::DeleteSwipe, 1).await;
    let report = mm.unmatch(matched.id, a).await.unwrap();

    assert!(!report.swipes_cleared);
    assert_eq!(store.match_count().await, 0);
    assert!(mm.list_matches(a).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unmatch_by_outsider_rejected() {
    let store = Arc::new(MemoryStore::new());
    let mm = matchmaker(&store);
    let a = join(&mm, "Ada").await;
    let b = join(&mm, "Bo").await;
    let eve = join(&mm, "Eve").await;
    mm.swipe(a, b, Direction::Like).await.unwrap();
    let matched = mm
        .swipe(b, a, Direction::Like)
        .await
        .unwrap()
        .matched
        .unwrap();

    let err = mm.unmatch(matched.id, eve).await.unwrap_err();

    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(store.match_count().await, 1);
}

#[tokio::test]
async fn test_match_list_carries_profile_and_last_message() {
    let store = Arc::new(MemoryStore::new());
    let mm = matchmaker(&store);
    let a = join(&mm, "Ada").await;
    let b = join(&mm, "Bo").await;
    let c = join(&mm, "Cy").await;
    for other in [b, c] {
        mm.swipe(a, other, Direction::Like).await.unwrap();
        mm.swipe(other, a, Direction::Like).await.unwrap();
    }
    let summaries = mm.list_matches(a).await.unwrap();
    assert_eq!(summaries.len(), 2);
    // Newest first
    assert_eq!(summaries[0].other_profile.as_ref().unwrap().id, c);

    mm.send_message(summaries[1].matched.id, b, "hello").await.unwrap();
    let summaries = mm.list_matches(a).await.unwrap();
    let with_b = summaries
        .iter()
        .find(|s| s.matched.is_participant(b))
        .unwrap();
    assert_eq!(with_b.last_message.as_ref().unwrap().text, "hello");
    assert_eq!(mm.unread_count(a).await.unwrap(), 1);
    assert_eq!(mm.unread_count(b).await.unwrap(), 0);
}
