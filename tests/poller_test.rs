// Tests for the live match poller against an in-memory feed

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use matchroom::core::message::{ChatEvent, MessageKind};
use matchroom::core::poller::{MatchCache, MatchUpdatePoller, PollerSettings};
use matchroom::error::{HubError, Result};
use matchroom::metrics::HubMetrics;
use matchroom::storage::{Match, MatchEvent, MatchStatus, MemoryStore, Store, StoredMessage};

fn settings() -> PollerSettings {
    PollerSettings {
        interval: Duration::from_millis(50),
        fetch_timeout: Duration::from_secs(1),
    }
}

fn new_poller(
    store: Arc<dyn Store>,
    cache: MatchCache,
) -> (MatchUpdatePoller, mpsc::Receiver<ChatEvent>, Arc<HubMetrics>) {
    let (tx, rx) = mpsc::channel(16);
    let metrics = HubMetrics::shared();
    let poller = MatchUpdatePoller::new(store, cache, tx, metrics.clone(), settings());
    (poller, rx, metrics)
}

#[tokio::test]
async fn test_kickoff_yields_exactly_one_update() {
    let store = Arc::new(MemoryStore::new());
    let cache = MatchCache::new();
    let mut game = Match::new("m1", "football", "home", "away", Utc::now());
    store.upsert_match(game.clone()).await;
    cache.update_if_changed(&game);

    let (poller, mut rx, metrics) = new_poller(store.clone(), cache.clone());

    // Unchanged feed produces nothing
    assert_eq!(poller.poll_once().await.unwrap(), 0);
    assert!(rx.try_recv().is_err());

    game.status = MatchStatus::Live;
    store.upsert_match(game.clone()).await;
    assert_eq!(poller.poll_once().await.unwrap(), 1);

    let update = rx.try_recv().unwrap();
    assert_eq!(update.kind, MessageKind::MatchEvent);
    assert_eq!(update.chat_room, "m1");
    assert_eq!(update.match_state.unwrap().status, MatchStatus::Live);

    // Identical poll right after is a no-op
    assert_eq!(poller.poll_once().await.unwrap(), 0);
    assert!(rx.try_recv().is_err());
    assert_eq!(HubMetrics::get(&metrics.match_updates), 1);
    assert_eq!(cache.get("m1").unwrap().status, MatchStatus::Live);
}

#[tokio::test]
async fn test_goal_carries_latest_event() {
    let store = Arc::new(MemoryStore::new());
    let (poller, mut rx, _) = new_poller(store.clone(), MatchCache::new());

    let mut game = Match::new("m7", "football", "home", "away", Utc::now());
    game.status = MatchStatus::Live;
    store.upsert_match(game.clone()).await;
    assert_eq!(poller.poll_once().await.unwrap(), 1);
    rx.try_recv().unwrap();

    game.home_score = 1;
    game.events.push(MatchEvent {
        id: "e1".to_string(),
        match_id: "m7".to_string(),
        event_type: "GOAL".to_string(),
        event_time: 23,
        description: "Header from a corner".to_string(),
        created_at: Utc::now(),
    });
    store.upsert_match(game).await;
    assert_eq!(poller.poll_once().await.unwrap(), 1);

    let update = rx.try_recv().unwrap();
    assert_eq!(update.event.unwrap().event_type, "GOAL");
    assert_eq!(update.match_state.unwrap().home_score, 1);
}

#[tokio::test]
async fn test_finished_match_is_broadcast_once() {
    let store = Arc::new(MemoryStore::new());
    let cache = MatchCache::new();
    let (poller, mut rx, _) = new_poller(store.clone(), cache.clone());

    let mut game = Match::new("m3", "football", "home", "away", Utc::now());
    game.status = MatchStatus::Finished;
    store.upsert_match(game).await;

    assert_eq!(poller.poll_once().await.unwrap(), 1);
    assert_eq!(poller.poll_once().await.unwrap(), 0);
    rx.try_recv().unwrap();
    assert!(rx.try_recv().is_err());
    assert_eq!(cache.get("m3").unwrap().status, MatchStatus::Finished);
}

struct FlakyStore {
    fail: AtomicBool,
    inner: MemoryStore,
}

#[async_trait]
impl Store for FlakyStore {
    async fn create_message(&self, message: &StoredMessage) -> Result<()> {
        self.inner.create_message(message).await
    }

    async fn get_recent_messages(&self, room_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        self.inner.get_recent_messages(room_id, limit).await
    }

    async fn get_live_matches(&self) -> Result<Vec<Match>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HubError::StorageError("feed unavailable".to_string()));
        }
        self.inner.get_live_matches().await
    }
}

#[tokio::test]
async fn test_store_failure_skips_cycle() {
    let store = Arc::new(FlakyStore {
        fail: AtomicBool::new(true),
        inner: MemoryStore::new(),
    });
    store
        .inner
        .upsert_match(Match::new("m1", "football", "home", "away", Utc::now()))
        .await;
    let (poller, mut rx, metrics) = new_poller(store.clone(), MatchCache::new());

    assert!(poller.poll_once().await.is_err());
    assert!(rx.try_recv().is_err());
    assert_eq!(HubMetrics::get(&metrics.poll_failures), 1);

    store.fail.store(false, Ordering::SeqCst);
    assert_eq!(poller.poll_once().await.unwrap(), 1);
}

#[tokio::test]
async fn test_run_stops_when_hub_goes_away() {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_match(Match::new("m1", "football", "home", "away", Utc::now()))
        .await;
    let (poller, mut rx, _) = new_poller(store, MatchCache::new());
    let task = tokio::spawn(poller.run());

    let update = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(update.chat_room, "m1");

    drop(rx);
    timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}
