//! Live match polling
//!
//! Periodically pulls the live match feed from the store, diffs it against the
//! last known snapshot per match and submits changed matches to the hub as
//! `event` broadcasts. The snapshot cache is also read by the hub when it
//! sends initial data to a joining connection.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use crate::core::message::ChatEvent;
use crate::error::{HubError, Result};
use crate::metrics::{HubMetrics, SharedMetrics};
use crate::storage::traits::Match;
use crate::storage::SharedStore;

/// Poller timing
#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub interval: Duration,
    /// Upper bound for a single live match fetch
    pub fetch_timeout: Duration,
}

/// Last known state per match, keyed by match id (which is also the room id)
#[derive(Debug, Clone, Default)]
pub struct MatchCache {
    inner: Arc<RwLock<HashMap<String, Match>>>,
}

impl MatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot for a room, if the poller has seen its match
    pub fn get(&self, match_id: &str) -> Option<Match> {
        match self.inner.read() {
            Ok(guard) => guard.get(match_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(match_id).cloned(),
        }
    }

    /// Store `game` if it is new or differs from the cached entry.
    /// Returns true when the entry changed.
    pub fn update_if_changed(&self, game: &Match) -> bool {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let changed = guard
            .get(&game.id)
            .map_or(true, |cached| cached.differs_from(game));
        if changed {
            guard.insert(game.id.clone(), game.clone());
        }
        changed
    }
}

/// Periodic producer of match update events
pub struct MatchUpdatePoller {
    store: SharedStore,
    cache: MatchCache,
    broadcast: mpsc::Sender<ChatEvent>,
    metrics: SharedMetrics,
    settings: PollerSettings,
}

impl MatchUpdatePoller {
    pub fn new(
        store: SharedStore,
        cache: MatchCache,
        broadcast: mpsc::Sender<ChatEvent>,
        metrics: SharedMetrics,
        settings: PollerSettings,
    ) -> Self {
        Self {
            store,
            cache,
            broadcast,
            metrics,
            settings,
        }
    }

    /// Run a single poll cycle, returning how many updates were submitted.
    ///
    /// Fails with `HubUnavailable` once the hub stopped accepting broadcasts.
    pub async fn poll_once(&self) -> Result<usize> {
        let matches = match timeout(self.settings.fetch_timeout, self.store.get_live_matches()).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                HubMetrics::incr(&self.metrics.poll_failures);
                return Err(e);
            }
            Err(_) => {
                HubMetrics::incr(&self.metrics.poll_failures);
                return Err(HubError::StorageTimeout("get_live_matches"));
            }
        };

        let mut submitted = 0;
        for game in matches {
            if !self.cache.update_if_changed(&game) {
                continue;
            }

            if game.status.is_terminal() {
                info!(
                    "Match {} ended with status {:?} ({}-{})",
                    game.id, game.status, game.home_score, game.away_score
                );
            } else {
                debug!(
                    "Match {} changed: {:?} {}-{}",
                    game.id, game.status, game.home_score, game.away_score
                );
            }

            self.broadcast
                .send(ChatEvent::match_update(game))
                .await
                .map_err(|_| HubError::HubUnavailable)?;
            HubMetrics::incr(&self.metrics.match_updates);
            submitted += 1;
        }

        Ok(submitted)
    }

    /// Poll on a fixed interval until the hub shuts down
    pub async fn run(self) {
        let start = Instant::now() + self.settings.interval;
        let mut ticker = interval_at(start, self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Match update poller started (interval: {:?})",
            self.settings.interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(0) => {}
                        Ok(count) => debug!("Submitted {} match updates", count),
                        Err(HubError::HubUnavailable) => break,
                        Err(e) => warn!("Failed to poll live matches: {}", e),
                    }
                }
                _ = self.broadcast.closed() => break,
            }
        }

        info!("Match update poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::MatchStatus;
    use chrono::Utc;

    #[test]
    fn test_cache_diffs_on_score_and_status() {
        let cache = MatchCache::new();
        let mut game = Match::new("m1", "football", "a", "b", Utc::now());

        assert!(cache.update_if_changed(&game));
        assert!(!cache.update_if_changed(&game));

        game.match_data = serde_json::json!({"corners": 3});
        assert!(!cache.update_if_changed(&game));

        game.status = MatchStatus::Live;
        assert!(cache.update_if_changed(&game));
        game.home_score = 1;
        assert!(cache.update_if_changed(&game));

        assert_eq!(cache.get("m1").unwrap().home_score, 1);
        assert!(cache.get("m2").is_none());
    }
}
