//! In-memory storage implementation for development and testing
//!
//! Keeps a bounded history per room and a table of matches. Suitable for
//! development, tests, and single-node demos.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::*;
use crate::error::Result;

/// Maximum number of messages kept per room
const DEFAULT_MAX_MESSAGES_PER_ROOM: usize = 500;

/// In-memory store
pub struct MemoryStore {
    room_messages: RwLock<HashMap<String, VecDeque<StoredMessage>>>,
    matches: RwLock<HashMap<String, Match>>,
    max_messages_per_room: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_MESSAGES_PER_ROOM)
    }

    /// Create a store keeping at most `capacity` messages per room
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            room_messages: RwLock::new(HashMap::new()),
            matches: RwLock::new(HashMap::new()),
            max_messages_per_room: capacity.max(1),
        }
    }

    /// Insert or replace a match
    pub async fn upsert_match(&self, game: Match) {
        self.matches.write().await.insert(game.id.clone(), game);
    }

    /// Remove a match, returning it if present
    pub async fn remove_match(&self, match_id: &str) -> Option<Match> {
        self.matches.write().await.remove(match_id)
    }

    /// Number of messages stored for a room
    pub async fn message_count(&self, room_id: &str) -> usize {
        self.room_messages
            .read()
            .await
            .get(room_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_message(&self, message: &StoredMessage) -> Result<()> {
        let mut rooms = self.room_messages.write().await;
        let history = rooms
            .entry(message.chat_room_id.clone())
            .or_insert_with(VecDeque::new);

        // If at capacity, remove the oldest message
        if history.len() >= self.max_messages_per_room {
            history.pop_front();
        }
        history.push_back(message.clone());

        Ok(())
    }

    async fn get_recent_messages(&self, room_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let rooms = self.room_messages.read().await;
        let Some(history) = rooms.get(room_id) else {
            return Ok(Vec::new());
        };

        let skip = history.len().saturating_sub(limit);
        Ok(history.iter().skip(skip).cloned().collect())
    }

    // Every tracked match is part of the feed until it is removed
    async fn get_live_matches(&self) -> Result<Vec<Match>> {
        let matches = self.matches.read().await;
        let mut live: Vec<Match> = matches.values().cloned().collect();
        live.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(live)
    }
}

/// Shared handle to a store
pub type SharedStore = Arc<dyn Store>;
