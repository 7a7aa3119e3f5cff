//! Abstract storage interface consumed by the hub
//!
//! The hub only needs three operations from the persistence layer: write a
//! chat message, read a room's recent history, and list the matches that are
//! currently live. Everything else about storage lives outside this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::user::User;
use crate::error::Result;

/// A persisted chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub chat_room_id: String,
    pub user_id: String,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
    /// Joined author, when the backend resolves it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// Lifecycle of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Cancelled,
}

impl MatchStatus {
    /// No further updates are expected once a match reaches this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Finished | MatchStatus::Cancelled)
    }
}

/// Something that happened during a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub id: String,
    pub match_id: String,
    /// GOAL, YELLOW_CARD, RED_CARD, SUBSTITUTION, PENALTY, KICKOFF, HALFTIME, FULLTIME
    pub event_type: String,
    /// Match minute
    pub event_time: u32,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Externally sourced match state, keyed by the match id which doubles as room id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub sport_id: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub start_time: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_score: u32,
    pub away_score: u32,
    /// Sport specific payload, passed through untouched
    #[serde(default)]
    pub match_data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<MatchEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// Creates a scheduled match with a blank score line
    pub fn new(
        id: impl Into<String>,
        sport_id: impl Into<String>,
        home_team_id: impl Into<String>,
        away_team_id: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            sport_id: sport_id.into(),
            home_team_id: home_team_id.into(),
            away_team_id: away_team_id.into(),
            start_time,
            status: MatchStatus::Scheduled,
            home_score: 0,
            away_score: 0,
            match_data: serde_json::Value::Null,
            events: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `other` differs in a way members care about: either score or the status
    pub fn differs_from(&self, other: &Match) -> bool {
        self.home_score != other.home_score
            || self.away_score != other.away_score
            || self.status != other.status
    }
}

/// Persistence collaborator used for chat history and live match state
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a chat message
    async fn create_message(&self, message: &StoredMessage) -> Result<()>;

    /// Most recent messages of a room, oldest first
    async fn get_recent_messages(&self, room_id: &str, limit: usize) -> Result<Vec<StoredMessage>>;

    /// Every match currently considered live
    async fn get_live_matches(&self) -> Result<Vec<Match>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Match {
        Match::new("m1", "football", "home", "away", Utc::now())
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&MatchStatus::Live).unwrap();
        assert_eq!(json, "\"LIVE\"");
        let status: MatchStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert!(status.is_terminal());
        assert!(!MatchStatus::Scheduled.is_terminal());
    }

    #[test]
    fn test_differs_on_score_or_status_only() {
        let base = sample();

        let mut same = base.clone();
        same.match_data = serde_json::json!({"possession": 61});
        same.updated_at = Utc::now();
        assert!(!base.differs_from(&same));

        let mut scored = base.clone();
        scored.away_score = 1;
        assert!(base.differs_from(&scored));

        let mut kicked_off = base.clone();
        kicked_off.status = MatchStatus::Live;
        assert!(base.differs_from(&kicked_off));
    }
}
