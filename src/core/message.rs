//! Wire and internal event types
//!
//! Clients send [`InboundMessage`] objects; everything the hub delivers is a
//! [`ChatEvent`]. Sender identity and timestamps are always assigned by the
//! server, never taken from the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::user::User;
use crate::storage::traits::{Match, MatchEvent, StoredMessage};

/// Kind tag carried by every event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Chat,
    Join,
    Leave,
    Typing,
    /// Live match update synthesized by the poller
    #[serde(rename = "event")]
    MatchEvent,
    Error,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Chat => "chat",
            MessageKind::Join => "join",
            MessageKind::Leave => "leave",
            MessageKind::Typing => "typing",
            MessageKind::MatchEvent => "event",
            MessageKind::Error => "error",
        }
    }
}

/// Kinds a client is allowed to send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundKind {
    Chat,
    Join,
    Leave,
    Typing,
}

impl From<InboundKind> for MessageKind {
    fn from(kind: InboundKind) -> Self {
        match kind {
            InboundKind::Chat => MessageKind::Chat,
            InboundKind::Join => MessageKind::Join,
            InboundKind::Leave => MessageKind::Leave,
            InboundKind::Typing => MessageKind::Typing,
        }
    }
}

/// Client-to-server frame. Unknown fields such as `user` or `timestamp` are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: InboundKind,
    #[serde(default)]
    pub chat_room: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl InboundMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Event delivered to room members, one JSON object per event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub chat_room: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_state: Option<Match>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<MatchEvent>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ChatEvent {
    fn bare(kind: MessageKind, room: impl Into<String>) -> Self {
        Self {
            kind,
            chat_room: room.into(),
            content: None,
            user: None,
            match_state: None,
            event: None,
            timestamp: Utc::now(),
            error: None,
            data: None,
        }
    }

    /// Stamp an inbound message with its sender and the ingress time
    pub fn from_inbound(message: InboundMessage, sender: &User) -> Self {
        let mut event = Self::bare(message.kind.into(), message.chat_room);
        event.content = message.content;
        event.user = Some(sender.clone());
        event
    }

    pub fn chat(room: impl Into<String>, sender: &User, content: impl Into<String>) -> Self {
        let mut event = Self::bare(MessageKind::Chat, room);
        event.content = Some(content.into());
        event.user = Some(sender.clone());
        event
    }

    pub fn join(room: impl Into<String>, user: &User) -> Self {
        let mut event = Self::bare(MessageKind::Join, room);
        event.user = Some(user.clone());
        event
    }

    pub fn leave(room: impl Into<String>, user: &User) -> Self {
        let mut event = Self::bare(MessageKind::Leave, room);
        event.user = Some(user.clone());
        event
    }

    /// Match snapshot for the room named after the match
    pub fn match_update(state: Match) -> Self {
        let mut event = Self::bare(MessageKind::MatchEvent, state.id.clone());
        event.event = state.events.last().cloned();
        event.match_state = Some(state);
        event
    }

    /// Error reply addressed to a single connection
    pub fn error(room: impl Into<String>, message: impl Into<String>) -> Self {
        let mut event = Self::bare(MessageKind::Error, room);
        event.error = Some(message.into());
        event
    }

    /// Replay of a persisted message, keeping its original timestamp
    pub fn from_stored(message: StoredMessage) -> Self {
        let mut event = Self::bare(MessageKind::Chat, message.chat_room_id);
        event.content = Some(message.content);
        event.user = message.user;
        event.timestamp = message.created_at;
        event
    }

    /// Row handed to the store for a chat event
    pub fn to_stored(&self) -> Option<StoredMessage> {
        if self.kind != MessageKind::Chat {
            return None;
        }
        let user = self.user.as_ref()?;
        Some(StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            chat_room_id: self.chat_room.clone(),
            user_id: user.id.clone(),
            content: self.content.clone().unwrap_or_default(),
            message_type: MessageKind::Chat.as_str().to_string(),
            created_at: self.timestamp,
            user: Some(user.clone()),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
