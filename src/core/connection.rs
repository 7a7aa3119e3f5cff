//! WebSocket connection state shared between the hub and the pumps
//!
//! A [`Connection`] is created by the accept path with the rooms granted at
//! admission. The hub owns it while registered; the read and write pumps only
//! hold `Arc` references.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::user::User;
use crate::core::message::ChatEvent;
use crate::core::rate_limiter::{RateLimiter, TokenBucketConfig};
use crate::error::{HubError, Result};

/// Stable identity of one transport session
pub type ConnectionId = Uuid;

/// Serialized event ready for the transport
pub type Payload = Arc<str>;

/// Receiving half of a connection's outbound queue, drained by the write pump
pub type OutboundReceiver = mpsc::Receiver<Payload>;

/// Bounded outbound queue that can be closed from the producer side.
///
/// Once closed no producer can enqueue again, and the write pump sees the end
/// of the queue after draining what is already buffered.
#[derive(Debug)]
pub struct OutboundQueue {
    sender: Mutex<Option<mpsc::Sender<Payload>>>,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Non-blocking enqueue
    pub fn try_send(&self, payload: Payload) -> Result<()> {
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(sender) = guard.as_ref() else {
            return Err(HubError::ConnectionClosed);
        };
        sender.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => HubError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => HubError::ConnectionClosed,
        })
    }

    /// Drop the producer side. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        let mut guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        match self.sender.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

/// Represents the state of a single WebSocket connection
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub user: User,
    /// Rooms granted at admission, fixed for the lifetime of the connection
    rooms: HashSet<String>,
    queue: OutboundQueue,
    /// Defends the hub against a single abusive sender
    limiter: RateLimiter,
    evicting: AtomicBool,
    pub connected_at: Instant,
}

impl Connection {
    /// Create a new connection with a unique ID
    pub fn new(
        user: User,
        rooms: impl IntoIterator<Item = String>,
        queue_capacity: usize,
        limits: TokenBucketConfig,
    ) -> (Arc<Self>, OutboundReceiver) {
        let (queue, rx) = OutboundQueue::new(queue_capacity);
        let connection = Self {
            id: Uuid::new_v4(),
            user,
            rooms: rooms.into_iter().collect(),
            queue,
            limiter: RateLimiter::new(limits),
            evicting: AtomicBool::new(false),
            connected_at: Instant::now(),
        };
        (Arc::new(connection), rx)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &String> {
        self.rooms.iter()
    }

    /// Check whether the connection was admitted to a room
    pub fn can_access_room(&self, room: &str) -> bool {
        self.rooms.contains(room)
    }

    /// Per-connection admission control for inbound messages
    pub fn allow_message(&self) -> bool {
        self.limiter.allow()
    }

    /// Enqueue an already serialized payload without waiting
    pub fn try_send(&self, payload: Payload) -> Result<()> {
        self.queue.try_send(payload)
    }

    /// Serialize and enqueue a single event
    pub fn send_event(&self, event: &ChatEvent) -> Result<()> {
        let payload: Payload = event.to_json()?.into();
        self.try_send(payload)
    }

    /// Close the outbound queue so the write pump flushes and stops
    pub fn close(&self) -> bool {
        self.queue.close()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Flag the connection for eviction. Returns true only for the first caller.
    pub fn mark_evicting(&self) -> bool {
        !self.evicting.swap(true, Ordering::AcqRel)
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> TokenBucketConfig {
        TokenBucketConfig::new(10.0, 10)
    }

    #[test]
    fn test_room_access_is_fixed_at_admission() {
        let (conn, _rx) = Connection::new(
            User::new("u1", "alice"),
            vec!["m1".to_string()],
            4,
            limits(),
        );
        assert!(conn.can_access_room("m1"));
        assert!(!conn.can_access_room("m2"));
    }

    #[tokio::test]
    async fn test_queue_full_then_closed() {
        let (conn, mut rx) = Connection::new(User::new("u1", "alice"), Vec::new(), 1, limits());

        assert!(conn.try_send("a".into()).is_ok());
        assert!(matches!(conn.try_send("b".into()), Err(HubError::QueueFull)));

        assert!(conn.close());
        assert!(!conn.close());
        assert!(matches!(
            conn.try_send("c".into()),
            Err(HubError::ConnectionClosed)
        ));

        // Buffered payload is still drained before the end of the queue
        assert_eq!(rx.recv().await.as_deref(), Some("a"));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_eviction_flag_is_set_once() {
        let (conn, _rx) = Connection::new(User::new("u1", "alice"), Vec::new(), 1, limits());
        assert!(conn.mark_evicting());
        assert!(!conn.mark_evicting());
    }
}
