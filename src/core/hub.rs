//! Broadcast coordinator
//!
//! A single task owns the connection map and the [`RoomIndex`]. Sessions and
//! the match poller talk to it through a [`HubHandle`]; every register,
//! unregister and broadcast request is processed to completion before the
//! next one, so the index needs no locking.

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::constants::HUB_BROADCAST_CHANNEL_CAPACITY;
use crate::constants::HUB_CONTROL_CHANNEL_CAPACITY;
use crate::core::connection::{Connection, ConnectionId, Payload};
use crate::core::message::{ChatEvent, MessageKind};
use crate::core::persistence::{PersistenceQueue, PersistenceWorker};
use crate::core::poller::MatchCache;
use crate::core::rate_limiter::TokenBucketConfig;
use crate::core::room::RoomIndex;
use crate::error::{HubError, Result};
use crate::metrics::{HubMetrics, SharedMetrics};
use crate::storage::SharedStore;

/// Coordinator tuning
#[derive(Debug, Clone, Copy)]
pub struct HubSettings {
    /// Shared admission limit applied to every room
    pub room_limit: TokenBucketConfig,
    /// Persisted messages replayed per room on connect
    pub history_limit: usize,
    pub fetch_timeout: Duration,
    pub persist_timeout: Duration,
    pub persistence_queue_capacity: usize,
}

/// A connection waiting to be admitted, with the ack sent once it is in its rooms
type Registration = (Arc<Connection>, oneshot::Sender<()>);

/// Cloneable front door to the hub task
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<ConnectionId>,
    broadcast_tx: mpsc::Sender<ChatEvent>,
}

impl HubHandle {
    /// Hand a freshly admitted connection to the hub.
    ///
    /// Returns once the hub has joined it to its rooms, so anything the
    /// caller broadcasts afterwards already counts it as a member.
    pub async fn register(&self, connection: Arc<Connection>) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.register_tx
            .send((connection, ack_tx))
            .await
            .map_err(|_| HubError::HubUnavailable)?;
        ack_rx.await.map_err(|_| HubError::HubUnavailable)
    }

    /// Request deregistration. Repeated requests for the same id are harmless.
    pub async fn unregister(&self, id: ConnectionId) -> Result<()> {
        self.unregister_tx
            .send(id)
            .await
            .map_err(|_| HubError::HubUnavailable)
    }

    /// Submit an event for fan-out, waiting until the hub accepts it
    pub async fn broadcast(&self, event: ChatEvent) -> Result<()> {
        self.broadcast_tx
            .send(event)
            .await
            .map_err(|_| HubError::HubUnavailable)
    }

    /// Broadcast channel for producers that only submit events
    pub fn broadcast_sender(&self) -> mpsc::Sender<ChatEvent> {
        self.broadcast_tx.clone()
    }
}

/// State owned by the coordinator task
pub struct Hub {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    rooms: RoomIndex,
    store: SharedStore,
    match_cache: MatchCache,
    metrics: SharedMetrics,
    settings: HubSettings,
    persistence: PersistenceQueue,
    persistence_worker: Option<PersistenceWorker>,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::Receiver<ConnectionId>,
    broadcast_rx: mpsc::Receiver<ChatEvent>,
    // Weak so that outstanding evictions never keep the hub alive
    evict_tx: mpsc::WeakSender<ConnectionId>,
}

impl Hub {
    pub fn new(
        store: SharedStore,
        match_cache: MatchCache,
        metrics: SharedMetrics,
        settings: HubSettings,
    ) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(HUB_CONTROL_CHANNEL_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::channel(HUB_CONTROL_CHANNEL_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(HUB_BROADCAST_CHANNEL_CAPACITY);

        let (persistence, persistence_worker) = PersistenceQueue::new(
            store.clone(),
            settings.persistence_queue_capacity,
            settings.persist_timeout,
            metrics.clone(),
        );

        let hub = Self {
            connections: HashMap::new(),
            rooms: RoomIndex::new(settings.room_limit),
            store,
            match_cache,
            metrics,
            settings,
            persistence,
            persistence_worker: Some(persistence_worker),
            register_rx,
            unregister_rx,
            broadcast_rx,
            evict_tx: unregister_tx.downgrade(),
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
        };
        (hub, handle)
    }

    /// Process requests until every handle has been dropped
    pub async fn run(mut self) {
        if let Some(worker) = self.persistence_worker.take() {
            tokio::spawn(worker.run());
        }

        info!("Hub started");

        loop {
            tokio::select! {
                Some((connection, ack)) = self.register_rx.recv() => {
                    self.on_connect(connection);
                    let _ = ack.send(());
                }
                Some(id) = self.unregister_rx.recv() => self.on_disconnect(id),
                Some(event) = self.broadcast_rx.recv() => self.on_broadcast(event),
                else => break,
            }
        }

        for connection in self.connections.values() {
            connection.close();
        }
        info!("Hub stopped with {} connections", self.connections.len());
    }

    fn on_connect(&mut self, connection: Arc<Connection>) {
        if self.connections.contains_key(&connection.id) {
            warn!("Connection {} is already registered", connection.id);
            return;
        }

        let rooms: Vec<String> = connection.rooms().cloned().collect();
        self.connections.insert(connection.id, connection.clone());
        for room in &rooms {
            self.rooms.join(connection.id, room);
        }
        self.metrics.connection_opened();
        self.metrics.set_rooms_active(self.rooms.room_count());
        debug_assert!(self.rooms.is_consistent());

        info!(
            "Client connected: {} (user {}, rooms {:?})",
            connection.id, connection.user.username, rooms
        );
        debug!("Current connections: {}", self.connections.len());

        // Join notices skip the room limiter
        for room in &rooms {
            self.fan_out_event(&ChatEvent::join(room.as_str(), &connection.user));
        }

        tokio::spawn(send_initial_data(
            connection,
            rooms,
            self.store.clone(),
            self.match_cache.clone(),
            self.settings.history_limit,
            self.settings.fetch_timeout,
        ));
    }

    fn on_disconnect(&mut self, id: ConnectionId) {
        let Some(connection) = self.connections.remove(&id) else {
            debug!("Connection {} already unregistered", id);
            return;
        };

        connection.close();
        let rooms = self.rooms.leave_all(id);
        self.metrics.connection_closed();
        self.metrics.set_rooms_active(self.rooms.room_count());
        debug_assert!(self.rooms.is_consistent());

        info!(
            "Client disconnected: {} after {:?}",
            id,
            connection.connection_duration()
        );
        debug!("Current connections: {}", self.connections.len());

        for room in &rooms {
            self.fan_out_event(&ChatEvent::leave(room.as_str(), &connection.user));
        }
    }

    fn on_broadcast(&mut self, event: ChatEvent) {
        if event.kind == MessageKind::MatchEvent {
            self.rooms.retain_match_state(&event.chat_room);
            self.metrics.set_rooms_active(self.rooms.room_count());
        }

        match self.rooms.allow(&event.chat_room) {
            Some(true) => {}
            Some(false) => {
                debug!(
                    "Room {} over its rate limit, dropping {} event",
                    event.chat_room,
                    event.kind.as_str()
                );
                HubMetrics::incr(&self.metrics.room_rate_limited);
                return;
            }
            None => {
                debug!(
                    "No room {} for {} event, dropping",
                    event.chat_room,
                    event.kind.as_str()
                );
                return;
            }
        }

        if let Some(stored) = event.to_stored() {
            self.persistence.submit(stored);
        }

        self.fan_out_event(&event);
    }

    fn fan_out_event(&self, event: &ChatEvent) {
        match event.to_json() {
            Ok(json) => self.fan_out(&event.chat_room, Payload::from(json)),
            Err(e) => error!(
                "Failed to serialize {} event for room {}: {}",
                event.kind.as_str(),
                event.chat_room,
                e
            ),
        }
    }

    /// Non-blocking delivery to every member of a room
    fn fan_out(&self, room: &str, payload: Payload) {
        let mut delivered = 0u64;

        for id in self.rooms.members_of(room) {
            let Some(connection) = self.connections.get(id) else {
                continue;
            };
            match connection.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(HubError::QueueFull) => self.evict(connection),
                Err(_) => {}
            }
        }

        HubMetrics::add(&self.metrics.messages_delivered, delivered);
        debug!("Delivered to {} members of room {}", delivered, room);
    }

    /// Schedule deregistration of a slow consumer from outside the loop
    fn evict(&self, connection: &Arc<Connection>) {
        if !connection.mark_evicting() {
            return;
        }

        warn!(
            "Outbound queue full for connection {} (user {}), evicting",
            connection.id, connection.user.username
        );
        HubMetrics::incr(&self.metrics.evictions);

        let id = connection.id;
        let evict_tx = self.evict_tx.clone();
        tokio::spawn(async move {
            if let Some(tx) = evict_tx.upgrade() {
                let _ = tx.send(id).await;
            }
        });
    }
}

/// Replay recent history and the cached match snapshot for each room.
/// A full queue stops the replay for that connection.
async fn send_initial_data(
    connection: Arc<Connection>,
    rooms: Vec<String>,
    store: SharedStore,
    match_cache: MatchCache,
    history_limit: usize,
    fetch_timeout: Duration,
) {
    for room in rooms {
        match timeout(fetch_timeout, store.get_recent_messages(&room, history_limit)).await {
            Ok(Ok(messages)) => {
                for message in messages {
                    if !deliver(&connection, &ChatEvent::from_stored(message)) {
                        return;
                    }
                }
            }
            Ok(Err(e)) => {
                error!("Failed to get recent messages for room {}: {}", room, e);
                continue;
            }
            Err(_) => {
                error!("Timed out fetching recent messages for room {}", room);
                continue;
            }
        }

        if let Some(state) = match_cache.get(&room) {
            if !deliver(&connection, &ChatEvent::match_update(state)) {
                return;
            }
        }
    }
}

/// Returns false once the queue can no longer take events
fn deliver(connection: &Connection, event: &ChatEvent) -> bool {
    match connection.send_event(event) {
        Ok(()) => true,
        Err(HubError::QueueFull) | Err(HubError::ConnectionClosed) => {
            debug!("Stopping initial data for connection {}", connection.id);
            false
        }
        Err(e) => {
            warn!("Skipping initial data event for {}: {}", connection.id, e);
            true
        }
    }
}
