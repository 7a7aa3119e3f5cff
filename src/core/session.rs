//! Per-connection read and write pumps
//!
//! Each WebSocket is served by two tasks. The read pump decodes client frames,
//! applies the per-connection policy and hands events to the hub. The write
//! pump drains the outbound queue onto the socket and keeps the connection
//! alive with pings.

use futures_util::sink::{Sink, SinkExt};
use futures_util::stream::{Stream, StreamExt};
use log::{debug, info, warn};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use warp::ws::{Message, WebSocket};

use crate::core::connection::{Connection, ConnectionId, OutboundReceiver};
use crate::core::hub::HubHandle;
use crate::core::message::{ChatEvent, InboundMessage};
use crate::metrics::{HubMetrics, SharedMetrics};

const RATE_LIMIT_EXCEEDED: &str = "Rate limit exceeded";
const ROOM_ACCESS_DENIED: &str = "Room access denied";

/// Transport timing for a single connection
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub write_wait: Duration,
    pub pong_wait: Duration,
    pub ping_interval: Duration,
    pub outbound_queue_capacity: usize,
}

/// Serve a registered connection until either side goes away
pub async fn run_session(
    ws: WebSocket,
    connection: Arc<Connection>,
    outbound: OutboundReceiver,
    hub: HubHandle,
    settings: SessionSettings,
    metrics: SharedMetrics,
) {
    let (sink, stream) = ws.split();
    let (stop_tx, stop_rx) = oneshot::channel();

    let writer = tokio::spawn(write_pump(sink, outbound, connection.id, settings, stop_tx));
    read_pump(stream, connection, hub, settings, metrics, stop_rx).await;

    if let Err(e) = writer.await {
        warn!("Write pump task failed: {}", e);
    }
}

/// Read client frames until the transport fails, the peer goes silent for
/// longer than `pong_wait`, or the write pump stops. Always ends by asking
/// the hub to deregister the connection.
pub async fn read_pump<S, E>(
    mut stream: S,
    connection: Arc<Connection>,
    hub: HubHandle,
    settings: SessionSettings,
    metrics: SharedMetrics,
    mut stop: oneshot::Receiver<()>,
) where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = tokio::select! {
            _ = &mut stop => {
                debug!("Write side of {} closed, stopping reader", connection.id);
                break;
            }
            frame = timeout(settings.pong_wait, stream.next()) => frame,
        };

        let message = match frame {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                warn!("WebSocket error on {}: {}", connection.id, e);
                break;
            }
            Ok(None) => break,
            Err(_) => {
                info!("Connection {} missed its read deadline", connection.id);
                break;
            }
        };

        if message.is_close() {
            break;
        }
        // Pings and pongs only refresh the deadline
        let Ok(text) = message.to_str() else {
            continue;
        };

        if !handle_text(text, &connection, &hub, &metrics).await {
            break;
        }
    }

    if hub.unregister(connection.id).await.is_err() {
        // No hub left to close the queue for us
        connection.close();
    }
}

/// Returns false once the hub no longer accepts events
async fn handle_text(
    text: &str,
    connection: &Connection,
    hub: &HubHandle,
    metrics: &HubMetrics,
) -> bool {
    let inbound = match InboundMessage::parse(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!("Failed to parse message from {}: {}", connection.id, e);
            return true;
        }
    };

    if !connection.allow_message() {
        debug!("Connection {} exceeded its message rate", connection.id);
        HubMetrics::incr(&metrics.messages_rate_limited);
        reply_error(connection, &inbound.chat_room, RATE_LIMIT_EXCEEDED);
        return true;
    }

    let event = ChatEvent::from_inbound(inbound, &connection.user);

    if !connection.can_access_room(&event.chat_room) {
        warn!(
            "User {} denied access to room {}",
            connection.user.username, event.chat_room
        );
        HubMetrics::incr(&metrics.access_denied);
        reply_error(connection, &event.chat_room, ROOM_ACCESS_DENIED);
        return true;
    }

    HubMetrics::incr(&metrics.messages_received);
    hub.broadcast(event).await.is_ok()
}

fn reply_error(connection: &Connection, room: &str, message: &str) {
    if let Err(e) = connection.send_event(&ChatEvent::error(room, message)) {
        debug!("Could not deliver error to {}: {}", connection.id, e);
    }
}

/// Drain the outbound queue onto the socket.
///
/// Everything already queued when a payload is taken goes out in the same
/// text frame, separated by newlines. Every write, pings and the final close
/// frame included, must finish within `write_wait`.
pub async fn write_pump<S>(
    mut sink: S,
    mut outbound: OutboundReceiver,
    connection_id: ConnectionId,
    settings: SessionSettings,
    stop: oneshot::Sender<()>,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            payload = outbound.recv() => {
                let Some(first) = payload else {
                    // Hub closed the queue
                    send_with_deadline(&mut sink, Message::close(), settings.write_wait, connection_id).await;
                    break;
                };

                let mut frame = String::from(&*first);
                let queued = outbound.len();
                for _ in 0..queued {
                    match outbound.try_recv() {
                        Ok(next) => {
                            frame.push('\n');
                            frame.push_str(&next);
                        }
                        Err(_) => break,
                    }
                }

                if !send_with_deadline(&mut sink, Message::text(frame), settings.write_wait, connection_id).await {
                    break;
                }
            }
            _ = ping.tick() => {
                if !send_with_deadline(&mut sink, Message::ping(Vec::new()), settings.write_wait, connection_id).await {
                    break;
                }
            }
        }
    }

    let _ = timeout(settings.write_wait, sink.close()).await;
    let _ = stop.send(());
    debug!("Write pump for {} stopped", connection_id);
}

async fn send_with_deadline<S>(
    sink: &mut S,
    message: Message,
    write_wait: Duration,
    connection_id: ConnectionId,
) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match timeout(write_wait, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("Failed to send to {}: {}", connection_id, e);
            false
        }
        Err(_) => {
            warn!("Write deadline exceeded for {}", connection_id);
            false
        }
    }
}
