//! Hub metrics and Prometheus text export
//!
//! Counters are plain atomics so the hub loop can record them without
//! awaiting. A snapshot is turned into [`Metric`] values on export.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Metric value types
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
}

/// A single metric data point
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub name: &'static str,
    pub value: MetricValue,
    pub help: &'static str,
}

impl Metric {
    fn counter(name: &'static str, help: &'static str, value: &AtomicU64) -> Self {
        Self {
            name,
            value: MetricValue::Counter(value.load(Ordering::Relaxed)),
            help,
        }
    }

    fn gauge(name: &'static str, help: &'static str, value: f64) -> Self {
        Self {
            name,
            value: MetricValue::Gauge(value),
            help,
        }
    }
}

/// Counters shared by the hub, the sessions, the poller and the persistence worker
#[derive(Debug)]
pub struct HubMetrics {
    started_at: Instant,
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub rooms_active: AtomicU64,
    pub messages_received: AtomicU64,
    pub messages_delivered: AtomicU64,
    pub messages_rate_limited: AtomicU64,
    pub room_rate_limited: AtomicU64,
    pub access_denied: AtomicU64,
    pub evictions: AtomicU64,
    pub persist_failures: AtomicU64,
    pub persist_dropped: AtomicU64,
    pub match_updates: AtomicU64,
    pub poll_failures: AtomicU64,
}

pub type SharedMetrics = Arc<HubMetrics>;

impl HubMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            rooms_active: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            messages_rate_limited: AtomicU64::new(0),
            room_rate_limited: AtomicU64::new(0),
            access_denied: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            persist_dropped: AtomicU64::new(0),
            match_updates: AtomicU64::new(0),
            poll_failures: AtomicU64::new(0),
        }
    }

    pub fn shared() -> SharedMetrics {
        Arc::new(Self::new())
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        Self::incr(&self.connections_total);
        Self::incr(&self.connections_active);
    }

    pub fn connection_closed(&self) {
        // Saturating so a stray double close never wraps the gauge
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn set_rooms_active(&self, count: usize) {
        self.rooms_active.store(count as u64, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> u64 {
        self.connections_active.load(Ordering::Relaxed)
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Current values of every metric
    pub fn snapshot(&self) -> Vec<Metric> {
        vec![
            Metric::counter(
                "matchroom_connections_total",
                "WebSocket connections accepted",
                &self.connections_total,
            ),
            Metric::gauge(
                "matchroom_connections_active",
                "Currently registered connections",
                Self::get(&self.connections_active) as f64,
            ),
            Metric::gauge(
                "matchroom_rooms_active",
                "Rooms with members or cached match state",
                Self::get(&self.rooms_active) as f64,
            ),
            Metric::counter(
                "matchroom_messages_received_total",
                "Inbound client messages accepted by the read pump",
                &self.messages_received,
            ),
            Metric::counter(
                "matchroom_messages_delivered_total",
                "Events enqueued to member connections",
                &self.messages_delivered,
            ),
            Metric::counter(
                "matchroom_messages_rate_limited_total",
                "Inbound messages rejected by the per-connection limiter",
                &self.messages_rate_limited,
            ),
            Metric::counter(
                "matchroom_room_rate_limited_total",
                "Broadcasts dropped by the per-room limiter",
                &self.room_rate_limited,
            ),
            Metric::counter(
                "matchroom_access_denied_total",
                "Messages addressed to rooms outside the admission set",
                &self.access_denied,
            ),
            Metric::counter(
                "matchroom_evictions_total",
                "Connections evicted for a full outbound queue",
                &self.evictions,
            ),
            Metric::counter(
                "matchroom_persist_failures_total",
                "Chat messages the store failed to persist",
                &self.persist_failures,
            ),
            Metric::counter(
                "matchroom_persist_dropped_total",
                "Chat messages dropped because the persistence queue was full",
                &self.persist_dropped,
            ),
            Metric::counter(
                "matchroom_match_updates_total",
                "Match updates submitted by the poller",
                &self.match_updates,
            ),
            Metric::counter(
                "matchroom_poll_failures_total",
                "Failed or timed out live match fetches",
                &self.poll_failures,
            ),
            Metric::gauge(
                "matchroom_uptime_seconds",
                "Seconds since the hub started",
                self.started_at.elapsed().as_secs_f64(),
            ),
        ]
    }

    /// Prometheus text exposition format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        for metric in self.snapshot() {
            output.push_str(&format!("# HELP {} {}\n", metric.name, metric.help));
            match metric.value {
                MetricValue::Counter(value) => {
                    output.push_str(&format!("# TYPE {} counter\n", metric.name));
                    output.push_str(&format!("{} {}\n", metric.name, value));
                }
                MetricValue::Gauge(value) => {
                    output.push_str(&format!("# TYPE {} gauge\n", metric.name));
                    output.push_str(&format!("{} {}\n", metric.name, value));
                }
            }
        }

        output
    }
}

impl Default for HubMetrics {
    fn default() -> Self {
        Self::new()
    }
}
