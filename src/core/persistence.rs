//! Bounded write-behind queue for chat persistence
//!
//! The hub submits chat messages without waiting. A single worker drains the
//! queue into the store; when the queue is full new messages are rejected and
//! counted, the live broadcast is unaffected.

use log::{debug, error, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::metrics::{HubMetrics, SharedMetrics};
use crate::storage::{SharedStore, StoredMessage};

/// Producer side, owned by the hub
#[derive(Debug, Clone)]
pub struct PersistenceQueue {
    tx: mpsc::Sender<StoredMessage>,
    metrics: SharedMetrics,
}

/// Consumer side, run on its own task
pub struct PersistenceWorker {
    rx: mpsc::Receiver<StoredMessage>,
    store: SharedStore,
    write_timeout: Duration,
    metrics: SharedMetrics,
}

impl PersistenceQueue {
    pub fn new(
        store: SharedStore,
        capacity: usize,
        write_timeout: Duration,
        metrics: SharedMetrics,
    ) -> (Self, PersistenceWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            tx,
            metrics: metrics.clone(),
        };
        let worker = PersistenceWorker {
            rx,
            store,
            write_timeout,
            metrics,
        };
        (queue, worker)
    }

    /// Submit a message without waiting. Returns false if it was dropped.
    pub fn submit(&self, message: StoredMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(
                    "Persistence queue full, dropping message {} for room {}",
                    message.id, message.chat_room_id
                );
                HubMetrics::incr(&self.metrics.persist_dropped);
                false
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                error!(
                    "Persistence worker stopped, dropping message {} for room {}",
                    message.id, message.chat_room_id
                );
                HubMetrics::incr(&self.metrics.persist_dropped);
                false
            }
        }
    }
}

impl PersistenceWorker {
    /// Drain the queue until every producer is gone
    pub async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            match timeout(self.write_timeout, self.store.create_message(&message)).await {
                Ok(Ok(())) => debug!("Persisted message {} in room {}", message.id, message.chat_room_id),
                Ok(Err(e)) => {
                    error!(
                        "Failed to persist message in room {} from user {}: {}",
                        message.chat_room_id, message.user_id, e
                    );
                    HubMetrics::incr(&self.metrics.persist_failures);
                }
                Err(_) => {
                    error!(
                        "Timed out persisting message in room {} from user {}",
                        message.chat_room_id, message.user_id
                    );
                    HubMetrics::incr(&self.metrics.persist_failures);
                }
            }
        }
        debug!("Persistence worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HubError, Result};
    use crate::storage::{Match, MemoryStore, Store};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;

    fn message(n: usize) -> StoredMessage {
        StoredMessage {
            id: format!("msg_{}", n),
            chat_room_id: "m1".to_string(),
            user_id: "u1".to_string(),
            content: "hi".to_string(),
            message_type: "chat".to_string(),
            created_at: Utc::now(),
            user: None,
        }
    }

    struct FailingStore;

    #[async_trait]
    impl Store for FailingStore {
        async fn create_message(&self, _message: &StoredMessage) -> Result<()> {
            Err(HubError::StorageError("database unavailable".to_string()))
        }

        async fn get_recent_messages(&self, _room_id: &str, _limit: usize) -> Result<Vec<StoredMessage>> {
            Ok(Vec::new())
        }

        async fn get_live_matches(&self) -> Result<Vec<Match>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_worker_persists_in_order() {
        let store = Arc::new(MemoryStore::new());
        let metrics = HubMetrics::shared();
        let (queue, worker) =
            PersistenceQueue::new(store.clone(), 8, Duration::from_secs(1), metrics);

        for n in 0..3 {
            assert!(queue.submit(message(n)));
        }
        drop(queue);
        worker.run().await;

        let recent = store.get_recent_messages("m1", 10).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["msg_0", "msg_1", "msg_2"]);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_new() {
        let metrics = HubMetrics::shared();
        let (queue, _worker) = PersistenceQueue::new(
            Arc::new(MemoryStore::new()),
            1,
            Duration::from_secs(1),
            metrics.clone(),
        );

        assert!(queue.submit(message(0)));
        assert!(!queue.submit(message(1)));
        assert_eq!(HubMetrics::get(&metrics.persist_dropped), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_counted() {
        let metrics = HubMetrics::shared();
        let (queue, worker) = PersistenceQueue::new(
            Arc::new(FailingStore),
            4,
            Duration::from_secs(1),
            metrics.clone(),
        );

        queue.submit(message(0));
        drop(queue);
        worker.run().await;

        assert_eq!(HubMetrics::get(&metrics.persist_failures), 1);
    }
}
