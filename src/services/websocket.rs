use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::models::entities::NotificationRecord;

static CONN_COUNTER: AtomicU64 = AtomicU64::new(0);

pub type WsSender = mpsc::Sender<String>;

/// Best-effort real-time side channel. Implementations must never block the
/// caller and never report failure.
pub trait RealtimeChannel: Send + Sync {
    fn emit(&self, owner_id: &str, record: &NotificationRecord);

    fn emit_many(&self, records: &[NotificationRecord]) {
        for record in records {
            self.emit(&record.owner_id, record);
        }
    }
}

struct Connection {
    id: u64,
    sender: WsSender,
}

pub struct WsManager {
    connections: DashMap<String, Vec<Connection>>,
    buffer: usize,
}

impl WsManager {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Register a new WebSocket connection for a user.
    /// Returns (connection_id, receiver); the receiver streams JSON frames to the client.
    pub fn connect(&self, owner_id: &str) -> (u64, mpsc::Receiver<String>) {
        let id = CONN_COUNTER.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);

        self.connections
            .entry(owner_id.to_string())
            .or_default()
            .push(Connection { id, sender: tx });

        (id, rx)
    }

    pub fn disconnect(&self, owner_id: &str, conn_id: u64) {
        if let Some(mut conns) = self.connections.get_mut(owner_id) {
            conns.retain(|c| c.id != conn_id);
            if conns.is_empty() {
                drop(conns);
                self.connections.remove(owner_id);
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|entry| entry.value().len()).sum()
    }

    /// Queue a frame on every connection of a user. A full buffer drops the
    /// frame for that connection; a closed one is removed.
    fn send_to_user(&self, owner_id: &str, frame: &str) {
        if let Some(mut conns) = self.connections.get_mut(owner_id) {
            conns.retain(|c| match c.sender.try_send(frame.to_string()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        owner_id = %owner_id,
                        conn_id = c.id,
                        "Real-time buffer full, dropping frame"
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
            if conns.is_empty() {
                drop(conns);
                self.connections.remove(owner_id);
            }
        }
    }
}

impl RealtimeChannel for WsManager {
    fn emit(&self, owner_id: &str, record: &NotificationRecord) {
        let event = serde_json::json!({
            "event": "notification",
            "data": record,
        });
        self.send_to_user(owner_id, &event.to_string());
    }
}
