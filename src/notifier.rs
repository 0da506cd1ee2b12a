use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Entity-change events fanned out to realtime viewers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    CircuitCreated,
    CircuitUpdated,
    CircuitDeleted,
    VersionCreated,
    VersionRestored,
    ProofCreated,
    ProofUpdated,
    DataEncrypted,
    ComputationVerified,
    ExecutionStart,
    ExecutionStep,
    ExecutionComplete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CircuitCreated => "circuit:created",
            EventKind::CircuitUpdated => "circuit:updated",
            EventKind::CircuitDeleted => "circuit:deleted",
            EventKind::VersionCreated => "circuit:version:created",
            EventKind::VersionRestored => "circuit:version:restored",
            EventKind::ProofCreated => "proof:created",
            EventKind::ProofUpdated => "proof:updated",
            EventKind::DataEncrypted => "data:encrypted",
            EventKind::ComputationVerified => "computation:verified",
            EventKind::ExecutionStart => "circuit:execution:start",
            EventKind::ExecutionStep => "circuit:execution:step",
            EventKind::ExecutionComplete => "circuit:execution:complete",
        }
    }
}

/// Wire envelope delivered over the realtime channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

/// Best-effort, at-most-once broadcast. Subscribers that connect late miss
/// earlier events; subscribers that fall behind skip ahead.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Publishes an event. Never fails the caller.
    pub fn publish<T: Serialize>(&self, kind: EventKind, data: &T) {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(err) => {
                warn!(?err, event = kind.as_str(), "dropping unserialisable notification");
                return;
            }
        };
        let notification = Notification {
            kind: kind.as_str().to_string(),
            data,
            timestamp: Utc::now(),
        };
        match self.sender.send(notification) {
            Ok(receivers) => debug!(event = kind.as_str(), receivers, "notification published"),
            Err(_) => debug!(event = kind.as_str(), "no realtime subscribers"),
        }
    }
}
