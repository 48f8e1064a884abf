//! Live location relay.
//!
//! A single broadcast hub fans `location_update` events out to every
//! connected dashboard socket. Producers are the ingest path and sockets that
//! send their own `location_update` frames.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::{LocationUpdate, SensorPacket};

/// Frames a socket client may send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Relayed to all clients unchanged
    LocationUpdate(LocationUpdate),
    /// Persisted, then broadcast as a `location_update`
    SensorReading(SensorPacket),
}

/// Frames the server sends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    LocationUpdate(LocationUpdate),
    Ack { serial_number: String, location_id: i64 },
    Error { message: String },
}

#[derive(Clone)]
pub struct LocationRelay {
    tx: broadcast::Sender<LocationUpdate>,
}

impl LocationRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many subscribers received the update.
    pub fn publish(&self, update: LocationUpdate) -> usize {
        let device_id = update.device_id;
        let delivered = self.tx.send(update).unwrap_or(0);
        debug!(device_id, delivered, "location_update published");
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LocationUpdate> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
