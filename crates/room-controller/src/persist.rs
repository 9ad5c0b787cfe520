//! Playback snapshot persistence boundary.
//!
//! Rooms persist their last known playback position on a fire-and-forget
//! basis: writes are spawned, never awaited inline, and failures are logged
//! and swallowed. The store trait keeps the durable backend swappable; the
//! in-memory implementation backs tests and single-node deployments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Last known playback position for a room.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub time: f64,
    pub is_playing: bool,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot store unavailable: {0}")]
    Unavailable(String),
}

/// Durable store for per-room playback snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the snapshot for a room, if one was ever written.
    async fn read(&self, room_id: &str) -> Result<Option<PlaybackSnapshot>, SnapshotError>;

    /// Write (upsert) the snapshot for a room.
    async fn write(&self, room_id: &str, snapshot: PlaybackSnapshot) -> Result<(), SnapshotError>;
}

/// In-memory snapshot store.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<String, PlaybackSnapshot>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn read(&self, room_id: &str) -> Result<Option<PlaybackSnapshot>, SnapshotError> {
        Ok(self.snapshots.read().await.get(room_id).copied())
    }

    async fn write(&self, room_id: &str, snapshot: PlaybackSnapshot) -> Result<(), SnapshotError> {
        self.snapshots
            .write()
            .await
            .insert(room_id.to_string(), snapshot);
        Ok(())
    }
}
