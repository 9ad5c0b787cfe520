//! `CoordinatorActor` - singleton actor that fronts all client traffic.
//!
//! The coordinator:
//! - Owns the connection registry (outbound sender + last-seen per connection)
//! - Rate-limits and validates every inbound command before routing
//! - Supervises `RoomActor` instances (created on first join, reaped when
//!   their task finishes)
//! - Relays connection-targeted payloads (voice signaling, sync-response)
//!   without involving a room
//! - Sweeps stale connections on an interval

use super::messages::{
    ClientCommand, CoordinatorMessage, CoordinatorStatus, OutboundSender, RoomSnapshot, ServerEvent,
};
use super::room::{RoomActor, RoomActorHandle};
use crate::errors::RcError;
use crate::persist::SnapshotStore;
use crate::ratelimit::RateLimiter;
use crate::validate;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the coordinator mailbox.
const COORDINATOR_CHANNEL_BUFFER: usize = 500;

/// Timing knobs for liveness and buffering recovery.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    /// Idle time after which a connection is force-disconnected.
    pub stale_after: Duration,
    /// How often the liveness sweep runs.
    pub sweep_interval: Duration,
    /// How long a room's buffer gate may stay closed before forced recovery.
    pub recovery_after: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(45),
            sweep_interval: Duration::from_secs(15),
            recovery_after: Duration::from_secs(10),
        }
    }
}

/// Handle to the `CoordinatorActor`.
#[derive(Clone)]
pub struct CoordinatorActorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
    cancel_token: CancellationToken,
}

impl CoordinatorActorHandle {
    /// Register a new connection with its outbound event channel.
    pub async fn connect(
        &self,
        connection_id: String,
        sender: OutboundSender,
    ) -> Result<(), RcError> {
        self.send(CoordinatorMessage::Connect {
            connection_id,
            sender,
        })
        .await
    }

    /// Deregister a connection, leaving its room if it was in one.
    pub async fn disconnect(&self, connection_id: String) -> Result<(), RcError> {
        self.send(CoordinatorMessage::Disconnect { connection_id })
            .await
    }

    /// Submit a decoded client command for validation and routing.
    pub async fn command(
        &self,
        connection_id: String,
        command: ClientCommand,
    ) -> Result<(), RcError> {
        self.send(CoordinatorMessage::Command {
            connection_id,
            command,
        })
        .await
    }

    /// Get a snapshot of a room, if it exists.
    pub async fn room_snapshot(&self, room_id: String) -> Result<Option<RoomSnapshot>, RcError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorMessage::GetRoomSnapshot {
            room_id,
            respond_to: tx,
        })
        .await?;
        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))
    }

    /// Get connection and room counts.
    pub async fn status(&self) -> Result<CoordinatorStatus, RcError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorMessage::GetStatus { respond_to: tx })
            .await?;
        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the coordinator and all room actors.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Wait until the actor is cancelled.
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await;
    }

    async fn send(&self, message: CoordinatorMessage) -> Result<(), RcError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }
}

/// A registered connection.
struct ConnectionEntry {
    /// Outbound event channel; dropping it closes the client's socket.
    sender: OutboundSender,
    /// Updated on registration and on every heartbeat.
    last_seen: Instant,
    /// Room this connection currently belongs to, if any.
    room_id: Option<String>,
}

/// A supervised room.
struct ManagedRoom {
    handle: RoomActorHandle,
    /// Join handle for reaping; the task finishes when the room empties.
    task_handle: JoinHandle<()>,
}

/// The `CoordinatorActor` implementation.
pub struct CoordinatorActor {
    /// Message receiver.
    receiver: mpsc::Receiver<CoordinatorMessage>,
    /// Cancellation token (root of the actor hierarchy).
    cancel_token: CancellationToken,
    /// Registered connections by id.
    connections: HashMap<String, ConnectionEntry>,
    /// Live rooms by id.
    rooms: HashMap<String, ManagedRoom>,
    /// Per-connection command rate limiter.
    limiter: RateLimiter,
    /// Playback snapshot store handed to room actors.
    store: Arc<dyn SnapshotStore>,
    /// Timing knobs.
    settings: CoordinatorSettings,
}

impl CoordinatorActor {
    /// Spawn the coordinator. Returns a handle and the task join handle.
    pub fn spawn(
        settings: CoordinatorSettings,
        store: Arc<dyn SnapshotStore>,
    ) -> (CoordinatorActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(COORDINATOR_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = Self {
            receiver,
            cancel_token: cancel_token.clone(),
            connections: HashMap::new(),
            rooms: HashMap::new(),
            limiter: RateLimiter::with_default_policies(),
            store,
            settings,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = CoordinatorActorHandle {
            sender,
            cancel_token,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "rc.actor.coordinator")]
    async fn run(mut self) {
        info!(
            target: "rc.actor.coordinator",
            stale_after_secs = self.settings.stale_after.as_secs(),
            sweep_interval_secs = self.settings.sweep_interval.as_secs(),
            "CoordinatorActor started"
        );

        let mut sweep = tokio::time::interval(self.settings.sweep_interval);
        // The first tick completes immediately; skip it so a fresh start
        // never sweeps.
        sweep.tick().await;

        loop {
            // Reap room actors whose task has finished (room emptied).
            self.check_room_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "rc.actor.coordinator",
                        "CoordinatorActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                _ = sweep.tick() => {
                    self.sweep_stale_connections().await;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            info!(
                                target: "rc.actor.coordinator",
                                "CoordinatorActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "rc.actor.coordinator",
            connections = self.connections.len(),
            rooms = self.rooms.len(),
            "CoordinatorActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: CoordinatorMessage) {
        match message {
            CoordinatorMessage::Connect {
                connection_id,
                sender,
            } => {
                self.handle_connect(connection_id, sender);
            }

            CoordinatorMessage::Disconnect { connection_id } => {
                self.handle_disconnect(&connection_id).await;
            }

            CoordinatorMessage::Command {
                connection_id,
                command,
            } => {
                let kind = command.kind();
                if let Err(e) = self.handle_command(&connection_id, command).await {
                    if e.is_client_fault() {
                        debug!(
                            target: "rc.actor.coordinator",
                            connection_id = %connection_id,
                            kind = %kind,
                            error = %e,
                            "Command dropped"
                        );
                    } else {
                        warn!(
                            target: "rc.actor.coordinator",
                            connection_id = %connection_id,
                            kind = %kind,
                            error = %e,
                            "Command failed"
                        );
                    }
                }
            }

            CoordinatorMessage::GetRoomSnapshot {
                room_id,
                respond_to,
            } => {
                let snapshot = match self.room(&room_id) {
                    Ok(handle) => handle.get_state().await.ok(),
                    Err(_) => None,
                };
                let _ = respond_to.send(snapshot);
            }

            CoordinatorMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(CoordinatorStatus {
                    connections: self.connections.len(),
                    rooms: self.rooms.len(),
                });
            }
        }
    }

    fn handle_connect(&mut self, connection_id: String, sender: OutboundSender) {
        info!(
            target: "rc.actor.coordinator",
            connection_id = %connection_id,
            "Connection registered"
        );
        self.connections.insert(
            connection_id,
            ConnectionEntry {
                sender,
                last_seen: Instant::now(),
                room_id: None,
            },
        );
    }

    async fn handle_disconnect(&mut self, connection_id: &str) {
        let Some(entry) = self.connections.remove(connection_id) else {
            return;
        };
        self.limiter.forget(connection_id);

        info!(
            target: "rc.actor.coordinator",
            connection_id = %connection_id,
            "Connection deregistered"
        );

        if let Some(room_id) = entry.room_id {
            if let Some(managed) = self.rooms.get(&room_id) {
                // The room may already have exited; a failed send is fine.
                let _ = managed.handle.leave(connection_id.to_string()).await;
            }
        }
    }

    /// Validate, rate-limit, and route one client command.
    async fn handle_command(
        &mut self,
        connection_id: &str,
        command: ClientCommand,
    ) -> Result<(), RcError> {
        if !self
            .limiter
            .allow(connection_id, command.kind(), Instant::now())
        {
            return Err(RcError::RateLimited {
                kind: command.kind(),
            });
        }

        match command {
            ClientCommand::JoinRoom { room_id, username } => {
                validate::room_id(&room_id)?;
                let display_name = validate::display_name(username.as_deref());
                self.route_join(connection_id, &room_id, display_name).await
            }

            ClientCommand::Heartbeat { room_id } => {
                validate::room_id(&room_id)?;
                let entry = self.connection_mut(connection_id)?;
                entry.last_seen = Instant::now();
                Ok(())
            }

            ClientCommand::BufferStatus {
                room_id,
                is_buffered,
            } => {
                validate::room_id(&room_id)?;
                self.room(&room_id)?
                    .buffer_status(connection_id.to_string(), is_buffered)
                    .await
            }

            ClientCommand::ForceReady { room_id } => {
                validate::room_id(&room_id)?;
                self.room(&room_id)?
                    .force_ready(connection_id.to_string())
                    .await
            }

            ClientCommand::TransferHost { room_id, target_id } => {
                validate::room_id(&room_id)?;
                self.room(&room_id)?
                    .transfer_host(connection_id.to_string(), target_id)
                    .await
            }

            ClientCommand::Play { room_id, time } => {
                validate::room_id(&room_id)?;
                let time = validate::playback_time(time)?;
                self.room(&room_id)?
                    .play(connection_id.to_string(), time)
                    .await
            }

            ClientCommand::Pause { room_id, time } => {
                validate::room_id(&room_id)?;
                let time = validate::playback_time(time)?;
                self.room(&room_id)?
                    .pause(connection_id.to_string(), time)
                    .await
            }

            ClientCommand::Seek { room_id, time } => {
                validate::room_id(&room_id)?;
                let time = validate::playback_time(time)?;
                self.room(&room_id)?
                    .seek(connection_id.to_string(), time)
                    .await
            }

            ClientCommand::TimeUpdate {
                room_id,
                time,
                is_playing,
            } => {
                validate::room_id(&room_id)?;
                let time = validate::playback_time(time)?;
                self.room(&room_id)?
                    .time_update(connection_id.to_string(), time, is_playing)
                    .await
            }

            ClientCommand::SyncResponse {
                requester_id,
                time,
                is_playing,
            } => {
                let time = validate::playback_time(time)?;
                self.relay(&requester_id, ServerEvent::SyncResponse { time, is_playing });
                Ok(())
            }

            ClientCommand::PlaylistGet { room_id } => {
                validate::room_id(&room_id)?;
                self.room(&room_id)?
                    .playlist_get(connection_id.to_string())
                    .await
            }

            ClientCommand::PlaylistAdd {
                room_id,
                url,
                title,
            } => {
                validate::room_id(&room_id)?;
                let url = validate::media_url(&url)?;
                let title = validate::text(&title)?;
                self.room(&room_id)?
                    .playlist_add(connection_id.to_string(), url, title)
                    .await
            }

            ClientCommand::PlaylistRemove { room_id, item_id } => {
                validate::room_id(&room_id)?;
                self.room(&room_id)?
                    .playlist_remove(connection_id.to_string(), item_id)
                    .await
            }

            ClientCommand::PlaylistPlay { room_id, index } => {
                validate::room_id(&room_id)?;
                self.room(&room_id)?
                    .playlist_play(connection_id.to_string(), index)
                    .await
            }

            ClientCommand::SendMessage { room_id, message } => {
                validate::room_id(&room_id)?;
                let message = validate::text(&message)?;
                self.room(&room_id)?
                    .chat(connection_id.to_string(), message)
                    .await
            }

            ClientCommand::SendReaction {
                room_id,
                emoji,
                username,
                x,
                y,
            } => {
                validate::room_id(&room_id)?;
                validate::emoji(&emoji)?;
                let x = validate::coordinate(x)?;
                let y = validate::coordinate(y)?;
                let username = validate::username(&username)?;
                self.room(&room_id)?
                    .reaction(connection_id.to_string(), emoji, username, x, y)
                    .await
            }

            ClientCommand::JoinVoiceChat { room_id } => {
                validate::room_id(&room_id)?;
                let sender = self.connection_sender(connection_id)?;
                self.track_room(connection_id, &room_id).await?;
                let room = self.ensure_room(&room_id);
                room.join_voice(connection_id.to_string(), sender).await
            }

            ClientCommand::VoiceSendingSignal {
                user_to_signal,
                signal,
                caller_id,
            } => {
                self.relay(
                    &user_to_signal,
                    ServerEvent::VoiceUserJoinedSignal { signal, caller_id },
                );
                Ok(())
            }

            ClientCommand::VoiceReturningSignal { signal, caller_id } => {
                self.relay(
                    &caller_id,
                    ServerEvent::VoiceReceivingReturnedSignal {
                        signal,
                        id: connection_id.to_string(),
                    },
                );
                Ok(())
            }
        }
    }

    /// Route a join: leave any previous room, create the target room if
    /// needed, and hand the connection's sender to the room actor.
    async fn route_join(
        &mut self,
        connection_id: &str,
        room_id: &str,
        display_name: String,
    ) -> Result<(), RcError> {
        let sender = self.connection_sender(connection_id)?;
        self.track_room(connection_id, room_id).await?;

        let room = self.ensure_room(room_id);
        room.join(connection_id.to_string(), display_name, sender)
            .await
    }

    /// Record the connection's current room, leaving the previous one if it
    /// differs. A connection belongs to at most one room; every path that
    /// puts a connection into a room must go through here so disconnect
    /// cleanup always finds the right room.
    async fn track_room(&mut self, connection_id: &str, room_id: &str) -> Result<(), RcError> {
        let previous = self
            .connection_mut(connection_id)?
            .room_id
            .replace(room_id.to_string());
        if let Some(previous_room) = previous {
            if previous_room != room_id {
                if let Some(managed) = self.rooms.get(&previous_room) {
                    let _ = managed.handle.leave(connection_id.to_string()).await;
                }
            }
        }
        Ok(())
    }

    /// Get the live room handle, creating the room if it does not exist or
    /// its actor has already exited.
    fn ensure_room(&mut self, room_id: &str) -> RoomActorHandle {
        if let Some(managed) = self.rooms.get(room_id) {
            if !managed.handle.is_closed() {
                return managed.handle.clone();
            }
            self.rooms.remove(room_id);
        }

        info!(
            target: "rc.actor.coordinator",
            room_id = %room_id,
            total_rooms = self.rooms.len() + 1,
            "Creating room"
        );

        let (handle, task_handle) = RoomActor::spawn(
            room_id.to_string(),
            self.cancel_token.child_token(),
            Arc::clone(&self.store),
            self.settings.recovery_after,
        );
        self.rooms.insert(
            room_id.to_string(),
            ManagedRoom {
                handle: handle.clone(),
                task_handle,
            },
        );
        handle
    }

    /// Live room handle for commands that never create rooms.
    fn room(&self, room_id: &str) -> Result<RoomActorHandle, RcError> {
        self.rooms
            .get(room_id)
            .filter(|managed| !managed.handle.is_closed())
            .map(|managed| managed.handle.clone())
            .ok_or_else(|| RcError::RoomNotFound(room_id.to_string()))
    }

    fn connection_mut(&mut self, connection_id: &str) -> Result<&mut ConnectionEntry, RcError> {
        self.connections
            .get_mut(connection_id)
            .ok_or_else(|| RcError::ConnectionNotFound(connection_id.to_string()))
    }

    fn connection_sender(&self, connection_id: &str) -> Result<OutboundSender, RcError> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.sender.clone())
            .ok_or_else(|| RcError::ConnectionNotFound(connection_id.to_string()))
    }

    /// Push an event straight to a connection, bypassing rooms. Unknown
    /// targets are dropped.
    fn relay(&self, connection_id: &str, event: ServerEvent) {
        if let Some(entry) = self.connections.get(connection_id) {
            let _ = entry.sender.send(event);
        }
    }

    /// Force-disconnect connections idle past the stale threshold.
    async fn sweep_stale_connections(&mut self) {
        let now = Instant::now();
        let stale: Vec<String> = self
            .connections
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_seen) > self.settings.stale_after)
            .map(|(id, _)| id.clone())
            .collect();

        for connection_id in stale {
            warn!(
                target: "rc.actor.coordinator",
                connection_id = %connection_id,
                "Stale connection swept"
            );
            self.handle_disconnect(&connection_id).await;
        }
    }

    /// Reap room actors whose task has finished.
    async fn check_room_health(&mut self) {
        let mut finished = Vec::new();

        for (room_id, managed) in &self.rooms {
            if managed.task_handle.is_finished() {
                finished.push(room_id.clone());
            }
        }

        for room_id in finished {
            if let Some(managed) = self.rooms.remove(&room_id) {
                match managed.task_handle.await {
                    Ok(()) => {
                        debug!(
                            target: "rc.actor.coordinator",
                            room_id = %room_id,
                            "Room actor exited cleanly"
                        );
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            error!(
                                target: "rc.actor.coordinator",
                                room_id = %room_id,
                                error = ?join_error,
                                "Room actor panicked"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Perform graceful shutdown: cancel rooms and wait for them to finish.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "rc.actor.coordinator",
            connections = self.connections.len(),
            rooms = self.rooms.len(),
            "Performing graceful shutdown"
        );

        for managed in self.rooms.values() {
            managed.handle.cancel();
        }

        for (room_id, managed) in self.rooms.drain() {
            match tokio::time::timeout(Duration::from_secs(5), managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "rc.actor.coordinator",
                        room_id = %room_id,
                        "Room completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "rc.actor.coordinator",
                        room_id = %room_id,
                        error = ?e,
                        "Room task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "rc.actor.coordinator",
                        room_id = %room_id,
                        "Room shutdown timed out"
                    );
                }
            }
        }

        self.connections.clear();

        info!(
            target: "rc.actor.coordinator",
            "Graceful shutdown complete"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::persist::MemorySnapshotStore;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn spawn_coordinator() -> (CoordinatorActorHandle, JoinHandle<()>) {
        CoordinatorActor::spawn(
            CoordinatorSettings::default(),
            Arc::new(MemorySnapshotStore::new()),
        )
    }

    async fn connect(
        handle: &CoordinatorActorHandle,
        connection_id: &str,
    ) -> UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        handle.connect(connection_id.to_string(), tx).await.unwrap();
        rx
    }

    async fn join(handle: &CoordinatorActorHandle, connection_id: &str, room_id: &str, name: &str) {
        handle
            .command(
                connection_id.to_string(),
                ClientCommand::JoinRoom {
                    room_id: room_id.to_string(),
                    username: Some(name.to_string()),
                },
            )
            .await
            .unwrap();
    }

    /// Barrier: both the coordinator and the room have drained their
    /// mailboxes once this returns.
    async fn settle(
        handle: &CoordinatorActorHandle,
        room_id: &str,
        rx: &mut UnboundedReceiver<ServerEvent>,
    ) -> Vec<ServerEvent> {
        let _ = handle.room_snapshot(room_id.to_string()).await.unwrap();
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_join_creates_room_and_grants_host() {
        let (handle, _task) = spawn_coordinator();
        let mut rx = connect(&handle, "alice").await;
        join(&handle, "alice", "movie-night", "Alice").await;

        let events = settle(&handle, "movie-night", &mut rx).await;
        assert!(events.contains(&ServerEvent::IsHost { is_host: true }));

        let snapshot = handle
            .room_snapshot("movie-night".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.host_id, "alice");

        let status = handle.status().await.unwrap();
        assert_eq!(status.connections, 1);
        assert_eq!(status.rooms, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let (handle, _task) = spawn_coordinator();
        let mut alice_rx = connect(&handle, "alice").await;
        let _bob_rx = connect(&handle, "bob").await;
        join(&handle, "alice", "room-a", "Alice").await;
        join(&handle, "bob", "room-b", "Bob").await;
        let _ = settle(&handle, "room-a", &mut alice_rx).await;

        // Bob is host of room-b; his play must not reach room-a.
        handle
            .command(
                "bob".to_string(),
                ClientCommand::Play {
                    room_id: "room-b".to_string(),
                    time: 5.0,
                },
            )
            .await
            .unwrap();

        let events = settle(&handle, "room-a", &mut alice_rx).await;
        assert!(!events.contains(&ServerEvent::Play { time: 5.0 }));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_empty_room_is_reaped() {
        let (handle, _task) = spawn_coordinator();
        let _rx = connect(&handle, "alice").await;
        join(&handle, "alice", "movie-night", "Alice").await;

        handle.disconnect("alice".to_string()).await.unwrap();
        // Let the room task notice it emptied and finish.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let status = handle.status().await.unwrap();
        assert_eq!(status.connections, 0);
        assert_eq!(status.rooms, 0);

        assert!(handle
            .room_snapshot("movie-night".to_string())
            .await
            .unwrap()
            .is_none());

        handle.cancel();
    }

    #[tokio::test]
    async fn test_room_recreated_after_reap() {
        let (handle, _task) = spawn_coordinator();
        let _rx = connect(&handle, "alice").await;
        join(&handle, "alice", "movie-night", "Alice").await;
        handle.disconnect("alice".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A fresh joiner founds the room anew and becomes host.
        let mut bob_rx = connect(&handle, "bob").await;
        join(&handle, "bob", "movie-night", "Bob").await;

        let events = settle(&handle, "movie-night", &mut bob_rx).await;
        assert!(events.contains(&ServerEvent::IsHost { is_host: true }));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_switching_rooms_leaves_previous() {
        let (handle, _task) = spawn_coordinator();
        let _alice_rx = connect(&handle, "alice").await;
        let _bob_rx = connect(&handle, "bob").await;
        join(&handle, "alice", "room-a", "Alice").await;
        join(&handle, "bob", "room-a", "Bob").await;

        join(&handle, "alice", "room-b", "Alice").await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let room_a = handle
            .room_snapshot("room-a".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(room_a.users, vec!["bob"]);
        // Host authority in room-a passed to Bob on Alice's departure.
        assert_eq!(room_a.host_id, "bob");

        let room_b = handle
            .room_snapshot("room-b".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(room_b.users, vec!["alice"]);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_voice_join_to_other_room_leaves_previous() {
        let (handle, _task) = spawn_coordinator();
        let _alice_rx = connect(&handle, "alice").await;
        let _bob_rx = connect(&handle, "bob").await;
        join(&handle, "alice", "room-a", "Alice").await;
        join(&handle, "bob", "room-a", "Bob").await;

        // Voice-joining a different room moves the connection there; the
        // old room must not keep a ghost member.
        handle
            .command(
                "alice".to_string(),
                ClientCommand::JoinVoiceChat {
                    room_id: "room-b".to_string(),
                },
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let room_a = handle
            .room_snapshot("room-a".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(room_a.users, vec!["bob"]);
        assert_eq!(room_a.host_id, "bob");

        // Disconnect cleans up the room the connection actually occupies.
        handle.disconnect("alice".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(handle
            .room_snapshot("room-b".to_string())
            .await
            .unwrap()
            .is_none());
        let room_a = handle
            .room_snapshot("room-a".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(room_a.users, vec!["bob"]);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_reaction_with_invalid_username_dropped() {
        let (handle, _task) = spawn_coordinator();
        let mut alice_rx = connect(&handle, "alice").await;
        let _bob_rx = connect(&handle, "bob").await;
        join(&handle, "alice", "movie-night", "Alice").await;
        join(&handle, "bob", "movie-night", "Bob").await;
        let _ = settle(&handle, "movie-night", &mut alice_rx).await;

        handle
            .command(
                "bob".to_string(),
                ClientCommand::SendReaction {
                    room_id: "movie-night".to_string(),
                    emoji: "🔥".to_string(),
                    username: "x".repeat(51),
                    x: 50.0,
                    y: 50.0,
                },
            )
            .await
            .unwrap();
        handle
            .command(
                "bob".to_string(),
                ClientCommand::SendReaction {
                    room_id: "movie-night".to_string(),
                    emoji: "🔥".to_string(),
                    username: "   ".to_string(),
                    x: 50.0,
                    y: 50.0,
                },
            )
            .await
            .unwrap();

        // The whole reaction is dropped, not relayed under a placeholder.
        let events = settle(&handle, "movie-night", &mut alice_rx).await;
        assert!(events.is_empty());

        handle.cancel();
    }

    #[tokio::test]
    async fn test_rate_limited_commands_dropped() {
        let (handle, _task) = spawn_coordinator();
        let _alice_rx = connect(&handle, "alice").await;
        let mut bob_rx = connect(&handle, "bob").await;
        join(&handle, "alice", "movie-night", "Alice").await;
        join(&handle, "bob", "movie-night", "Bob").await;
        let _ = settle(&handle, "movie-night", &mut bob_rx).await;

        // Default play policy is 5 per 5s; the sixth is dropped.
        for i in 0..6 {
            handle
                .command(
                    "alice".to_string(),
                    ClientCommand::Play {
                        room_id: "movie-night".to_string(),
                        time: f64::from(i),
                    },
                )
                .await
                .unwrap();
        }

        let plays: Vec<_> = settle(&handle, "movie-night", &mut bob_rx)
            .await
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::Play { .. }))
            .collect();
        assert_eq!(plays.len(), 5);
        assert!(!plays.contains(&ServerEvent::Play { time: 5.0 }));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_malformed_payload_dropped_silently() {
        let (handle, _task) = spawn_coordinator();
        let _alice_rx = connect(&handle, "alice").await;
        let mut bob_rx = connect(&handle, "bob").await;
        join(&handle, "alice", "movie-night", "Alice").await;
        join(&handle, "bob", "movie-night", "Bob").await;
        let _ = settle(&handle, "movie-night", &mut bob_rx).await;

        handle
            .command(
                "alice".to_string(),
                ClientCommand::Play {
                    room_id: "movie-night".to_string(),
                    time: -1.0,
                },
            )
            .await
            .unwrap();
        handle
            .command(
                "alice".to_string(),
                ClientCommand::Seek {
                    room_id: "movie-night".to_string(),
                    time: f64::NAN,
                },
            )
            .await
            .unwrap();

        let events = settle(&handle, "movie-night", &mut bob_rx).await;
        assert!(events.is_empty());

        handle.cancel();
    }

    #[tokio::test]
    async fn test_sync_response_relayed_to_requester_only() {
        let (handle, _task) = spawn_coordinator();
        let mut alice_rx = connect(&handle, "alice").await;
        let mut bob_rx = connect(&handle, "bob").await;
        join(&handle, "alice", "movie-night", "Alice").await;
        join(&handle, "bob", "movie-night", "Bob").await;
        let _ = settle(&handle, "movie-night", &mut alice_rx).await;
        let _ = settle(&handle, "movie-night", &mut bob_rx).await;

        // Host answers Bob's sync request.
        handle
            .command(
                "alice".to_string(),
                ClientCommand::SyncResponse {
                    requester_id: "bob".to_string(),
                    time: 77.5,
                    is_playing: true,
                },
            )
            .await
            .unwrap();

        let bob_events = settle(&handle, "movie-night", &mut bob_rx).await;
        assert!(bob_events.contains(&ServerEvent::SyncResponse {
            time: 77.5,
            is_playing: true
        }));
        let alice_events = settle(&handle, "movie-night", &mut alice_rx).await;
        assert!(alice_events.is_empty());

        handle.cancel();
    }

    #[tokio::test]
    async fn test_voice_signals_relayed_opaquely() {
        let (handle, _task) = spawn_coordinator();
        let mut alice_rx = connect(&handle, "alice").await;
        let mut bob_rx = connect(&handle, "bob").await;

        let offer = serde_json::json!({"sdp": "offer", "ice": [1, 2, 3]});
        handle
            .command(
                "alice".to_string(),
                ClientCommand::VoiceSendingSignal {
                    user_to_signal: "bob".to_string(),
                    signal: offer.clone(),
                    caller_id: "alice".to_string(),
                },
            )
            .await
            .unwrap();

        let answer = serde_json::json!({"sdp": "answer"});
        handle
            .command(
                "bob".to_string(),
                ClientCommand::VoiceReturningSignal {
                    signal: answer.clone(),
                    caller_id: "alice".to_string(),
                },
            )
            .await
            .unwrap();

        // Status is a barrier: both commands have been routed.
        let _ = handle.status().await.unwrap();

        assert_eq!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::VoiceUserJoinedSignal {
                signal: offer,
                caller_id: "alice".to_string()
            }
        );
        assert_eq!(
            alice_rx.try_recv().unwrap(),
            ServerEvent::VoiceReceivingReturnedSignal {
                signal: answer,
                id: "bob".to_string()
            }
        );

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_connection_swept() {
        let (handle, _task) = CoordinatorActor::spawn(
            CoordinatorSettings::default(),
            Arc::new(MemorySnapshotStore::new()),
        );
        let _rx = connect(&handle, "alice").await;
        join(&handle, "alice", "movie-night", "Alice").await;

        // Heartbeats keep the connection alive across one sweep.
        tokio::time::advance(Duration::from_secs(30)).await;
        handle
            .command(
                "alice".to_string(),
                ClientCommand::Heartbeat {
                    room_id: "movie-night".to_string(),
                },
            )
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let status = handle.status().await.unwrap();
        assert_eq!(status.connections, 1, "heartbeat should defer the sweep");

        // Silence for more than 45s: the next sweep disconnects and the
        // emptied room is reaped.
        tokio::time::advance(Duration::from_secs(60)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let status = handle.status().await.unwrap();
        assert_eq!(status.connections, 0);
        assert_eq!(status.rooms, 0);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_command_from_unknown_connection_dropped() {
        let (handle, _task) = spawn_coordinator();

        // Never connected: join is dropped, no room is created.
        handle
            .command(
                "ghost".to_string(),
                ClientCommand::JoinRoom {
                    room_id: "movie-night".to_string(),
                    username: None,
                },
            )
            .await
            .unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.rooms, 0);

        handle.cancel();
    }
}
