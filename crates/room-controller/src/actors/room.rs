//! `RoomActor` - per-room actor that owns all room state.
//!
//! Each `RoomActor`:
//! - Owns the `RoomState` (host, members, buffer flags, playlist)
//! - Enforces host authority for playback and playlist mutations
//! - Owns the buffering auto-recovery deadline
//! - Spawns fire-and-forget playback snapshot persistence
//!
//! The actor exits on its own when the last member leaves; the coordinator
//! reaps the finished task and forgets the room.

use super::messages::{OutboundSender, RoomMessage, RoomSnapshot, ServerEvent};
use crate::errors::RcError;
use crate::persist::{PlaybackSnapshot, SnapshotStore};
use crate::state::RoomState;
use crate::validate::DEFAULT_DISPLAY_NAME;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 256;

/// Handle to a `RoomActor`.
#[derive(Clone)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: String,
}

impl RoomActorHandle {
    /// Get the room ID.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Whether the actor's mailbox has shut down (room emptied or cancelled).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// A connection joins this room.
    pub async fn join(
        &self,
        connection_id: String,
        display_name: String,
        sender: OutboundSender,
    ) -> Result<(), RcError> {
        self.send(RoomMessage::Join {
            connection_id,
            display_name,
            sender,
        })
        .await
    }

    /// A connection leaves this room (voluntary or forced).
    pub async fn leave(&self, connection_id: String) -> Result<(), RcError> {
        self.send(RoomMessage::Leave { connection_id }).await
    }

    /// A connection joins the room's voice channel, becoming a member if it
    /// was not one already.
    pub async fn join_voice(
        &self,
        connection_id: String,
        sender: OutboundSender,
    ) -> Result<(), RcError> {
        self.send(RoomMessage::JoinVoice {
            connection_id,
            sender,
        })
        .await
    }

    /// Report a member's buffer readiness.
    pub async fn buffer_status(
        &self,
        connection_id: String,
        is_buffered: bool,
    ) -> Result<(), RcError> {
        self.send(RoomMessage::BufferStatus {
            connection_id,
            is_buffered,
        })
        .await
    }

    /// Host forces every member's buffer flag to ready.
    pub async fn force_ready(&self, connection_id: String) -> Result<(), RcError> {
        self.send(RoomMessage::ForceReady { connection_id }).await
    }

    /// Host hands authority to another member.
    pub async fn transfer_host(
        &self,
        connection_id: String,
        target_id: String,
    ) -> Result<(), RcError> {
        self.send(RoomMessage::TransferHost {
            connection_id,
            target_id,
        })
        .await
    }

    /// Host starts playback at a position.
    pub async fn play(&self, connection_id: String, time: f64) -> Result<(), RcError> {
        self.send(RoomMessage::Play {
            connection_id,
            time,
        })
        .await
    }

    /// Host pauses playback at a position.
    pub async fn pause(&self, connection_id: String, time: f64) -> Result<(), RcError> {
        self.send(RoomMessage::Pause {
            connection_id,
            time,
        })
        .await
    }

    /// Host seeks to a position.
    pub async fn seek(&self, connection_id: String, time: f64) -> Result<(), RcError> {
        self.send(RoomMessage::Seek {
            connection_id,
            time,
        })
        .await
    }

    /// Host's periodic position heartbeat.
    pub async fn time_update(
        &self,
        connection_id: String,
        time: f64,
        is_playing: bool,
    ) -> Result<(), RcError> {
        self.send(RoomMessage::TimeUpdate {
            connection_id,
            time,
            is_playing,
        })
        .await
    }

    /// Member requests the current playlist.
    pub async fn playlist_get(&self, connection_id: String) -> Result<(), RcError> {
        self.send(RoomMessage::PlaylistGet { connection_id }).await
    }

    /// Host appends a playlist item.
    pub async fn playlist_add(
        &self,
        connection_id: String,
        url: String,
        title: String,
    ) -> Result<(), RcError> {
        self.send(RoomMessage::PlaylistAdd {
            connection_id,
            url,
            title,
        })
        .await
    }

    /// Host removes a playlist item by id.
    pub async fn playlist_remove(
        &self,
        connection_id: String,
        item_id: String,
    ) -> Result<(), RcError> {
        self.send(RoomMessage::PlaylistRemove {
            connection_id,
            item_id,
        })
        .await
    }

    /// Host selects a playlist index to play.
    pub async fn playlist_play(&self, connection_id: String, index: usize) -> Result<(), RcError> {
        self.send(RoomMessage::PlaylistPlay {
            connection_id,
            index,
        })
        .await
    }

    /// Member sends a chat message.
    pub async fn chat(&self, connection_id: String, message: String) -> Result<(), RcError> {
        self.send(RoomMessage::Chat {
            connection_id,
            message,
        })
        .await
    }

    /// Member sends an emoji reaction.
    pub async fn reaction(
        &self,
        connection_id: String,
        emoji: String,
        username: String,
        x: f64,
        y: f64,
    ) -> Result<(), RcError> {
        self.send(RoomMessage::Reaction {
            connection_id,
            emoji,
            username,
            x,
            y,
        })
        .await
    }

    /// Get a point-in-time snapshot of the room.
    pub async fn get_state(&self) -> Result<RoomSnapshot, RcError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::GetState { respond_to: tx }).await?;
        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the room actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    async fn send(&self, message: RoomMessage) -> Result<(), RcError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    /// Room ID.
    room_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<RoomMessage>,
    /// Cancellation token (child of the coordinator's token).
    cancel_token: CancellationToken,
    /// Membership, host authority, buffer flags, playlist.
    state: RoomState,
    /// Outbound event channels by member connection id.
    senders: HashMap<String, OutboundSender>,
    /// Playback snapshot store for fire-and-forget persistence.
    store: Arc<dyn SnapshotStore>,
    /// How long the buffer gate may stay closed before forced recovery.
    recovery_after: Duration,
    /// Armed while the buffer gate is closed.
    recovery_deadline: Option<Instant>,
}

impl RoomActor {
    /// Spawn a new room actor. Returns a handle and the task join handle.
    pub fn spawn(
        room_id: String,
        cancel_token: CancellationToken,
        store: Arc<dyn SnapshotStore>,
        recovery_after: Duration,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let actor = Self {
            room_id: room_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            state: RoomState::new(),
            senders: HashMap::new(),
            store,
            recovery_after,
            recovery_deadline: None,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "rc.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "rc.actor.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    break;
                }

                () = Self::wait_deadline(self.recovery_deadline), if self.recovery_deadline.is_some() => {
                    self.apply_buffer_recovery();
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            let room_empty = self.handle_message(message);
                            if room_empty {
                                break;
                            }
                        }
                        None => {
                            info!(
                                target: "rc.actor.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            members = self.state.member_count(),
            "RoomActor stopped"
        );
    }

    async fn wait_deadline(deadline: Option<Instant>) {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }

    /// Handle a single message. Returns true when the room has emptied and
    /// the actor should exit.
    fn handle_message(&mut self, message: RoomMessage) -> bool {
        match message {
            RoomMessage::Join {
                connection_id,
                display_name,
                sender,
            } => {
                self.handle_join(&connection_id, &display_name, sender);
            }

            RoomMessage::Leave { connection_id } => {
                return self.handle_leave(&connection_id);
            }

            RoomMessage::JoinVoice {
                connection_id,
                sender,
            } => {
                self.handle_join_voice(&connection_id, sender);
            }

            RoomMessage::BufferStatus {
                connection_id,
                is_buffered,
            } => {
                self.handle_buffer_status(&connection_id, is_buffered);
            }

            RoomMessage::ForceReady { connection_id } => {
                self.handle_force_ready(&connection_id);
            }

            RoomMessage::TransferHost {
                connection_id,
                target_id,
            } => {
                self.handle_transfer_host(&connection_id, &target_id);
            }

            RoomMessage::Play {
                connection_id,
                time,
            } => {
                self.handle_playback(&connection_id, ServerEvent::Play { time }, time, true);
            }

            RoomMessage::Pause {
                connection_id,
                time,
            } => {
                self.handle_playback(&connection_id, ServerEvent::Pause { time }, time, false);
            }

            RoomMessage::Seek {
                connection_id,
                time,
            } => {
                self.handle_playback(&connection_id, ServerEvent::Seek { time }, time, false);
            }

            RoomMessage::TimeUpdate {
                connection_id,
                time,
                is_playing,
            } => {
                self.handle_time_update(&connection_id, time, is_playing);
            }

            RoomMessage::PlaylistGet { connection_id } => {
                self.send_to(
                    &connection_id,
                    ServerEvent::PlaylistUpdate {
                        playlist: self.state.playlist().to_vec(),
                        current_index: self.state.current_index(),
                    },
                );
            }

            RoomMessage::PlaylistAdd {
                connection_id,
                url,
                title,
            } => {
                self.handle_playlist_add(&connection_id, url, title);
            }

            RoomMessage::PlaylistRemove {
                connection_id,
                item_id,
            } => {
                self.handle_playlist_remove(&connection_id, &item_id);
            }

            RoomMessage::PlaylistPlay {
                connection_id,
                index,
            } => {
                self.handle_playlist_play(&connection_id, index);
            }

            RoomMessage::Chat {
                connection_id,
                message,
            } => {
                self.handle_chat(&connection_id, message);
            }

            RoomMessage::Reaction {
                connection_id,
                emoji,
                username,
                x,
                y,
            } => {
                self.handle_reaction(&connection_id, emoji, username, x, y);
            }

            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }

        false
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id.clone(),
            host_id: self.state.host_id().to_string(),
            users: self.state.member_ids(),
            all_buffered: self.state.all_buffered(),
            playlist: self.state.playlist().to_vec(),
            current_index: self.state.current_index(),
        }
    }

    /// Handle a connection joining the room.
    #[instrument(skip_all, fields(room_id = %self.room_id, connection_id = %connection_id))]
    fn handle_join(&mut self, connection_id: &str, display_name: &str, sender: OutboundSender) {
        let is_new_room = self.state.is_empty();

        self.state.add_member(connection_id, display_name);
        self.senders.insert(connection_id.to_string(), sender);

        if is_new_room {
            self.state.set_host(connection_id);
            self.send_to(connection_id, ServerEvent::IsHost { is_host: true });
            debug!(target: "rc.actor.room", "Room created, joiner granted host");
        } else if !self.state.host_present() {
            // Recorded host is gone: the joiner recovers host authority.
            self.state.set_host(connection_id);
            self.send_to(connection_id, ServerEvent::IsHost { is_host: true });
            self.broadcast(ServerEvent::HostChanged {
                host_id: connection_id.to_string(),
            });
            info!(target: "rc.actor.room", "Host absent, joiner recovered host authority");
        } else if self.state.is_host(connection_id) {
            // Reconnecting host gets its authority confirmed.
            self.send_to(connection_id, ServerEvent::IsHost { is_host: true });
        } else {
            self.send_to(connection_id, ServerEvent::IsHost { is_host: false });
            let host_id = self.state.host_id().to_string();
            self.send_to(
                &host_id,
                ServerEvent::SyncRequest {
                    requester_id: connection_id.to_string(),
                },
            );
        }

        let others: Vec<String> = self
            .state
            .member_ids()
            .into_iter()
            .filter(|id| id != connection_id)
            .collect();
        self.send_to(connection_id, ServerEvent::AllUsers { users: others });
        self.send_to(
            connection_id,
            ServerEvent::GlobalBufferState {
                is_ready: self.state.all_buffered(),
            },
        );

        self.broadcast(ServerEvent::Presence {
            users: self.state.presence(),
        });

        if let Some(joiner) = self.senders.get(connection_id) {
            self.emit_persisted_state(vec![joiner.clone()]);
        }

        info!(
            target: "rc.actor.room",
            members = self.state.member_count(),
            "Member joined"
        );
    }

    /// Handle a connection leaving. Returns true when the room emptied.
    fn handle_leave(&mut self, connection_id: &str) -> bool {
        if !self.state.remove_member(connection_id) {
            return false;
        }
        self.senders.remove(connection_id);

        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            "Member left"
        );

        if self.state.is_empty() {
            info!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                "Last member left, room closing"
            );
            return true;
        }

        // Departure can flip the buffer gate open if the leaver was the
        // holdout.
        self.broadcast_buffer_gate();

        if !self.state.host_present() {
            if let Some(next_host) = self.state.first_member().map(str::to_string) {
                self.state.set_host(&next_host);
                self.send_to(&next_host, ServerEvent::IsHost { is_host: true });
                self.broadcast(ServerEvent::HostChanged {
                    host_id: next_host.clone(),
                });
                // Re-anchor everyone on the last persisted position; the new
                // host may be anywhere.
                self.emit_persisted_state(self.senders.values().cloned().collect());
                info!(
                    target: "rc.actor.room",
                    room_id = %self.room_id,
                    new_host = %next_host,
                    "Host left, promoted first remaining member"
                );
            }
        }

        self.broadcast(ServerEvent::Presence {
            users: self.state.presence(),
        });

        false
    }

    /// Handle a connection joining the voice channel, adding it to the room
    /// if it is not yet a member.
    fn handle_join_voice(&mut self, connection_id: &str, sender: OutboundSender) {
        if !self.state.contains(connection_id) {
            self.state.add_member(connection_id, DEFAULT_DISPLAY_NAME);
        }
        self.senders
            .entry(connection_id.to_string())
            .or_insert(sender);
        if !self.state.host_present() {
            self.state.set_host(connection_id);
        }

        let others: Vec<String> = self
            .state
            .member_ids()
            .into_iter()
            .filter(|id| id != connection_id)
            .collect();
        self.send_to(connection_id, ServerEvent::VoiceAllUsers { users: others });
        self.broadcast_except(
            connection_id,
            ServerEvent::VoiceUserJoined {
                user_id: connection_id.to_string(),
            },
        );
    }

    fn handle_buffer_status(&mut self, connection_id: &str, is_buffered: bool) {
        if !self.state.contains(connection_id) {
            debug!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                connection_id = %connection_id,
                "Buffer status from non-member ignored"
            );
            return;
        }
        self.state.set_buffered(connection_id, is_buffered);
        self.broadcast_buffer_gate();
    }

    fn handle_force_ready(&mut self, connection_id: &str) {
        if !self.require_host(connection_id, "force-ready") {
            return;
        }
        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            "Host forced all members ready"
        );
        self.state.force_all_buffered();
        self.broadcast_buffer_gate();
    }

    fn handle_transfer_host(&mut self, connection_id: &str, target_id: &str) {
        if !self.require_host(connection_id, "transfer-host") {
            return;
        }
        if !self.state.contains(target_id) {
            debug!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                "Host transfer to non-member ignored"
            );
            return;
        }

        self.state.set_host(target_id);
        self.send_to(target_id, ServerEvent::IsHost { is_host: true });
        self.broadcast(ServerEvent::HostChanged {
            host_id: target_id.to_string(),
        });
        self.broadcast(ServerEvent::Presence {
            users: self.state.presence(),
        });

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            new_host = %target_id,
            "Host authority transferred"
        );
    }

    /// Relay a host playback command to every other member and persist the
    /// new position.
    fn handle_playback(
        &mut self,
        connection_id: &str,
        event: ServerEvent,
        time: f64,
        is_playing: bool,
    ) {
        if !self.require_host(connection_id, "playback") {
            return;
        }
        self.broadcast_except(connection_id, event);
        self.persist(time, is_playing);
    }

    fn handle_time_update(&mut self, connection_id: &str, time: f64, is_playing: bool) {
        if !self.require_host(connection_id, "time-update") {
            return;
        }
        self.broadcast_except(
            connection_id,
            ServerEvent::SyncCheck {
                time,
                is_playing,
                sent_at: chrono::Utc::now().timestamp_millis(),
            },
        );
        self.persist(time, is_playing);
    }

    fn handle_playlist_add(&mut self, connection_id: &str, url: String, title: String) {
        if !self.require_host(connection_id, "playlist-add") {
            return;
        }
        let added_by = self
            .state
            .display_name(connection_id)
            .unwrap_or("Host")
            .to_string();
        self.state.add_playlist_item(url, title, added_by);
        self.broadcast_playlist();
    }

    fn handle_playlist_remove(&mut self, connection_id: &str, item_id: &str) {
        if !self.require_host(connection_id, "playlist-remove") {
            return;
        }
        if !self.state.remove_playlist_item(item_id) {
            return;
        }
        self.broadcast_playlist();
    }

    fn handle_playlist_play(&mut self, connection_id: &str, index: usize) {
        if !self.require_host(connection_id, "playlist-play") {
            return;
        }
        let Some(item) = self.state.select_playlist_index(index) else {
            debug!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                index,
                "Playlist index out of bounds"
            );
            return;
        };
        let url = item.url.clone();

        self.broadcast_playlist();
        self.broadcast(ServerEvent::PlaylistNext { index, url });
    }

    fn handle_chat(&mut self, connection_id: &str, message: String) {
        let sender_name = self
            .state
            .display_name(connection_id)
            .unwrap_or_default()
            .to_string();
        self.broadcast(ServerEvent::ReceiveMessage {
            message,
            sender_id: connection_id.to_string(),
            sender_name,
        });
    }

    fn handle_reaction(
        &mut self,
        connection_id: &str,
        emoji: String,
        username: String,
        x: f64,
        y: f64,
    ) {
        let id = format!("{connection_id}-{}", chrono::Utc::now().timestamp_millis());
        self.broadcast(ServerEvent::Reaction {
            id,
            emoji,
            username,
            x,
            y,
        });
    }

    /// Recompute and broadcast the buffer gate, arming or disarming the
    /// auto-recovery deadline on the transition.
    fn broadcast_buffer_gate(&mut self) {
        let is_ready = self.state.all_buffered();

        if is_ready {
            if self.recovery_deadline.take().is_some() {
                debug!(
                    target: "rc.actor.room",
                    room_id = %self.room_id,
                    "Buffer gate reopened, auto-recovery disarmed"
                );
            }
        } else if self.recovery_deadline.is_none() {
            self.recovery_deadline = Some(Instant::now() + self.recovery_after);
            debug!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                "Buffer gate closed, auto-recovery armed"
            );
        }

        self.broadcast(ServerEvent::GlobalBufferState { is_ready });
    }

    /// The auto-recovery deadline expired: force every flag ready so one
    /// stalled member cannot freeze the room.
    fn apply_buffer_recovery(&mut self) {
        self.recovery_deadline = None;
        warn!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            "Buffer gate stalled past deadline, forcing all members ready"
        );
        self.state.force_all_buffered();
        self.broadcast_buffer_gate();
    }

    /// Host-authority guard for mutating commands. Non-host commands are
    /// dropped without a reply.
    fn require_host(&self, connection_id: &str, operation: &str) -> bool {
        if self.state.is_host(connection_id) {
            return true;
        }
        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            operation = %operation,
            "Non-host command ignored"
        );
        false
    }

    fn broadcast_playlist(&self) {
        self.broadcast(ServerEvent::PlaylistUpdate {
            playlist: self.state.playlist().to_vec(),
            current_index: self.state.current_index(),
        });
    }

    fn send_to(&self, connection_id: &str, event: ServerEvent) {
        if let Some(sender) = self.senders.get(connection_id) {
            let _ = sender.send(event);
        }
    }

    fn broadcast(&self, event: ServerEvent) {
        for sender in self.senders.values() {
            let _ = sender.send(event.clone());
        }
    }

    fn broadcast_except(&self, except_connection_id: &str, event: ServerEvent) {
        for (connection_id, sender) in &self.senders {
            if connection_id != except_connection_id {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Fire-and-forget snapshot write; failures are logged and swallowed.
    fn persist(&self, time: f64, is_playing: bool) {
        let store = Arc::clone(&self.store);
        let room_id = self.room_id.clone();
        tokio::spawn(async move {
            if let Err(e) = store
                .write(&room_id, PlaybackSnapshot { time, is_playing })
                .await
            {
                warn!(
                    target: "rc.actor.room",
                    room_id = %room_id,
                    error = %e,
                    "Failed to persist playback snapshot"
                );
            }
        });
    }

    /// Fire-and-forget snapshot read, pushed to the given targets as a
    /// `persisted-state` event. Rooms never persisted emit nothing.
    fn emit_persisted_state(&self, targets: Vec<OutboundSender>) {
        let store = Arc::clone(&self.store);
        let room_id = self.room_id.clone();
        tokio::spawn(async move {
            match store.read(&room_id).await {
                Ok(Some(snapshot)) => {
                    for target in targets {
                        let _ = target.send(ServerEvent::PersistedState {
                            time: snapshot.time,
                            is_playing: snapshot.is_playing,
                        });
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        target: "rc.actor.room",
                        room_id = %room_id,
                        error = %e,
                        "Failed to read playback snapshot"
                    );
                }
            }
        });
    }
}
