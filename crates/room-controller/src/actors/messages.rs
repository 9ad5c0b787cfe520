//! Message types: the JSON wire protocol and the actor mailbox enums.
//!
//! Wire enums are tagged by a kebab-case `type` field with camelCase payload
//! fields. Mailbox enums are internal and never serialized.

use crate::state::{PlaylistItem, PresenceEntry};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// Outbound event channel for one connection. The WebSocket layer drains the
/// receiving end and serializes events onto the socket.
pub type OutboundSender = mpsc::UnboundedSender<ServerEvent>;

/// Commands received from clients over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    JoinRoom {
        room_id: String,
        #[serde(default)]
        username: Option<String>,
    },
    Heartbeat {
        room_id: String,
    },
    BufferStatus {
        room_id: String,
        is_buffered: bool,
    },
    ForceReady {
        room_id: String,
    },
    TransferHost {
        room_id: String,
        target_id: String,
    },
    Play {
        room_id: String,
        time: f64,
    },
    Pause {
        room_id: String,
        time: f64,
    },
    Seek {
        room_id: String,
        time: f64,
    },
    TimeUpdate {
        room_id: String,
        time: f64,
        is_playing: bool,
    },
    SyncResponse {
        requester_id: String,
        time: f64,
        is_playing: bool,
    },
    PlaylistGet {
        room_id: String,
    },
    PlaylistAdd {
        room_id: String,
        url: String,
        title: String,
    },
    PlaylistRemove {
        room_id: String,
        item_id: String,
    },
    PlaylistPlay {
        room_id: String,
        index: usize,
    },
    SendMessage {
        room_id: String,
        message: String,
    },
    SendReaction {
        room_id: String,
        emoji: String,
        username: String,
        x: f64,
        y: f64,
    },
    JoinVoiceChat {
        room_id: String,
    },
    VoiceSendingSignal {
        user_to_signal: String,
        signal: serde_json::Value,
        caller_id: String,
    },
    VoiceReturningSignal {
        signal: serde_json::Value,
        caller_id: String,
    },
}

impl ClientCommand {
    /// Stable command kind used as the rate-limiter key and in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ClientCommand::JoinRoom { .. } => "join-room",
            ClientCommand::Heartbeat { .. } => "heartbeat",
            ClientCommand::BufferStatus { .. } => "buffer-status",
            ClientCommand::ForceReady { .. } => "force-ready",
            ClientCommand::TransferHost { .. } => "transfer-host",
            ClientCommand::Play { .. } => "play",
            ClientCommand::Pause { .. } => "pause",
            ClientCommand::Seek { .. } => "seek",
            ClientCommand::TimeUpdate { .. } => "time-update",
            ClientCommand::SyncResponse { .. } => "sync-response",
            ClientCommand::PlaylistGet { .. } => "playlist-get",
            ClientCommand::PlaylistAdd { .. } => "playlist-add",
            ClientCommand::PlaylistRemove { .. } => "playlist-remove",
            ClientCommand::PlaylistPlay { .. } => "playlist-play",
            ClientCommand::SendMessage { .. } => "send-message",
            ClientCommand::SendReaction { .. } => "send-reaction",
            ClientCommand::JoinVoiceChat { .. } => "join-voice-chat",
            ClientCommand::VoiceSendingSignal { .. } => "voice-sending-signal",
            ClientCommand::VoiceReturningSignal { .. } => "voice-returning-signal",
        }
    }
}

/// Events pushed to clients over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    IsHost {
        is_host: bool,
    },
    HostChanged {
        host_id: String,
    },
    SyncRequest {
        requester_id: String,
    },
    /// Other members' connection ids, sent to a joiner.
    AllUsers {
        users: Vec<String>,
    },
    GlobalBufferState {
        is_ready: bool,
    },
    Presence {
        users: Vec<PresenceEntry>,
    },
    PersistedState {
        time: f64,
        is_playing: bool,
    },
    Play {
        time: f64,
    },
    Pause {
        time: f64,
    },
    Seek {
        time: f64,
    },
    SyncCheck {
        time: f64,
        is_playing: bool,
        /// Server wall-clock stamp in unix milliseconds, for delay
        /// compensation on the receiver.
        sent_at: i64,
    },
    SyncResponse {
        time: f64,
        is_playing: bool,
    },
    PlaylistUpdate {
        playlist: Vec<PlaylistItem>,
        current_index: usize,
    },
    PlaylistNext {
        index: usize,
        url: String,
    },
    ReceiveMessage {
        message: String,
        sender_id: String,
        sender_name: String,
    },
    Reaction {
        id: String,
        emoji: String,
        username: String,
        x: f64,
        y: f64,
    },
    VoiceAllUsers {
        users: Vec<String>,
    },
    VoiceUserJoined {
        user_id: String,
    },
    VoiceUserJoinedSignal {
        signal: serde_json::Value,
        caller_id: String,
    },
    VoiceReceivingReturnedSignal {
        signal: serde_json::Value,
        id: String,
    },
}

/// Point-in-time view of a room, for the coordinator and tests.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub host_id: String,
    /// Member connection ids in join order.
    pub users: Vec<String>,
    pub all_buffered: bool,
    pub playlist: Vec<PlaylistItem>,
    pub current_index: usize,
}

/// Messages handled by a `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    Join {
        connection_id: String,
        display_name: String,
        sender: OutboundSender,
    },
    Leave {
        connection_id: String,
    },
    JoinVoice {
        connection_id: String,
        sender: OutboundSender,
    },
    BufferStatus {
        connection_id: String,
        is_buffered: bool,
    },
    ForceReady {
        connection_id: String,
    },
    TransferHost {
        connection_id: String,
        target_id: String,
    },
    Play {
        connection_id: String,
        time: f64,
    },
    Pause {
        connection_id: String,
        time: f64,
    },
    Seek {
        connection_id: String,
        time: f64,
    },
    TimeUpdate {
        connection_id: String,
        time: f64,
        is_playing: bool,
    },
    PlaylistGet {
        connection_id: String,
    },
    PlaylistAdd {
        connection_id: String,
        url: String,
        title: String,
    },
    PlaylistRemove {
        connection_id: String,
        item_id: String,
    },
    PlaylistPlay {
        connection_id: String,
        index: usize,
    },
    Chat {
        connection_id: String,
        message: String,
    },
    Reaction {
        connection_id: String,
        emoji: String,
        username: String,
        x: f64,
        y: f64,
    },
    GetState {
        respond_to: oneshot::Sender<RoomSnapshot>,
    },
}

/// Coordinator status, for health reporting and tests.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorStatus {
    pub connections: usize,
    pub rooms: usize,
}

/// Messages handled by the `CoordinatorActor`.
#[derive(Debug)]
pub enum CoordinatorMessage {
    Connect {
        connection_id: String,
        sender: OutboundSender,
    },
    Disconnect {
        connection_id: String,
    },
    Command {
        connection_id: String,
        command: ClientCommand,
    },
    GetRoomSnapshot {
        room_id: String,
        respond_to: oneshot::Sender<Option<RoomSnapshot>>,
    },
    GetStatus {
        respond_to: oneshot::Sender<CoordinatorStatus>,
    },
}
