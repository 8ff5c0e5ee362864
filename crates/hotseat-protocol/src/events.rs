//! Inbound and outbound events, and the views of room state they carry.
//!
//! Inbound frames are decoded in two steps: bytes → [`Envelope`] (any
//! `type` string) → [`ClientEvent`] (one variant per known tag). The second
//! step is where unknown tags are rejected, so the caller can answer with a
//! precise error instead of a generic parse failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{GameState, MessageId, PlayerId, ProtocolError, RoomId};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The untyped wire frame: `{ "type": <string>, "data": <object> }`.
///
/// `data` may be omitted for events that carry no fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomData {
    pub room_id: RoomId,
    pub player_id: PlayerId,
    pub player_name: String,
}

/// Payload of `send-chat-message` and `send-confession`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationData {
    pub confession_id: MessageId,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteData {
    pub agree: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectTargetData {
    pub target_id: PlayerId,
}

/// An event sent by a client.
///
/// Serializes to the envelope shape directly. Decoding goes through
/// [`Envelope`] and `TryFrom` so unknown tags surface as
/// [`ProtocolError::UnknownType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinRoom(JoinRoomData),
    StartGame,
    SendChatMessage(MessageData),
    SendConfession(MessageData),
    SendExplanation(ExplanationData),
    Vote(VoteData),
    SelectNextTarget(SelectTargetData),
    LeaveRoom,
}

impl ClientEvent {
    /// The wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "join-room",
            Self::StartGame => "start-game",
            Self::SendChatMessage(_) => "send-chat-message",
            Self::SendConfession(_) => "send-confession",
            Self::SendExplanation(_) => "send-explanation",
            Self::Vote(_) => "vote",
            Self::SelectNextTarget(_) => "select-next-target",
            Self::LeaveRoom => "leave-room",
        }
    }
}

fn fields<T: DeserializeOwned>(data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(ProtocolError::Decode)
}

impl TryFrom<Envelope> for ClientEvent {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let Envelope { kind, data } = envelope;
        let event = match kind.as_str() {
            "join-room" => Self::JoinRoom(fields(data)?),
            "start-game" => Self::StartGame,
            "send-chat-message" => Self::SendChatMessage(fields(data)?),
            "send-confession" => Self::SendConfession(fields(data)?),
            "send-explanation" => Self::SendExplanation(fields(data)?),
            "vote" => Self::Vote(fields(data)?),
            "select-next-target" => Self::SelectNextTarget(fields(data)?),
            "leave-room" => Self::LeaveRoom,
            _ => return Err(ProtocolError::UnknownType(kind)),
        };
        Ok(event)
    }
}

impl<'de> Deserialize<'de> for ClientEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let envelope = Envelope::deserialize(deserializer)?;
        Self::try_from(envelope).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Public face of a player: no connection details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
}

/// A confession as clients see it.
///
/// Has no sender field, so it cannot leak who wrote the confession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfessionView {
    pub id: MessageId,
    pub message: String,
    pub explanation: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteStatus {
    pub count: usize,
    pub required: usize,
}

/// Full room state as sent in `join-room-success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub players: Vec<PlayerView>,
    pub game_state: GameState,
    pub current_target: Option<PlayerId>,
    pub target_history: Vec<PlayerId>,
    pub confessions: Vec<ConfessionView>,
    pub votes: VoteStatus,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// An event sent by the server.
///
/// `timestamp` fields on chat and explanation events are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    JoinRoomSuccess {
        player: PlayerView,
        room: RoomSnapshot,
    },
    PlayerListUpdated {
        players: Vec<PlayerView>,
    },
    GameStarted {
        target: PlayerId,
        target_name: String,
    },
    ChatMessage {
        sender_id: PlayerId,
        sender_name: String,
        message: String,
        timestamp: i64,
    },
    ConfessionSent {
        confession_id: MessageId,
    },
    ConfessionReceived(ConfessionView),
    ExplanationReceived {
        confession_id: MessageId,
        explanation: String,
        timestamp: i64,
    },
    VoteUpdated {
        votes: usize,
        required: usize,
    },
    VoteComplete {
        all_agree: bool,
    },
    NewTargetSelected {
        target: PlayerId,
        target_name: String,
    },
    GameReset {
        message: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// The wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoomSuccess { .. } => "join-room-success",
            Self::PlayerListUpdated { .. } => "player-list-updated",
            Self::GameStarted { .. } => "game-started",
            Self::ChatMessage { .. } => "chat-message",
            Self::ConfessionSent { .. } => "confession-sent",
            Self::ConfessionReceived(_) => "confession-received",
            Self::ExplanationReceived { .. } => "explanation-received",
            Self::VoteUpdated { .. } => "vote-updated",
            Self::VoteComplete { .. } => "vote-complete",
            Self::NewTargetSelected { .. } => "new-target-selected",
            Self::GameReset { .. } => "game-reset",
            Self::Error { .. } => "error",
        }
    }
}
