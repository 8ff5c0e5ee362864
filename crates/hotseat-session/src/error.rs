//! Error types for the session layer.

use hotseat_protocol::{ConnectionId, PlayerId, RoomId};

/// Errors raised while routing events to connections.
///
/// None of these are fatal to the server; they mean one recipient missed
/// one event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The connection never registered, or has already gone away.
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    /// The connection's writer has stopped; the event was dropped.
    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    /// No live connection is bound to this player in this room.
    #[error("no connection for player {player_id} in room {room_id}")]
    NoConnection { room_id: RoomId, player_id: PlayerId },
}
