//! Unified error type for the Hotseat server.

use hotseat_protocol::ProtocolError;
use hotseat_room::{ErrorKind, RoomError};
use hotseat_session::SessionError;
use hotseat_transport::TransportError;

/// Top-level error wrapping every layer's error.
///
/// `#[from]` on each variant lets `?` lift sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum HotseatError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    /// The connection has not joined a room yet.
    #[error("join a room first")]
    NotInRoom,
}

impl HotseatError {
    /// Classification for domain failures; `None` for I/O and codec errors.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Room(err) => Some(err.kind()),
            Self::NotInRoom => Some(ErrorKind::PreconditionFailed),
            _ => None,
        }
    }

    /// The text sent to the client in an `error` event.
    pub fn client_message(&self) -> String {
        match self {
            Self::Protocol(ProtocolError::Decode(err)) => format!("invalid message: {err}"),
            other => other.to_string(),
        }
    }
}
