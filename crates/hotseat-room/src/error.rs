//! Error types for the room layer.

use hotseat_protocol::{MessageId, PlayerId, RoomId};

/// Coarse classification of a [`RoomError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The room is not in a state that allows the operation.
    PreconditionFailed,
    /// The request names something that cannot be used.
    InvalidArgument,
    /// The acting player is not allowed to do this.
    Forbidden,
    /// The room, player, or confession does not exist.
    NotFound,
}

/// Errors raised by room operations and game rules.
///
/// Every failing operation leaves the room exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    #[error("player {0} is not in this room")]
    PlayerNotFound(PlayerId),

    #[error("confession {0} not found")]
    MessageNotFound(MessageId),

    #[error("at least {required} players are needed to start (have {present})")]
    NotEnoughPlayers { required: usize, present: usize },

    #[error("the game has not started")]
    GameNotStarted,

    #[error("player {0} has already been the target")]
    AlreadyTargeted(PlayerId),

    #[error("player {0} does not exist")]
    UnknownTarget(PlayerId),

    #[error("the target cannot send confessions")]
    TargetCannotConfess,

    #[error("only the target can respond to confessions")]
    OnlyTargetMayExplain,

    #[error("the target cannot vote")]
    TargetCannotVote,

    #[error("only the current target can choose the next target")]
    OnlyTargetMayAdvance,
}

impl RoomError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotEnoughPlayers { .. } | Self::GameNotStarted => ErrorKind::PreconditionFailed,
            Self::AlreadyTargeted(_) | Self::UnknownTarget(_) => ErrorKind::InvalidArgument,
            Self::TargetCannotConfess
            | Self::OnlyTargetMayExplain
            | Self::TargetCannotVote
            | Self::OnlyTargetMayAdvance => ErrorKind::Forbidden,
            Self::RoomNotFound(_) | Self::PlayerNotFound(_) | Self::MessageNotFound(_) => {
                ErrorKind::NotFound
            }
        }
    }
}
