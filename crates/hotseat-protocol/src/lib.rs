//! Wire protocol for Hotseat.
//!
//! Every frame on the wire is an [`Envelope`]: `{ "type": <string>, "data": <object> }`.
//!
//! - **Types** ([`PlayerId`], [`RoomId`], [`MessageId`], [`GameState`]):
//!   identifiers shared by every layer.
//! - **Events** ([`ClientEvent`], [`ServerEvent`]): the typed form of an
//!   envelope, one variant per `type` tag.
//! - **Views** ([`RoomSnapshot`], [`PlayerView`], [`ConfessionView`]):
//!   what clients are allowed to see of room state.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes in, bytes out.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope → ClientEvent) → Dispatcher
//! ```

mod codec;
mod error;
mod events;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use events::{
    ClientEvent, ConfessionView, Envelope, ExplanationData, JoinRoomData, MessageData,
    PlayerView, RoomSnapshot, SelectTargetData, ServerEvent, VoteData, VoteStatus,
};
pub use types::{GameState, MessageId, PlayerId, RoomId};

pub use hotseat_transport::ConnectionId;
