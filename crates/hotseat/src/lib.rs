//! # Hotseat
//!
//! A real-time party game server. Players gather in a room; one of them is
//! the *target* and receives anonymous confessions from everyone else,
//! answers them, and the room votes on whether the answers hold up.
//!
//! The crate wires the layers together:
//!
//! ```text
//! WebSocket frames  ── hotseat-transport
//!     ↕
//! JSON envelopes    ── hotseat-protocol
//!     ↕
//! Dispatcher        ── this crate
//!     ↕                  ↘
//! GameService/Room      ConnectionDirectory
//! (hotseat-room)        (hotseat-session)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hotseat::prelude::*;
//!
//! # async fn run() -> Result<(), HotseatError> {
//! let server = HotseatServer::builder().bind("0.0.0.0:8080").build().await?;
//! server.run().await
//! # }
//! ```

mod config;
mod dispatcher;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use dispatcher::{Dispatcher, TARGET_LEFT_MESSAGE};
pub use error::HotseatError;
pub use server::{HotseatServer, HotseatServerBuilder};

/// Common imports for running a server or talking to one.
pub mod prelude {
    pub use crate::{
        Dispatcher, HotseatError, HotseatServer, HotseatServerBuilder, ServerConfig,
        TARGET_LEFT_MESSAGE,
    };
    pub use hotseat_protocol::{
        ClientEvent, Codec, ConfessionView, Envelope, ExplanationData, GameState, JoinRoomData,
        JsonCodec, MessageData, MessageId, PlayerId, PlayerView, RoomId, RoomSnapshot,
        SelectTargetData, ServerEvent, VoteData, VoteStatus,
    };
    pub use hotseat_room::{ErrorKind, RoomConfig, RoomError};
}
