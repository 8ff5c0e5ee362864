//! Room state and game rules for Hotseat.
//!
//! Every room sits behind its own mutex inside the [`RoomStore`]; the
//! [`GameService`] takes that lock for the full read-validate-mutate cycle
//! of each operation and hands the still-locked result back as a
//! [`Committed`] value so callers can publish it before anything else
//! touches the room.
//!
//! # Key types
//!
//! - [`Room`]: the aggregate: players, target rotation, confessions, votes
//! - [`RoomStore`]: concurrent registry of rooms, created lazily
//! - [`GameService`]: rules that compare the acting player with room state
//! - [`RoomError`] / [`ErrorKind`]: failures and their taxonomy
//! - [`RoomConfig`]: room settings

mod config;
mod error;
mod room;
mod service;
mod store;

pub use config::RoomConfig;
pub use error::{ErrorKind, RoomError};
pub use room::{Message, Player, Room, VoteTally};
pub use service::{ChatLine, Committed, Departure, GameService, Joined};
pub use store::{RoomSlot, RoomStore};
