//! Connection tracking and event delivery for Hotseat.
//!
//! A room knows its players; it does not know how to reach them. This
//! crate fills that gap:
//!
//! 1. **Outboxes**: every live connection registers a channel its writer
//!    task drains ([`ConnectionDirectory::connect`])
//! 2. **Bindings**: which room and player a connection currently acts for,
//!    indexed both ways ([`ConnectionDirectory::register`],
//!    [`ConnectionDirectory::connections_in_room`],
//!    [`ConnectionDirectory::connection_of`])
//! 3. **Delivery**: room broadcast, per-player delivery, and fan-out that
//!    never stops at a dead recipient ([`DeliveryReport`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatcher (above)  ← decides who hears what
//!     ↕
//! Session Layer (this crate)  ← connection → room/player, connection → outbox
//!     ↕
//! Protocol Layer (below)  ← ServerEvent, ConnectionId, ids
//! ```

mod directory;
mod error;

pub use directory::{Binding, ConnectionDirectory, DeliveryReport, Outbox};
pub use error::SessionError;
