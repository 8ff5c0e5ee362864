//! Identifier newtypes and the room lifecycle state shared by every layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Defines a string-backed identifier newtype.
///
/// Player and room ids are chosen by clients, so they are opaque strings.
/// `#[serde(transparent)]` keeps them plain JSON strings on the wire.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Returns the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id! {
    /// Stable player identity. Survives reconnects; the connection does not.
    PlayerId
}

string_id! {
    /// Identifier of one game room.
    RoomId
}

string_id! {
    /// Identifier of one confession, generated server-side.
    MessageId
}

impl MessageId {
    /// Generates a fresh random id (UUID v4), unique for the process lifetime.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// The lifecycle state of a room.
///
/// ```text
/// Waiting ──(start, ≥2 players)──→ Playing
///    ↑                               │
///    └──(reset / target leaves)──────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameState {
    #[default]
    Waiting,
    Playing,
}

impl GameState {
    /// Returns `true` while a round is in progress.
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "WAITING"),
            Self::Playing => write!(f, "PLAYING"),
        }
    }
}
