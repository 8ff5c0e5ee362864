//! Room configuration.

use serde::{Deserialize, Serialize};

/// Configuration applied to every room a [`RoomStore`](crate::RoomStore)
/// creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Minimum players required to start a game. Never below 2: someone
    /// has to be the target and someone has to vote.
    pub min_players: usize,
}

impl RoomConfig {
    /// Returns a config with `min_players` raised to at least 2.
    pub fn with_min_players(min_players: usize) -> Self {
        Self {
            min_players: min_players.max(2),
        }
    }
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self { min_players: 2 }
    }
}
