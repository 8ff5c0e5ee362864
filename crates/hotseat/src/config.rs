//! Server configuration.
//!
//! Defaults are usable as-is; `from_env` overrides them from `HOTSEAT_*`
//! variables. A value that does not parse is ignored with a warning.

use hotseat_room::RoomConfig;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Everything needed to run a [`HotseatServer`](crate::HotseatServer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            room: RoomConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads `HOTSEAT_BIND_ADDR`, `HOTSEAT_LOG` and `HOTSEAT_MIN_PLAYERS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HOTSEAT_BIND_ADDR").filter(|v| !v.trim().is_empty()) {
            config.bind_addr = addr.trim().to_string();
        }
        if let Some(filter) = lookup("HOTSEAT_LOG").filter(|v| !v.trim().is_empty()) {
            config.log_filter = filter.trim().to_string();
        }
        if let Some(min) = parse_var::<usize>(&lookup, "HOTSEAT_MIN_PLAYERS") {
            if min < 2 {
                tracing::warn!(min_players = min, "HOTSEAT_MIN_PLAYERS below 2, using 2");
            }
            config.room = RoomConfig::with_min_players(min);
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
