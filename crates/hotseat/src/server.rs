//! `HotseatServer` builder and server loop.
//!
//! Ties the layers together: transport → protocol → dispatcher → session
//! and room.

use std::net::SocketAddr;
use std::sync::Arc;

use hotseat_protocol::{Codec, JsonCodec};
use hotseat_room::{GameService, RoomConfig, RoomStore};
use hotseat_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{Dispatcher, HotseatError, ServerConfig};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) codec: C,
}

/// Builder for configuring and starting a Hotseat server.
///
/// # Example
///
/// ```rust,no_run
/// use hotseat::prelude::*;
///
/// # async fn run() -> Result<(), HotseatError> {
/// let server = HotseatServer::builder()
///     .bind("0.0.0.0:8080")
///     .room_config(RoomConfig::with_min_players(3))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct HotseatServerBuilder {
    config: ServerConfig,
}

impl HotseatServerBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every setting at once.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn room_config(mut self, room: RoomConfig) -> Self {
        self.config.room = room;
        self
    }

    /// Binds the listener. Uses `JsonCodec` on the WebSocket transport.
    pub async fn build(self) -> Result<HotseatServer<JsonCodec>, HotseatError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let service = GameService::new(RoomStore::new(self.config.room));

        let state = Arc::new(ServerState {
            dispatcher: Dispatcher::new(service),
            codec: JsonCodec,
        });

        Ok(HotseatServer { transport, state })
    }
}

/// A bound Hotseat server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct HotseatServer<C: Codec = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl HotseatServer {
    /// Creates a new builder.
    pub fn builder() -> HotseatServerBuilder {
        HotseatServerBuilder::new()
    }
}

impl<C: Codec> HotseatServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(mut self) -> Result<(), HotseatError> {
        tracing::info!("hotseat server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(handle_connection(conn, state));
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
