//! Per-connection handler: reader loop, writer task, and cleanup.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register an outbox with the dispatcher and spawn the writer task
//!   2. Loop: receive frame → decode → dispatch
//!   3. On close or error the guard disconnects the player

use std::sync::Arc;

use hotseat_protocol::{ClientEvent, Codec, ConnectionId, Envelope, ProtocolError, ServerEvent};
use hotseat_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::ServerState;

/// Drop guard that takes the player out of their room when the handler
/// exits, even by panic. `Drop` is synchronous, so the async cleanup runs
/// in a spawned task.
struct ConnectionGuard<C: Codec> {
    connection: ConnectionId,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        let connection = self.connection;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.dispatcher.disconnect(connection).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) {
    let conn = Arc::new(conn);
    let connection = conn.id();
    tracing::debug!(%connection, "handling new connection");

    let (outbox, inbox) = mpsc::unbounded_channel();
    state.dispatcher.connect(connection, outbox);
    let _guard = ConnectionGuard {
        connection,
        state: Arc::clone(&state),
    };
    tokio::spawn(write_loop(Arc::clone(&conn), inbox, Arc::clone(&state)));

    loop {
        let frame = match conn.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!(%connection, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%connection, error = %e, "recv error");
                break;
            }
        };

        match decode_event(&state.codec, &frame) {
            Ok(event) => state.dispatcher.dispatch(connection, event).await,
            Err(e) => {
                tracing::debug!(%connection, error = %e, "failed to decode frame");
                state.dispatcher.reject(connection, &e.into());
            }
        }
    }

    // _guard drops here → disconnect fires, the outbox goes away, and the
    // writer drains what is left and closes the socket.
}

/// Reads the envelope first so an unknown `type` is reported by name.
fn decode_event(codec: &impl Codec, frame: &[u8]) -> Result<ClientEvent, ProtocolError> {
    let envelope: Envelope = codec.decode(frame)?;
    ClientEvent::try_from(envelope)
}

/// Drains the outbox onto the socket until every sender is gone or the
/// socket fails.
async fn write_loop<C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut inbox: mpsc::UnboundedReceiver<ServerEvent>,
    state: Arc<ServerState<C>>,
) {
    let connection = conn.id();
    while let Some(event) = inbox.recv().await {
        let bytes = match state.codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(%connection, kind = event.kind(), error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%connection, error = %e, "send failed, stopping writer");
            break;
        }
    }
    if let Err(e) = conn.close().await {
        tracing::debug!(%connection, error = %e, "close failed");
    }
}
