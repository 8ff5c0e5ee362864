//! The connection directory: who is connected, what they are bound to, and
//! how to reach them.
//!
//! Four sharded [`DashMap`]s back it, so the directory can be shared across
//! connection tasks behind an `Arc` without an outer lock:
//!
//! - connection → outbox
//! - connection → (room, player)
//! - (room, player) → connection
//! - room → live connections
//!
//! No map guard is held across an `.await`, and no guard on one map is
//! held while the same map is written.

use std::collections::HashSet;

use dashmap::DashMap;
use hotseat_protocol::{ConnectionId, PlayerId, RoomId, ServerEvent};
use tokio::sync::mpsc;

use crate::SessionError;

/// Sending half of a connection's outbound queue. The connection's writer
/// task owns the receiver.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// The room and player a connection currently acts for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    pub room_id: RoomId,
    pub player_id: PlayerId,
}

impl Binding {
    pub fn new(room_id: RoomId, player_id: PlayerId) -> Self {
        Self { room_id, player_id }
    }
}

/// Outcome of a fan-out.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: Vec<(ConnectionId, SessionError)>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Registry of live connections and the players they speak for.
#[derive(Debug, Default)]
pub struct ConnectionDirectory {
    outboxes: DashMap<ConnectionId, Outbox>,
    bindings: DashMap<ConnectionId, Binding>,
    players: DashMap<Binding, ConnectionId>,
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection.
    pub fn connect(&self, connection: ConnectionId, outbox: Outbox) {
        self.outboxes.insert(connection, outbox);
        tracing::debug!(%connection, "connection registered");
    }

    /// Forgets a connection entirely: it is unregistered from its room and
    /// can no longer be reached. Returns the binding it held, if any, so
    /// the caller can take the player out of their room.
    pub fn disconnect(&self, connection: ConnectionId) -> Option<Binding> {
        self.outboxes.remove(&connection);
        let binding = self.unregister(connection);
        tracing::debug!(%connection, bound = binding.is_some(), "connection removed");
        binding
    }

    pub fn is_connected(&self, connection: ConnectionId) -> bool {
        self.outboxes.contains_key(&connection)
    }

    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }

    /// Binds `connection` to a room and player.
    ///
    /// A connection holds at most one binding; any other binding it had is
    /// dropped first. If another connection was bound to the same player in
    /// the same room (a reconnect), that connection is unbound and returned.
    pub fn register(&self, connection: ConnectionId, binding: Binding) -> Option<ConnectionId> {
        if self.binding(connection).is_some_and(|current| current != binding) {
            self.unregister(connection);
        }

        let displaced = self
            .players
            .insert(binding.clone(), connection)
            .filter(|previous| *previous != connection);
        if let Some(previous) = displaced {
            self.bindings.remove_if(&previous, |_, held| *held == binding);
            self.leave_room_index(&binding.room_id, previous);
            tracing::info!(
                room_id = %binding.room_id,
                player_id = %binding.player_id,
                from = %previous,
                to = %connection,
                "player moved to a new connection"
            );
        }

        self.rooms
            .entry(binding.room_id.clone())
            .or_default()
            .insert(connection);
        tracing::debug!(
            %connection,
            room_id = %binding.room_id,
            player_id = %binding.player_id,
            "connection bound"
        );
        self.bindings.insert(connection, binding);
        displaced
    }

    /// Drops a connection's binding but keeps it reachable.
    pub fn unregister(&self, connection: ConnectionId) -> Option<Binding> {
        let (_, binding) = self.bindings.remove(&connection)?;
        self.players
            .remove_if(&binding, |_, bound| *bound == connection);
        self.leave_room_index(&binding.room_id, connection);
        Some(binding)
    }

    pub fn binding(&self, connection: ConnectionId) -> Option<Binding> {
        self.bindings.get(&connection).map(|entry| entry.value().clone())
    }

    /// Every connection currently bound to `room_id`, in id order.
    pub fn connections_in_room(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        let mut connections: Vec<ConnectionId> = self
            .rooms
            .get(room_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        connections.sort();
        connections
    }

    /// The connection bound to `player_id` in `room_id`, if any.
    pub fn connection_of(&self, room_id: &RoomId, player_id: &PlayerId) -> Option<ConnectionId> {
        let key = Binding::new(room_id.clone(), player_id.clone());
        self.players.get(&key).map(|entry| *entry.value())
    }

    /// Queues one event for one connection.
    pub fn send(&self, connection: ConnectionId, event: ServerEvent) -> Result<(), SessionError> {
        let outbox = self
            .outboxes
            .get(&connection)
            .ok_or(SessionError::UnknownConnection(connection))?;
        outbox
            .send(event)
            .map_err(|_| SessionError::Closed(connection))
    }

    /// Queues one event for the connection bound to a specific player.
    pub fn send_to_player(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        event: ServerEvent,
    ) -> Result<(), SessionError> {
        let connection = self
            .connection_of(room_id, player_id)
            .ok_or_else(|| SessionError::NoConnection {
                room_id: room_id.clone(),
                player_id: player_id.clone(),
            })?;
        self.send(connection, event)
    }

    /// Queues `event` for every connection in the room, skipping the one
    /// bound to `except`.
    pub fn broadcast(
        &self,
        room_id: &RoomId,
        except: Option<&PlayerId>,
        event: &ServerEvent,
    ) -> DeliveryReport {
        let skip = except.and_then(|player_id| self.connection_of(room_id, player_id));
        let recipients = self
            .connections_in_room(room_id)
            .into_iter()
            .filter(|connection| Some(*connection) != skip);
        self.deliver(recipients, event)
    }

    /// Queues the same event for every listed connection. A failure for one
    /// recipient is recorded and the rest still get the event.
    pub fn deliver<I>(&self, recipients: I, event: &ServerEvent) -> DeliveryReport
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        let mut report = DeliveryReport::default();
        for connection in recipients {
            match self.send(connection, event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    tracing::warn!(%connection, kind = event.kind(), error = %err, "delivery failed");
                    report.failed.push((connection, err));
                }
            }
        }
        report
    }

    fn leave_room_index(&self, room_id: &RoomId, connection: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            members.remove(&connection);
        }
        self.rooms.remove_if(room_id, |_, members| members.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    fn binding(room: &str, player: &str) -> Binding {
        Binding::new(RoomId::from(room), PlayerId::from(player))
    }

    fn reset_event() -> ServerEvent {
        ServerEvent::GameReset {
            message: "bye".into(),
        }
    }

    fn connected(directory: &ConnectionDirectory, n: u64) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        directory.connect(conn(n), tx);
        rx
    }

    #[test]
    fn test_connect_and_send() {
        let directory = ConnectionDirectory::new();
        let mut rx = connected(&directory, 1);

        directory.send(conn(1), reset_event()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), reset_event());
        assert!(directory.is_connected(conn(1)));
        assert_eq!(directory.connection_count(), 1);
    }

    #[test]
    fn test_send_to_unknown_connection() {
        let directory = ConnectionDirectory::new();
        assert_eq!(
            directory.send(conn(7), reset_event()),
            Err(SessionError::UnknownConnection(conn(7)))
        );
    }

    #[test]
    fn test_send_to_closed_connection() {
        let directory = ConnectionDirectory::new();
        drop(connected(&directory, 1));

        assert_eq!(
            directory.send(conn(1), reset_event()),
            Err(SessionError::Closed(conn(1)))
        );
    }

    #[test]
    fn test_register_fills_both_indices() {
        let directory = ConnectionDirectory::new();
        assert_eq!(directory.register(conn(1), binding("r", "a")), None);
        assert_eq!(directory.register(conn(2), binding("r", "b")), None);

        let room = RoomId::from("r");
        assert_eq!(directory.connections_in_room(&room), vec![conn(1), conn(2)]);
        assert_eq!(directory.connection_of(&room, &PlayerId::from("b")), Some(conn(2)));
        assert_eq!(directory.binding(conn(1)), Some(binding("r", "a")));
    }

    #[test]
    fn test_reconnect_displaces_old_connection() {
        let directory = ConnectionDirectory::new();
        directory.register(conn(1), binding("r", "a"));

        assert_eq!(directory.register(conn(2), binding("r", "a")), Some(conn(1)));
        assert_eq!(directory.binding(conn(1)), None);
        assert_eq!(directory.connections_in_room(&RoomId::from("r")), vec![conn(2)]);
        assert_eq!(
            directory.connection_of(&RoomId::from("r"), &PlayerId::from("a")),
            Some(conn(2))
        );
        // The displaced connection no longer owns anything to clean up.
        assert_eq!(directory.unregister(conn(1)), None);
    }

    #[test]
    fn test_register_again_is_idempotent() {
        let directory = ConnectionDirectory::new();
        directory.register(conn(1), binding("r", "a"));
        assert_eq!(directory.register(conn(1), binding("r", "a")), None);
        assert_eq!(directory.connections_in_room(&RoomId::from("r")), vec![conn(1)]);
    }

    #[test]
    fn test_register_elsewhere_moves_connection() {
        let directory = ConnectionDirectory::new();
        directory.register(conn(1), binding("one", "a"));
        directory.register(conn(1), binding("two", "a"));

        assert!(directory.connections_in_room(&RoomId::from("one")).is_empty());
        assert_eq!(directory.connection_of(&RoomId::from("one"), &PlayerId::from("a")), None);
        assert_eq!(directory.connections_in_room(&RoomId::from("two")), vec![conn(1)]);
    }

    #[test]
    fn test_disconnect_returns_binding_and_cleans_indices() {
        let directory = ConnectionDirectory::new();
        let _rx = connected(&directory, 1);
        directory.register(conn(1), binding("r", "a"));

        assert_eq!(directory.disconnect(conn(1)), Some(binding("r", "a")));
        assert!(!directory.is_connected(conn(1)));
        assert!(directory.connections_in_room(&RoomId::from("r")).is_empty());
        assert_eq!(directory.connection_of(&RoomId::from("r"), &PlayerId::from("a")), None);
        assert_eq!(directory.disconnect(conn(1)), None);
    }

    #[test]
    fn test_send_to_player() {
        let directory = ConnectionDirectory::new();
        let mut rx = connected(&directory, 1);
        directory.register(conn(1), binding("r", "a"));

        directory
            .send_to_player(&RoomId::from("r"), &PlayerId::from("a"), reset_event())
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), reset_event());

        assert_eq!(
            directory.send_to_player(&RoomId::from("r"), &PlayerId::from("z"), reset_event()),
            Err(SessionError::NoConnection {
                room_id: RoomId::from("r"),
                player_id: PlayerId::from("z"),
            })
        );
    }

    #[test]
    fn test_broadcast_skips_excluded_player_and_other_rooms() {
        let directory = ConnectionDirectory::new();
        let mut a = connected(&directory, 1);
        let mut b = connected(&directory, 2);
        let mut outsider = connected(&directory, 3);
        directory.register(conn(1), binding("r", "a"));
        directory.register(conn(2), binding("r", "b"));
        directory.register(conn(3), binding("elsewhere", "c"));

        let report = directory.broadcast(&RoomId::from("r"), Some(&PlayerId::from("b")), &reset_event());

        assert_eq!(report, DeliveryReport { delivered: 1, failed: vec![] });
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_err());
        assert!(outsider.try_recv().is_err());
    }

    #[test]
    fn test_deliver_survives_failed_recipient() {
        let directory = ConnectionDirectory::new();
        let mut rx1 = connected(&directory, 1);
        drop(connected(&directory, 2));
        let mut rx3 = connected(&directory, 3);

        let report = directory.deliver([conn(1), conn(2), conn(3), conn(4)], &reset_event());

        assert_eq!(report.delivered, 2);
        assert!(!report.is_complete());
        assert_eq!(
            report.failed,
            vec![
                (conn(2), SessionError::Closed(conn(2))),
                (conn(4), SessionError::UnknownConnection(conn(4))),
            ]
        );
        assert_eq!(rx1.try_recv().unwrap(), reset_event());
        assert_eq!(rx3.try_recv().unwrap(), reset_event());
    }
}
