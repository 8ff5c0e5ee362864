//! Routes inbound client events to the game service and fans the results
//! out to the right connections.
//!
//! Every game operation returns its result with the room still locked, and
//! the dispatcher queues all resulting events before letting go of it. Two
//! operations on one room therefore reach every outbox in the order they
//! were accepted.

use chrono::Utc;
use hotseat_protocol::{
    ClientEvent, ConnectionId, ExplanationData, JoinRoomData, MessageData, PlayerId, RoomId,
    SelectTargetData, ServerEvent, VoteData,
};
use hotseat_room::{GameService, Room};
use hotseat_session::{Binding, ConnectionDirectory, DeliveryReport, Outbox};

use crate::HotseatError;

/// Sent to the rest of the room when the target walks out mid-round.
pub const TARGET_LEFT_MESSAGE: &str = "The target left the room, so the game has been reset.";

/// Turns client events into game operations and game results into
/// server events.
#[derive(Debug, Default)]
pub struct Dispatcher {
    service: GameService,
    directory: ConnectionDirectory,
}

impl Dispatcher {
    pub fn new(service: GameService) -> Self {
        Self {
            service,
            directory: ConnectionDirectory::new(),
        }
    }

    pub fn service(&self) -> &GameService {
        &self.service
    }

    pub fn directory(&self) -> &ConnectionDirectory {
        &self.directory
    }

    /// Registers a new connection and the queue its writer drains.
    pub fn connect(&self, connection: ConnectionId, outbox: Outbox) {
        self.directory.connect(connection, outbox);
    }

    /// Handles one inbound event. Failures become an `error` event for
    /// `origin` and nobody else.
    pub async fn dispatch(&self, origin: ConnectionId, event: ClientEvent) {
        tracing::debug!(connection = %origin, kind = event.kind(), "dispatching event");
        if let Err(err) = self.route(origin, event).await {
            self.reject(origin, &err);
        }
    }

    /// Tells `origin` its request failed.
    pub fn reject(&self, origin: ConnectionId, err: &HotseatError) {
        tracing::warn!(connection = %origin, error = %err, "request rejected");
        self.notify(
            origin,
            ServerEvent::Error {
                message: err.client_message(),
            },
        );
    }

    /// Cleans up after a closed connection. A player still bound to it
    /// leaves their room.
    pub async fn disconnect(&self, origin: ConnectionId) {
        if let Some(binding) = self.directory.disconnect(origin) {
            tracing::info!(
                connection = %origin,
                room_id = %binding.room_id,
                player_id = %binding.player_id,
                "connection closed while in a room"
            );
            self.leave(origin, binding).await;
        }
    }

    async fn route(&self, origin: ConnectionId, event: ClientEvent) -> Result<(), HotseatError> {
        match event {
            ClientEvent::JoinRoom(data) => {
                self.join(origin, data).await;
                Ok(())
            }
            ClientEvent::LeaveRoom => {
                let binding = self.directory.unregister(origin).ok_or(HotseatError::NotInRoom)?;
                self.leave(origin, binding).await;
                Ok(())
            }
            event => {
                let binding = self.directory.binding(origin).ok_or(HotseatError::NotInRoom)?;
                self.play(origin, &binding, event).await
            }
        }
    }

    async fn join(&self, origin: ConnectionId, data: JoinRoomData) {
        let JoinRoomData {
            room_id,
            player_id,
            player_name,
        } = data;
        let binding = Binding::new(room_id, player_id);

        if let Some(previous) = self.directory.binding(origin).filter(|b| *b != binding) {
            self.directory.unregister(origin);
            self.leave(origin, previous).await;
        }

        let joined = self
            .service
            .join(&binding.room_id, binding.player_id.clone(), player_name, origin)
            .await;
        let room_id = binding.room_id.clone();
        self.directory.register(origin, binding);

        self.notify(
            origin,
            ServerEvent::JoinRoomSuccess {
                player: joined.player.clone(),
                room: joined.room.clone(),
            },
        );
        self.broadcast(
            &room_id,
            None,
            &ServerEvent::PlayerListUpdated {
                players: joined.room.players.clone(),
            },
        );
    }

    /// Takes the player out of their room unless they have since rejoined
    /// from another connection.
    async fn leave(&self, origin: ConnectionId, binding: Binding) {
        let departure = match self
            .service
            .leave_from(&binding.room_id, &binding.player_id, origin)
            .await
        {
            Ok(Some(departure)) => departure,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(
                    room_id = %binding.room_id,
                    player_id = %binding.player_id,
                    error = %err,
                    "leave ignored"
                );
                return;
            }
        };
        if departure.room_closed {
            return;
        }

        self.broadcast(
            &binding.room_id,
            None,
            &ServerEvent::PlayerListUpdated {
                players: departure.players.clone(),
            },
        );
        if departure.was_target {
            self.broadcast(
                &binding.room_id,
                None,
                &ServerEvent::GameReset {
                    message: TARGET_LEFT_MESSAGE.to_string(),
                },
            );
        }
    }

    /// Everything that needs a bound connection.
    async fn play(
        &self,
        origin: ConnectionId,
        binding: &Binding,
        event: ClientEvent,
    ) -> Result<(), HotseatError> {
        let Binding { room_id, player_id } = binding;

        match event {
            ClientEvent::StartGame => {
                let target = self.service.start(room_id).await?;
                self.broadcast(
                    room_id,
                    None,
                    &ServerEvent::GameStarted {
                        target: target.id.clone(),
                        target_name: target.name.clone(),
                    },
                );
            }

            ClientEvent::SendChatMessage(MessageData { message }) => {
                let line = self.service.chat(room_id, player_id, message).await?;
                self.broadcast(
                    room_id,
                    line.room().and_then(Room::current_target),
                    &ServerEvent::ChatMessage {
                        sender_id: line.sender.id.clone(),
                        sender_name: line.sender.name.clone(),
                        message: line.message.clone(),
                        timestamp: line.sent_at.timestamp_millis(),
                    },
                );
            }

            ClientEvent::SendConfession(MessageData { message }) => {
                let confession = self.service.submit_message(room_id, player_id, message).await?;
                self.notify(
                    origin,
                    ServerEvent::ConfessionSent {
                        confession_id: confession.id.clone(),
                    },
                );
                if let Some(target) = confession.room().and_then(Room::current_target) {
                    let event = ServerEvent::ConfessionReceived(confession.view());
                    if let Err(err) = self.directory.send_to_player(room_id, target, event) {
                        tracing::warn!(%room_id, %target, error = %err, "confession not delivered");
                    }
                }
            }

            ClientEvent::SendExplanation(ExplanationData {
                confession_id,
                explanation,
            }) => {
                let answered = self
                    .service
                    .submit_response(room_id, player_id, &confession_id, explanation)
                    .await?;
                self.broadcast(
                    room_id,
                    None,
                    &ServerEvent::ExplanationReceived {
                        confession_id: answered.id.clone(),
                        explanation: answered.response.clone().unwrap_or_default(),
                        timestamp: Utc::now().timestamp_millis(),
                    },
                );
            }

            ClientEvent::Vote(VoteData { agree }) => {
                let tally = self.service.cast_vote(room_id, player_id, agree).await?;
                self.broadcast(
                    room_id,
                    None,
                    &ServerEvent::VoteUpdated {
                        votes: tally.votes,
                        required: tally.required,
                    },
                );
                if tally.complete {
                    self.broadcast(
                        room_id,
                        None,
                        &ServerEvent::VoteComplete {
                            all_agree: tally.all_agree,
                        },
                    );
                }
            }

            ClientEvent::SelectNextTarget(SelectTargetData { target_id }) => {
                let target = self
                    .service
                    .select_next_target(room_id, player_id, &target_id)
                    .await?;
                self.broadcast(
                    room_id,
                    None,
                    &ServerEvent::NewTargetSelected {
                        target: target.id.clone(),
                        target_name: target.name.clone(),
                    },
                );
            }

            // Routed before a binding is required.
            ClientEvent::JoinRoom(_) | ClientEvent::LeaveRoom => {}
        }
        Ok(())
    }

    fn notify(&self, connection: ConnectionId, event: ServerEvent) {
        let kind = event.kind();
        if let Err(err) = self.directory.send(connection, event) {
            tracing::warn!(%connection, kind, error = %err, "delivery failed");
        }
    }

    /// Sends `event` to every connection in the room except the one bound
    /// to `except`. Callers hold the room's [`Committed`] result while this
    /// runs.
    ///
    /// [`Committed`]: hotseat_room::Committed
    fn broadcast(
        &self,
        room_id: &RoomId,
        except: Option<&PlayerId>,
        event: &ServerEvent,
    ) -> DeliveryReport {
        let report = self.directory.broadcast(room_id, except, event);
        tracing::debug!(
            %room_id,
            kind = event.kind(),
            delivered = report.delivered,
            failed = report.failed.len(),
            "broadcast"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use hotseat_protocol::{GameState, MessageId};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use super::*;

    struct Client {
        connection: ConnectionId,
        rx: UnboundedReceiver<ServerEvent>,
    }

    impl Client {
        fn drain(&mut self) -> Vec<ServerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                events.push(event);
            }
            events
        }

        fn kinds(&mut self) -> Vec<&'static str> {
            self.drain().iter().map(ServerEvent::kind).collect()
        }
    }

    fn client(dispatcher: &Dispatcher, n: u64) -> Client {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = ConnectionId::new(n);
        dispatcher.connect(connection, tx);
        Client { connection, rx }
    }

    fn join_event(room: &str, player: &str) -> ClientEvent {
        ClientEvent::JoinRoom(JoinRoomData {
            room_id: RoomId::from(room),
            player_id: PlayerId::from(player),
            player_name: player.to_uppercase(),
        })
    }

    /// Three players in room "r", everyone's inbox drained.
    async fn seated(dispatcher: &Dispatcher) -> Vec<Client> {
        let mut clients = Vec::new();
        for (n, id) in ["a", "b", "c"].into_iter().enumerate() {
            let c = client(dispatcher, n as u64);
            dispatcher.dispatch(c.connection, join_event("r", id)).await;
            clients.push(c);
        }
        for c in &mut clients {
            c.drain();
        }
        clients
    }

    /// Starts the game; returns the index of the target's client.
    async fn start(dispatcher: &Dispatcher, clients: &mut [Client]) -> usize {
        dispatcher.dispatch(clients[0].connection, ClientEvent::StartGame).await;
        let mut target = None;
        for c in clients.iter_mut() {
            match c.drain().as_slice() {
                [ServerEvent::GameStarted { target: t, .. }] => target = Some(t.clone()),
                other => panic!("expected game-started, got {other:?}"),
            }
        }
        let target = target.unwrap();
        ["a", "b", "c"]
            .iter()
            .position(|id| PlayerId::from(*id) == target)
            .unwrap()
    }

    #[tokio::test]
    async fn test_join_acks_joiner_and_updates_room() {
        let dispatcher = Dispatcher::default();
        let mut a = client(&dispatcher, 1);
        let mut b = client(&dispatcher, 2);

        dispatcher.dispatch(a.connection, join_event("r", "a")).await;
        assert_eq!(a.kinds(), vec!["join-room-success", "player-list-updated"]);

        dispatcher.dispatch(b.connection, join_event("r", "b")).await;
        match b.drain().as_slice() {
            [ServerEvent::JoinRoomSuccess { player, room }, ServerEvent::PlayerListUpdated { players }] => {
                assert_eq!(player.name, "B");
                assert_eq!(room.players.len(), 2);
                assert_eq!(room.game_state, GameState::Waiting);
                assert_eq!(players.len(), 2);
            }
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(a.kinds(), vec!["player-list-updated"]);
    }

    #[tokio::test]
    async fn test_events_before_join_are_rejected() {
        let dispatcher = Dispatcher::default();
        let mut a = client(&dispatcher, 1);

        dispatcher.dispatch(a.connection, ClientEvent::StartGame).await;
        dispatcher.dispatch(a.connection, ClientEvent::LeaveRoom).await;
        let events = a.drain();
        assert_eq!(
            events,
            vec![
                ServerEvent::Error { message: "join a room first".into() },
                ServerEvent::Error { message: "join a room first".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_start_with_one_player_errors_to_origin_only() {
        let dispatcher = Dispatcher::default();
        let mut a = client(&dispatcher, 1);
        dispatcher.dispatch(a.connection, join_event("r", "a")).await;
        a.drain();

        dispatcher.dispatch(a.connection, ClientEvent::StartGame).await;
        match a.drain().as_slice() {
            [ServerEvent::Error { message }] => assert!(message.contains("at least 2 players")),
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_confession_goes_only_to_target_without_sender() {
        let dispatcher = Dispatcher::default();
        let mut clients = seated(&dispatcher).await;
        let t = start(&dispatcher, &mut clients).await;
        let sender = (t + 1) % 3;
        let bystander = (t + 2) % 3;

        dispatcher
            .dispatch(
                clients[sender].connection,
                ClientEvent::SendConfession(MessageData { message: "I broke the vase".into() }),
            )
            .await;

        let confession_id = match clients[sender].drain().as_slice() {
            [ServerEvent::ConfessionSent { confession_id }] => confession_id.clone(),
            other => panic!("unexpected events {other:?}"),
        };
        match clients[t].drain().as_slice() {
            [ServerEvent::ConfessionReceived(view)] => {
                assert_eq!(view.id, confession_id);
                assert_eq!(view.message, "I broke the vase");
            }
            other => panic!("unexpected events {other:?}"),
        }
        assert!(clients[bystander].drain().is_empty());
    }

    #[tokio::test]
    async fn test_target_cannot_confess() {
        let dispatcher = Dispatcher::default();
        let mut clients = seated(&dispatcher).await;
        let t = start(&dispatcher, &mut clients).await;

        dispatcher
            .dispatch(
                clients[t].connection,
                ClientEvent::SendConfession(MessageData { message: "me".into() }),
            )
            .await;
        assert_eq!(clients[t].kinds(), vec!["error"]);
        assert!(clients[(t + 1) % 3].drain().is_empty());
    }

    #[tokio::test]
    async fn test_chat_skips_target() {
        let dispatcher = Dispatcher::default();
        let mut clients = seated(&dispatcher).await;
        let t = start(&dispatcher, &mut clients).await;
        let speaker = (t + 1) % 3;

        dispatcher
            .dispatch(
                clients[speaker].connection,
                ClientEvent::SendChatMessage(MessageData { message: "hmm".into() }),
            )
            .await;

        assert!(clients[t].drain().is_empty());
        for i in [speaker, (t + 2) % 3] {
            match clients[i].drain().as_slice() {
                [ServerEvent::ChatMessage { message, timestamp, .. }] => {
                    assert_eq!(message, "hmm");
                    assert!(*timestamp > 0);
                }
                other => panic!("unexpected events {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_explanation_and_votes_are_broadcast() {
        let dispatcher = Dispatcher::default();
        let mut clients = seated(&dispatcher).await;
        let t = start(&dispatcher, &mut clients).await;
        let voters = [(t + 1) % 3, (t + 2) % 3];

        dispatcher
            .dispatch(
                clients[voters[0]].connection,
                ClientEvent::SendConfession(MessageData { message: "x".into() }),
            )
            .await;
        let confession_id = match clients[t].drain().as_slice() {
            [ServerEvent::ConfessionReceived(view)] => view.id.clone(),
            other => panic!("unexpected events {other:?}"),
        };
        clients[voters[0]].drain();

        dispatcher
            .dispatch(
                clients[t].connection,
                ClientEvent::SendExplanation(ExplanationData {
                    confession_id,
                    explanation: "it was an accident".into(),
                }),
            )
            .await;
        for c in clients.iter_mut() {
            assert_eq!(c.kinds(), vec!["explanation-received"]);
        }

        dispatcher
            .dispatch(clients[voters[0]].connection, ClientEvent::Vote(VoteData { agree: true }))
            .await;
        for c in clients.iter_mut() {
            assert_eq!(
                c.drain(),
                vec![ServerEvent::VoteUpdated { votes: 1, required: 2 }]
            );
        }

        dispatcher
            .dispatch(clients[voters[1]].connection, ClientEvent::Vote(VoteData { agree: true }))
            .await;
        for c in clients.iter_mut() {
            assert_eq!(
                c.drain(),
                vec![
                    ServerEvent::VoteUpdated { votes: 2, required: 2 },
                    ServerEvent::VoteComplete { all_agree: true },
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_confession_is_an_error() {
        let dispatcher = Dispatcher::default();
        let mut clients = seated(&dispatcher).await;
        let t = start(&dispatcher, &mut clients).await;

        dispatcher
            .dispatch(
                clients[t].connection,
                ClientEvent::SendExplanation(ExplanationData {
                    confession_id: MessageId::from("nope"),
                    explanation: "?".into(),
                }),
            )
            .await;
        assert_eq!(
            clients[t].drain(),
            vec![ServerEvent::Error { message: "confession nope not found".into() }]
        );
    }

    #[tokio::test]
    async fn test_target_disconnect_resets_game() {
        let dispatcher = Dispatcher::default();
        let mut clients = seated(&dispatcher).await;
        let t = start(&dispatcher, &mut clients).await;

        dispatcher.disconnect(clients[t].connection).await;

        for i in [(t + 1) % 3, (t + 2) % 3] {
            match clients[i].drain().as_slice() {
                [ServerEvent::PlayerListUpdated { players }, ServerEvent::GameReset { message }] => {
                    assert_eq!(players.len(), 2);
                    assert_eq!(message, TARGET_LEFT_MESSAGE);
                }
                other => panic!("unexpected events {other:?}"),
            }
        }
        let snapshot = dispatcher.service().snapshot(&RoomId::from("r")).await.unwrap();
        assert_eq!(snapshot.game_state, GameState::Waiting);
    }

    #[tokio::test]
    async fn test_last_player_leaving_closes_room() {
        let dispatcher = Dispatcher::default();
        let mut a = client(&dispatcher, 1);
        dispatcher.dispatch(a.connection, join_event("r", "a")).await;
        dispatcher.dispatch(a.connection, ClientEvent::LeaveRoom).await;

        assert_eq!(a.kinds(), vec!["join-room-success", "player-list-updated"]);
        assert!(!dispatcher.service().store().exists(&RoomId::from("r")));
        assert!(dispatcher.directory().binding(a.connection).is_none());
    }

    #[tokio::test]
    async fn test_reconnect_keeps_player_when_old_connection_drops() {
        let dispatcher = Dispatcher::default();
        let mut old = client(&dispatcher, 1);
        let mut new = client(&dispatcher, 2);
        let mut other = client(&dispatcher, 3);
        dispatcher.dispatch(other.connection, join_event("r", "b")).await;
        dispatcher.dispatch(old.connection, join_event("r", "a")).await;
        dispatcher.dispatch(new.connection, join_event("r", "a")).await;
        old.drain();
        new.drain();
        other.drain();

        dispatcher.disconnect(old.connection).await;
        assert!(other.drain().is_empty());

        let snapshot = dispatcher.service().snapshot(&RoomId::from("r")).await.unwrap();
        assert_eq!(snapshot.players.len(), 2);

        dispatcher
            .dispatch(other.connection, ClientEvent::SendChatMessage(MessageData { message: "hi".into() }))
            .await;
        assert_eq!(new.kinds(), vec!["chat-message"]);
    }

    #[tokio::test]
    async fn test_rejoin_between_unbind_and_leave_keeps_player() {
        let dispatcher = Dispatcher::default();
        let mut old = client(&dispatcher, 1);
        let mut new = client(&dispatcher, 2);
        let mut other = client(&dispatcher, 3);
        dispatcher.dispatch(other.connection, join_event("r", "b")).await;
        dispatcher.dispatch(old.connection, join_event("r", "a")).await;
        old.drain();
        other.drain();

        // The old socket closes, and the player rejoins before its leave runs.
        let stale = dispatcher.directory().disconnect(old.connection).unwrap();
        dispatcher.dispatch(new.connection, join_event("r", "a")).await;
        dispatcher.leave(old.connection, stale).await;

        assert_eq!(new.kinds(), vec!["join-room-success", "player-list-updated"]);
        assert_eq!(other.kinds(), vec!["player-list-updated"]);
        let snapshot = dispatcher.service().snapshot(&RoomId::from("r")).await.unwrap();
        assert_eq!(snapshot.players.len(), 2);
        assert_eq!(
            dispatcher.directory().binding(new.connection),
            Some(Binding::new(RoomId::from("r"), PlayerId::from("a")))
        );
    }

    #[tokio::test]
    async fn test_joining_another_room_leaves_the_first() {
        let dispatcher = Dispatcher::default();
        let mut a = client(&dispatcher, 1);
        let mut b = client(&dispatcher, 2);
        dispatcher.dispatch(a.connection, join_event("one", "a")).await;
        dispatcher.dispatch(b.connection, join_event("one", "b")).await;
        a.drain();
        b.drain();

        dispatcher.dispatch(a.connection, join_event("two", "a")).await;

        match b.drain().as_slice() {
            [ServerEvent::PlayerListUpdated { players }] => assert_eq!(players.len(), 1),
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(a.kinds(), vec!["join-room-success", "player-list-updated"]);
        assert_eq!(
            dispatcher.directory().binding(a.connection),
            Some(Binding::new(RoomId::from("two"), PlayerId::from("a")))
        );
    }

    #[tokio::test]
    async fn test_closed_outbox_does_not_block_others() {
        let dispatcher = Dispatcher::default();
        let mut clients = seated(&dispatcher).await;
        let gone = clients.remove(1);
        drop(gone.rx);

        dispatcher
            .dispatch(clients[0].connection, ClientEvent::SendChatMessage(MessageData { message: "still here".into() }))
            .await;
        assert_eq!(clients[0].kinds(), vec!["chat-message"]);
        assert_eq!(clients[1].kinds(), vec!["chat-message"]);
    }

    #[tokio::test]
    async fn test_only_target_can_select_next() {
        let dispatcher = Dispatcher::default();
        let mut clients = seated(&dispatcher).await;
        let t = start(&dispatcher, &mut clients).await;
        let ids = ["a", "b", "c"];
        let next = (t + 1) % 3;

        dispatcher
            .dispatch(
                clients[next].connection,
                ClientEvent::SelectNextTarget(SelectTargetData { target_id: PlayerId::from(ids[t]) }),
            )
            .await;
        assert_eq!(clients[next].kinds(), vec!["error"]);

        dispatcher
            .dispatch(
                clients[t].connection,
                ClientEvent::SelectNextTarget(SelectTargetData { target_id: PlayerId::from(ids[next]) }),
            )
            .await;
        for c in clients.iter_mut() {
            match c.drain().as_slice() {
                [ServerEvent::NewTargetSelected { target, target_name }] => {
                    assert_eq!(target.as_str(), ids[next]);
                    assert_eq!(target_name, &ids[next].to_uppercase());
                }
                other => panic!("unexpected events {other:?}"),
            }
        }
    }
}
