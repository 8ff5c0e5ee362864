//! Game rules layered over the room store.
//!
//! Every operation locks exactly one room, checks the acting player against
//! the room's current state, applies the change, and returns a
//! [`Committed`] value that still holds the lock. Callers publish the
//! resulting events and then drop it, so two operations on the same room
//! can never be observed out of order.

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hotseat_protocol::{ConnectionId, MessageId, PlayerId, PlayerView, RoomId, RoomSnapshot};
use tokio::sync::OwnedMutexGuard;

use crate::{Message, Player, Room, RoomError, RoomSlot, RoomStore, VoteTally};

/// The outcome of an operation, with the room still locked.
///
/// Dropping it releases the room. Calling back into [`GameService`] for the
/// same room while holding one will wait forever.
#[derive(Debug)]
pub struct Committed<T> {
    value: T,
    guard: OwnedMutexGuard<Option<Room>>,
}

impl<T> Committed<T> {
    /// The room as it stands after the operation. `None` once the last
    /// player has left and the room was closed.
    pub fn room(&self) -> Option<&Room> {
        self.guard.as_ref()
    }

    /// Releases the room and returns the result.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Committed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct Joined {
    pub player: PlayerView,
    pub room: RoomSnapshot,
}

/// Result of a player leaving a room.
#[derive(Debug, Clone)]
pub struct Departure {
    pub player: PlayerView,
    /// The leaver was the current target, so the round was reset.
    pub was_target: bool,
    /// The leaver was the last player and the room no longer exists.
    pub room_closed: bool,
    /// Who is still in the room.
    pub players: Vec<PlayerView>,
}

/// A chat line accepted for broadcast.
#[derive(Debug, Clone)]
pub struct ChatLine {
    pub sender: PlayerView,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

/// Enforces who may do what, and when.
#[derive(Debug, Default)]
pub struct GameService {
    store: RoomStore,
}

impl GameService {
    pub fn new(store: RoomStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RoomStore {
        &self.store
    }

    /// Adds `player_id` to `room_id`, creating the room if needed. Joining
    /// again with the same id only rebinds the connection.
    pub async fn join(
        &self,
        room_id: &RoomId,
        player_id: PlayerId,
        name: String,
        connection: ConnectionId,
    ) -> Committed<Joined> {
        loop {
            let slot = self.store.get_or_create(room_id);
            let mut guard = slot.lock_owned().await;
            // Closed between lookup and lock; the store already forgot it.
            let Some(room) = guard.as_mut() else {
                continue;
            };

            let player = room.add_player(player_id, name, connection).view();
            let snapshot = room.snapshot();
            tracing::info!(
                %room_id,
                player_id = %player.id,
                %connection,
                players = snapshot.players.len(),
                "player joined room"
            );
            return Committed {
                value: Joined {
                    player,
                    room: snapshot,
                },
                guard,
            };
        }
    }

    /// Removes a player. The last player out closes the room.
    pub async fn leave(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
    ) -> Result<Committed<Departure>, RoomError> {
        self.depart(room_id, player_id, None)
            .await?
            .ok_or_else(|| RoomError::PlayerNotFound(player_id.clone()))
    }

    /// Removes a player on behalf of `connection`.
    ///
    /// Returns `Ok(None)` and leaves the room untouched when the player has
    /// since rejoined from another connection.
    pub async fn leave_from(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        connection: ConnectionId,
    ) -> Result<Option<Committed<Departure>>, RoomError> {
        self.depart(room_id, player_id, Some(connection)).await
    }

    async fn depart(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        connection: Option<ConnectionId>,
    ) -> Result<Option<Committed<Departure>>, RoomError> {
        let slot = self.store.get(room_id)?;
        let mut guard = Arc::clone(&slot).lock_owned().await;
        let room = guard
            .as_mut()
            .ok_or_else(|| RoomError::RoomNotFound(room_id.clone()))?;

        let current = room
            .player(player_id)
            .ok_or_else(|| RoomError::PlayerNotFound(player_id.clone()))?
            .connection;
        if let Some(connection) = connection.filter(|c| *c != current) {
            tracing::debug!(
                %room_id,
                %player_id,
                %connection,
                current = %current,
                "stale leave ignored, player rejoined elsewhere"
            );
            return Ok(None);
        }

        let was_target = room.is_target(player_id);
        let player = room
            .remove_player(player_id)
            .ok_or_else(|| RoomError::PlayerNotFound(player_id.clone()))?;
        let players = room.player_views();
        let room_closed = room.is_empty();

        if was_target {
            tracing::info!(%room_id, %player_id, "target left, round reset");
        }
        tracing::info!(%room_id, %player_id, remaining = players.len(), "player left room");

        if room_closed {
            guard.take();
            self.store.retire(room_id, &slot);
        }

        Ok(Some(Committed {
            value: Departure {
                player: player.view(),
                was_target,
                room_closed,
                players,
            },
            guard,
        }))
    }

    /// Starts the game and returns the chosen target.
    pub async fn start(&self, room_id: &RoomId) -> Result<Committed<PlayerView>, RoomError> {
        self.mutate(room_id, |room| {
            let target = room.start()?.clone();
            let view = target_view(room, &target)?;
            tracing::info!(room_id = %room.room_id(), target = %view.id, "game started");
            Ok(view)
        })
        .await
    }

    /// Records a confession from anyone but the target.
    pub async fn submit_message(
        &self,
        room_id: &RoomId,
        sender_id: &PlayerId,
        body: String,
    ) -> Result<Committed<Message>, RoomError> {
        self.mutate(room_id, |room| {
            require_member(room, sender_id)?;
            require_playing(room)?;
            if room.is_target(sender_id) {
                return Err(RoomError::TargetCannotConfess);
            }
            let message = room.add_message(sender_id.clone(), body).clone();
            tracing::debug!(room_id = %room.room_id(), message_id = %message.id, "confession recorded");
            Ok(message)
        })
        .await
    }

    /// Records the target's response to one of their confessions.
    pub async fn submit_response(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        message_id: &MessageId,
        response: String,
    ) -> Result<Committed<Message>, RoomError> {
        self.mutate(room_id, |room| {
            require_member(room, player_id)?;
            require_playing(room)?;
            if !room.is_target(player_id) {
                return Err(RoomError::OnlyTargetMayExplain);
            }
            let message = room.add_response(message_id, response)?.clone();
            tracing::debug!(room_id = %room.room_id(), %message_id, "explanation recorded");
            Ok(message)
        })
        .await
    }

    /// Records a vote from anyone but the target.
    pub async fn cast_vote(
        &self,
        room_id: &RoomId,
        voter_id: &PlayerId,
        agree: bool,
    ) -> Result<Committed<VoteTally>, RoomError> {
        self.mutate(room_id, |room| {
            require_member(room, voter_id)?;
            require_playing(room)?;
            if room.is_target(voter_id) {
                return Err(RoomError::TargetCannotVote);
            }
            let tally = room.cast_vote(voter_id.clone(), agree);
            if tally.complete {
                tracing::info!(
                    room_id = %room.room_id(),
                    all_agree = tally.all_agree,
                    "vote complete"
                );
            }
            Ok(tally)
        })
        .await
    }

    /// Lets the current target pass the hot seat to someone new.
    pub async fn select_next_target(
        &self,
        room_id: &RoomId,
        acting_id: &PlayerId,
        target_id: &PlayerId,
    ) -> Result<Committed<PlayerView>, RoomError> {
        self.mutate(room_id, |room| {
            require_member(room, acting_id)?;
            require_playing(room)?;
            if !room.is_target(acting_id) {
                return Err(RoomError::OnlyTargetMayAdvance);
            }
            room.select_next_target(target_id)?;
            let view = target_view(room, target_id)?;
            tracing::info!(room_id = %room.room_id(), target = %view.id, "new target selected");
            Ok(view)
        })
        .await
    }

    /// Accepts a chat line from a member. Chat works in any game state.
    pub async fn chat(
        &self,
        room_id: &RoomId,
        sender_id: &PlayerId,
        message: String,
    ) -> Result<Committed<ChatLine>, RoomError> {
        self.mutate(room_id, |room| {
            let sender = require_member(room, sender_id)?.view();
            Ok(ChatLine {
                sender,
                message,
                sent_at: Utc::now(),
            })
        })
        .await
    }

    /// A point-in-time copy of the room.
    pub async fn snapshot(&self, room_id: &RoomId) -> Result<RoomSnapshot, RoomError> {
        let slot = self.store.get(room_id)?;
        let guard = slot.lock().await;
        guard
            .as_ref()
            .map(Room::snapshot)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.clone()))
    }

    /// Locks an existing room and applies `op`. On error nothing is kept.
    async fn mutate<T>(
        &self,
        room_id: &RoomId,
        op: impl FnOnce(&mut Room) -> Result<T, RoomError>,
    ) -> Result<Committed<T>, RoomError> {
        let slot: Arc<RoomSlot> = self.store.get(room_id)?;
        let mut guard = slot.lock_owned().await;
        let room = guard
            .as_mut()
            .ok_or_else(|| RoomError::RoomNotFound(room_id.clone()))?;
        let value = op(room)?;
        Ok(Committed { value, guard })
    }
}

fn require_member<'a>(room: &'a Room, player_id: &PlayerId) -> Result<&'a Player, RoomError> {
    room.player(player_id)
        .ok_or_else(|| RoomError::PlayerNotFound(player_id.clone()))
}

fn require_playing(room: &Room) -> Result<(), RoomError> {
    if room.game_state().is_playing() {
        Ok(())
    } else {
        Err(RoomError::GameNotStarted)
    }
}

fn target_view(room: &Room, target_id: &PlayerId) -> Result<PlayerView, RoomError> {
    room.player(target_id)
        .map(Player::view)
        .ok_or_else(|| RoomError::PlayerNotFound(target_id.clone()))
}
