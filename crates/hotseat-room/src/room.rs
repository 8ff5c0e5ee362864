//! The room aggregate: membership, target rotation, confessions, and votes.
//!
//! A [`Room`] knows nothing about connections beyond the id it stores per
//! player, and nothing about locking. Each method either applies its whole
//! effect or returns an error and leaves the room untouched.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use hotseat_protocol::{
    ConfessionView, ConnectionId, GameState, MessageId, PlayerId, PlayerView, RoomId,
    RoomSnapshot, VoteStatus,
};
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::{RoomConfig, RoomError};

/// A member of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// The connection currently speaking for this player. Replaced on
    /// reconnect.
    pub connection: ConnectionId,
}

impl Player {
    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// An anonymous confession addressed to the current target.
///
/// The sender is kept for server-side bookkeeping only and never leaves the
/// room through [`Message::view`] or [`Room::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    sender_id: PlayerId,
    pub body: String,
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(sender_id: PlayerId, body: String) -> Self {
        Self {
            id: MessageId::generate(),
            sender_id,
            body,
            response: None,
            created_at: Utc::now(),
        }
    }

    pub fn sender_id(&self) -> &PlayerId {
        &self.sender_id
    }

    /// The sender-free form shown to players.
    pub fn view(&self) -> ConfessionView {
        ConfessionView {
            id: self.id.clone(),
            message: self.body.clone(),
            explanation: self.response.clone(),
            timestamp: self.created_at,
        }
    }
}

/// Vote status right after a vote was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    /// Distinct voters so far.
    pub votes: usize,
    /// Always `players - 1`.
    pub required: usize,
    /// `votes >= required`.
    pub complete: bool,
    /// Every recorded vote is `true`.
    pub all_agree: bool,
}

/// All state for one game instance.
#[derive(Debug, Clone)]
pub struct Room {
    room_id: RoomId,
    min_players: usize,
    players: HashMap<PlayerId, Player>,
    game_state: GameState,
    current_target: Option<PlayerId>,
    target_history: Vec<PlayerId>,
    messages: Vec<Message>,
    votes: HashMap<PlayerId, bool>,
}

impl Room {
    /// Creates an empty room in the `Waiting` state with default settings.
    pub fn new(room_id: RoomId) -> Self {
        Self::with_config(room_id, &RoomConfig::default())
    }

    pub fn with_config(room_id: RoomId, config: &RoomConfig) -> Self {
        Self {
            room_id,
            min_players: config.min_players.max(2),
            players: HashMap::new(),
            game_state: GameState::Waiting,
            current_target: None,
            target_history: Vec::new(),
            messages: Vec::new(),
            votes: HashMap::new(),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn game_state(&self) -> GameState {
        self.game_state
    }

    pub fn current_target(&self) -> Option<&PlayerId> {
        self.current_target.as_ref()
    }

    pub fn is_target(&self, player_id: &PlayerId) -> bool {
        self.current_target.as_ref() == Some(player_id)
    }

    pub fn target_history(&self) -> &[PlayerId] {
        &self.target_history
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn player(&self, player_id: &PlayerId) -> Option<&Player> {
        self.players.get(player_id)
    }

    pub fn has_player(&self, player_id: &PlayerId) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Players as shown on the wire, ordered by id so every recipient sees
    /// the same list.
    pub fn player_views(&self) -> Vec<PlayerView> {
        let mut views: Vec<PlayerView> = self.players.values().map(Player::view).collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }

    pub fn required_votes(&self) -> usize {
        self.players.len().saturating_sub(1)
    }

    pub fn vote_status(&self) -> VoteStatus {
        VoteStatus {
            count: self.votes.len(),
            required: self.required_votes(),
        }
    }

    /// Inserts a player, or rebinds an existing one to `connection`.
    ///
    /// A returning player keeps their original display name.
    pub fn add_player(&mut self, id: PlayerId, name: String, connection: ConnectionId) -> &Player {
        self.players
            .entry(id.clone())
            .and_modify(|player| player.connection = connection)
            .or_insert(Player {
                id,
                name,
                connection,
            })
    }

    /// Removes a player. Removing the current target resets the round.
    ///
    /// Returns the removed player, or `None` if they were not a member.
    pub fn remove_player(&mut self, player_id: &PlayerId) -> Option<Player> {
        let removed = self.players.remove(player_id)?;
        self.votes.remove(player_id);
        if self.is_target(player_id) {
            self.reset();
        }
        Some(removed)
    }

    /// Starts (or restarts) the game with a randomly chosen target.
    pub fn start(&mut self) -> Result<&PlayerId, RoomError> {
        self.start_with(&mut rand::rng())
    }

    /// Like [`start`](Self::start), drawing from the given generator.
    pub fn start_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<&PlayerId, RoomError> {
        if self.players.len() < self.min_players {
            return Err(RoomError::NotEnoughPlayers {
                required: self.min_players,
                present: self.players.len(),
            });
        }
        let target = self.pick_random_target(rng)?;
        self.game_state = GameState::Playing;
        Ok(self.make_target(target))
    }

    /// Hands the hot seat to `target`, who must not have had it yet this
    /// cycle.
    pub fn select_next_target(&mut self, target: &PlayerId) -> Result<&PlayerId, RoomError> {
        if !self.game_state.is_playing() {
            return Err(RoomError::GameNotStarted);
        }
        if self.target_history.contains(target) {
            return Err(RoomError::AlreadyTargeted(target.clone()));
        }
        if !self.players.contains_key(target) {
            return Err(RoomError::UnknownTarget(target.clone()));
        }
        Ok(self.make_target(target.clone()))
    }

    /// Records a confession and returns it.
    pub fn add_message(&mut self, sender_id: PlayerId, body: String) -> &Message {
        self.messages.push(Message::new(sender_id, body));
        let last = self.messages.len() - 1;
        &self.messages[last]
    }

    /// Attaches (or overwrites) the response to a confession.
    pub fn add_response(
        &mut self,
        message_id: &MessageId,
        response: String,
    ) -> Result<&Message, RoomError> {
        let message = self
            .messages
            .iter_mut()
            .find(|message| &message.id == message_id)
            .ok_or_else(|| RoomError::MessageNotFound(message_id.clone()))?;
        message.response = Some(response);
        Ok(message)
    }

    /// Records a vote, replacing any earlier vote by the same voter.
    pub fn cast_vote(&mut self, voter_id: PlayerId, agree: bool) -> VoteTally {
        self.votes.insert(voter_id, agree);
        let votes = self.votes.len();
        let required = self.required_votes();
        VoteTally {
            votes,
            required,
            complete: votes >= required,
            all_agree: self.votes.values().all(|agree| *agree),
        }
    }

    /// Back to `Waiting`. Players and target history are kept.
    pub fn reset(&mut self) {
        self.game_state = GameState::Waiting;
        self.current_target = None;
        self.messages.clear();
        self.votes.clear();
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id.clone(),
            players: self.player_views(),
            game_state: self.game_state,
            current_target: self.current_target.clone(),
            target_history: self.target_history.clone(),
            confessions: self.messages.iter().map(Message::view).collect(),
            votes: self.vote_status(),
        }
    }

    /// Picks uniformly among players not yet in the history. When everyone
    /// has had a turn the history is cleared and the draw repeats once over
    /// the full membership.
    fn pick_random_target<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<PlayerId, RoomError> {
        if self.players.is_empty() {
            return Err(RoomError::NotEnoughPlayers {
                required: self.min_players,
                present: 0,
            });
        }

        if self.eligible_targets().is_empty() {
            tracing::debug!(room_id = %self.room_id, "target rotation exhausted, starting a new cycle");
            self.target_history.clear();
        }

        self.eligible_targets()
            .choose(rng)
            .map(|id| (*id).clone())
            .ok_or_else(|| RoomError::NotEnoughPlayers {
                required: self.min_players,
                present: self.players.len(),
            })
    }

    fn eligible_targets(&self) -> Vec<&PlayerId> {
        let seen: HashSet<&PlayerId> = self.target_history.iter().collect();
        let mut eligible: Vec<&PlayerId> =
            self.players.keys().filter(|id| !seen.contains(id)).collect();
        // HashMap order is random per process; sort so a seeded rng is
        // reproducible.
        eligible.sort();
        eligible
    }

    fn make_target(&mut self, target: PlayerId) -> &PlayerId {
        self.target_history.push(target.clone());
        self.messages.clear();
        self.votes.clear();
        self.current_target.insert(target)
    }
}
