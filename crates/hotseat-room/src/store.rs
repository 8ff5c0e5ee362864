//! Concurrent registry of rooms.

use std::sync::Arc;

use dashmap::DashMap;
use hotseat_protocol::RoomId;
use tokio::sync::Mutex;

use crate::{Room, RoomConfig, RoomError};

/// One room behind its own lock.
///
/// `None` means the room was retired while someone was waiting on the lock;
/// whoever sees it must go back to the store for a fresh slot.
pub type RoomSlot = Mutex<Option<Room>>;

/// Maps room ids to room slots. Rooms are created on first use.
///
/// The map itself is sharded, so lookups for different rooms do not
/// contend. Holding a slot's lock never blocks the map.
#[derive(Debug)]
pub struct RoomStore {
    rooms: DashMap<RoomId, Arc<RoomSlot>>,
    config: RoomConfig,
}

impl RoomStore {
    pub fn new(config: RoomConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Returns the slot for `room_id`, creating a fresh `Waiting` room if
    /// none exists. Concurrent callers for the same id get the same slot.
    pub fn get_or_create(&self, room_id: &RoomId) -> Arc<RoomSlot> {
        self.rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                tracing::info!(%room_id, "room created");
                Arc::new(Mutex::new(Some(Room::with_config(
                    room_id.clone(),
                    &self.config,
                ))))
            })
            .value()
            .clone()
    }

    pub fn get(&self, room_id: &RoomId) -> Result<Arc<RoomSlot>, RoomError> {
        self.rooms
            .get(room_id)
            .map(|slot| slot.value().clone())
            .ok_or_else(|| RoomError::RoomNotFound(room_id.clone()))
    }

    pub fn exists(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Removes a room. Anyone still holding its slot will find it retired.
    ///
    /// Returns `false` if there was no such room.
    pub async fn delete(&self, room_id: &RoomId) -> bool {
        let Some((_, slot)) = self.rooms.remove(room_id) else {
            return false;
        };
        slot.lock().await.take();
        tracing::info!(%room_id, "room deleted");
        true
    }

    /// Removes `room_id` only if it still maps to `slot`.
    ///
    /// The caller must already have emptied the slot while holding its lock.
    pub(crate) fn retire(&self, room_id: &RoomId, slot: &Arc<RoomSlot>) -> bool {
        let removed = self
            .rooms
            .remove_if(room_id, |_, current| Arc::ptr_eq(current, slot))
            .is_some();
        if removed {
            tracing::info!(%room_id, "room closed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new(RoomConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_returns_same_slot() {
        let store = RoomStore::default();
        let id = RoomId::from("lobby");

        let a = store.get_or_create(&id);
        let b = store.get_or_create(&id);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);

        let guard = a.lock().await;
        let room = guard.as_ref().unwrap();
        assert_eq!(room.room_id(), &id);
        assert!(room.is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown_room() {
        let store = RoomStore::default();
        let err = store.get(&RoomId::from("missing")).unwrap_err();
        assert_eq!(err, RoomError::RoomNotFound(RoomId::from("missing")));
    }

    #[tokio::test]
    async fn test_delete_retires_slot() {
        let store = RoomStore::default();
        let id = RoomId::from("lobby");
        let slot = store.get_or_create(&id);

        assert!(store.delete(&id).await);
        assert!(!store.exists(&id));
        assert!(slot.lock().await.is_none());
        assert!(!store.delete(&id).await);
    }

    #[tokio::test]
    async fn test_retire_ignores_replaced_slot() {
        let store = RoomStore::default();
        let id = RoomId::from("lobby");
        let old = store.get_or_create(&id);
        store.delete(&id).await;
        let fresh = store.get_or_create(&id);

        assert!(!store.retire(&id, &old));
        assert!(store.exists(&id));
        assert!(store.retire(&id, &fresh));
        assert!(store.is_empty());
    }

    #[test]
    fn test_rooms_use_store_config() {
        let store = RoomStore::new(RoomConfig::with_min_players(4));
        assert_eq!(store.config().min_players, 4);
        store.get_or_create(&RoomId::from("b"));
        store.get_or_create(&RoomId::from("a"));
        let mut ids = store.room_ids();
        ids.sort();
        assert_eq!(ids, vec![RoomId::from("a"), RoomId::from("b")]);
    }
}
