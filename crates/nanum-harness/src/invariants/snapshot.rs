//! Observable state snapshots for invariant checking.
//!
//! A snapshot is read straight from the store: every room and every message
//! at one point in time. Checks that need history (receipt growth, closed
//! room quiescence) read the histories carried forward by
//! [`SystemSnapshot::record`].

use std::collections::{BTreeMap, BTreeSet};

use nanum_chat::{ChatError, Message, MessageId, ParticipantId, Room, RoomId, messages_collection, rooms_collection};
use nanum_store::{Direction, Query, Store};

/// Snapshot of every room in a store, plus histories across captures.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Current state per room.
    pub rooms: BTreeMap<RoomId, RoomSnapshot>,
    /// `readBy` of every message at each capture, oldest first.
    pub read_by_history: BTreeMap<(RoomId, MessageId), Vec<BTreeSet<ParticipantId>>>,
    /// Message counts observed while a room was closed, oldest first.
    pub closed_history: BTreeMap<RoomId, Vec<usize>>,
}

impl SystemSnapshot {
    /// Snapshot with no rooms and no history.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read every room and its messages from `store`.
    pub fn capture<S: Store>(store: &S) -> Result<Self, ChatError> {
        let mut snapshot = Self::empty();
        snapshot.record(store)?;
        Ok(snapshot)
    }

    /// Replace the current state with a fresh read and extend the histories.
    pub fn record<S: Store>(&mut self, store: &S) -> Result<(), ChatError> {
        let mut rooms = BTreeMap::new();
        for doc in store.query(&Query::collection(rooms_collection()))? {
            let room = Room::from_document(&doc)?;
            let query = Query::collection(messages_collection(&room.id))
                .order_by("createdAt", Direction::Ascending);
            let messages = store
                .query(&query)?
                .iter()
                .map(Message::from_document)
                .collect::<Result<Vec<_>, _>>()?;
            rooms.insert(room.id.clone(), RoomSnapshot { room, messages });
        }

        for (id, snapshot) in &rooms {
            for message in &snapshot.messages {
                self.read_by_history
                    .entry((id.clone(), message.id.clone()))
                    .or_default()
                    .push(message.read_by.iter().cloned().collect());
            }
            if snapshot.room.is_closed {
                self.closed_history.entry(id.clone()).or_default().push(snapshot.messages.len());
            }
        }

        self.rooms = rooms;
        Ok(())
    }

    /// Add a room directly, without history.
    pub fn with_room(mut self, snapshot: RoomSnapshot) -> Self {
        self.rooms.insert(snapshot.room.id.clone(), snapshot);
        self
    }
}

/// One room and its full message log.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    /// Decoded room document.
    pub room: Room,
    /// Messages ordered by `createdAt`.
    pub messages: Vec<Message>,
}
