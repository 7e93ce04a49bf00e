//! Read receipts.
//!
//! Each message carries the set of participants who have observed it
//! (`readBy`). Marking is a batch of set-union merges, so it is idempotent at
//! the data level. A [`ReadCache`] per reader and room only saves redundant
//! writes when the same visible set is reported repeatedly; one reader's
//! marks never stand in for another's.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

use nanum_store::{Batch, FieldOp, Patch, Store};

use crate::{
    ChatError, Message, MessageId, ParticipantId, RoomId, Session, message, room::messages_collection,
};

/// Ids of visible messages `viewer` should mark as read: sent by someone
/// else and not yet carrying `viewer` in `readBy`.
pub fn pending_receipts(messages: &[Message], viewer: &ParticipantId) -> Vec<MessageId> {
    messages
        .iter()
        .filter(|m| &m.sender_id != viewer && !m.is_read_by(viewer))
        .map(|m| m.id.clone())
        .collect()
}

/// True once someone besides the sender has observed the message.
pub fn is_read_by_others(message: &Message) -> bool {
    message.read_by.len() > 1
}

/// Participants of a room of `participant_count` who have not observed the
/// message.
pub fn unread_count(message: &Message, participant_count: usize) -> usize {
    participant_count - message.read_by.len().min(participant_count)
}

/// Messages `viewer` has not observed.
pub fn room_unread_count(messages: &[Message], viewer: &ParticipantId) -> usize {
    messages.iter().filter(|m| !m.is_read_by(viewer)).count()
}

/// Bounded memory of message ids one reader has already marked in one room.
///
/// When the cache grows past its capacity it restarts from the id that
/// overflowed it.
#[derive(Debug, Default)]
pub struct ReadCache {
    seen: HashSet<MessageId>,
    capacity: usize,
}

impl ReadCache {
    /// Empty cache holding up to `capacity` ids.
    pub fn new(capacity: usize) -> Self {
        Self { seen: HashSet::new(), capacity }
    }

    /// Record `id`. False if it was already recorded.
    pub fn admit(&mut self, id: &MessageId) -> bool {
        if !self.seen.insert(id.clone()) {
            return false;
        }
        if self.seen.len() > self.capacity {
            self.seen.clear();
            self.seen.insert(id.clone());
        }
        true
    }

    /// Forget ids whose write did not land.
    pub fn evict(&mut self, ids: &[MessageId]) {
        for id in ids {
            self.seen.remove(id);
        }
    }

    /// Number of remembered ids.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True if nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Marks messages as read on behalf of callers.
#[derive(Clone)]
pub struct ReceiptTracker<S: Store> {
    store: S,
    capacity: usize,
    caches: Arc<Mutex<HashMap<CacheKey, ReadCache>>>,
}

type CacheKey = (ParticipantId, RoomId);

impl<S: Store> ReceiptTracker<S> {
    /// Tracker with per-reader, per-room caches of `capacity` ids.
    pub fn new(store: S, capacity: usize) -> Self {
        Self { store, capacity, caches: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Add the caller to `readBy` of every message in `ids`, in one atomic
    /// batch.
    ///
    /// Ids the caller already marked through this tracker are skipped.
    /// Returns how many messages were written; zero means no write happened.
    pub fn mark_as_read(
        &self,
        session: &Session,
        room: &RoomId,
        ids: &[MessageId],
    ) -> Result<usize, ChatError> {
        let caller = session.caller()?;
        if ids.is_empty() {
            return Ok(0);
        }

        let key = (caller.id.clone(), room.clone());
        let fresh: Vec<MessageId> = {
            let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
            let cache = caches.entry(key.clone()).or_insert_with(|| ReadCache::new(self.capacity));
            ids.iter().filter(|id| !id.as_str().is_empty() && cache.admit(id)).cloned().collect()
        };
        if fresh.is_empty() {
            tracing::trace!(room = %room, reader = %caller.id, "all receipts already marked");
            return Ok(0);
        }

        let messages = messages_collection(room);
        let mut batch = Batch::new();
        for id in &fresh {
            batch.update(
                messages.doc(id),
                Patch::new().with(message::field::READ_BY, FieldOp::ArrayUnion(vec![(&caller.id).into()])),
            );
        }

        if let Err(e) = self.store.commit(&batch) {
            let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cache) = caches.get_mut(&key) {
                cache.evict(&fresh);
            }
            return Err(e.into());
        }

        tracing::debug!(room = %room, reader = %caller.id, count = fresh.len(), "marked messages read");
        Ok(fresh.len())
    }

    /// Ids remembered for `reader` in `room`.
    pub fn cached(&self, reader: &ParticipantId, room: &RoomId) -> usize {
        let caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        caches.get(&(reader.clone(), room.clone())).map_or(0, ReadCache::len)
    }
}
