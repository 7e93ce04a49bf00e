//! Model world: the reference implementation.
//!
//! Tracks, per room, only what the protocol promises: membership, owner,
//! closed flag and message count. No timestamps, no store. The real chat
//! core over a reliable store must agree with it after every operation.

use std::collections::{BTreeMap, BTreeSet};

use super::operation::{Actor, ModelRoomId, Operation, OperationError, OperationResult};

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObservableState {
    /// Per-room state, keyed by room index.
    pub rooms: BTreeMap<ModelRoomId, ObservableRoom>,
}

/// What can be compared about one room.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObservableRoom {
    /// Current members.
    pub participants: BTreeSet<Actor>,
    /// Recorded owner.
    pub owner: Option<Actor>,
    /// Closed flag.
    pub closed: bool,
    /// Messages in the log, system messages included.
    pub messages: usize,
}

/// Reference model of the chat core.
#[derive(Debug, Clone, Default)]
pub struct ModelWorld {
    rooms: BTreeMap<ModelRoomId, ObservableRoom>,
}

impl ModelWorld {
    /// World with no rooms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an operation and return the expected result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match *op {
            Operation::Enter { actor, room, owner } => {
                let entry = self.rooms.entry(room).or_insert_with(|| ObservableRoom {
                    owner: Some(owner.unwrap_or(actor)),
                    ..ObservableRoom::default()
                });
                entry.participants.insert(actor);
                entry.participants.extend(owner);
                if entry.owner.is_none() {
                    entry.owner = owner;
                }
                OperationResult::Ok
            },
            Operation::Send { room, .. } => match self.rooms.get_mut(&room) {
                None => OperationResult::Error(OperationError::RoomNotFound),
                Some(r) if r.closed => OperationResult::Error(OperationError::RoomClosed),
                Some(r) => {
                    r.messages += 1;
                    OperationResult::Ok
                },
            },
            Operation::Read { .. } | Operation::AdvanceTime { .. } => OperationResult::Ok,
            Operation::Leave { actor, room } => {
                if let Some(r) = self.rooms.get_mut(&room)
                    && r.participants.remove(&actor)
                    && !r.closed
                {
                    r.messages += 1;
                }
                OperationResult::Ok
            },
            Operation::OwnerLeave { actor, room } => {
                let Some(r) = self.rooms.get_mut(&room) else {
                    return OperationResult::Ok;
                };
                if r.owner != Some(actor) {
                    return OperationResult::Error(OperationError::NotOwner);
                }
                r.participants.remove(&actor);
                if !r.closed {
                    r.closed = true;
                    r.messages += 1;
                }
                OperationResult::Ok
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState { rooms: self.rooms.clone() }
    }
}
