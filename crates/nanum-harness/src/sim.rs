//! Simulation world running the real chat core.
//!
//! A [`SimWorld`] owns a [`ChatService`] over either a reliable or a
//! fault-injecting store, a manual clock, and a snapshot that is re-recorded
//! after every operation so history-based invariants see every step.
//! Snapshots always read the reliable inner store, never the chaotic
//! wrapper, so observation itself cannot fail.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use nanum_chat::{
    Caller, ChatConfig, ChatError, ChatService, EnsureRoom, ListingId, Message, ParticipantId, RoomId,
    Session, pending_receipts,
};
use nanum_store::{ChaoticStore, ManualClock, MemoryStore, Store, Timestamp};

use crate::{
    invariants::{InvariantRegistry, SystemSnapshot, Violation},
    model::{Actor, ModelRoomId, ObservableRoom, ObservableState, Operation, OperationResult},
};

/// Store every simulation ultimately writes to.
pub type SimStore = MemoryStore<ManualClock>;

/// The real system under test.
pub struct SimWorld<S: Store> {
    service: ChatService<S>,
    observed: SimStore,
    clock: ManualClock,
    snapshot: SystemSnapshot,
    registry: InvariantRegistry,
}

impl SimWorld<SimStore> {
    /// World over a store that never fails.
    pub fn reliable() -> Self {
        let clock = ManualClock::starting_at(Timestamp::from_secs(1));
        let store = MemoryStore::with_clock(clock.clone());
        Self::assemble(store.clone(), store, clock)
    }
}

impl SimWorld<ChaoticStore<SimStore>> {
    /// World whose store operations fail with probability `failure_rate`.
    pub fn chaotic(failure_rate: f64, seed: u64) -> Self {
        let clock = ManualClock::starting_at(Timestamp::from_secs(1));
        let store = MemoryStore::with_clock(clock.clone());
        Self::assemble(ChaoticStore::with_seed(store.clone(), failure_rate, seed), store, clock)
    }
}

impl<S: Store> SimWorld<S> {
    fn assemble(store: S, observed: SimStore, clock: ManualClock) -> Self {
        Self {
            service: ChatService::new(store, ChatConfig::default()),
            observed,
            clock,
            snapshot: SystemSnapshot::empty(),
            registry: InvariantRegistry::standard(),
        }
    }

    /// Service under test.
    pub fn service(&self) -> &ChatService<S> {
        &self.service
    }

    /// Latest recorded snapshot.
    pub fn snapshot(&self) -> &SystemSnapshot {
        &self.snapshot
    }

    /// Participant id of an actor.
    pub fn participant(actor: Actor) -> ParticipantId {
        ParticipantId::new(format!("u{actor}"))
    }

    /// Room id of a model room.
    pub fn room_id(room: ModelRoomId) -> RoomId {
        RoomId::for_listing(&ListingId::new(room.to_string()))
    }

    fn session(actor: Actor) -> Session {
        Session::signed_in(Caller::new(Self::participant(actor)))
    }

    /// Apply one operation, then re-record the snapshot.
    pub fn apply(&mut self, op: &Operation) -> Result<OperationResult, ChatError> {
        let result = match *op {
            Operation::Enter { actor, room, owner } => {
                let mut request = EnsureRoom::new(Self::room_id(room), format!("listing {room}"));
                if let Some(owner) = owner {
                    request = request.owner(Self::participant(owner));
                }
                self.service.ensure_room(&Self::session(actor), &request).into()
            },
            Operation::Send { actor, room, image } => {
                let (text, image) = if image { ("", Some("https://img.example/1.jpg")) } else { ("hello", None) };
                self.service.send_message(&Self::session(actor), &Self::room_id(room), text, image).into()
            },
            Operation::Read { actor, room } => self.read(actor, room).into(),
            Operation::Leave { actor, room } => {
                self.service.leave_room(&Self::session(actor), &Self::room_id(room)).into()
            },
            Operation::OwnerLeave { actor, room } => {
                self.service.leave_room_as_owner(&Self::session(actor), &Self::room_id(room)).into()
            },
            Operation::AdvanceTime { millis } => {
                self.clock.advance(Duration::from_millis(u64::from(millis)));
                OperationResult::Ok
            },
        };
        tracing::trace!(?op, ?result, "applied");

        self.snapshot.record(&self.observed)?;
        Ok(result)
    }

    /// Open the feed, mark what is pending, close the feed.
    fn read(&self, actor: Actor, room: ModelRoomId) -> Result<usize, ChatError> {
        let session = Self::session(actor);
        let room_id = Self::room_id(room);
        let latest: Arc<Mutex<Vec<Message>>> = Arc::default();

        let sink = Arc::clone(&latest);
        let feed = self.service.subscribe_messages(&session, &room_id, move |messages| {
            *sink.lock().unwrap_or_else(PoisonError::into_inner) = messages;
        })?;
        let visible = std::mem::take(&mut *latest.lock().unwrap_or_else(PoisonError::into_inner));
        feed.unsubscribe();

        let pending = pending_receipts(&visible, &Self::participant(actor));
        self.service.mark_as_read(&session, &room_id, &pending)
    }

    /// Run every invariant against the latest snapshot.
    pub fn check(&self) -> Result<(), Vec<Violation>> {
        self.registry.check_all(&self.snapshot)
    }

    /// Observable state in the model's terms. Rooms whose ids do not follow
    /// the simulation's naming are ignored.
    pub fn observable_state(&self) -> ObservableState {
        let actor = |p: &ParticipantId| p.as_str().strip_prefix('u').and_then(|n| n.parse::<Actor>().ok());

        let rooms = self
            .snapshot
            .rooms
            .iter()
            .filter_map(|(id, snapshot)| {
                let index = id.listing_id()?.as_str().parse::<ModelRoomId>().ok()?;
                let participants: BTreeSet<Actor> = snapshot.room.participants.iter().filter_map(actor).collect();
                Some((index, ObservableRoom {
                    participants,
                    owner: snapshot.room.owner_id.as_ref().and_then(actor),
                    closed: snapshot.room.is_closed,
                    messages: snapshot.messages.len(),
                }))
            })
            .collect();

        ObservableState { rooms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reliable_world_records_each_step() {
        let mut world = SimWorld::reliable();
        world.apply(&Operation::Enter { actor: 0, room: 3, owner: None }).unwrap();
        world.apply(&Operation::Send { actor: 0, room: 3, image: true }).unwrap();

        let state = world.observable_state();
        assert_eq!(state.rooms[&3].messages, 1);
        assert_eq!(state.rooms[&3].owner, Some(0));
        assert!(world.check().is_ok());
    }

    #[test]
    fn read_marks_pending_messages() {
        let mut world = SimWorld::reliable();
        world.apply(&Operation::Enter { actor: 1, room: 0, owner: Some(0) }).unwrap();
        world.apply(&Operation::Send { actor: 0, room: 0, image: false }).unwrap();
        world.apply(&Operation::Read { actor: 1, room: 0 }).unwrap();

        let room = &world.snapshot().rooms[&SimWorld::<SimStore>::room_id(0)];
        assert!(room.messages[0].is_read_by(&SimWorld::<SimStore>::participant(1)));
    }
}
