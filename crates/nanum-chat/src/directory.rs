//! Room directory.
//!
//! `ensure_room` runs on every room entry, not only the first. It reads the
//! room, computes the smallest patch that makes the caller (and the listing
//! owner) full members with a `joinedAt`, and writes it only if something
//! changed. Planning is a pure function of the stored room so convergence can
//! be tested without a store.
//!
//! An existing `joinedAt` is never rewritten: moving it later would hide
//! history the participant has already seen.

use nanum_store::{FieldOp, Patch, Store, Value};

use crate::{
    ChatError, ParticipantId, Room, RoomId, RoomKind, Session,
    config::Notices,
    room::{field, joined_at_field, room_path},
};

/// Arguments of [`RoomDirectory::ensure_room`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureRoom {
    /// Room to create or enter.
    pub room: RoomId,
    /// Title used when the room is created.
    pub title: String,
    /// Presentation tag. When set and different from the stored tag, the
    /// room is relabeled.
    pub kind: Option<RoomKind>,
    /// Owner of the underlying listing.
    pub owner: Option<ParticipantId>,
}

impl EnsureRoom {
    /// Request for `room` with a title and nothing else.
    pub fn new(room: RoomId, title: impl Into<String>) -> Self {
        Self { room, title: title.into(), kind: None, owner: None }
    }

    /// Set the kind.
    #[must_use]
    pub fn kind(mut self, kind: RoomKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the owner.
    #[must_use]
    pub fn owner(mut self, owner: impl Into<ParticipantId>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// What `ensure_room` has to write.
#[derive(Debug, Clone, PartialEq)]
pub enum EnsurePlan {
    /// Room is absent: write it in full.
    Create(Patch),
    /// Room exists but memberships or labels need repair.
    Update(Patch),
    /// Room already satisfies the request.
    Unchanged,
}

/// Result of `ensure_room`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The room was created.
    Created,
    /// The existing room was patched.
    Updated,
    /// Nothing needed to change.
    Unchanged,
    /// The room could not be read. Nothing was written; the next entry
    /// retries.
    Deferred,
}

/// Compute the write that makes `existing` satisfy `request` for `caller`.
pub fn plan_ensure(
    existing: Option<&Room>,
    request: &EnsureRoom,
    caller: &ParticipantId,
    notices: &Notices,
) -> EnsurePlan {
    let owner = request.owner.as_ref().filter(|owner| *owner != caller);

    let Some(room) = existing else {
        let mut members = vec![caller];
        members.extend(owner);

        let mut patch = Patch::new()
            .set(field::ID, &request.room)
            .set(field::TITLE, request.title.as_str())
            .set(field::KIND, request.kind.unwrap_or_default().as_str())
            .set(field::OWNER_ID, request.owner.as_ref().unwrap_or(caller))
            .set(field::IS_CLOSED, false)
            .set(field::PARTICIPANTS, Value::Array(members.iter().map(|p| (*p).into()).collect()));
        for member in &members {
            patch.push(joined_at_field(member), FieldOp::ServerTimestamp);
        }
        return EnsurePlan::Create(
            patch
                .server_timestamp(field::CREATED_AT)
                .server_timestamp(field::UPDATED_AT)
                .set(field::LAST_MESSAGE, notices.room_opened.as_str()),
        );
    };

    let mut patch = Patch::new();

    if let Some(kind) = request.kind
        && room.kind_tag.as_deref() != Some(kind.as_str())
    {
        patch.push(field::KIND, FieldOp::Set(kind.as_str().into()));
    }

    let mut joining = Vec::new();
    for member in std::iter::once(caller).chain(owner) {
        if !room.is_participant(member) {
            joining.push(member.into());
        }
        if room.joined_at(member).is_none() {
            patch.push(joined_at_field(member), FieldOp::ServerTimestamp);
        }
    }
    if !joining.is_empty() {
        patch.push(field::PARTICIPANTS, FieldOp::ArrayUnion(joining));
    }

    if room.owner_id.is_none()
        && let Some(owner) = &request.owner
    {
        patch.push(field::OWNER_ID, FieldOp::Set(owner.into()));
    }

    if patch.is_empty() { EnsurePlan::Unchanged } else { EnsurePlan::Update(patch) }
}

/// Creates rooms and keeps their memberships whole.
#[derive(Clone)]
pub struct RoomDirectory<S: Store> {
    store: S,
    notices: Notices,
}

impl<S: Store> RoomDirectory<S> {
    /// Directory over `store`.
    pub fn new(store: S, notices: Notices) -> Self {
        Self { store, notices }
    }

    /// Make sure the room exists and the caller (and owner, if given) are
    /// members with a `joinedAt`. Safe to call on every room entry.
    ///
    /// A failed read is logged and reported as [`EnsureOutcome::Deferred`];
    /// a failed write is returned.
    pub fn ensure_room(
        &self,
        session: &Session,
        request: &EnsureRoom,
    ) -> Result<EnsureOutcome, ChatError> {
        let caller = session.caller()?;
        let path = room_path(&request.room);

        let existing = match self.store.get(&path) {
            Ok(doc) => doc.map(|doc| Room::from_document(&doc)).transpose()?,
            Err(e) => {
                tracing::warn!(room = %request.room, error = %e, "room read failed, deferring ensure");
                return Ok(EnsureOutcome::Deferred);
            },
        };

        match plan_ensure(existing.as_ref(), request, &caller.id, &self.notices) {
            EnsurePlan::Create(patch) => {
                self.store.set(&path, &patch)?;
                tracing::info!(room = %request.room, caller = %caller.id, "room created");
                Ok(EnsureOutcome::Created)
            },
            EnsurePlan::Update(patch) => {
                self.store.update(&path, &patch)?;
                tracing::debug!(room = %request.room, caller = %caller.id, ops = patch.len(), "room repaired");
                Ok(EnsureOutcome::Updated)
            },
            EnsurePlan::Unchanged => {
                tracing::trace!(room = %request.room, "room already consistent");
                Ok(EnsureOutcome::Unchanged)
            },
        }
    }

    /// Read and decode a room.
    pub fn room(&self, room: &RoomId) -> Result<Option<Room>, ChatError> {
        self.store.get(&room_path(room))?.map(|doc| Room::from_document(&doc)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use nanum_store::{Document, Fields, Timestamp};

    use super::*;
    use crate::room::rooms_collection;

    fn pid(id: &str) -> ParticipantId {
        ParticipantId::new(id)
    }

    fn request() -> EnsureRoom {
        EnsureRoom::new(RoomId::new("post_42").expect("valid id"), "Costco beef").owner("u1")
    }

    fn apply(existing: Option<&Room>, patch: &Patch, at: i64) -> Room {
        let mut fields = Fields::new();
        if let Some(room) = existing {
            fields = room_fields(room);
        }
        patch.apply(&mut fields, Timestamp::from_secs(at));
        Room::from_document(&Document::new(rooms_collection().doc("post_42"), fields)).expect("decode failed")
    }

    fn room_fields(room: &Room) -> Fields {
        let mut fields = Fields::new();
        fields.insert(field::PARTICIPANTS.into(), Value::Array(room.participants.iter().map(Into::into).collect()));
        let joined: BTreeMap<String, Value> =
            room.joined_at.iter().map(|(p, t)| (p.as_str().to_string(), Value::Timestamp(*t))).collect();
        fields.insert(field::JOINED_AT.into(), Value::Map(joined));
        if let Some(owner) = &room.owner_id {
            fields.insert(field::OWNER_ID.into(), owner.into());
        }
        if let Some(tag) = &room.kind_tag {
            fields.insert(field::KIND.into(), tag.as_str().into());
        }
        fields
    }

    #[test]
    fn create_stamps_caller_and_owner() {
        let plan = plan_ensure(None, &request(), &pid("u2"), &Notices::default());
        let EnsurePlan::Create(patch) = plan else {
            panic!("expected create, got {plan:?}");
        };

        let room = apply(None, &patch, 3);
        assert_eq!(room.participants, vec![pid("u2"), pid("u1")]);
        assert_eq!(room.joined_at(&pid("u1")), Some(Timestamp::from_secs(3)));
        assert_eq!(room.joined_at(&pid("u2")), Some(Timestamp::from_secs(3)));
        assert_eq!(room.owner_id, Some(pid("u1")));
        assert!(!room.is_closed);
    }

    #[test]
    fn second_call_is_unchanged() {
        let EnsurePlan::Create(patch) = plan_ensure(None, &request(), &pid("u2"), &Notices::default()) else {
            panic!("expected create");
        };
        let room = apply(None, &patch, 3);

        assert_eq!(plan_ensure(Some(&room), &request(), &pid("u2"), &Notices::default()), EnsurePlan::Unchanged);
    }

    #[test]
    fn member_without_joined_at_is_healed() {
        let EnsurePlan::Create(patch) = plan_ensure(None, &request(), &pid("u2"), &Notices::default()) else {
            panic!("expected create");
        };
        let mut room = apply(None, &patch, 3);
        room.joined_at.remove(&pid("u2"));

        let EnsurePlan::Update(fix) = plan_ensure(Some(&room), &request(), &pid("u2"), &Notices::default()) else {
            panic!("expected update");
        };
        assert_eq!(fix.len(), 1);

        let healed = apply(Some(&room), &fix, 9);
        assert_eq!(healed.joined_at(&pid("u2")), Some(Timestamp::from_secs(9)));
        assert_eq!(healed.joined_at(&pid("u1")), Some(Timestamp::from_secs(3)));
        assert_eq!(healed.participants, room.participants);
    }

    #[test]
    fn owner_missing_from_members_is_restored() {
        let EnsurePlan::Create(patch) = plan_ensure(None, &request(), &pid("u2"), &Notices::default()) else {
            panic!("expected create");
        };
        let mut room = apply(None, &patch, 3);
        room.participants.retain(|p| *p != pid("u1"));

        let EnsurePlan::Update(fix) = plan_ensure(Some(&room), &request(), &pid("u2"), &Notices::default()) else {
            panic!("expected update");
        };
        let restored = apply(Some(&room), &fix, 9);
        assert!(restored.is_participant(&pid("u1")));
        assert_eq!(restored.joined_at(&pid("u1")), Some(Timestamp::from_secs(3)));
    }

    #[test]
    fn relabel_and_fill_owner() {
        let EnsurePlan::Create(patch) =
            plan_ensure(None, &EnsureRoom::new(RoomId::new("post_42").expect("valid id"), "x"), &pid("u2"), &Notices::default())
        else {
            panic!("expected create");
        };
        let mut room = apply(None, &patch, 3);
        room.owner_id = None;

        let request = request().kind(RoomKind::Free);
        let EnsurePlan::Update(fix) = plan_ensure(Some(&room), &request, &pid("u2"), &Notices::default()) else {
            panic!("expected update");
        };
        assert_eq!(fix.op_for(&field::KIND.into()), Some(&FieldOp::Set("free".into())));
        assert_eq!(fix.op_for(&field::OWNER_ID.into()), Some(&FieldOp::Set("u1".into())));
    }
}
