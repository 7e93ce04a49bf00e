//! Room lifecycle: member leave and owner teardown.
//!
//! `OPEN -> CLOSED` is the only transition and it is terminal. Neither path
//! is transactional; each is a short sequence of independent atomic writes
//! that converges when retried.

use std::sync::Arc;

use nanum_store::{FieldOp, Patch, Store, StoreError, Value};

use crate::{
    ChatError, ListingId, ParticipantId, Room, RoomId, Session,
    config::{ChatConfig, Notices},
    message::NewMessage,
    room::{field, listing_path, messages_collection, room_path},
};

/// Listing field counting joined guests.
const CURRENT_PARTICIPANTS: &str = "currentParticipants";

/// What a leave did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The room does not exist; nothing was written.
    NoRoom,
    /// The caller was removed from the room.
    Left,
    /// The caller was not a member; only the room preview was refreshed.
    NotMember,
    /// The owner closed the room.
    Closed,
    /// The room was already closed; only leftover membership was removed.
    AlreadyClosed,
}

/// Drives room state transitions.
#[derive(Clone)]
pub struct LifecycleController<S: Store> {
    store: S,
    config: Arc<ChatConfig>,
}

impl<S: Store> LifecycleController<S> {
    /// Controller over `store`.
    pub fn new(store: S, config: Arc<ChatConfig>) -> Self {
        Self { store, config }
    }

    fn notices(&self) -> &Notices {
        &self.config.notices
    }

    fn load(&self, room_id: &RoomId) -> Result<Option<Room>, ChatError> {
        self.store.get(&room_path(room_id))?.map(|doc| Room::from_document(&doc)).transpose()
    }

    /// Leave a room as a member. The room stays open for everyone else.
    ///
    /// A non-owner leaving a listing room also releases one seat on the
    /// listing, best-effort.
    pub fn leave_room(&self, session: &Session, room_id: &RoomId) -> Result<LeaveOutcome, ChatError> {
        let caller = session.caller()?;
        let Some(room) = self.load(room_id)? else {
            tracing::debug!(room = %room_id, "leave ignored, room missing");
            return Ok(LeaveOutcome::NoRoom);
        };

        let nick = caller.nickname(&self.notices().default_nickname);
        let preview = Notices::render(&self.notices().member_left_preview, nick);
        let path = room_path(room_id);

        if !room.is_participant(&caller.id) {
            if !room.is_closed {
                self.store.update(
                    &path,
                    &Patch::new()
                        .set(field::LAST_MESSAGE, preview.as_str())
                        .server_timestamp(field::UPDATED_AT),
                )?;
            }
            return Ok(LeaveOutcome::NotMember);
        }

        let mut patch = Patch::new()
            .with(field::PARTICIPANTS, FieldOp::ArrayRemove(vec![(&caller.id).into()]));
        if !room.is_closed {
            let text = Notices::render(&self.notices().member_left, nick);
            self.post_system_message(room_id, &text, &caller.id)?;
            patch = patch
                .set(field::LAST_MESSAGE, preview.as_str())
                .server_timestamp(field::UPDATED_AT);
        }
        self.store.update(&path, &patch)?;
        tracing::info!(room = %room_id, participant = %caller.id, "participant left");

        if !room.is_owner(&caller.id)
            && let Some(listing) = room_id.listing_id()
        {
            self.release_seat(&listing);
        }

        Ok(LeaveOutcome::Left)
    }

    /// Close the room as its owner.
    ///
    /// In order: delete the listing behind a `post_` room (failures are
    /// logged and do not block the close), append the closing system
    /// message, then mark the room closed and remove the owner. Repeating
    /// the call on a closed room only retries the listing delete and the
    /// membership removal.
    pub fn leave_room_as_owner(
        &self,
        session: &Session,
        room_id: &RoomId,
    ) -> Result<LeaveOutcome, ChatError> {
        let caller = session.caller()?;
        let Some(room) = self.load(room_id)? else {
            tracing::debug!(room = %room_id, "owner leave ignored, room missing");
            return Ok(LeaveOutcome::NoRoom);
        };
        if !room.is_owner(&caller.id) {
            return Err(ChatError::NotOwner { room: room_id.clone(), caller: caller.id.clone() });
        }

        if let Some(listing) = room_id.listing_id()
            && let Err(e) = self.delete_listing(&listing)
        {
            tracing::warn!(room = %room_id, error = %e, "listing delete failed, closing anyway");
        }

        let path = room_path(room_id);
        let leave = Patch::new()
            .with(field::PARTICIPANTS, FieldOp::ArrayRemove(vec![(&caller.id).into()]));

        if room.is_closed {
            if room.is_participant(&caller.id) {
                self.store.update(&path, &leave)?;
            }
            return Ok(LeaveOutcome::AlreadyClosed);
        }

        let text = self.notices().owner_closed.clone();
        self.post_system_message(room_id, &text, &caller.id)?;
        self.store.update(
            &path,
            &leave
                .set(field::IS_CLOSED, true)
                .set(field::CLOSED_BY, &caller.id)
                .server_timestamp(field::CLOSED_AT)
                .set(field::LAST_MESSAGE, text.as_str())
                .server_timestamp(field::UPDATED_AT),
        )?;

        tracing::info!(room = %room_id, owner = %caller.id, "room closed");
        Ok(LeaveOutcome::Closed)
    }

    fn post_system_message(
        &self,
        room_id: &RoomId,
        text: &str,
        reader: &ParticipantId,
    ) -> Result<(), ChatError> {
        let system = ParticipantId::system();
        let message = NewMessage {
            sender_id: &system,
            sender_name: &self.notices().system_name,
            sender_email: None,
            text,
            image: None,
            reader,
        };
        self.store.add(&messages_collection(room_id), &message.to_patch())?;
        Ok(())
    }

    /// Delete a listing. An already-deleted listing counts as success.
    fn delete_listing(&self, listing: &ListingId) -> Result<(), ChatError> {
        match self.store.delete(&listing_path(listing)) {
            Ok(()) => {
                tracing::info!(listing = %listing, "listing deleted");
                Ok(())
            },
            Err(StoreError::NotFound { .. }) => {
                tracing::debug!(listing = %listing, "listing already gone");
                Ok(())
            },
            Err(source) => {
                Err(ChatError::DependentDeleteFailed { listing: listing.clone(), source })
            },
        }
    }

    /// Decrement the listing's participant counter if it is positive.
    fn release_seat(&self, listing: &ListingId) {
        let path = listing_path(listing);
        let result = self.store.get(&path).and_then(|doc| {
            let current =
                doc.as_ref().and_then(|d| d.field(CURRENT_PARTICIPANTS)).and_then(Value::as_int);
            match current {
                Some(n) if n > 0 => self.store.update(
                    &path,
                    &Patch::new().with(CURRENT_PARTICIPANTS, FieldOp::Increment(-1)),
                ),
                _ => Ok(()),
            }
        });
        if let Err(e) = result {
            tracing::warn!(listing = %listing, error = %e, "seat release failed");
        }
    }
}
