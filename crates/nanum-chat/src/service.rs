//! Front door of the chat core.
//!
//! [`ChatService`] wires the directory, log, receipt tracker and lifecycle
//! controller over one store and one configuration. Every operation takes the
//! caller's [`Session`]; there is no ambient identity.

use std::sync::Arc;

use nanum_store::{Direction, FilterOp, Query, Store, Subscription};

use crate::{
    ChatConfig, ChatError, MessageFeed, MessageId, Room, RoomId, Session,
    directory::{EnsureOutcome, EnsureRoom, RoomDirectory},
    lifecycle::{LeaveOutcome, LifecycleController},
    log::MessageLog,
    receipts::ReceiptTracker,
    room::{field, rooms_collection},
};

/// Chat operations over a document store.
#[derive(Clone)]
pub struct ChatService<S: Store> {
    store: S,
    config: Arc<ChatConfig>,
    directory: RoomDirectory<S>,
    log: MessageLog<S>,
    receipts: ReceiptTracker<S>,
    lifecycle: LifecycleController<S>,
}

impl<S: Store> ChatService<S> {
    /// Service over `store` with `config`.
    pub fn new(store: S, config: ChatConfig) -> Self {
        let config = Arc::new(config);
        Self {
            directory: RoomDirectory::new(store.clone(), config.notices.clone()),
            log: MessageLog::new(store.clone(), Arc::clone(&config)),
            receipts: ReceiptTracker::new(store.clone(), config.read_cache_capacity),
            lifecycle: LifecycleController::new(store.clone(), Arc::clone(&config)),
            store,
            config,
        }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// See [`RoomDirectory::ensure_room`].
    pub fn ensure_room(&self, session: &Session, request: &EnsureRoom) -> Result<EnsureOutcome, ChatError> {
        self.directory.ensure_room(session, request)
    }

    /// Read one room.
    pub fn room(&self, room: &RoomId) -> Result<Option<Room>, ChatError> {
        self.directory.room(room)
    }

    /// See [`MessageLog::send_message`].
    pub fn send_message(
        &self,
        session: &Session,
        room: &RoomId,
        text: &str,
        image: Option<&str>,
    ) -> Result<MessageId, ChatError> {
        self.log.send_message(session, room, text, image)
    }

    /// See [`MessageLog::subscribe_messages`].
    pub fn subscribe_messages(
        &self,
        session: &Session,
        room: &RoomId,
        on_messages: impl Fn(Vec<crate::Message>) + Send + Sync + 'static,
    ) -> Result<MessageFeed, ChatError> {
        self.log.subscribe_messages(session, room, on_messages)
    }

    /// Subscribe to the rooms the caller belongs to, most recently active
    /// first. Undecodable rooms are skipped.
    pub fn subscribe_my_rooms(
        &self,
        session: &Session,
        on_rooms: impl Fn(Vec<Room>) + Send + Sync + 'static,
    ) -> Result<Subscription, ChatError> {
        let caller = session.caller()?;
        let query = Query::collection(rooms_collection())
            .filter(field::PARTICIPANTS, FilterOp::ArrayContains((&caller.id).into()))
            .order_by(field::UPDATED_AT, Direction::Descending);

        let subscription = self.store.subscribe_query(
            &query,
            Box::new(move |docs| {
                let rooms = docs
                    .iter()
                    .filter_map(|doc| match Room::from_document(doc) {
                        Ok(room) => Some(room),
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping malformed room");
                            None
                        },
                    })
                    .collect();
                on_rooms(rooms);
            }),
        )?;
        Ok(subscription)
    }

    /// See [`ReceiptTracker::mark_as_read`].
    pub fn mark_as_read(&self, session: &Session, room: &RoomId, ids: &[MessageId]) -> Result<usize, ChatError> {
        self.receipts.mark_as_read(session, room, ids)
    }

    /// See [`LifecycleController::leave_room`].
    pub fn leave_room(&self, session: &Session, room: &RoomId) -> Result<LeaveOutcome, ChatError> {
        self.lifecycle.leave_room(session, room)
    }

    /// See [`LifecycleController::leave_room_as_owner`].
    pub fn leave_room_as_owner(&self, session: &Session, room: &RoomId) -> Result<LeaveOutcome, ChatError> {
        self.lifecycle.leave_room_as_owner(session, room)
    }
}
