//! Message log: sending and the per-viewer message feed.
//!
//! # Feed state machine
//!
//! A [`MessageFeed`] holds two subscriptions. The outer one watches the room
//! document for the viewer's `joinedAt`; the inner one watches the newest
//! messages and exists only while a `joinedAt` is known.
//!
//! ```text
//! AwaitingJoin --room fires with joinedAt--> Attached
//! Attached     --room fires--------------->  Attached (inner replaced)
//! Attached     --room fires without it---->  AwaitingJoin (inner dropped)
//! any          --unsubscribe------------->  Closed (both levels torn down)
//! ```
//!
//! Room callbacks can nest (a message callback may send, which rewrites the
//! room). Each room callback takes a generation number; only the newest
//! generation may install its inner subscription, older ones tear theirs
//! down.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use nanum_store::{CollectionPath, Direction, Document, Patch, Query, Store, Subscription, Timestamp};

use crate::{
    ChatError, Message, MessageId, ParticipantId, Room, RoomId, Session, Viewer,
    config::ChatConfig,
    message::{self, NewMessage},
    room::{self, messages_collection, room_path},
};

const NOTIFICATIONS: &str = "notifications";
const USERS: &str = "users";

/// Callback receiving the viewer's visible messages, oldest first.
pub type MessagesCallback = Arc<dyn Fn(Vec<Message>) + Send + Sync>;

/// Appends messages and serves per-viewer feeds.
#[derive(Clone)]
pub struct MessageLog<S: Store> {
    store: S,
    config: Arc<ChatConfig>,
}

impl<S: Store> MessageLog<S> {
    /// Log over `store`.
    pub fn new(store: S, config: Arc<ChatConfig>) -> Self {
        Self { store, config }
    }

    /// Append a message from the caller.
    ///
    /// Rejects blank content before touching the store, then refuses closed
    /// or missing rooms. The closed check reads the room just before writing;
    /// a close racing with this send may let one message through.
    ///
    /// After the message and the room preview are written, every other
    /// participant gets a notification. Notification failures are logged and
    /// ignored.
    pub fn send_message(
        &self,
        session: &Session,
        room_id: &RoomId,
        text: &str,
        image: Option<&str>,
    ) -> Result<MessageId, ChatError> {
        let caller = session.caller()?;
        let image = image.filter(|url| !url.trim().is_empty());
        let has_text = !text.trim().is_empty();
        if !has_text && image.is_none() {
            return Err(ChatError::ContentMissing);
        }

        let path = room_path(room_id);
        let Some(doc) = self.store.get(&path)? else {
            return Err(ChatError::RoomNotFound(room_id.clone()));
        };
        let room = Room::from_document(&doc)?;
        if room.is_closed {
            tracing::debug!(room = %room_id, sender = %caller.id, "send refused, room closed");
            return Err(ChatError::RoomClosed(room_id.clone()));
        }

        let notices = &self.config.notices;
        let nick = caller.nickname(&notices.default_nickname);
        let text = if has_text { text } else { "" };

        let id: MessageId = self
            .store
            .add(
                &messages_collection(room_id),
                &NewMessage {
                    sender_id: &caller.id,
                    sender_name: nick,
                    sender_email: caller.email.as_deref(),
                    text,
                    image,
                    reader: &caller.id,
                }
                .to_patch(),
            )?
            .into();

        let preview = notices.preview(text, image.is_some());
        self.store.update(
            &path,
            &Patch::new()
                .set(room::field::LAST_MESSAGE, preview.as_str())
                .server_timestamp(room::field::UPDATED_AT),
        )?;

        self.notify_others(&room, &caller.id, nick, &preview);

        tracing::debug!(room = %room_id, sender = %caller.id, message = %id, "message sent");
        Ok(id)
    }

    fn notify_others(&self, room: &Room, sender: &ParticipantId, nick: &str, preview: &str) {
        let notices = &self.config.notices;
        let title = if room.title.is_empty() { notices.default_room_title.as_str() } else { room.title.as_str() };
        let body = format!("{nick}: {preview}");

        for target in room.others(sender) {
            let inbox = CollectionPath::root(USERS).doc(target).collection(NOTIFICATIONS);
            let notification = Patch::new()
                .set("type", "chat")
                .set("roomId", &room.id)
                .set("roomName", title)
                .set("title", title)
                .set("body", body.as_str())
                .set("isRead", false)
                .server_timestamp("createdAt")
                .set("senderId", sender);

            if let Err(e) = self.store.add(&inbox, &notification) {
                tracing::warn!(room = %room.id, target = %target, error = %e, "notification fan-out failed");
            }
        }
    }

    /// Subscribe to the caller's visible messages in a room.
    ///
    /// `on_messages` receives the visible messages, oldest first, each time
    /// they change. Nothing is delivered while the caller has no `joinedAt`
    /// in the room.
    ///
    /// Only the newest `message_window` messages are read. Once a room holds
    /// more than that, older visible messages drop out of the delivered set,
    /// so the feed is not a full history.
    pub fn subscribe_messages(
        &self,
        session: &Session,
        room_id: &RoomId,
        on_messages: impl Fn(Vec<Message>) + Send + Sync + 'static,
    ) -> Result<MessageFeed, ChatError> {
        let caller = session.caller()?;

        let feed = Arc::new(FeedShared {
            store: self.store.clone(),
            room: room_id.clone(),
            query: Query::collection(messages_collection(room_id))
                .order_by(message::field::CREATED_AT, Direction::Descending)
                .limit(self.config.message_window),
            viewer: Viewer { id: caller.id.clone(), blocked: caller.blocked.clone() },
            grace: self.config.grace,
            on_messages: Arc::new(on_messages),
            state: Mutex::new(FeedState { generation: 0, phase: FeedPhase::AwaitingJoin }),
        });

        let outer = {
            let feed = Arc::clone(&feed);
            self.store
                .subscribe_doc(&room_path(room_id), Box::new(move |doc| feed.on_room(doc)))?
        };

        Ok(MessageFeed { outer, feed })
    }
}

/// Phase of a feed.
enum FeedPhase {
    AwaitingJoin,
    Attached { joined_at: Timestamp, inner: Subscription },
    Closed,
}

struct FeedState {
    generation: u64,
    phase: FeedPhase,
}

/// State shared by the room callback and the feed handle.
struct FeedShared<S: Store> {
    store: S,
    room: RoomId,
    query: Query,
    viewer: Viewer,
    grace: Duration,
    on_messages: MessagesCallback,
    state: Mutex<FeedState>,
}

impl<S: Store> FeedShared<S> {
    fn lock(&self) -> std::sync::MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Outer callback: tear down the inner subscription and reattach it for
    /// the current `joinedAt`.
    fn on_room(&self, doc: Option<Document>) {
        let Some(doc) = doc else {
            // A missing room keeps whatever is attached
            return;
        };
        let joined_at = match Room::from_document(&doc) {
            Ok(room) => room.joined_at(&self.viewer.id),
            Err(e) => {
                tracing::warn!(room = %self.room, error = %e, "undecodable room in feed");
                return;
            },
        };

        let (generation, previous) = {
            let mut state = self.lock();
            if matches!(state.phase, FeedPhase::Closed) {
                return;
            }
            state.generation += 1;
            (state.generation, std::mem::replace(&mut state.phase, FeedPhase::AwaitingJoin))
        };
        if let FeedPhase::Attached { inner, .. } = previous {
            inner.unsubscribe();
        }

        let Some(joined_at) = joined_at else {
            tracing::debug!(room = %self.room, viewer = %self.viewer.id, "awaiting joinedAt");
            return;
        };

        let inner = match self.attach(joined_at) {
            Ok(inner) => inner,
            Err(e) => {
                tracing::warn!(room = %self.room, error = %e, "message subscription failed");
                return;
            },
        };

        let mut state = self.lock();
        if state.generation == generation && !matches!(state.phase, FeedPhase::Closed) {
            state.phase = FeedPhase::Attached { joined_at, inner };
        } else {
            drop(state);
            inner.unsubscribe();
        }
    }

    fn attach(&self, joined_at: Timestamp) -> Result<Subscription, ChatError> {
        let viewer = self.viewer.clone();
        let grace = self.grace;
        let on_messages = Arc::clone(&self.on_messages);

        let inner = self.store.subscribe_query(
            &self.query,
            Box::new(move |docs| {
                // Newest first from the store; deliver oldest first
                let log: Vec<Message> = docs
                    .iter()
                    .rev()
                    .filter_map(|doc| match Message::from_document(doc) {
                        Ok(message) => Some(message),
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping malformed message");
                            None
                        },
                    })
                    .collect();
                on_messages(viewer.project(&log, joined_at, grace));
            }),
        )?;
        Ok(inner)
    }
}

/// Handle of a live message feed.
///
/// `unsubscribe` tears down the room subscription and any attached message
/// subscription. Dropping the handle does the same.
#[must_use = "dropping a MessageFeed unsubscribes immediately"]
pub struct MessageFeed {
    outer: Subscription,
    feed: Arc<dyn FeedControl>,
}

/// Type-erased access to a feed's state.
trait FeedControl: Send + Sync {
    fn close(&self);
    fn joined_at(&self) -> Option<Timestamp>;
}

impl<S: Store> FeedControl for FeedShared<S> {
    fn close(&self) {
        let previous = std::mem::replace(&mut self.lock().phase, FeedPhase::Closed);
        if let FeedPhase::Attached { inner, .. } = previous {
            inner.unsubscribe();
        }
    }

    fn joined_at(&self) -> Option<Timestamp> {
        match self.lock().phase {
            FeedPhase::Attached { joined_at, .. } => Some(joined_at),
            FeedPhase::AwaitingJoin | FeedPhase::Closed => None,
        }
    }
}

impl MessageFeed {
    /// Stop both levels. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        self.outer.unsubscribe();
        self.feed.close();
    }

    /// `joinedAt` the inner subscription is filtering with, if attached.
    pub fn joined_at(&self) -> Option<Timestamp> {
        self.feed.joined_at()
    }

    /// True while a message subscription is attached.
    pub fn is_attached(&self) -> bool {
        self.joined_at().is_some()
    }
}

impl Drop for MessageFeed {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for MessageFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageFeed")
            .field("active", &self.outer.is_active())
            .field("joined_at", &self.joined_at())
            .finish()
    }
}
