//! Room documents.
//!
//! Rooms live at `chatRooms/{roomId}`; their messages at
//! `chatRooms/{roomId}/messages`. Decoding is lenient the way the stored
//! data demands: rooms written by older clients may lack any field, so
//! absent fields decode to their empty value rather than failing.

use std::collections::BTreeMap;

use nanum_store::{CollectionPath, DocPath, Document, FieldPath, Timestamp, Value};

use crate::{ChatError, ListingId, ParticipantId, RoomId};

/// Stored field names.
pub(crate) mod field {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const KIND: &str = "type";
    pub const OWNER_ID: &str = "ownerId";
    pub const IS_CLOSED: &str = "isClosed";
    pub const CLOSED_BY: &str = "closedBy";
    pub const CLOSED_AT: &str = "closedAt";
    pub const PARTICIPANTS: &str = "participants";
    pub const JOINED_AT: &str = "joinedAt";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
    pub const LAST_MESSAGE: &str = "lastMessage";
}

const ROOMS: &str = "chatRooms";
const MESSAGES: &str = "messages";
const LISTINGS: &str = "posts";

/// Collection holding every room.
pub fn rooms_collection() -> CollectionPath {
    CollectionPath::root(ROOMS)
}

/// Path of a room document.
pub fn room_path(room: &RoomId) -> DocPath {
    rooms_collection().doc(room)
}

/// Message collection of a room.
pub fn messages_collection(room: &RoomId) -> CollectionPath {
    room_path(room).collection(MESSAGES)
}

/// Path of a listing document.
pub fn listing_path(listing: &ListingId) -> DocPath {
    CollectionPath::root(LISTINGS).doc(listing)
}

/// Field path of one participant's join time.
pub(crate) fn joined_at_field(participant: &ParticipantId) -> FieldPath {
    FieldPath::nested(field::JOINED_AT, participant.as_str())
}

/// Presentation tag of a room. Has no effect on the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomKind {
    /// Standard group-purchase room.
    #[default]
    Group,
    /// Free-share room.
    Free,
}

impl RoomKind {
    /// Stored tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Free => "free",
        }
    }

    /// Decode a stored tag. Unknown tags read as [`RoomKind::Group`].
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "free" => Self::Free,
            _ => Self::Group,
        }
    }
}

/// Lifecycle state. `Closed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomState {
    /// Accepting messages.
    Open,
    /// No further messages may be appended.
    Closed {
        /// Who closed it, if recorded
        by: Option<ParticipantId>,
        /// When, if the store has stamped it
        at: Option<Timestamp>,
    },
}

/// Decoded room document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// Room id (document id).
    pub id: RoomId,
    /// Display name.
    pub title: String,
    /// Presentation tag.
    pub kind: RoomKind,
    /// Stored tag as written, `None` if absent.
    pub kind_tag: Option<String>,
    /// Owner of the underlying listing, if recorded.
    pub owner_id: Option<ParticipantId>,
    /// Current members, in stored order.
    pub participants: Vec<ParticipantId>,
    /// Start of each participant's visibility window.
    pub joined_at: BTreeMap<ParticipantId, Timestamp>,
    /// Closed flag.
    pub is_closed: bool,
    /// Who closed the room.
    pub closed_by: Option<ParticipantId>,
    /// When the room was closed.
    pub closed_at: Option<Timestamp>,
    /// Preview of the latest activity.
    pub last_message: Option<String>,
    /// Creation time.
    pub created_at: Option<Timestamp>,
    /// Time of the latest activity.
    pub updated_at: Option<Timestamp>,
}

impl Room {
    /// Decode a room document.
    pub fn from_document(doc: &Document) -> Result<Self, ChatError> {
        let id = RoomId::new(doc.id().as_str()).map_err(|_| ChatError::Decode {
            path: doc.path.to_string(),
            reason: "blank room id".to_string(),
        })?;

        let participants = doc
            .field(field::PARTICIPANTS)
            .and_then(Value::as_array)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_str)
            .map(ParticipantId::new)
            .collect();

        let joined_at = doc
            .field(field::JOINED_AT)
            .and_then(Value::as_map)
            .map(|map| {
                map.iter()
                    .filter_map(|(pid, at)| {
                        at.as_timestamp().map(|at| (ParticipantId::new(pid.as_str()), at))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let kind_tag = doc.str_field(field::KIND).map(String::from);

        Ok(Self {
            id,
            title: doc.str_field(field::TITLE).unwrap_or_default().to_string(),
            kind: kind_tag.as_deref().map_or(RoomKind::Group, RoomKind::from_tag),
            kind_tag,
            owner_id: participant_field(doc, field::OWNER_ID),
            participants,
            joined_at,
            is_closed: doc.field(field::IS_CLOSED).and_then(Value::as_bool).unwrap_or(false),
            closed_by: participant_field(doc, field::CLOSED_BY),
            closed_at: doc.timestamp_field(field::CLOSED_AT),
            last_message: doc.str_field(field::LAST_MESSAGE).map(String::from),
            created_at: doc.timestamp_field(field::CREATED_AT),
            updated_at: doc.timestamp_field(field::UPDATED_AT),
        })
    }

    /// True if `participant` is a current member.
    pub fn is_participant(&self, participant: &ParticipantId) -> bool {
        self.participants.contains(participant)
    }

    /// Start of `participant`'s visibility window. A member without one is
    /// not a valid subscriber.
    pub fn joined_at(&self, participant: &ParticipantId) -> Option<Timestamp> {
        self.joined_at.get(participant).copied()
    }

    /// True if `participant` is the recorded owner.
    pub fn is_owner(&self, participant: &ParticipantId) -> bool {
        self.owner_id.as_ref() == Some(participant)
    }

    /// Lifecycle state.
    pub fn state(&self) -> RoomState {
        if self.is_closed {
            RoomState::Closed { by: self.closed_by.clone(), at: self.closed_at }
        } else {
            RoomState::Open
        }
    }

    /// Whether the composer (and join affordances) should be offered to
    /// `caller`. False once the room is closed.
    pub fn can_compose(&self, caller: &ParticipantId) -> bool {
        !self.is_closed && self.is_participant(caller)
    }

    /// Members other than `participant`.
    pub fn others<'a>(
        &'a self,
        participant: &'a ParticipantId,
    ) -> impl Iterator<Item = &'a ParticipantId> + 'a {
        self.participants.iter().filter(move |p| *p != participant && !p.as_str().is_empty())
    }
}

fn participant_field(doc: &Document, name: &str) -> Option<ParticipantId> {
    doc.str_field(name).filter(|s| !s.is_empty()).map(ParticipantId::new)
}
