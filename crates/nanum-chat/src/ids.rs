//! Identifier newtypes.
//!
//! Rooms created for a marketplace listing use the id `"post_" + listingId`.
//! The owner-leave path relies on this being bit-exact to find the listing it
//! deletes, so the conversion lives in exactly one place.

use std::fmt;

use nanum_store::{DocId, Value};

use crate::ChatError;

const LISTING_PREFIX: &str = "post_";

/// Sender id reserved for messages generated by the room itself.
pub const SYSTEM_SENDER: &str = "system";

/// Conversation room id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomId(String);

impl RoomId {
    /// Parse a room id, rejecting blank input.
    pub fn new(id: impl Into<String>) -> Result<Self, ChatError> {
        let id = id.into();
        if id.trim().is_empty() || id.contains('/') {
            return Err(ChatError::InvalidRoomId(id));
        }
        Ok(Self(id))
    }

    /// Room bound to a marketplace listing.
    pub fn for_listing(listing: &ListingId) -> Self {
        Self(format!("{LISTING_PREFIX}{}", listing.0))
    }

    /// Listing this room was created for, if it follows the listing
    /// convention.
    pub fn listing_id(&self) -> Option<ListingId> {
        self.0
            .strip_prefix(LISTING_PREFIX)
            .filter(|rest| !rest.is_empty())
            .map(|rest| ListingId(rest.to_string()))
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&RoomId> for DocId {
    fn from(id: &RoomId) -> Self {
        DocId::new(id.0.clone())
    }
}

impl From<&RoomId> for Value {
    fn from(id: &RoomId) -> Self {
        Value::String(id.0.clone())
    }
}

/// Marketplace listing id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListingId(String);

impl ListingId {
    /// Wrap a listing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&ListingId> for DocId {
    fn from(id: &ListingId) -> Self {
        DocId::new(id.0.clone())
    }
}

/// Participant (user) id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Wrap a participant id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The reserved sender of system messages.
    pub fn system() -> Self {
        Self(SYSTEM_SENDER.to_string())
    }

    /// True for the reserved system sender.
    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_SENDER
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<&ParticipantId> for Value {
    fn from(id: &ParticipantId) -> Self {
        Value::String(id.0.clone())
    }
}

impl From<&ParticipantId> for DocId {
    fn from(id: &ParticipantId) -> Self {
        DocId::new(id.0.clone())
    }
}

/// Store-assigned message id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap a message id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<DocId> for MessageId {
    fn from(id: DocId) -> Self {
        Self(id.as_str().to_string())
    }
}

impl From<&MessageId> for DocId {
    fn from(id: &MessageId) -> Self {
        DocId::new(id.0.clone())
    }
}
