//! Chat error types.

use nanum_store::StoreError;
use thiserror::Error;

use crate::{ListingId, ParticipantId, RoomId};

/// Errors returned by chat operations.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The room is closed. The message was not sent; callers should restore
    /// the composer text.
    #[error("room {0} is closed")]
    RoomClosed(RoomId),

    /// No signed-in caller. Nothing was read or written.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Message has neither text nor an image. Rejected before any write.
    #[error("message has no text or image")]
    ContentMissing,

    /// Deleting the listing behind a room failed during owner-leave.
    ///
    /// Never returned from the owner-leave path itself: the room is closed
    /// regardless, and this error is only logged.
    #[error("failed to delete listing {listing}: {source}")]
    DependentDeleteFailed {
        /// Listing that could not be deleted
        listing: ListingId,
        /// Underlying store failure
        #[source]
        source: StoreError,
    },

    /// No room with this id exists.
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// Room id is blank or contains a path separator.
    #[error("invalid room id {0:?}")]
    InvalidRoomId(String),

    /// Only the room owner may close it.
    #[error("{caller} is not the owner of room {room}")]
    NotOwner {
        /// Room the caller tried to close
        room: RoomId,
        /// Who tried
        caller: ParticipantId,
    },

    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A stored document does not have the expected shape.
    #[error("malformed document {path}: {reason}")]
    Decode {
        /// Full document path
        path: String,
        /// What was wrong with it
        reason: String,
    },
}

impl ChatError {
    /// Stable code for UI feedback and the CLI.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomClosed(_) => "ROOM_CLOSED",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::ContentMissing => "CONTENT_MISSING",
            Self::DependentDeleteFailed { .. } => "DEPENDENT_DELETE_FAILED",
            Self::RoomNotFound(_) => "ROOM_NOT_FOUND",
            Self::InvalidRoomId(_) => "INVALID_ROOM_ID",
            Self::NotOwner { .. } => "NOT_OWNER",
            Self::Store(_) => "STORE",
            Self::Decode { .. } => "DECODE",
        }
    }

    /// Returns true if retrying the same operation later may succeed.
    ///
    /// Protocol refusals (closed room, missing content, not the owner) are
    /// never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) | Self::DependentDeleteFailed { source: e, .. } => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_taxonomy() {
        let room = RoomId::new("post_42").expect("valid id");
        assert_eq!(ChatError::RoomClosed(room.clone()).code(), "ROOM_CLOSED");
        assert_eq!(ChatError::RoomNotFound(room).code(), "ROOM_NOT_FOUND");
        assert_eq!(ChatError::ContentMissing.code(), "CONTENT_MISSING");
        assert_eq!(ChatError::NotAuthenticated.code(), "NOT_AUTHENTICATED");
    }

    #[test]
    fn store_io_failures_are_transient() {
        assert!(ChatError::Store(StoreError::Io("timeout".into())).is_transient());
        assert!(!ChatError::Store(StoreError::NotFound { path: "a/b".into() }).is_transient());
        assert!(!ChatError::ContentMissing.is_transient());
        assert!(
            ChatError::DependentDeleteFailed {
                listing: ListingId::new("42"),
                source: StoreError::Io("down".into()),
            }
            .is_transient()
        );
    }

    #[test]
    fn display_includes_context() {
        let err = ChatError::NotOwner {
            room: RoomId::new("post_42").expect("valid id"),
            caller: ParticipantId::new("u2"),
        };
        assert_eq!(err.to_string(), "u2 is not the owner of room post_42");
    }
}
