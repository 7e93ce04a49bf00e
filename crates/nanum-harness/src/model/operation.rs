//! Operations for model-based testing.
//!
//! Operations are generated randomly and applied both to the [`ModelWorld`]
//! oracle and to a [`SimWorld`] running the real chat core.
//!
//! [`ModelWorld`]: super::ModelWorld
//! [`SimWorld`]: crate::SimWorld

use arbitrary::Arbitrary;
use nanum_chat::ChatError;

/// Participant index. Maps to participant id `u{n}`.
pub type Actor = u8;

/// Listing index. Maps to room id `post_{n}`.
pub type ModelRoomId = u8;

/// Actions a participant can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Enter a room, creating it if needed.
    Enter {
        /// Who enters.
        actor: Actor,
        /// Target room.
        room: ModelRoomId,
        /// Listing owner passed along on entry.
        owner: Option<Actor>,
    },

    /// Send a message.
    Send {
        /// Sender.
        actor: Actor,
        /// Target room.
        room: ModelRoomId,
        /// Attach an image instead of text.
        image: bool,
    },

    /// Open the room feed and mark everything pending as read.
    Read {
        /// Reader.
        actor: Actor,
        /// Target room.
        room: ModelRoomId,
    },

    /// Leave as a member.
    Leave {
        /// Who leaves.
        actor: Actor,
        /// Target room.
        room: ModelRoomId,
    },

    /// Leave as the owner, closing the room.
    OwnerLeave {
        /// Who leaves.
        actor: Actor,
        /// Target room.
        room: ModelRoomId,
    },

    /// Advance the store clock.
    AdvanceTime {
        /// Milliseconds to advance.
        millis: u16,
    },
}

impl Operation {
    /// Copy of the operation with actors and rooms folded into range.
    #[must_use]
    pub fn clamped(self, actors: u8, rooms: u8) -> Self {
        let a = |n: Actor| n % actors.max(1);
        let r = |n: ModelRoomId| n % rooms.max(1);
        match self {
            Self::Enter { actor, room, owner } => Self::Enter { actor: a(actor), room: r(room), owner: owner.map(a) },
            Self::Send { actor, room, image } => Self::Send { actor: a(actor), room: r(room), image },
            Self::Read { actor, room } => Self::Read { actor: a(actor), room: r(room) },
            Self::Leave { actor, room } => Self::Leave { actor: a(actor), room: r(room) },
            Self::OwnerLeave { actor, room } => Self::OwnerLeave { actor: a(actor), room: r(room) },
            Self::AdvanceTime { millis } => Self::AdvanceTime { millis },
        }
    }
}

/// Outcome of applying an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// The operation succeeded (including no-op outcomes).
    Ok,
    /// The operation was refused or failed.
    Error(OperationError),
}

impl OperationResult {
    /// True on success.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Failure classes compared between model and real system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Room is closed.
    RoomClosed,
    /// Room does not exist.
    RoomNotFound,
    /// Caller is not the room's owner.
    NotOwner,
    /// Store failure (only under fault injection).
    Store,
    /// Any other refusal.
    Other,
}

impl From<&ChatError> for OperationError {
    fn from(error: &ChatError) -> Self {
        match error {
            ChatError::RoomClosed(_) => Self::RoomClosed,
            ChatError::RoomNotFound(_) => Self::RoomNotFound,
            ChatError::NotOwner { .. } => Self::NotOwner,
            e if e.is_transient() => Self::Store,
            _ => Self::Other,
        }
    }
}

impl<T> From<Result<T, ChatError>> for OperationResult {
    fn from(result: Result<T, ChatError>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) => Self::Error(OperationError::from(&e)),
        }
    }
}
