//! Store-level invariants for the chat core.
//!
//! Checks run against a [`SystemSnapshot`]: every room document and message
//! log read back out of the store, plus the `readBy` and closed-room
//! histories accumulated across captures. They look only at persisted data,
//! so they hold the same way over a reliable store and over one that drops
//! writes.
//!
//! ```ignore
//! let mut snapshot = SystemSnapshot::capture(&store)?;
//! // ... drive the service ...
//! snapshot.record(&store)?;
//! InvariantRegistry::standard().check_all(&snapshot)?;
//! ```

mod checks;
mod snapshot;

use std::fmt;

use nanum_chat::RoomId;

pub use checks::{ClosedRoomQuiescence, JoinedAtCoverage, ReadByGrowth, SenderInReadBy};
pub use snapshot::{RoomSnapshot, SystemSnapshot};

/// Outcome of one check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant, tied to the room whose stored state broke it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Room whose documents violate it.
    pub room: RoomId,
    /// What the stored state looked like.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in room {}: {}", self.invariant, self.room, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property of persisted chat state.
pub trait Invariant: Send + Sync {
    /// Name used in violation reports.
    fn name(&self) -> &'static str;

    /// Check the snapshot. Reports the first offending room.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;

    /// Violation of this invariant in `room`.
    fn violation(&self, room: &RoomId, message: String) -> Violation {
        Violation { invariant: self.name(), room: room.clone(), message }
    }
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// The chat core invariants:
    /// - [`JoinedAtCoverage`]: every participant has a `joinedAt`
    /// - [`SenderInReadBy`]: a message's sender has always read it
    /// - [`ClosedRoomQuiescence`]: closed rooms gain no messages
    /// - [`ReadByGrowth`]: `readBy` never loses a reader
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(JoinedAtCoverage);
        registry.add(SenderInReadBy);
        registry.add(ClosedRoomQuiescence);
        registry.add(ReadByGrowth);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Run every registered check. Collects one violation per failing
    /// invariant.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
