//! Per-viewer message visibility.
//!
//! A participant sees the part of the log that starts at their `joinedAt`,
//! less a grace window. The projection is recomputed for every viewer on
//! every log change and never shared between viewers.

use std::{collections::BTreeSet, time::Duration};

use nanum_store::Timestamp;

use crate::{Message, ParticipantId};

/// Earliest `createdAt` a viewer who joined at `joined_at` may see.
pub fn visibility_floor(joined_at: Timestamp, grace: Duration) -> Timestamp {
    joined_at.saturating_sub(grace)
}

/// Messages created at or after `joined_at - grace`, in input order.
pub fn visible(messages: &[Message], joined_at: Timestamp, grace: Duration) -> Vec<Message> {
    let floor = visibility_floor(joined_at, grace);
    messages.iter().filter(|m| m.created_at >= floor).cloned().collect()
}

/// One participant's view of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    /// Who is looking.
    pub id: ParticipantId,
    /// Senders whose messages are hidden. System messages are always shown.
    pub blocked: BTreeSet<ParticipantId>,
}

impl Viewer {
    /// Viewer that blocks no one.
    pub fn new(id: ParticipantId) -> Self {
        Self { id, blocked: BTreeSet::new() }
    }

    /// Apply the join-time filter, then hide blocked senders.
    pub fn project(&self, messages: &[Message], joined_at: Timestamp, grace: Duration) -> Vec<Message> {
        let mut shown = visible(messages, joined_at, grace);
        shown.retain(|m| m.is_system() || !self.blocked.contains(&m.sender_id));
        shown
    }
}
