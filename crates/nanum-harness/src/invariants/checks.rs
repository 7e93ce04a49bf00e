//! Chat core invariant checks.

use super::{Invariant, InvariantResult, SystemSnapshot};

/// Every participant of every room has a `joinedAt`.
///
/// A member without one would be shown the whole history, so the protocol
/// never writes membership without a join time in the same patch.
pub struct JoinedAtCoverage;

impl Invariant for JoinedAtCoverage {
    fn name(&self) -> &'static str {
        "JoinedAtCoverage"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (id, snapshot) in &state.rooms {
            for member in &snapshot.room.participants {
                if snapshot.room.joined_at(member).is_none() {
                    return Err(self.violation(id, format!("participant {member} has no joinedAt")));
                }
            }
        }
        Ok(())
    }
}

/// `readBy` starts with the writer of a message.
///
/// User messages always list their sender. System messages list the
/// participant whose action produced them, so they are never unread by
/// everyone.
pub struct SenderInReadBy;

impl Invariant for SenderInReadBy {
    fn name(&self) -> &'static str {
        "SenderInReadBy"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (id, snapshot) in &state.rooms {
            for message in &snapshot.messages {
                let ok = if message.is_system() {
                    !message.read_by.is_empty()
                } else {
                    message.is_read_by(&message.sender_id)
                };
                if !ok {
                    return Err(self.violation(
                        id,
                        format!("message {}: readBy {:?} missing its writer", message.id, message.read_by),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A closed room stays closed and gains no messages.
///
/// Closing is terminal. Once a capture has seen a room closed, every later
/// capture must see it closed with the same message count.
pub struct ClosedRoomQuiescence;

impl Invariant for ClosedRoomQuiescence {
    fn name(&self) -> &'static str {
        "ClosedRoomQuiescence"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (id, counts) in &state.closed_history {
            let Some(snapshot) = state.rooms.get(id) else {
                return Err(self.violation(id, "closed room disappeared".to_string()));
            };
            if !snapshot.room.is_closed {
                return Err(self.violation(id, "reopened after closing".to_string()));
            }
            if snapshot.room.closed_by.is_none() {
                return Err(self.violation(id, "closed without closedBy".to_string()));
            }
            if let Some(window) = counts.windows(2).find(|w| w[0] != w[1]) {
                return Err(self.violation(
                    id,
                    format!("message count changed {} -> {} after closing", window[0], window[1]),
                ));
            }
        }
        Ok(())
    }
}

/// `readBy` never loses a reader across captures.
pub struct ReadByGrowth;

impl Invariant for ReadByGrowth {
    fn name(&self) -> &'static str {
        "ReadByGrowth"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for ((room, message), history) in &state.read_by_history {
            for window in history.windows(2) {
                if let Some(lost) = window[0].difference(&window[1]).next() {
                    return Err(self.violation(room, format!("message {message}: reader {lost} removed")));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use nanum_chat::{Message, MessageId, ParticipantId, Room, RoomId, RoomKind};
    use nanum_store::Timestamp;

    use super::*;
    use crate::invariants::RoomSnapshot;

    fn pid(id: &str) -> ParticipantId {
        ParticipantId::new(id)
    }

    fn room(members: &[&str], joined: &[&str]) -> Room {
        Room {
            id: RoomId::new("post_1").unwrap(),
            title: "t".to_string(),
            kind: RoomKind::Group,
            kind_tag: None,
            owner_id: Some(pid("u1")),
            participants: members.iter().copied().map(pid).collect(),
            joined_at: joined.iter().map(|p| (pid(p), Timestamp::from_secs(1))).collect(),
            is_closed: false,
            closed_by: None,
            closed_at: None,
            last_message: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn message(sender: &str, read_by: &[&str]) -> Message {
        Message {
            id: MessageId::new("m"),
            sender_id: pid(sender),
            sender_name: None,
            sender_email: None,
            text: "x".to_string(),
            image: None,
            created_at: Timestamp::from_secs(2),
            read_by: read_by.iter().copied().map(pid).collect(),
        }
    }

    fn single(room: Room, messages: Vec<Message>) -> SystemSnapshot {
        SystemSnapshot::empty().with_room(RoomSnapshot { room, messages })
    }

    #[test]
    fn member_without_joined_at_violates() {
        let state = single(room(&["u1", "u2"], &["u1"]), vec![]);
        let violation = JoinedAtCoverage.check(&state).unwrap_err();
        assert_eq!(violation.room, RoomId::new("post_1").unwrap());
        assert!(violation.message.contains("u2"));
        assert!(JoinedAtCoverage.check(&single(room(&["u1"], &["u1"]), vec![])).is_ok());
    }

    #[test]
    fn sender_must_have_read_own_message() {
        let r = room(&["u1"], &["u1"]);
        assert!(SenderInReadBy.check(&single(r.clone(), vec![message("u1", &["u2"])])).is_err());
        assert!(SenderInReadBy.check(&single(r.clone(), vec![message("u1", &["u1"])])).is_ok());
        assert!(SenderInReadBy.check(&single(r, vec![message("system", &["u1"])])).is_ok());
    }

    #[test]
    fn closed_room_must_stay_quiet() {
        let mut closed = room(&["u2"], &["u2"]);
        closed.is_closed = true;
        closed.closed_by = Some(pid("u1"));

        let mut state = single(closed.clone(), vec![message("system", &["u1"])]);
        state.closed_history.insert(closed.id.clone(), vec![1, 1]);
        assert!(ClosedRoomQuiescence.check(&state).is_ok());

        state.closed_history.insert(closed.id.clone(), vec![1, 2]);
        assert!(ClosedRoomQuiescence.check(&state).is_err());

        let mut reopened = single(room(&["u2"], &["u2"]), vec![]);
        reopened.closed_history.insert(closed.id, vec![1]);
        assert!(ClosedRoomQuiescence.check(&reopened).is_err());
    }

    #[test]
    fn lost_reader_violates() {
        let mut state = SystemSnapshot::empty();
        let key = (RoomId::new("post_1").unwrap(), MessageId::new("m"));
        let before: BTreeSet<_> = [pid("u1"), pid("u2")].into();
        let after: BTreeSet<_> = [pid("u1")].into();

        state.read_by_history.insert(key.clone(), vec![after.clone(), before.clone()]);
        assert!(ReadByGrowth.check(&state).is_ok());

        state.read_by_history.insert(key, vec![before, after]);
        assert!(ReadByGrowth.check(&state).unwrap_err().message.contains("u2"));
    }
}
