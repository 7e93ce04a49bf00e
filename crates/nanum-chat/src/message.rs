//! Message documents.

use nanum_store::{Document, FieldOp, Patch, Timestamp, Value};

use crate::{ChatError, MessageId, ParticipantId};

/// Stored field names.
pub(crate) mod field {
    pub const TEXT: &str = "text";
    pub const IMAGE: &str = "image";
    pub const SENDER_ID: &str = "senderId";
    pub const SENDER_NAME: &str = "senderName";
    pub const SENDER_EMAIL: &str = "senderEmail";
    pub const CREATED_AT: &str = "createdAt";
    pub const READ_BY: &str = "readBy";
}

/// Decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Store-assigned id.
    pub id: MessageId,
    /// Author, or the reserved system sender.
    pub sender_id: ParticipantId,
    /// Author's nickname at send time.
    pub sender_name: Option<String>,
    /// Author's email at send time.
    pub sender_email: Option<String>,
    /// Body. Empty for image-only messages.
    pub text: String,
    /// Attached image URL.
    pub image: Option<String>,
    /// Server timestamp. Reads as the epoch while unresolved.
    pub created_at: Timestamp,
    /// Participants who have observed the message.
    pub read_by: Vec<ParticipantId>,
}

impl Message {
    /// Decode a message document.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Decode` if the sender is missing.
    pub fn from_document(doc: &Document) -> Result<Self, ChatError> {
        let sender_id = doc
            .str_field(field::SENDER_ID)
            .filter(|s| !s.is_empty())
            .map(ParticipantId::new)
            .ok_or_else(|| ChatError::Decode {
                path: doc.path.to_string(),
                reason: "missing senderId".to_string(),
            })?;

        let read_by = doc
            .field(field::READ_BY)
            .and_then(Value::as_array)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_str)
            .map(ParticipantId::new)
            .collect();

        Ok(Self {
            id: MessageId::from(doc.id().clone()),
            sender_id,
            sender_name: doc.str_field(field::SENDER_NAME).map(String::from),
            sender_email: doc.str_field(field::SENDER_EMAIL).map(String::from),
            text: doc.str_field(field::TEXT).unwrap_or_default().to_string(),
            image: doc.str_field(field::IMAGE).map(String::from),
            created_at: doc.timestamp_field(field::CREATED_AT).unwrap_or(Timestamp::EPOCH),
            read_by,
        })
    }

    /// True for messages generated by the room itself.
    pub fn is_system(&self) -> bool {
        self.sender_id.is_system()
    }

    /// True if `participant` has observed this message.
    pub fn is_read_by(&self, participant: &ParticipantId) -> bool {
        self.read_by.contains(participant)
    }
}

/// Fields of a new message. `readBy` always starts with `reader`.
pub(crate) struct NewMessage<'a> {
    pub sender_id: &'a ParticipantId,
    pub sender_name: &'a str,
    pub sender_email: Option<&'a str>,
    pub text: &'a str,
    pub image: Option<&'a str>,
    pub reader: &'a ParticipantId,
}

impl NewMessage<'_> {
    pub(crate) fn to_patch(&self) -> Patch {
        Patch::new()
            .set(field::TEXT, self.text)
            .set(field::IMAGE, self.image)
            .set(field::SENDER_ID, self.sender_id)
            .set(field::SENDER_NAME, self.sender_name)
            .set(field::SENDER_EMAIL, self.sender_email)
            .server_timestamp(field::CREATED_AT)
            .with(field::READ_BY, FieldOp::ArrayUnion(vec![self.reader.into()]))
    }
}

#[cfg(test)]
mod tests {
    use nanum_store::{CollectionPath, Fields};

    use super::*;

    fn stored(patch: &Patch) -> Document {
        let mut fields = Fields::new();
        patch.apply(&mut fields, Timestamp::from_secs(5));
        Document::new(CollectionPath::root("chatRooms").doc("r").collection("messages").doc("m1"), fields)
    }

    #[test]
    fn new_message_round_trips() {
        let sender = ParticipantId::new("u1");
        let patch = NewMessage {
            sender_id: &sender,
            sender_name: "Mina",
            sender_email: None,
            text: "hello",
            image: None,
            reader: &sender,
        }
        .to_patch();

        let message = Message::from_document(&stored(&patch)).expect("decode failed");
        assert_eq!(message.id.as_str(), "m1");
        assert_eq!(message.text, "hello");
        assert_eq!(message.created_at, Timestamp::from_secs(5));
        assert_eq!(message.read_by, vec![sender.clone()]);
        assert!(message.is_read_by(&sender));
        assert!(message.image.is_none());
        assert!(!message.is_system());
    }

    #[test]
    fn missing_sender_is_malformed() {
        let result = Message::from_document(&stored(&Patch::new().set(field::TEXT, "orphan")));
        assert!(matches!(result, Err(ChatError::Decode { .. })));
    }
}
