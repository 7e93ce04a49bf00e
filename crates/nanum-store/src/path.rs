//! Collection, document and field paths.
//!
//! Collections nest under documents (`chatRooms/post_42/messages`). Paths are
//! built infallibly; stores validate them on every operation and reject empty
//! segments or segments containing `/` with [`StoreError::InvalidPath`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Store-unique document id within a collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(String);

impl DocId {
    /// Wrap an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Path of a collection, e.g. `chatRooms` or `chatRooms/post_1/messages`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Top-level collection.
    pub fn root(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Document inside this collection.
    pub fn doc(&self, id: impl Into<DocId>) -> DocPath {
        DocPath { collection: self.clone(), id: id.into() }
    }

    /// Path as a `/`-separated string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        let segments: Vec<&str> = self.0.split('/').collect();
        if segments.len() % 2 == 0 || segments.iter().any(|s| s.is_empty()) {
            return Err(StoreError::InvalidPath(format!("collection path {:?}", self.0)));
        }
        Ok(())
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of a single document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath {
    /// Collection holding the document.
    pub collection: CollectionPath,
    /// Id within the collection.
    pub id: DocId,
}

impl DocPath {
    /// Subcollection nested under this document.
    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}/{name}", self.collection, self.id))
    }

    /// Parse a full `collection/id` path as produced by `Display`.
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        let (collection, id) = path
            .rsplit_once('/')
            .ok_or_else(|| StoreError::InvalidPath(format!("document path {path:?}")))?;
        let parsed = CollectionPath::root(collection).doc(id);
        parsed.validate()?;
        Ok(parsed)
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        self.collection.validate()?;
        if self.id.0.is_empty() || self.id.0.contains('/') {
            return Err(StoreError::InvalidPath(format!("document id {:?}", self.id.0)));
        }
        Ok(())
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Path to a possibly nested field inside a document.
///
/// Segments are kept separate so map keys (participant ids) never need
/// escaping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Top-level field.
    pub fn field(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Field one level down inside a map field.
    pub fn nested(map: impl Into<String>, key: impl Into<String>) -> Self {
        Self(vec![map.into(), key.into()])
    }

    /// Path segments, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for FieldPath {
    fn from(name: &str) -> Self {
        Self::field(name)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcollection_paths() {
        let room = CollectionPath::root("chatRooms").doc("post_42");
        let messages = room.collection("messages");
        assert_eq!(messages.as_str(), "chatRooms/post_42/messages");
        assert!(messages.validate().is_ok());
        assert_eq!(messages.doc("m1").to_string(), "chatRooms/post_42/messages/m1");
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(CollectionPath::root("").validate().is_err());
        assert!(CollectionPath::root("a/b").validate().is_err());
        assert!(CollectionPath::root("posts").doc("").validate().is_err());
        assert!(CollectionPath::root("posts").doc("a/b").validate().is_err());
    }

    #[test]
    fn parse_round_trips_display() {
        let path = CollectionPath::root("users").doc("u1").collection("notifications").doc("n7");
        assert_eq!(DocPath::parse(&path.to_string()), Ok(path));
        assert!(DocPath::parse("nodelimiter").is_err());
    }
}
