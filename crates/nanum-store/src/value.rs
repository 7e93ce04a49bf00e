//! Document values.
//!
//! Values form a small JSON-like tree with one addition: [`Timestamp`], which
//! the store assigns from its clock when a patch carries the
//! [`crate::FieldOp::ServerTimestamp`] sentinel.
//!
//! Values are totally ordered so queries can order by any field. Values of
//! different kinds compare by kind, in declaration order.

use std::{collections::BTreeMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{DocId, DocPath, FieldPath};

/// Top-level document fields, keyed by field name.
pub type Fields = BTreeMap<String, Value>;

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The Unix epoch. Used as the ordering position of messages whose
    /// timestamp is missing.
    pub const EPOCH: Self = Self(0);

    /// Timestamp from milliseconds since the Unix epoch.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Timestamp from whole seconds since the Unix epoch.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Milliseconds since the Unix epoch.
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Move this timestamp back by `duration`, clamping at `i64::MIN`.
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(millis))
    }

    /// Move this timestamp forward by `duration`, clamping at `i64::MAX`.
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A field value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Store-assigned or caller-supplied point in time.
    Timestamp(Timestamp),
    /// UTF-8 string.
    String(String),
    /// Ordered list. Merge operators treat it as a set.
    Array(Vec<Value>),
    /// Nested fields.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// String contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean contents, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer contents, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Timestamp contents, if this is a timestamp.
    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Elements, if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Nested fields, if this is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Array of strings from any iterator of string-likes.
    pub fn string_array<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array(items.into_iter().map(|s| Self::String(s.into())).collect())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<Timestamp> for Value {
    fn from(t: Timestamp) -> Self {
        Self::Timestamp(t)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A stored document: its path plus its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Where the document lives.
    pub path: DocPath,
    /// Top-level fields.
    pub fields: Fields,
}

impl Document {
    /// Create a document value.
    pub fn new(path: DocPath, fields: Fields) -> Self {
        Self { path, fields }
    }

    /// Document id (last path segment).
    pub fn id(&self) -> &DocId {
        &self.path.id
    }

    /// Look up a possibly nested field.
    pub fn get(&self, field: &FieldPath) -> Option<&Value> {
        lookup(&self.fields, field)
    }

    /// Look up a top-level field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Top-level string field.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    /// Top-level timestamp field.
    pub fn timestamp_field(&self, name: &str) -> Option<Timestamp> {
        self.field(name).and_then(Value::as_timestamp)
    }
}

/// Walk `path` through nested maps.
pub(crate) fn lookup<'a>(fields: &'a Fields, path: &FieldPath) -> Option<&'a Value> {
    let (first, rest) = path.segments().split_first()?;
    let mut current = fields.get(first)?;
    for segment in rest {
        current = current.as_map()?.get(segment)?;
    }
    Some(current)
}
