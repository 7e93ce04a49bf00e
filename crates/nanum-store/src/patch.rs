//! Partial document writes.
//!
//! A [`Patch`] is an ordered list of field operations. Besides plain sets it
//! carries the merge operators the chat protocol relies on to stay convergent
//! without transactions: set-union and set-removal on arrays, integer
//! increments, and the server-timestamp sentinel.

use std::collections::BTreeMap;

use crate::{DocPath, FieldPath, Fields, Timestamp, Value};

/// A single field operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOp {
    /// Replace the field.
    Set(Value),
    /// Replace the field with the store clock's time at commit.
    ServerTimestamp,
    /// Append each value not already present. Non-arrays are replaced.
    ArrayUnion(Vec<Value>),
    /// Remove every element equal to one of the values.
    ArrayRemove(Vec<Value>),
    /// Add to an integer field. Missing or non-integer fields start at zero.
    Increment(i64),
    /// Remove the field.
    Delete,
}

/// Ordered set of field operations applied atomically to one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    ops: Vec<(FieldPath, FieldOp)>,
}

impl Patch {
    /// Empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation.
    #[must_use]
    pub fn with(mut self, field: impl Into<FieldPath>, op: FieldOp) -> Self {
        self.push(field, op);
        self
    }

    /// Append a plain set.
    #[must_use]
    pub fn set(self, field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        self.with(field, FieldOp::Set(value.into()))
    }

    /// Append a server-timestamp sentinel.
    #[must_use]
    pub fn server_timestamp(self, field: impl Into<FieldPath>) -> Self {
        self.with(field, FieldOp::ServerTimestamp)
    }

    /// Append an operation in place.
    pub fn push(&mut self, field: impl Into<FieldPath>, op: FieldOp) {
        self.ops.push((field.into(), op));
    }

    /// True if the patch has no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Operations in application order.
    pub fn ops(&self) -> &[(FieldPath, FieldOp)] {
        &self.ops
    }

    /// Operation targeting exactly `field`, if any.
    pub fn op_for(&self, field: &FieldPath) -> Option<&FieldOp> {
        self.ops.iter().find(|(path, _)| path == field).map(|(_, op)| op)
    }

    /// Apply every operation to `fields`, resolving sentinels with `now`.
    pub fn apply(&self, fields: &mut Fields, now: Timestamp) {
        for (path, op) in &self.ops {
            apply_op(fields, path.segments(), op, now);
        }
    }
}

fn apply_op(fields: &mut Fields, segments: &[String], op: &FieldOp, now: Timestamp) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };

    if !rest.is_empty() {
        if matches!(op, FieldOp::Delete) && !fields.contains_key(first) {
            return;
        }
        let child = fields.entry(first.clone()).or_insert_with(|| Value::Map(BTreeMap::new()));
        if !matches!(child, Value::Map(_)) {
            *child = Value::Map(BTreeMap::new());
        }
        if let Value::Map(map) = child {
            apply_op(map, rest, op, now);
        }
        return;
    }

    match op {
        FieldOp::Set(value) => {
            fields.insert(first.clone(), value.clone());
        },
        FieldOp::ServerTimestamp => {
            fields.insert(first.clone(), Value::Timestamp(now));
        },
        FieldOp::ArrayUnion(values) => {
            let mut items = take_array(fields, first);
            for value in values {
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
            fields.insert(first.clone(), Value::Array(items));
        },
        FieldOp::ArrayRemove(values) => {
            let mut items = take_array(fields, first);
            items.retain(|item| !values.contains(item));
            fields.insert(first.clone(), Value::Array(items));
        },
        FieldOp::Increment(delta) => {
            let current = fields.get(first).and_then(Value::as_int).unwrap_or(0);
            fields.insert(first.clone(), Value::Int(current.saturating_add(*delta)));
        },
        FieldOp::Delete => {
            fields.remove(first);
        },
    }
}

fn take_array(fields: &mut Fields, name: &str) -> Vec<Value> {
    match fields.remove(name) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Updates committed all-or-nothing by [`crate::Store::commit`].
#[derive(Debug, Clone, Default)]
pub struct Batch {
    updates: Vec<(DocPath, Patch)>,
}

impl Batch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a merge into an existing document.
    pub fn update(&mut self, path: DocPath, patch: Patch) {
        self.updates.push((path, patch));
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Number of queued updates.
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Queued updates in commit order.
    pub fn updates(&self) -> &[(DocPath, Patch)] {
        &self.updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::from_secs(100)
    }

    #[test]
    fn array_union_skips_present_values() {
        let mut fields = Fields::new();
        fields.insert("readBy".into(), Value::string_array(["u1"]));

        Patch::new()
            .with("readBy", FieldOp::ArrayUnion(vec!["u1".into(), "u2".into()]))
            .apply(&mut fields, now());

        assert_eq!(fields.get("readBy"), Some(&Value::string_array(["u1", "u2"])));
    }

    #[test]
    fn array_remove_on_missing_field_leaves_empty_array() {
        let mut fields = Fields::new();
        Patch::new()
            .with("participants", FieldOp::ArrayRemove(vec!["u1".into()]))
            .apply(&mut fields, now());
        assert_eq!(fields.get("participants"), Some(&Value::Array(vec![])));
    }

    #[test]
    fn nested_server_timestamp_creates_map() {
        let mut fields = Fields::new();
        Patch::new().server_timestamp(FieldPath::nested("joinedAt", "u1")).apply(&mut fields, now());

        let joined = fields.get("joinedAt").and_then(Value::as_map).cloned().unwrap_or_default();
        assert_eq!(joined.get("u1"), Some(&Value::Timestamp(now())));
    }

    #[test]
    fn nested_set_keeps_sibling_keys() {
        let mut fields = Fields::new();
        Patch::new()
            .set(FieldPath::nested("joinedAt", "u1"), Timestamp::from_secs(1))
            .set(FieldPath::nested("joinedAt", "u2"), Timestamp::from_secs(2))
            .apply(&mut fields, now());

        let joined = fields.get("joinedAt").and_then(Value::as_map).cloned().unwrap_or_default();
        assert_eq!(joined.len(), 2);
    }

    #[test]
    fn increment_and_delete() {
        let mut fields = Fields::new();
        fields.insert("currentParticipants".into(), Value::Int(3));
        fields.insert("stale".into(), Value::Bool(true));

        Patch::new()
            .with("currentParticipants", FieldOp::Increment(-1))
            .with("stale", FieldOp::Delete)
            .with(FieldPath::nested("absent", "x"), FieldOp::Delete)
            .apply(&mut fields, now());

        assert_eq!(fields.get("currentParticipants"), Some(&Value::Int(2)));
        assert!(!fields.contains_key("stale"));
        assert!(!fields.contains_key("absent"));
    }
}
