//! Redb-backed durable store.
//!
//! Every write runs in one redb write transaction, so single-document writes
//! and batches are ACID and survive restarts. Listeners are process-local:
//! they observe writes made through this handle or its clones.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, Table, TableDefinition};

use crate::{
    Batch, Clock, CollectionPath, DocId, DocPath, Document, Fields, Patch, Query, Store,
    StoreError, SystemClock, Timestamp,
    subscription::{DocListener, Listeners, QueryListener, Snapshots, Subscription, dispatch},
};

/// Table: documents
/// Key: `{collection}\0{id}`, so one collection is a contiguous key range
/// Value: CBOR-encoded fields
const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// Table: meta
/// Key: counter name
/// Value: counter
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const VERSION: &str = "version";
const NEXT_ID: &str = "next_id";

/// Durable store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore<C: Clock = SystemClock> {
    db: Arc<Database>,
    listeners: Listeners,
    clock: C,
}

impl RedbStore<SystemClock> {
    /// Open or create a database at `path`, stamped by the system clock.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_clock(path, SystemClock::new())
    }
}

impl<C: Clock> RedbStore<C> {
    /// Open or create a database at `path`, stamped by `clock`.
    pub fn open_with_clock(path: impl AsRef<Path>, clock: C) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(DOCUMENTS).map_err(io)?;
            let _ = txn.open_table(META).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        tracing::debug!(path = %path.as_ref().display(), "opened redb store");
        Ok(Self { db: Arc::new(db), listeners: Listeners::default(), clock })
    }

    /// Run a mutation in one write transaction, then notify listeners of
    /// `changed`. Dropping the transaction on error aborts it.
    fn write<T>(
        &self,
        mutate: impl FnOnce(&mut Tables<'_>, Timestamp) -> Result<(T, Vec<DocPath>), StoreError>,
    ) -> Result<T, StoreError> {
        let now = self.clock.now();
        let txn = self.db.begin_write().map_err(io)?;
        let (out, changed) = {
            let mut tables = Tables {
                docs: txn.open_table(DOCUMENTS).map_err(io)?,
                meta: txn.open_table(META).map_err(io)?,
            };
            let result = mutate(&mut tables, now)?;
            tables.bump(VERSION)?;
            result
        };
        txn.commit().map_err(io)?;

        let affected = self.listeners.affected(&changed);
        dispatch(self, &affected);
        Ok(out)
    }
}

/// Open tables of one write transaction.
struct Tables<'txn> {
    docs: Table<'txn, &'static str, &'static [u8]>,
    meta: Table<'txn, &'static str, u64>,
}

impl Tables<'_> {
    fn get(&self, path: &DocPath) -> Result<Option<Fields>, StoreError> {
        read_fields(&self.docs, path)
    }

    fn put(&mut self, path: &DocPath, fields: &Fields) -> Result<(), StoreError> {
        let bytes = encode(fields)?;
        self.docs.insert(doc_key(path).as_str(), bytes.as_slice()).map_err(io)?;
        Ok(())
    }

    fn remove(&mut self, path: &DocPath) -> Result<bool, StoreError> {
        Ok(self.docs.remove(doc_key(path).as_str()).map_err(io)?.is_some())
    }

    /// Increment a counter, returning its previous value.
    fn bump(&mut self, counter: &str) -> Result<u64, StoreError> {
        let current = self.meta.get(counter).map_err(io)?.map_or(0, |v| v.value());
        self.meta.insert(counter, current + 1).map_err(io)?;
        Ok(current)
    }
}

impl<C: Clock> Snapshots for RedbStore<C> {
    fn doc_snapshot(&self, path: &DocPath) -> Result<(u64, Option<Document>), StoreError> {
        let txn = self.db.begin_read().map_err(io)?;
        let version = read_version(&txn.open_table(META).map_err(io)?)?;
        let docs = txn.open_table(DOCUMENTS).map_err(io)?;

        let doc = read_fields(&docs, path)?.map(|fields| Document::new(path.clone(), fields));
        Ok((version, doc))
    }

    fn query_snapshot(&self, query: &Query) -> Result<(u64, Vec<Document>), StoreError> {
        let txn = self.db.begin_read().map_err(io)?;
        let version = read_version(&txn.open_table(META).map_err(io)?)?;
        let docs = txn.open_table(DOCUMENTS).map_err(io)?;

        let candidates = scan_collection(&docs, &query.collection)?;
        Ok((version, query.evaluate(candidates)))
    }
}

impl<C: Clock> Store for RedbStore<C> {
    fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        path.validate()?;
        Ok(self.doc_snapshot(path)?.1)
    }

    fn set(&self, path: &DocPath, patch: &Patch) -> Result<(), StoreError> {
        path.validate()?;
        self.write(|tables, now| {
            let mut fields = Fields::new();
            patch.apply(&mut fields, now);
            tables.put(path, &fields)?;
            Ok(((), vec![path.clone()]))
        })
    }

    fn update(&self, path: &DocPath, patch: &Patch) -> Result<(), StoreError> {
        path.validate()?;
        self.write(|tables, now| {
            let mut fields = tables.get(path)?.ok_or_else(|| StoreError::not_found(path))?;
            patch.apply(&mut fields, now);
            tables.put(path, &fields)?;
            Ok(((), vec![path.clone()]))
        })
    }

    fn add(&self, collection: &CollectionPath, patch: &Patch) -> Result<DocId, StoreError> {
        collection.validate()?;
        self.write(|tables, now| {
            let id = DocId::new(format!("{:016x}", tables.bump(NEXT_ID)?));
            let path = collection.doc(id.clone());

            let mut fields = Fields::new();
            patch.apply(&mut fields, now);
            tables.put(&path, &fields)?;
            Ok((id, vec![path]))
        })
    }

    fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        path.validate()?;
        self.write(|tables, _| {
            if !tables.remove(path)? {
                return Err(StoreError::not_found(path));
            }
            Ok(((), vec![path.clone()]))
        })
    }

    fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        query.collection.validate()?;
        Ok(self.query_snapshot(query)?.1)
    }

    fn subscribe_doc(
        &self,
        path: &DocPath,
        listener: DocListener,
    ) -> Result<Subscription, StoreError> {
        path.validate()?;
        let (registered, subscription) = self.listeners.register_doc(path.clone(), listener);
        dispatch(self, &[registered]);
        Ok(subscription)
    }

    fn subscribe_query(
        &self,
        query: &Query,
        listener: QueryListener,
    ) -> Result<Subscription, StoreError> {
        query.collection.validate()?;
        let (registered, subscription) = self.listeners.register_query(query.clone(), listener);
        dispatch(self, &[registered]);
        Ok(subscription)
    }

    fn commit(&self, batch: &Batch) -> Result<(), StoreError> {
        for (path, _) in batch.updates() {
            path.validate()?;
        }
        if batch.is_empty() {
            return Ok(());
        }

        self.write(|tables, now| {
            let mut changed = Vec::with_capacity(batch.len());
            for (path, patch) in batch.updates() {
                let mut fields = tables.get(path)?.ok_or_else(|| StoreError::not_found(path))?;
                patch.apply(&mut fields, now);
                tables.put(path, &fields)?;
                changed.push(path.clone());
            }
            Ok(((), changed))
        })
    }
}

fn io(e: impl std::fmt::Display) -> StoreError {
    StoreError::Io(e.to_string())
}

fn doc_key(path: &DocPath) -> String {
    format!("{}\0{}", path.collection, path.id)
}

fn encode(fields: &Fields) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(fields, &mut bytes)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> Result<Fields, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn read_version(meta: &impl ReadableTable<&'static str, u64>) -> Result<u64, StoreError> {
    Ok(meta.get(VERSION).map_err(io)?.map_or(0, |v| v.value()))
}

fn read_fields(
    docs: &impl ReadableTable<&'static str, &'static [u8]>,
    path: &DocPath,
) -> Result<Option<Fields>, StoreError> {
    docs.get(doc_key(path).as_str()).map_err(io)?.map(|v| decode(v.value())).transpose()
}

fn scan_collection(
    docs: &impl ReadableTable<&'static str, &'static [u8]>,
    collection: &CollectionPath,
) -> Result<Vec<Document>, StoreError> {
    // '\u{1}' is the successor of the '\0' separator
    let start = format!("{collection}\0");
    let end = format!("{collection}\u{1}");

    let mut out = Vec::new();
    for entry in docs.range(start.as_str()..end.as_str()).map_err(io)? {
        let (key, value) = entry.map_err(io)?;
        let Some((_, id)) = key.value().split_once('\0') else {
            continue;
        };
        out.push(Document::new(collection.doc(id), decode(value.value())?));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::{Direction, FieldOp, FieldPath, ManualClock, Value};

    fn rooms() -> CollectionPath {
        CollectionPath::root("chatRooms")
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("nanum.redb");
        let path = rooms().doc("post_42");

        {
            let store = RedbStore::open(&file).expect("open failed");
            store
                .set(
                    &path,
                    &Patch::new()
                        .set("title", "Costco beef")
                        .with("participants", FieldOp::ArrayUnion(vec!["u1".into()])),
                )
                .expect("set failed");
        }

        let store = RedbStore::open(&file).expect("reopen failed");
        let doc = store.get(&path).expect("get failed").expect("document should exist");
        assert_eq!(doc.str_field("title"), Some("Costco beef"));
        assert_eq!(doc.field("participants"), Some(&Value::string_array(["u1"])));
    }

    #[test]
    fn ids_keep_increasing_after_reopen() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("nanum.redb");
        let messages = rooms().doc("r").collection("messages");

        let first = {
            let store = RedbStore::open(&file).expect("open failed");
            store.add(&messages, &Patch::new().set("text", "a")).expect("add failed")
        };

        let store = RedbStore::open(&file).expect("reopen failed");
        let second = store.add(&messages, &Patch::new().set("text", "b")).expect("add failed");
        assert!(first < second);
    }

    #[test]
    fn collection_scan_excludes_subcollections() {
        let dir = tempdir().expect("tempdir");
        let store = RedbStore::open(dir.path().join("nanum.redb")).expect("open failed");

        let room = rooms().doc("r");
        store.set(&room, &Patch::new().set("title", "x")).expect("set failed");
        store.add(&room.collection("messages"), &Patch::new().set("text", "hi")).expect("add failed");
        store.set(&CollectionPath::root("chatRoomsArchive").doc("z"), &Patch::new()).expect("set failed");

        let docs = store.query(&Query::collection(rooms())).expect("query failed");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id().as_str(), "r");
    }

    #[test]
    fn failed_batch_leaves_nothing_applied() {
        let dir = tempdir().expect("tempdir");
        let store = RedbStore::open(dir.path().join("nanum.redb")).expect("open failed");
        let messages = rooms().doc("r").collection("messages");
        let id = store.add(&messages, &Patch::new().set("text", "hi")).expect("add failed");

        let mut batch = Batch::new();
        batch.update(messages.doc(id.clone()), Patch::new().with("readBy", FieldOp::ArrayUnion(vec!["u2".into()])));
        batch.update(messages.doc("missing"), Patch::new().set("x", true));

        assert!(matches!(store.commit(&batch), Err(StoreError::NotFound { .. })));
        let doc = store.get(&messages.doc(id)).expect("get failed").expect("document should exist");
        assert!(doc.field("readBy").is_none());
    }

    #[test]
    fn timestamps_and_ordering_match_memory_backend() {
        let dir = tempdir().expect("tempdir");
        let clock = ManualClock::starting_at(Timestamp::from_secs(0));
        let store =
            RedbStore::open_with_clock(dir.path().join("nanum.redb"), clock.clone()).expect("open failed");
        let messages = rooms().doc("r").collection("messages");

        for text in ["a", "b", "c"] {
            clock.advance(std::time::Duration::from_secs(5));
            store
                .add(&messages, &Patch::new().set("text", text).server_timestamp("createdAt"))
                .expect("add failed");
        }

        let docs = store
            .query(&Query::collection(messages).order_by("createdAt", Direction::Descending).limit(2))
            .expect("query failed");
        let texts: Vec<&str> = docs.iter().filter_map(|d| d.str_field("text")).collect();
        assert_eq!(texts, ["c", "b"]);
        assert_eq!(docs[0].timestamp_field("createdAt"), Some(Timestamp::from_secs(15)));
    }

    #[test]
    fn doc_listener_sees_nested_updates() {
        let dir = tempdir().expect("tempdir");
        let store = RedbStore::open(dir.path().join("nanum.redb")).expect("open failed");
        let room = rooms().doc("r");
        store.set(&room, &Patch::new().set("title", "x")).expect("set failed");

        let joined = Arc::new(std::sync::Mutex::new(None));
        let sink = Arc::clone(&joined);
        let _sub = store
            .subscribe_doc(
                &room,
                Box::new(move |doc| {
                    let at = doc.and_then(|d| {
                        d.get(&FieldPath::nested("joinedAt", "u1")).and_then(Value::as_timestamp)
                    });
                    *sink.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = at;
                }),
            )
            .expect("subscribe failed");

        store
            .update(&room, &Patch::new().set(FieldPath::nested("joinedAt", "u1"), Timestamp::from_secs(8)))
            .expect("update failed");

        assert_eq!(
            *joined.lock().unwrap_or_else(std::sync::PoisonError::into_inner),
            Some(Timestamp::from_secs(8))
        );
    }
}
