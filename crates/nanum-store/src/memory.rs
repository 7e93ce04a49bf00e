//! In-memory store for tests and simulation.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    Batch, Clock, CollectionPath, DocId, DocPath, Document, Fields, Patch, Query, Store,
    StoreError, SystemClock, Timestamp,
    subscription::{DocListener, Listeners, QueryListener, Snapshots, Subscription, dispatch},
};

/// In-memory storage implementation for testing and simulation
///
/// Documents are grouped per collection in ordered maps. All state is wrapped
/// in Arc<Mutex<>> so clones share documents and listeners. Listeners are
/// dispatched after the lock is released. Generic over the clock so tests can
/// script server timestamps with [`crate::ManualClock`].
#[derive(Clone)]
pub struct MemoryStore<C: Clock = SystemClock> {
    inner: Arc<Mutex<MemoryStoreInner>>,
    listeners: Listeners,
    clock: C,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Documents by collection, then id
    collections: BTreeMap<CollectionPath, BTreeMap<DocId, Fields>>,

    /// Bumped on every committed write
    version: u64,

    /// Next id handed out by `add`
    next_id: u64,
}

impl MemoryStoreInner {
    fn get(&self, path: &DocPath) -> Option<&Fields> {
        self.collections.get(&path.collection).and_then(|docs| docs.get(&path.id))
    }

    fn get_mut(&mut self, path: &DocPath) -> Option<&mut Fields> {
        self.collections.get_mut(&path.collection).and_then(|docs| docs.get_mut(&path.id))
    }

    fn put(&mut self, path: &DocPath, fields: Fields) {
        self.collections.entry(path.collection.clone()).or_default().insert(path.id.clone(), fields);
    }

    fn documents(&self, collection: &CollectionPath) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(collection.doc(id.clone()), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl MemoryStore<SystemClock> {
    /// Create an empty store stamped by the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for MemoryStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryStore<C> {
    /// Create an empty store stamped by `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStoreInner::default())),
            listeners: Listeners::default(),
            clock,
        }
    }

    /// Clock used for server timestamps.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Total number of documents across all collections.
    ///
    /// Useful for debugging and testing.
    pub fn document_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.collections.values().map(BTreeMap::len).sum()
    }

    /// Number of documents in one collection.
    pub fn collection_len(&self, collection: &CollectionPath) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.collections.get(collection).map_or(0, BTreeMap::len)
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStoreInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run a mutation under the lock, then notify listeners of `changed`.
    fn write<T>(
        &self,
        mutate: impl FnOnce(&mut MemoryStoreInner, Timestamp) -> Result<(T, Vec<DocPath>), StoreError>,
    ) -> Result<T, StoreError> {
        let now = self.clock.now();
        let (out, changed) = {
            let mut inner = self.lock()?;
            let result = mutate(&mut inner, now)?;
            inner.version += 1;
            result
        };

        let affected = self.listeners.affected(&changed);
        dispatch(self, &affected);
        Ok(out)
    }
}

impl<C: Clock> Snapshots for MemoryStore<C> {
    fn doc_snapshot(&self, path: &DocPath) -> Result<(u64, Option<Document>), StoreError> {
        let inner = self.lock()?;
        let doc = inner.get(path).map(|fields| Document::new(path.clone(), fields.clone()));
        Ok((inner.version, doc))
    }

    fn query_snapshot(&self, query: &Query) -> Result<(u64, Vec<Document>), StoreError> {
        let inner = self.lock()?;
        Ok((inner.version, query.evaluate(inner.documents(&query.collection))))
    }
}

impl<C: Clock> Store for MemoryStore<C> {
    fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        path.validate()?;
        Ok(self.doc_snapshot(path)?.1)
    }

    fn set(&self, path: &DocPath, patch: &Patch) -> Result<(), StoreError> {
        path.validate()?;
        self.write(|inner, now| {
            let mut fields = Fields::new();
            patch.apply(&mut fields, now);
            inner.put(path, fields);
            Ok(((), vec![path.clone()]))
        })
    }

    fn update(&self, path: &DocPath, patch: &Patch) -> Result<(), StoreError> {
        path.validate()?;
        self.write(|inner, now| {
            let fields = inner.get_mut(path).ok_or_else(|| StoreError::not_found(path))?;
            patch.apply(fields, now);
            Ok(((), vec![path.clone()]))
        })
    }

    fn add(&self, collection: &CollectionPath, patch: &Patch) -> Result<DocId, StoreError> {
        collection.validate()?;
        self.write(|inner, now| {
            let id = DocId::new(format!("{:016x}", inner.next_id));
            inner.next_id += 1;

            let path = collection.doc(id.clone());
            let mut fields = Fields::new();
            patch.apply(&mut fields, now);
            inner.put(&path, fields);
            Ok((id, vec![path]))
        })
    }

    fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        path.validate()?;
        self.write(|inner, _| {
            inner
                .collections
                .get_mut(&path.collection)
                .and_then(|docs| docs.remove(&path.id))
                .ok_or_else(|| StoreError::not_found(path))?;
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

        self.write(|inner, now| {
            // Check every target first so a missing one leaves nothing applied
            if let Some((missing, _)) = batch.updates().iter().find(|(p, _)| inner.get(p).is_none())
            {
                return Err(StoreError::not_found(missing));
            }

            let mut changed = Vec::with_capacity(batch.len());
            for (path, patch) in batch.updates() {
                if let Some(fields) = inner.get_mut(path) {
                    patch.apply(fields, now);
                }
                changed.push(path.clone());
            }
            Ok(((), changed))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{Direction, FieldOp, ManualClock, Timestamp, Value};

    fn rooms() -> CollectionPath {
        CollectionPath::root("chatRooms")
    }

    #[test]
    fn set_then_get() {
        let store = MemoryStore::new();
        let path = rooms().doc("post_1");

        store.set(&path, &Patch::new().set("title", "Costco beef")).expect("set failed");

        let doc = store.get(&path).expect("get failed").expect("document should exist");
        assert_eq!(doc.str_field("title"), Some("Costco beef"));
    }

    #[test]
    fn set_overwrites_all_fields() {
        let store = MemoryStore::new();
        let path = rooms().doc("post_1");

        store.set(&path, &Patch::new().set("a", 1_i64).set("b", 2_i64)).expect("set failed");
        store.set(&path, &Patch::new().set("a", 3_i64)).expect("set failed");

        let doc = store.get(&path).expect("get failed").expect("document should exist");
        assert_eq!(doc.field("a"), Some(&Value::Int(3)));
        assert!(doc.field("b").is_none());
    }

    #[test]
    fn update_missing_document_fails() {
        let store = MemoryStore::new();
        let result = store.update(&rooms().doc("nope"), &Patch::new().set("a", 1_i64));
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert_eq!(store.document_count(), 0);
    }

    #[test]
    fn server_timestamps_come_from_clock() {
        let clock = ManualClock::starting_at(Timestamp::from_secs(42));
        let store = MemoryStore::with_clock(clock);
        let path = rooms().doc("r");

        store.set(&path, &Patch::new().server_timestamp("createdAt")).expect("set failed");

        let doc = store.get(&path).expect("get failed").expect("document should exist");
        assert_eq!(doc.timestamp_field("createdAt"), Some(Timestamp::from_secs(42)));
    }

    #[test]
    fn add_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let messages = rooms().doc("r").collection("messages");

        let a = store.add(&messages, &Patch::new().set("text", "a")).expect("add failed");
        let b = store.add(&messages, &Patch::new().set("text", "b")).expect("add failed");

        assert!(a < b);
        assert_eq!(store.collection_len(&messages), 2);
    }

    #[test]
    fn delete_removes_and_reports_missing() {
        let store = MemoryStore::new();
        let path = CollectionPath::root("posts").doc("42");
        store.set(&path, &Patch::new().set("title", "x")).expect("set failed");

        store.delete(&path).expect("delete failed");
        assert!(store.get(&path).expect("get failed").is_none());
        assert!(matches!(store.delete(&path), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        let messages = rooms().doc("r").collection("messages");
        let id = store.add(&messages, &Patch::new().set("text", "hi")).expect("add failed");

        let mut batch = Batch::new();
        batch.update(messages.doc(id.clone()), Patch::new().set("seen", true));
        batch.update(messages.doc("missing"), Patch::new().set("seen", true));

        assert!(store.commit(&batch).is_err());
        let doc = store.get(&messages.doc(id)).expect("get failed").expect("document should exist");
        assert!(doc.field("seen").is_none());
    }

    #[test]
    fn subscription_receives_initial_and_updates() {
        let store = MemoryStore::new();
        let path = rooms().doc("r");
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        let sub = store
            .subscribe_doc(
                &path,
                Box::new(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .expect("subscribe failed");

        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.set(&path, &Patch::new().set("title", "x")).expect("set failed");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Writes elsewhere do not fire
        store.set(&rooms().doc("other"), &Patch::new()).expect("set failed");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        sub.unsubscribe();
        store.update(&path, &Patch::new().set("title", "y")).expect("update failed");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn listener_may_write_back_into_store() {
        let store = MemoryStore::new();
        let path = rooms().doc("r");
        store.set(&path, &Patch::new().set("n", 0_i64)).expect("set failed");

        let writer = store.clone();
        let target = path.clone();
        let _sub = store
            .subscribe_doc(
                &path,
                Box::new(move |doc| {
                    let n = doc.and_then(|d| d.field("n").and_then(Value::as_int)).unwrap_or(0);
                    if n < 3 {
                        let _ = writer.update(&target, &Patch::new().with("n", FieldOp::Increment(1)));
                    }
                }),
            )
            .expect("subscribe failed");

        let doc = store.get(&path).expect("get failed").expect("document should exist");
        assert_eq!(doc.field("n"), Some(&Value::Int(3)));
    }

    #[test]
    fn query_subscription_sees_ordered_results() {
        let clock = ManualClock::starting_at(Timestamp::from_secs(0));
        let store = MemoryStore::with_clock(clock.clone());
        let messages = rooms().doc("r").collection("messages");
        let latest = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&latest);

        let _sub = store
            .subscribe_query(
                &Query::collection(messages.clone()).order_by("createdAt", Direction::Descending),
                Box::new(move |docs| {
                    let texts: Vec<String> =
                        docs.iter().filter_map(|d| d.str_field("text").map(String::from)).collect();
                    *sink.lock().unwrap_or_else(PoisonError::into_inner) = texts;
                }),
            )
            .expect("subscribe failed");

        for text in ["a", "b", "c"] {
            clock.advance(std::time::Duration::from_secs(1));
            store
                .add(&messages, &Patch::new().set("text", text).server_timestamp("createdAt"))
                .expect("add failed");
        }

        let texts = latest.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert_eq!(texts, ["c", "b", "a"]);
    }
}
