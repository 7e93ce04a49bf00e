//! Live subscriptions.
//!
//! Backends keep a [`Listeners`] registry. After each committed write they ask
//! it which listeners the changed paths affect, then call [`dispatch`], which
//! re-reads a fresh snapshot for each listener and invokes its callback with
//! no store lock held.
//!
//! Snapshots carry the store version they were read at. A listener never
//! receives a snapshot older than one it has already seen, so concurrent
//! writers cannot make a listener go back in time. Delivery is re-entrant: a
//! callback may write to the store and receive the resulting snapshot before
//! it returns.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use crate::{DocPath, Document, Query, StoreError};

/// Callback for a document subscription. `None` while the document is absent.
pub type DocListener = Box<dyn Fn(Option<Document>) + Send + Sync>;

/// Callback for a query subscription. Receives the full ordered result set.
pub type QueryListener = Box<dyn Fn(Vec<Document>) + Send + Sync>;

/// What a listener watches.
pub(crate) enum Target {
    Doc(DocPath),
    Query(Query),
}

enum Callback {
    Doc(DocListener),
    Query(QueryListener),
}

/// A registered listener.
pub(crate) struct Listener {
    id: u64,
    target: Target,
    callback: Callback,
    active: AtomicBool,
    /// Highest store version delivered so far.
    seen_version: AtomicU64,
}

impl Listener {
    fn touched_by(&self, changed: &[DocPath]) -> bool {
        match &self.target {
            Target::Doc(path) => changed.contains(path),
            Target::Query(query) => changed.iter().any(|p| p.collection == query.collection),
        }
    }

    /// Record `version` as seen. False if a newer snapshot was already
    /// delivered.
    fn admit(&self, version: u64) -> bool {
        self.seen_version.fetch_max(version, Ordering::SeqCst) <= version
    }
}

/// Read access backends expose to [`dispatch`].
pub(crate) trait Snapshots {
    /// Document plus the store version it was read at.
    fn doc_snapshot(&self, path: &DocPath) -> Result<(u64, Option<Document>), StoreError>;

    /// Query result plus the store version it was read at.
    fn query_snapshot(&self, query: &Query) -> Result<(u64, Vec<Document>), StoreError>;
}

/// Deliver a fresh snapshot to each listener.
///
/// Read failures are logged and skipped; the listener catches up on the next
/// write.
pub(crate) fn dispatch(store: &impl Snapshots, listeners: &[Arc<Listener>]) {
    for listener in listeners {
        if !listener.active.load(Ordering::SeqCst) {
            continue;
        }
        match (&listener.target, &listener.callback) {
            (Target::Doc(path), Callback::Doc(callback)) => match store.doc_snapshot(path) {
                Ok((version, doc)) => {
                    if listener.admit(version) && listener.active.load(Ordering::SeqCst) {
                        callback(doc);
                    }
                },
                Err(e) => tracing::warn!(%path, error = %e, "document snapshot failed"),
            },
            (Target::Query(query), Callback::Query(callback)) => {
                match store.query_snapshot(query) {
                    Ok((version, docs)) => {
                        if listener.admit(version) && listener.active.load(Ordering::SeqCst) {
                            callback(docs);
                        }
                    },
                    Err(e) => {
                        tracing::warn!(collection = %query.collection, error = %e, "query snapshot failed");
                    },
                }
            },
            _ => {},
        }
    }
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Arc<Listener>>>,
}

impl Registry {
    fn remove(&self, id: u64) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
    }
}

/// Listener registry shared by all clones of a backend.
#[derive(Clone, Default)]
pub(crate) struct Listeners {
    registry: Arc<Registry>,
}

impl Listeners {
    pub(crate) fn register_doc(
        &self,
        path: DocPath,
        callback: DocListener,
    ) -> (Arc<Listener>, Subscription) {
        self.register(Target::Doc(path), Callback::Doc(callback))
    }

    pub(crate) fn register_query(
        &self,
        query: Query,
        callback: QueryListener,
    ) -> (Arc<Listener>, Subscription) {
        self.register(Target::Query(query), Callback::Query(callback))
    }

    fn register(&self, target: Target, callback: Callback) -> (Arc<Listener>, Subscription) {
        let id = self.registry.next_id.fetch_add(1, Ordering::SeqCst);
        let listener = Arc::new(Listener {
            id,
            target,
            callback,
            active: AtomicBool::new(true),
            seen_version: AtomicU64::new(0),
        });
        self.registry
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&listener));

        let subscription = Subscription {
            handle: Some(Handle {
                listener: Arc::clone(&listener),
                registry: Arc::downgrade(&self.registry),
            }),
        };
        (listener, subscription)
    }

    /// Active listeners affected by writes to `changed`, in registration
    /// order.
    pub(crate) fn affected(&self, changed: &[DocPath]) -> Vec<Arc<Listener>> {
        let entries = self.registry.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<Arc<Listener>> =
            entries.values().filter(|l| l.touched_by(changed)).cloned().collect();
        hits.sort_by_key(|l| l.id);
        hits
    }

    /// Number of registered listeners.
    pub(crate) fn len(&self) -> usize {
        self.registry.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct Handle {
    listener: Arc<Listener>,
    registry: Weak<Registry>,
}

/// Teardown handle for a live subscription.
///
/// `unsubscribe` is idempotent. Dropping the handle unsubscribes, so callers
/// keep it alive for as long as they want updates.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    handle: Option<Handle>,
}

impl Subscription {
    /// Handle with nothing attached.
    pub fn inert() -> Self {
        Self { handle: None }
    }

    /// Stop delivery. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if let Some(handle) = &self.handle
            && handle.listener.active.swap(false, Ordering::SeqCst)
            && let Some(registry) = handle.registry.upgrade()
        {
            registry.remove(handle.listener.id);
        }
    }

    /// True until `unsubscribe` is called. Inert handles are never active.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.listener.active.load(Ordering::SeqCst))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.is_active()).finish()
    }
}
