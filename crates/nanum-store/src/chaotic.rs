//! Chaotic store wrapper for fault injection testing
//!
//! Randomly fails operations so chat-level error handling can be exercised:
//! a failed send must leave no message, a failed receipt batch must not
//! poison the read cache, a failed listing delete must leave the room open.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    Batch, CollectionPath, DocId, DocListener, DocPath, Document, Patch, Query, QueryListener,
    Store, StoreError, Subscription,
};

/// Store wrapper that randomly injects failures
///
/// Delegates to an underlying store but fails operations based on a
/// configured failure rate. A failed operation has no effect on the inner
/// store. Listener callbacks of successful subscriptions are never
/// suppressed, only the subscribe call itself may fail.
#[derive(Clone)]
pub struct ChaoticStore<S: Store> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<AtomicUsize>,
}

/// Deterministic LCG so chaos runs replay from a seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    #[allow(clippy::cast_precision_loss)]
    fn next(&mut self) -> f64 {
        // Numerical Recipes constants
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: Store> ChaoticStore<S> {
    /// Wrap `inner` with the default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying store (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of operations attempted, failed ones included.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::SeqCst)
    }

    /// Count the operation and roll for failure.
    fn roll(&self, operation: &'static str) -> Result<(), StoreError> {
        self.operation_count.fetch_add(1, Ordering::SeqCst);
        let roll = self.rng.lock().unwrap_or_else(PoisonError::into_inner).next();
        if roll < self.failure_rate {
            tracing::debug!(operation, "injecting store failure");
            return Err(StoreError::Io(format!("chaotic failure injection ({operation})")));
        }
        Ok(())
    }
}

impl<S: Store> Store for ChaoticStore<S> {
    fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        self.roll("get")?;
        self.inner.get(path)
    }

    fn set(&self, path: &DocPath, patch: &Patch) -> Result<(), StoreError> {
        self.roll("set")?;
        self.inner.set(path, patch)
    }

    fn update(&self, path: &DocPath, patch: &Patch) -> Result<(), StoreError> {
        self.roll("update")?;
        self.inner.update(path, patch)
    }

    fn add(&self, collection: &CollectionPath, patch: &Patch) -> Result<DocId, StoreError> {
        self.roll("add")?;
        self.inner.add(collection, patch)
    }

    fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        self.roll("delete")?;
        self.inner.delete(path)
    }

    fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.roll("query")?;
        self.inner.query(query)
    }

    fn subscribe_doc(
        &self,
        path: &DocPath,
        listener: DocListener,
    ) -> Result<Subscription, StoreError> {
        self.roll("subscribe_doc")?;
        self.inner.subscribe_doc(path, listener)
    }

    fn subscribe_query(
        &self,
        query: &Query,
        listener: QueryListener,
    ) -> Result<Subscription, StoreError> {
        self.roll("subscribe_query")?;
        self.inner.subscribe_query(query, listener)
    }

    fn commit(&self, batch: &Batch) -> Result<(), StoreError> {
        self.roll("commit")?;
        self.inner.commit(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    #[test]
    fn zero_rate_never_fails() {
        let store = ChaoticStore::new(MemoryStore::new(), 0.0);
        let path = CollectionPath::root("posts").doc("1");

        for _ in 0..100 {
            store.set(&path, &Patch::new().set("title", "x")).expect("set should not fail");
        }
        assert_eq!(store.operation_count(), 100);
    }

    #[test]
    fn full_rate_always_fails_without_side_effects() {
        let store = ChaoticStore::new(MemoryStore::new(), 1.0);
        let path = CollectionPath::root("posts").doc("1");

        let result = store.set(&path, &Patch::new().set("title", "x"));
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(store.inner().document_count(), 0);
    }

    #[test]
    fn same_seed_same_failures() {
        let run = |seed| {
            let store = ChaoticStore::with_seed(MemoryStore::new(), 0.5, seed);
            let path = CollectionPath::root("posts").doc("1");
            (0..50).map(|_| store.get(&path).is_err()).collect::<Vec<_>>()
        };

        assert_eq!(run(7), run(7));
        assert!(run(7).iter().any(|failed| *failed));
        assert!(run(7).iter().any(|failed| !*failed));
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between")]
    fn rejects_out_of_range_rate() {
        let _ = ChaoticStore::new(MemoryStore::new(), 1.5);
    }
}
