//! Document store collaborator for the Nanum chat core.
//!
//! The chat core runs against a passive document store: no server-side logic,
//! only document reads and writes, queries, live subscriptions and atomic
//! batches. Every invariant of the chat protocol is enforced by the client,
//! so this crate knows nothing about rooms or messages.
//!
//! # Components
//!
//! - [`Store`]: Trait every backend implements
//! - [`MemoryStore`]: In-memory backend for tests and simulation
//! - [`RedbStore`]: Durable single-file backend
//! - [`ChaoticStore`]: Fault-injecting wrapper for chaos tests
//! - [`Clock`]: Source of server-assigned timestamps
//! - [`Subscription`]: Teardown handle returned by every subscribe call

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod chaotic;
mod clock;
mod error;
mod memory;
mod patch;
mod path;
mod query;
mod redb;
mod subscription;
mod value;

pub use chaotic::ChaoticStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use patch::{Batch, FieldOp, Patch};
pub use path::{CollectionPath, DocId, DocPath, FieldPath};
pub use query::{Direction, Filter, FilterOp, Query};
pub use subscription::{DocListener, QueryListener, Subscription};
pub use value::{Document, Fields, Timestamp, Value};

pub use self::redb::RedbStore;

/// Storage abstraction for documents, queries and live subscriptions.
///
/// Must be Clone (handed to every component of the chat core), Send + Sync
/// (listeners fire on whichever thread committed the write), and synchronous.
/// Implementations share internal state via Arc, so clones observe the same
/// documents and the same listeners.
///
/// # Consistency
///
/// Every single-document write is atomic. [`Store::commit`] applies a batch
/// of updates all-or-nothing. Nothing else is transactional: a read followed
/// by a write may race with other writers.
///
/// # Listeners
///
/// Listeners receive the current snapshot synchronously inside the subscribe
/// call, then a fresh snapshot after every committed write touching their
/// document or collection. No store lock is held while a listener runs, so
/// listeners may call back into the store.
pub trait Store: Clone + Send + Sync + 'static {
    /// Read a document. `None` if it does not exist.
    fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    /// Create or fully overwrite a document.
    ///
    /// The patch is applied to an empty document, so server-timestamp
    /// sentinels and merge operators resolve the same way as in `update`.
    fn set(&self, path: &DocPath, patch: &Patch) -> Result<(), StoreError>;

    /// Merge a patch into an existing document.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the document does not exist.
    fn update(&self, path: &DocPath, patch: &Patch) -> Result<(), StoreError>;

    /// Create a document with a store-assigned id.
    ///
    /// Ids are unique per store and increase with every call, so they break
    /// ties between documents that share a server timestamp.
    fn add(&self, collection: &CollectionPath, patch: &Patch) -> Result<DocId, StoreError>;

    /// Delete a document.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the document does not exist.
    fn delete(&self, path: &DocPath) -> Result<(), StoreError>;

    /// Run a query once.
    fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Watch a single document.
    fn subscribe_doc(
        &self,
        path: &DocPath,
        listener: DocListener,
    ) -> Result<Subscription, StoreError>;

    /// Watch the result set of a query.
    fn subscribe_query(
        &self,
        query: &Query,
        listener: QueryListener,
    ) -> Result<Subscription, StoreError>;

    /// Apply a batch of updates atomically.
    ///
    /// Either every update is applied or none is. Fails with
    /// `StoreError::NotFound` if any target document is missing.
    fn commit(&self, batch: &Batch) -> Result<(), StoreError>;
}
