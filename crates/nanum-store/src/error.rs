//! Store error types.

use thiserror::Error;

/// Errors returned by [`crate::Store`] implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Target document does not exist.
    ///
    /// Returned by `update`, `delete` and batch commits. Callers that only
    /// need "delete if present" semantics treat this as success.
    #[error("document not found: {path}")]
    NotFound {
        /// Full document path (`collection/id`).
        path: String,
    },

    /// Backend I/O failure.
    ///
    /// May be transient (disk busy, injected chaos) or permanent. Check the
    /// message for details.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// A stored document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An internal lock was poisoned by a panicking thread.
    #[error("store lock poisoned")]
    Poisoned,

    /// Path or field path violates the store's naming rules.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl StoreError {
    /// Returns true if retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Poisoned)
    }

    pub(crate) fn not_found(path: &crate::DocPath) -> Self {
        Self::NotFound { path: path.to_string() }
    }
}
