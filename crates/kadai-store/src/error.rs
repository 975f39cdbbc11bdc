//! Error types for local persistence.

use thiserror::Error;

/// Errors from the local store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The referenced record does not exist (local integrity bug if it
    /// vanished mid-pass — `fetch_by_id` returns `Ok(None)` instead).
    #[error("record not found: {0}")]
    NotFound(String),

    /// A create collided with an existing id.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// Underlying SQLite failure. Fatal to the current sync phase; the
    /// pass is safe to retry in full later.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A stored row could not be decoded back into its entity.
    #[error("corrupt record in {table}: {detail}")]
    Corrupt {
        table: &'static str,
        detail: String,
    },
}
