//! Error types for remote calls.

use thiserror::Error;

/// Errors from the remote store. Either kind aborts only the current sync
/// phase: local state is untouched, unsent records keep `needs_sync`, and
/// the checkpoint does not advance.
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    /// Transient transport failure. Retryable at the next pass.
    #[error("network error: {0}")]
    Network(String),

    /// The backend rejected the request. The record stays dirty until the
    /// payload is fixed or the rejection is resolved.
    #[error("server rejected request: {0}")]
    Server(String),
}
