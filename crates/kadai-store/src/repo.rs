//! The local repository contract.

use kadai_types::{Syncable, Timestamp, UserId};

use crate::error::StoreError;

/// CRUD + sync-flag access to the on-device store for one entity family.
///
/// Side effects are confined to the local store; no network calls
/// originate here. Implementations must be safe under interleaved calls
/// from the UI and the sync engine, and a single-record write is atomic
/// (no torn reads).
pub trait LocalRepository<E: Syncable>: Send + Sync {
    /// Insert a new record. Fails with [`StoreError::AlreadyExists`] if
    /// the id is already present.
    fn create(&self, entity: &E) -> Result<(), StoreError>;

    /// Look up one record. Missing ids are `Ok(None)`, never an error.
    fn fetch_by_id(&self, id: E::Id) -> Result<Option<E>, StoreError>;

    /// Full-record overwrite. Fails with [`StoreError::NotFound`] if the
    /// record does not exist.
    fn update(&self, entity: &E) -> Result<(), StoreError>;

    /// All records with `needs_sync = true` for the user, tombstoned ones
    /// included — a tombstone still has to be pushed.
    fn fetch_needing_sync(&self, user_id: UserId) -> Result<Vec<E>, StoreError>;

    /// All live (non-tombstoned) records for the user, ascending by
    /// `updated_at`. The listing surface the UI reads.
    fn fetch_all(&self, user_id: UserId) -> Result<Vec<E>, StoreError>;

    /// Bulk soft-delete for an account-level wipe. Every live record is
    /// tombstoned at `now` and marked `needs_sync` so the wipe propagates.
    fn delete_all(&self, user_id: UserId, now: Timestamp) -> Result<(), StoreError>;

    /// Physically remove tombstones older than the retention threshold.
    /// Returns the number of rows purged. Only tombstones that have been
    /// pushed (`needs_sync = false`) are eligible — an unpushed tombstone
    /// must never be lost.
    fn purge_tombstones(&self, user_id: UserId, older_than: Timestamp)
    -> Result<usize, StoreError>;
}
