//! The remote repository contract.
//!
//! The wire protocol is upsert-oriented: `create` and `update` share one
//! idempotent path keyed by the client-generated id, and `delete` is the
//! same path with the tombstone set. `fetch_since` is an ascending,
//! paginated scan over `updated_at` — the cursor rule is encoded in
//! [`Cursor`] so callers can't get the inclusive/exclusive bounds wrong.

use async_trait::async_trait;

use kadai_types::{Syncable, Timestamp, UserId};

use crate::error::RemoteError;

/// Fixed page size for `fetch_since`. A page shorter than this terminates
/// the pull loop.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Where a `fetch_since` page starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cursor {
    /// First pull ever for this user/family: fetch everything.
    Start,
    /// First page of a pass resuming from a checkpoint. **Inclusive**, so
    /// a record stamped exactly at the checkpoint is not lost.
    From(Timestamp),
    /// Continuation page. **Exclusive** on the previous page's last-seen
    /// stamp, so consecutive pages don't re-fetch.
    After(Timestamp),
}

impl Cursor {
    /// Does a record stamped `at` fall past this cursor?
    pub fn admits(&self, at: Timestamp) -> bool {
        match self {
            Cursor::Start => true,
            Cursor::From(t) => at >= *t,
            Cursor::After(t) => at > *t,
        }
    }
}

/// One page worth of `fetch_since` parameters.
#[derive(Clone, Copy, Debug)]
pub struct PageRequest {
    pub cursor: Cursor,
    pub limit: usize,
}

impl PageRequest {
    /// The first page of a pull pass, from an optional checkpoint.
    pub fn first(checkpoint: Option<Timestamp>, limit: usize) -> Self {
        let cursor = match checkpoint {
            Some(t) => Cursor::From(t),
            None => Cursor::Start,
        };
        Self { cursor, limit }
    }

    /// A continuation page after the previous page's final `updated_at`.
    pub fn next(last_seen: Timestamp, limit: usize) -> Self {
        Self {
            cursor: Cursor::After(last_seen),
            limit,
        }
    }
}

/// CRUD + incremental-fetch access to the authoritative backend for one
/// entity family.
///
/// Every call may fail with [`RemoteError`]; failures must leave remote
/// state either untouched or fully applied — never half-written.
#[async_trait]
pub trait RemoteRepository<E: Syncable>: Send + Sync {
    /// Server-side upsert keyed by the record id. A duplicate create with
    /// the same id succeeds as an update, not a conflict — this is what
    /// makes push retries safe. Returns the stored record carrying the
    /// server-authoritative `updated_at`.
    async fn create(&self, entity: &E) -> Result<E, RemoteError>;

    /// Same idempotent-upsert contract as [`create`](Self::create). A
    /// tombstoned record is pushed through here, carrying its tombstone.
    async fn update(&self, entity: &E) -> Result<E, RemoteError>;

    /// Set the remote tombstone. Idempotent: deleting an already-deleted
    /// or unknown id is not an error.
    async fn delete(&self, user_id: UserId, id: E::Id) -> Result<(), RemoteError>;

    /// One page of records (tombstones included) for the user, ascending
    /// by `updated_at`, starting at the cursor. The caller keeps
    /// requesting continuation pages until a short page comes back.
    async fn fetch_since(&self, user_id: UserId, page: PageRequest) -> Result<Vec<E>, RemoteError>;
}
