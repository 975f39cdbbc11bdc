//! The sync envelope shared by every syncable entity.
//!
//! Sync mechanics only ever look at the envelope: `updated_at` is the
//! last-writer-wins discriminator and the pagination cursor, `deleted_at`
//! carries the tombstone, `needs_sync`/`remote_id` drive the push phase.
//! Entity-specific fields are opaque payload as far as the engine is
//! concerned.

use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::family::EntityFamily;
use crate::ids::UserId;

/// Wall-clock timestamp, UTC. Serialized as ISO-8601 / RFC 3339 on the wire.
pub type Timestamp = DateTime<Utc>;

/// Per-record sync bookkeeping, embedded in every syncable entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncMeta<Id> {
    /// Owning user; immutable, scopes every query.
    pub user_id: UserId,
    /// LWW discriminator and pagination cursor. Monotonically
    /// non-decreasing per record across both stores; after a successful
    /// push it holds the server-assigned value.
    pub updated_at: Timestamp,
    /// Tombstone. `None` = live. Once set locally it is only ever cleared
    /// by a strictly newer remote record (a revival).
    pub deleted_at: Option<Timestamp>,
    /// Informational mutation counter. Incremented on every local edit,
    /// never consulted for conflict arbitration.
    pub version: i64,
    /// `None` until the record has been created remotely; selects the
    /// create vs update push path.
    pub remote_id: Option<Id>,
    /// True whenever a local mutation has not been confirmed remotely.
    pub needs_sync: bool,
}

impl<Id: Copy> SyncMeta<Id> {
    /// Envelope for a freshly created local record: dirty, never pushed.
    pub fn new(user_id: UserId, now: Timestamp) -> Self {
        Self {
            user_id,
            updated_at: now,
            deleted_at: None,
            version: 1,
            remote_id: None,
            needs_sync: true,
        }
    }

    /// Record a local mutation: bump `version`, mark dirty, advance
    /// `updated_at`. Clamped so `updated_at` never moves backward even if
    /// the wall clock does.
    pub fn touch(&mut self, now: Timestamp) {
        self.updated_at = self.updated_at.max(now);
        self.version += 1;
        self.needs_sync = true;
    }

    /// Soft-delete. Idempotent: tombstoning an already-deleted record
    /// keeps the original `deleted_at` but still marks the record dirty
    /// so the tombstone is (re-)pushed.
    pub fn tombstone(&mut self, now: Timestamp) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(now);
        }
        self.touch(now);
    }

    /// Confirm a successful push: adopt the server-assigned `updated_at`
    /// (the server is the source of truth for ordering from here on) and
    /// clear the dirty flag.
    pub fn confirm_pushed(&mut self, remote_id: Id, server_updated_at: Timestamp) {
        self.remote_id = Some(remote_id);
        self.updated_at = server_updated_at;
        self.needs_sync = false;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A record type the sync engine can reconcile.
///
/// Implementors embed a [`SyncMeta`] and expose it uniformly; everything
/// else about the type is opaque payload carried through serde.
pub trait Syncable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Typed identifier; client-generated, globally unique, immutable.
    type Id: Copy
        + Eq
        + Ord
        + Hash
        + fmt::Display
        + fmt::Debug
        + Into<uuid::Uuid>
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// Which independently-synced family this type belongs to.
    const FAMILY: EntityFamily;

    fn id(&self) -> Self::Id;
    fn meta(&self) -> &SyncMeta<Self::Id>;
    fn meta_mut(&mut self) -> &mut SyncMeta<Self::Id>;

    fn user_id(&self) -> UserId {
        self.meta().user_id
    }

    fn updated_at(&self) -> Timestamp {
        self.meta().updated_at
    }

    fn is_deleted(&self) -> bool {
        self.meta().is_deleted()
    }

    fn needs_sync(&self) -> bool {
        self.meta().needs_sync
    }

    /// Tagged view at the storage boundary: payload fields are
    /// meaningless once a record is tombstoned, though the row keeps
    /// carrying them for diagnostics.
    fn state(&self) -> RecordState<'_, Self> {
        match self.meta().deleted_at {
            Some(deleted_at) => RecordState::Tombstoned { id: self.id(), deleted_at },
            None => RecordState::Live(self),
        }
    }
}

/// Live-or-tombstoned view of a record (see [`Syncable::state`]).
#[derive(Debug)]
pub enum RecordState<'a, E: Syncable> {
    Live(&'a E),
    Tombstoned { id: E::Id, deleted_at: Timestamp },
}
