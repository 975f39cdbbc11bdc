//! The sync checkpoint store.
//!
//! One cursor per `(user, family)`: the `updated_at` of the most recently
//! observed remote change. The pull phase resumes from it after restart.

use std::collections::HashMap;

use parking_lot::RwLock;

use kadai_types::{EntityFamily, Timestamp, UserId};

use crate::error::StoreError;

/// Persists pull-phase cursors per user and entity family.
pub trait CheckpointStore: Send + Sync {
    /// The stored cursor, or `None` if this user/family has never
    /// completed a pull ("fetch everything").
    fn load(&self, user_id: UserId, family: EntityFamily) -> Result<Option<Timestamp>, StoreError>;

    /// Move the cursor forward. Monotonic: a regression is silently
    /// clamped — the stored value never moves backward. (Clamp rather
    /// than assert: a slow pass may race a newer pass's advance, and that
    /// is not a caller bug.)
    fn advance(
        &self,
        user_id: UserId,
        family: EntityFamily,
        to: Timestamp,
    ) -> Result<(), StoreError>;
}

/// In-memory checkpoint store for tests and second-device simulation.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    cursors: RwLock<HashMap<(UserId, EntityFamily), Timestamp>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, user_id: UserId, family: EntityFamily) -> Result<Option<Timestamp>, StoreError> {
        Ok(self.cursors.read().get(&(user_id, family)).copied())
    }

    fn advance(
        &self,
        user_id: UserId,
        family: EntityFamily,
        to: Timestamp,
    ) -> Result<(), StoreError> {
        let mut cursors = self.cursors.write();
        let slot = cursors.entry((user_id, family)).or_insert(to);
        *slot = (*slot).max(to);
        Ok(())
    }
}
