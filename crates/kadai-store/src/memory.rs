//! In-memory repositories.
//!
//! Test doubles with the same contract as the SQLite store. Integration
//! tests also use them as independent "devices": two `MemoryRepo`s synced
//! against one remote model two installs of the app.

use std::collections::HashMap;

use parking_lot::RwLock;

use kadai_types::{RecordState, Syncable, Timestamp, UserId};

use crate::error::StoreError;
use crate::repo::LocalRepository;

/// [`LocalRepository`] backed by a `HashMap`.
pub struct MemoryRepo<E: Syncable> {
    rows: RwLock<HashMap<E::Id, E>>,
}

impl<E: Syncable> MemoryRepo<E> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Number of rows, tombstones included.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl<E: Syncable> Default for MemoryRepo<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Syncable> LocalRepository<E> for MemoryRepo<E> {
    fn create(&self, entity: &E) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&entity.id()) {
            return Err(StoreError::AlreadyExists(entity.id().to_string()));
        }
        rows.insert(entity.id(), entity.clone());
        Ok(())
    }

    fn fetch_by_id(&self, id: E::Id) -> Result<Option<E>, StoreError> {
        Ok(self.rows.read().get(&id).cloned())
    }

    fn update(&self, entity: &E) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        match rows.get_mut(&entity.id()) {
            Some(slot) => {
                *slot = entity.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(entity.id().to_string())),
        }
    }

    fn fetch_needing_sync(&self, user_id: UserId) -> Result<Vec<E>, StoreError> {
        let mut out: Vec<E> = self
            .rows
            .read()
            .values()
            .filter(|e| e.user_id() == user_id && e.needs_sync())
            .cloned()
            .collect();
        out.sort_by_key(|e| (e.updated_at(), e.id()));
        Ok(out)
    }

    fn fetch_all(&self, user_id: UserId) -> Result<Vec<E>, StoreError> {
        let mut out: Vec<E> = self
            .rows
            .read()
            .values()
            .filter(|e| e.user_id() == user_id && matches!(e.state(), RecordState::Live(_)))
            .cloned()
            .collect();
        out.sort_by_key(|e| (e.updated_at(), e.id()));
        Ok(out)
    }

    fn delete_all(&self, user_id: UserId, now: Timestamp) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        for entity in rows.values_mut() {
            if entity.user_id() == user_id && !entity.is_deleted() {
                entity.meta_mut().tombstone(now);
            }
        }
        Ok(())
    }

    fn purge_tombstones(
        &self,
        user_id: UserId,
        older_than: Timestamp,
    ) -> Result<usize, StoreError> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|_, e| {
            let purgeable = e.user_id() == user_id
                && !e.needs_sync()
                && e.meta().deleted_at.is_some_and(|d| d < older_than);
            !purgeable
        });
        Ok(before - rows.len())
    }
}
