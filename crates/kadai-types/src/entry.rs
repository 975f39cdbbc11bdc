//! Working-log entries.

use serde::{Deserialize, Serialize};

use crate::envelope::{SyncMeta, Syncable, Timestamp};
use crate::family::EntityFamily;
use crate::ids::{EntryId, UserId};

/// A free-form working-log entry. `occurred_at` is when the logged thing
/// happened — user-editable payload, distinct from the envelope's
/// `updated_at` which orders sync.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: EntryId,
    pub title: String,
    pub body: String,
    pub occurred_at: Timestamp,
    #[serde(flatten)]
    pub sync: SyncMeta<EntryId>,
}

impl LogEntry {
    pub fn new(
        user_id: UserId,
        title: impl Into<String>,
        body: impl Into<String>,
        occurred_at: Timestamp,
        now: Timestamp,
    ) -> Self {
        Self {
            id: EntryId::new(),
            title: title.into(),
            body: body.into(),
            occurred_at,
            sync: SyncMeta::new(user_id, now),
        }
    }
}

impl Syncable for LogEntry {
    type Id = EntryId;

    const FAMILY: EntityFamily = EntityFamily::LogEntries;

    fn id(&self) -> EntryId {
        self.id
    }

    fn meta(&self) -> &SyncMeta<EntryId> {
        &self.sync
    }

    fn meta_mut(&mut self) -> &mut SyncMeta<EntryId> {
        &mut self.sync
    }
}
