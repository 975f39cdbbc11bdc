//! Labels.

use serde::{Deserialize, Serialize};

use crate::envelope::{SyncMeta, Syncable, Timestamp};
use crate::family::EntityFamily;
use crate::ids::{LabelId, UserId};

/// A user-defined label. Labels can be revived by name: re-creating a
/// label that was soft-deleted clears its tombstone rather than minting a
/// duplicate id, so a revival must be able to propagate as an "undelete".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub name: String,
    /// Hex color, e.g. `"#e8a13f"`.
    pub color: String,
    #[serde(flatten)]
    pub sync: SyncMeta<LabelId>,
}

impl Label {
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        color: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: LabelId::new(),
            name: name.into(),
            color: color.into(),
            sync: SyncMeta::new(user_id, now),
        }
    }

    pub fn rename(&mut self, name: impl Into<String>, now: Timestamp) {
        self.name = name.into();
        self.sync.touch(now);
    }

    /// Clear the tombstone on a label the user re-created by name.
    pub fn revive(&mut self, now: Timestamp) {
        if self.sync.deleted_at.take().is_some() {
            self.sync.touch(now);
        }
    }
}

impl Syncable for Label {
    type Id = LabelId;

    const FAMILY: EntityFamily = EntityFamily::Labels;

    fn id(&self) -> LabelId {
        self.id
    }

    fn meta(&self) -> &SyncMeta<LabelId> {
        &self.sync
    }

    fn meta_mut(&mut self) -> &mut SyncMeta<LabelId> {
        &mut self.sync
    }
}
