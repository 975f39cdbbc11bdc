//! Task ↔ label links.

use serde::{Deserialize, Serialize};

use crate::envelope::{SyncMeta, Syncable, Timestamp};
use crate::family::EntityFamily;
use crate::ids::{LabelId, LinkId, TaskId, UserId};

/// One row of the task/label join table. Links sync as their own family
/// and are themselves soft-deletable: removing a label from a task
/// tombstones the link so the removal propagates to other devices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskLabelLink {
    pub id: LinkId,
    pub task_id: TaskId,
    pub label_id: LabelId,
    #[serde(flatten)]
    pub sync: SyncMeta<LinkId>,
}

impl TaskLabelLink {
    pub fn new(user_id: UserId, task_id: TaskId, label_id: LabelId, now: Timestamp) -> Self {
        Self {
            id: LinkId::new(),
            task_id,
            label_id,
            sync: SyncMeta::new(user_id, now),
        }
    }
}

impl Syncable for TaskLabelLink {
    type Id = LinkId;

    const FAMILY: EntityFamily = EntityFamily::TaskLabelLinks;

    fn id(&self) -> LinkId {
        self.id
    }

    fn meta(&self) -> &SyncMeta<LinkId> {
        &self.sync
    }

    fn meta_mut(&mut self) -> &mut SyncMeta<LinkId> {
        &mut self.sync
    }
}
