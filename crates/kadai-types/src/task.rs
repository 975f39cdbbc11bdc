//! Tasks and subtasks.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::envelope::{SyncMeta, Syncable, Timestamp};
use crate::family::EntityFamily;
use crate::ids::{TaskId, UserId};

/// Which list a task lives in.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Inbox,
    Today,
    Upcoming,
    Someday,
}

/// A task. Subtasks reference their parent via `parent_task_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub bucket: Bucket,
    /// Manual sort order within the bucket.
    pub position: i64,
    pub due_at: Option<Timestamp>,
    pub parent_task_id: Option<TaskId>,
    /// `Some` = completed at that instant. Completion is payload, not a
    /// tombstone — completed tasks still sync and still list.
    pub completed_at: Option<Timestamp>,
    #[serde(flatten)]
    pub sync: SyncMeta<TaskId>,
}

impl Task {
    /// New local task: dirty, never pushed.
    pub fn new(user_id: UserId, title: impl Into<String>, bucket: Bucket, now: Timestamp) -> Self {
        Self {
            id: TaskId::new(),
            title: title.into(),
            bucket,
            position: 0,
            due_at: None,
            parent_task_id: None,
            completed_at: None,
            sync: SyncMeta::new(user_id, now),
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>, now: Timestamp) {
        self.title = title.into();
        self.sync.touch(now);
    }

    pub fn move_to(&mut self, bucket: Bucket, position: i64, now: Timestamp) {
        self.bucket = bucket;
        self.position = position;
        self.sync.touch(now);
    }

    pub fn complete(&mut self, now: Timestamp) {
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
            self.sync.touch(now);
        }
    }

    pub fn reopen(&mut self, now: Timestamp) {
        if self.completed_at.take().is_some() {
            self.sync.touch(now);
        }
    }
}

impl Syncable for Task {
    type Id = TaskId;

    const FAMILY: EntityFamily = EntityFamily::Tasks;

    fn id(&self) -> TaskId {
        self.id
    }

    fn meta(&self) -> &SyncMeta<TaskId> {
        &self.sync
    }

    fn meta_mut(&mut self) -> &mut SyncMeta<TaskId> {
        &mut self.sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_edits_mark_dirty() {
        let now = Utc.timestamp_opt(1_000, 0).single().expect("ts");
        let later = Utc.timestamp_opt(2_000, 0).single().expect("ts");

        let mut task = Task::new(UserId::new(), "write spec", Bucket::Inbox, now);
        task.sync.needs_sync = false;

        task.complete(later);
        assert!(task.sync.needs_sync);
        assert_eq!(task.completed_at, Some(later));
        assert_eq!(task.sync.updated_at, later);
        assert_eq!(task.sync.version, 2);
    }
}
