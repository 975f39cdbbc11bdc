//! Entity families — the independently-synced record types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// One of the independently-synced record types.
///
/// Families share no state: a sync pass runs push+pull per family, and a
/// failure in one family never blocks another. The string form is used as
/// the checkpoint row key and in log fields.
#[derive(
    Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityFamily {
    Tasks,
    Labels,
    TaskLabelLinks,
    LogEntries,
}

impl EntityFamily {
    /// The SQLite table backing this family in the local store.
    pub fn table(&self) -> &'static str {
        match self {
            EntityFamily::Tasks => "tasks",
            EntityFamily::Labels => "labels",
            EntityFamily::TaskLabelLinks => "task_label_links",
            EntityFamily::LogEntries => "log_entries",
        }
    }
}
