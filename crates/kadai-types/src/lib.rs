//! Shared domain types for Kadai.
//!
//! This crate is the relational foundation: typed IDs, the sync envelope,
//! and the four syncable entity families. It has **no internal kadai
//! dependencies** — a pure leaf crate that other crates build on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! User (UserId)
//!     └── owns Task (TaskId)
//!     │       └── parent_task_id forms subtask lineage
//!     └── owns Label (LabelId)
//!     └── owns TaskLabelLink (LinkId = task ↔ label join row)
//!     └── owns LogEntry (EntryId, working log)
//! ```
//!
//! Every entity embeds a [`SyncMeta`] envelope; the sync engine reconciles
//! records purely through that envelope (see [`Syncable`]) and treats the
//! rest of each struct as opaque payload.

pub mod entry;
pub mod envelope;
pub mod family;
pub mod ids;
pub mod label;
pub mod link;
pub mod task;

// Re-export primary types at crate root for convenience.
pub use entry::LogEntry;
pub use envelope::{RecordState, SyncMeta, Syncable, Timestamp};
pub use family::EntityFamily;
pub use ids::{EntryId, LabelId, LinkId, TaskId, UserId};
pub use label::Label;
pub use link::TaskLabelLink;
pub use task::{Bucket, Task};
