//! Realtime change hints.
//!
//! Best-effort notifications the backend emits whenever it observes a
//! change for a user. Their only contract is "a sync pass for this user
//! may now find fresher data" — they schedule an earlier pass, they never
//! mutate state themselves, and missing one is harmless because the next
//! pass pulls from the checkpoint anyway.

use kadai_types::{EntityFamily, UserId};

/// What kind of change the backend observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One observed change. `id` is the raw entity UUID — the consumer only
/// uses it for logging, never for lookups.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub user_id: UserId,
    pub family: EntityFamily,
    pub id: uuid::Uuid,
    pub kind: ChangeKind,
}
