//! Offline-first synchronization engine for Kadai.
//!
//! Reconciles the local store against the authoritative remote, per
//! entity family, with push-then-pull passes:
//!
//! ```text
//! sync(user)
//!   └── per family (tasks → labels → links → log entries)
//!         ├── Push: fetch_needing_sync → upsert remotely → confirm locally
//!         └── Pull: fetch_since(checkpoint) pages → LWW apply → advance checkpoint
//! ```
//!
//! Convergence guarantees: a tombstone is never lost, already-synced data
//! is never re-sent, the checkpoint only moves forward and only after a
//! fully-applied pull, and conflicts resolve by last-writer-wins with
//! ties favoring the local copy.
//!
//! [`SyncEngine`] is the per-pass state machine; [`SyncService`] is the
//! application-facing trigger surface (coalescing, realtime hints,
//! cancellation). Collaborators arrive by constructor injection — see
//! [`FamilyLane`].

pub mod engine;
pub mod report;
pub mod service;

pub use engine::{DEFAULT_PAGE_SIZE, FamilyLane, SyncEngine};
pub use report::{FamilyReport, PullOutcome, PushOutcome, SyncError, SyncPhase, SyncReport};
pub use service::SyncService;
