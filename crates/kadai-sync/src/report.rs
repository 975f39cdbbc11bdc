//! Pass outcomes and the sync error taxonomy.

use thiserror::Error;

use kadai_remote::RemoteError;
use kadai_store::StoreError;
use kadai_types::EntityFamily;

/// The two halves of one family's sync pass.
///
/// A pass runs `Idle → Pushing → Pulling → Idle`; an unrecoverable error
/// in either phase ends the pass as `Failed(phase)` and the next pass
/// starts fresh from `Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    Push,
    Pull,
}

/// An error that aborted a phase. Record-level failures are *not* errors
/// at this level — they're counted in the outcome and retried next pass.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local persistence failed. Fatal to the phase, safe to retry the
    /// whole pass later.
    #[error("{phase:?} phase storage failure: {source}")]
    Store {
        phase: SyncPhase,
        #[source]
        source: StoreError,
    },

    /// A remote call the phase cannot proceed without failed (e.g. a
    /// `fetch_since` page).
    #[error("{phase:?} phase remote failure: {source}")]
    Remote {
        phase: SyncPhase,
        #[source]
        source: RemoteError,
    },

    /// The pass was cancelled cooperatively. Everything confirmed so far
    /// is consistent; unconfirmed records stay dirty for the next pass.
    #[error("pass cancelled during {0:?} phase")]
    Cancelled(SyncPhase),
}

impl SyncError {
    pub fn phase(&self) -> SyncPhase {
        match self {
            SyncError::Store { phase, .. } => *phase,
            SyncError::Remote { phase, .. } => *phase,
            SyncError::Cancelled(phase) => *phase,
        }
    }
}

/// Push-phase counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// Records confirmed by the remote and flushed locally.
    pub pushed: usize,
    /// Records whose push failed; they keep `needs_sync` and retry next
    /// pass.
    pub failed: usize,
}

/// Pull-phase counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PullOutcome {
    /// Remote records inserted or overwritten locally.
    pub applied: usize,
    /// Remote records discarded because the local copy was as new or
    /// newer (ties favor local).
    pub discarded: usize,
    /// Full pages applied.
    pub pages: usize,
}

/// One family's pass result.
#[derive(Debug)]
pub struct FamilyReport {
    pub family: EntityFamily,
    pub push: PushOutcome,
    pub pull: PullOutcome,
    /// Set when a phase aborted; counters still reflect the work that
    /// completed before the abort.
    pub error: Option<SyncError>,
}

impl FamilyReport {
    pub(crate) fn new(family: EntityFamily) -> Self {
        Self {
            family,
            push: PushOutcome::default(),
            pull: PullOutcome::default(),
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of one `sync_user` invocation: one report per family, in the
/// order the families were processed. Sync failures are silent to the
/// end user by design — this report exists for logging and tests.
#[derive(Debug)]
pub struct SyncReport {
    pub families: Vec<FamilyReport>,
}

impl SyncReport {
    pub fn fully_succeeded(&self) -> bool {
        self.families.iter().all(FamilyReport::succeeded)
    }

    pub fn family(&self, family: EntityFamily) -> Option<&FamilyReport> {
        self.families.iter().find(|r| r.family == family)
    }
}
