//! The bidirectional sync engine.
//!
//! One pass per user reconciles each entity family in turn: **push**
//! local unsynced records to the remote, then **pull** remote changes
//! since the last checkpoint and resolve them by last-writer-wins.
//!
//! # Ordering
//!
//! Push runs before pull, so a just-pushed record's own remote echo is
//! filtered out by the pull's tie-break (remote wins only on a strictly
//! greater `updated_at`; ties favor local) instead of being re-applied.
//! Pages are applied in ascending `updated_at` order and the checkpoint
//! only advances after every fetched page has applied cleanly.
//!
//! # Failure isolation
//!
//! One record's push failure doesn't block the rest of the phase — the
//! record stays `needs_sync` and retries next pass. One family's phase
//! failure doesn't block the other families. Nothing here retries within
//! a pass; the caller schedules the next pass.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub use kadai_remote::DEFAULT_PAGE_SIZE;
use kadai_remote::{PageRequest, RemoteRepository};
use kadai_store::{CheckpointStore, LocalRepository};
use kadai_types::{Label, LogEntry, Syncable, Task, TaskLabelLink, Timestamp, UserId};

use crate::report::{FamilyReport, PullOutcome, PushOutcome, SyncError, SyncPhase, SyncReport};

/// One family's pair of stores. The engine receives all collaborators by
/// injection — it never looks anything up ambiently.
pub struct FamilyLane<E: Syncable> {
    local: Arc<dyn LocalRepository<E>>,
    remote: Arc<dyn RemoteRepository<E>>,
}

impl<E: Syncable> FamilyLane<E> {
    pub fn new(local: Arc<dyn LocalRepository<E>>, remote: Arc<dyn RemoteRepository<E>>) -> Self {
        Self { local, remote }
    }
}

/// Reconciles one user's data across all four families.
pub struct SyncEngine {
    tasks: FamilyLane<Task>,
    labels: FamilyLane<Label>,
    links: FamilyLane<TaskLabelLink>,
    log_entries: FamilyLane<LogEntry>,
    checkpoints: Arc<dyn CheckpointStore>,
    page_size: usize,
}

impl SyncEngine {
    pub fn new(
        tasks: FamilyLane<Task>,
        labels: FamilyLane<Label>,
        links: FamilyLane<TaskLabelLink>,
        log_entries: FamilyLane<LogEntry>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            tasks,
            labels,
            links,
            log_entries,
            checkpoints,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the pull page size (must be at least 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Run one full pass: push+pull for tasks, then labels, then their
    /// link table, then working-log entries. Families are independent —
    /// a failed family is reported and the next one still runs.
    pub async fn sync_user(&self, user_id: UserId, cancel: &CancellationToken) -> SyncReport {
        let families = vec![
            self.sync_family(&self.tasks, user_id, cancel).await,
            self.sync_family(&self.labels, user_id, cancel).await,
            self.sync_family(&self.links, user_id, cancel).await,
            self.sync_family(&self.log_entries, user_id, cancel).await,
        ];
        let report = SyncReport { families };
        if report.fully_succeeded() {
            info!(user = %user_id.short(), "sync pass complete");
        } else {
            warn!(user = %user_id.short(), "sync pass finished with failed phases");
        }
        report
    }

    async fn sync_family<E: Syncable>(
        &self,
        lane: &FamilyLane<E>,
        user_id: UserId,
        cancel: &CancellationToken,
    ) -> FamilyReport {
        let mut report = FamilyReport::new(E::FAMILY);

        debug!(family = %E::FAMILY, "pushing");
        if let Err(e) = self.push(lane, user_id, cancel, &mut report.push).await {
            warn!(family = %E::FAMILY, error = %e, "push phase aborted");
            report.error = Some(e);
            return report;
        }

        debug!(family = %E::FAMILY, "pulling");
        if let Err(e) = self.pull(lane, user_id, cancel, &mut report.pull).await {
            warn!(family = %E::FAMILY, error = %e, "pull phase aborted");
            report.error = Some(e);
        }
        report
    }

    // =========================================================================
    // Push phase (local → remote)
    // =========================================================================

    async fn push<E: Syncable>(
        &self,
        lane: &FamilyLane<E>,
        user_id: UserId,
        cancel: &CancellationToken,
        out: &mut PushOutcome,
    ) -> Result<(), SyncError> {
        let dirty = lane
            .local
            .fetch_needing_sync(user_id)
            .map_err(|source| SyncError::Store { phase: SyncPhase::Push, source })?;

        for record in dirty {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled(SyncPhase::Push));
            }

            // A record never created remotely goes through `create`;
            // everything else — tombstones included — is an `update`.
            // Both are the same idempotent upsert on the wire, so a
            // retried push can never make a duplicate.
            let result = if record.meta().remote_id.is_none() {
                lane.remote.create(&record).await
            } else {
                lane.remote.update(&record).await
            };

            match result {
                Ok(stored) => self.confirm_push(lane, &record, &stored, out)?,
                Err(e) => {
                    // Stays dirty; the next pass retries it.
                    warn!(family = %E::FAMILY, id = %record.id(), error = %e, "push failed");
                    out.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Flush a confirmed push back into the local store: `needs_sync`
    /// off, `remote_id` set, and the server's `updated_at` adopted so the
    /// server stays the source of truth for ordering.
    fn confirm_push<E: Syncable>(
        &self,
        lane: &FamilyLane<E>,
        pushed: &E,
        stored: &E,
        out: &mut PushOutcome,
    ) -> Result<(), SyncError> {
        let store_err = |source| SyncError::Store { phase: SyncPhase::Push, source };

        // Re-read: the UI may have edited the record while the push was
        // in flight, and that edit must not be clobbered.
        let current = lane.local.fetch_by_id(pushed.id()).map_err(store_err)?;
        match current {
            None => {
                warn!(family = %E::FAMILY, id = %pushed.id(), "record vanished mid-push");
                out.failed += 1;
            }
            Some(mut current) => {
                if current.meta().version == pushed.meta().version {
                    let mut confirmed = stored.clone();
                    confirmed.meta_mut().needs_sync = false;
                    confirmed.meta_mut().remote_id = Some(stored.id());
                    lane.local.update(&confirmed).map_err(store_err)?;
                } else {
                    // Concurrent local edit: keep it dirty for the next
                    // pass, but remember the record now exists remotely.
                    trace!(family = %E::FAMILY, id = %pushed.id(), "local edit raced the push");
                    current.meta_mut().remote_id = Some(stored.id());
                    lane.local.update(&current).map_err(store_err)?;
                }
                out.pushed += 1;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Pull phase (remote → local)
    // =========================================================================

    async fn pull<E: Syncable>(
        &self,
        lane: &FamilyLane<E>,
        user_id: UserId,
        cancel: &CancellationToken,
        out: &mut PullOutcome,
    ) -> Result<(), SyncError> {
        let store_err = |source| SyncError::Store { phase: SyncPhase::Pull, source };

        let checkpoint = self
            .checkpoints
            .load(user_id, E::FAMILY)
            .map_err(store_err)?;
        let mut page_req = PageRequest::first(checkpoint, self.page_size);

        // Highest stamp across fully-applied pages; the checkpoint never
        // advances past it, so a cancelled or failed pull resumes
        // correctly.
        let mut newest: Option<Timestamp> = None;
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let page = lane
                .remote
                .fetch_since(user_id, page_req)
                .await
                .map_err(|source| SyncError::Remote { phase: SyncPhase::Pull, source })?;
            let page_len = page.len();
            let last_seen = page.last().map(Syncable::updated_at);

            for remote_rec in page {
                self.apply(lane, remote_rec, out)?;
            }
            out.pages += 1;

            if let Some(t) = last_seen {
                newest = Some(newest.map_or(t, |n| n.max(t)));
            }
            match last_seen {
                Some(t) if page_len == self.page_size => {
                    page_req = PageRequest::next(t, self.page_size);
                }
                // Short page: the scan is exhausted.
                _ => break,
            }
        }

        if let Some(t) = newest {
            self.checkpoints
                .advance(user_id, E::FAMILY, t)
                .map_err(store_err)?;
            debug!(family = %E::FAMILY, checkpoint = %t, "checkpoint advanced");
        }
        if cancelled {
            return Err(SyncError::Cancelled(SyncPhase::Pull));
        }
        Ok(())
    }

    /// Resolve one fetched remote record against the local copy.
    ///
    /// Remote wins only on a strictly greater `updated_at`; otherwise the
    /// local record is presumed newer (or concurrent and already pushed)
    /// and the remote copy is discarded. A winning remote record fully
    /// overwrites the local one — including setting a tombstone, and
    /// including *clearing* one (labels can be revived by name).
    fn apply<E: Syncable>(
        &self,
        lane: &FamilyLane<E>,
        remote_rec: E,
        out: &mut PullOutcome,
    ) -> Result<(), SyncError> {
        let store_err = |source| SyncError::Store { phase: SyncPhase::Pull, source };

        let local = lane.local.fetch_by_id(remote_rec.id()).map_err(store_err)?;
        let incoming_wins = match &local {
            None => true,
            Some(local_rec) => remote_rec.updated_at() > local_rec.updated_at(),
        };

        if !incoming_wins {
            trace!(family = %E::FAMILY, id = %remote_rec.id(), "remote copy discarded; local wins");
            out.discarded += 1;
            return Ok(());
        }

        let mut incoming = remote_rec;
        let id = incoming.id();
        incoming.meta_mut().needs_sync = false;
        incoming.meta_mut().remote_id = Some(id);

        match local {
            None => lane.local.create(&incoming).map_err(store_err)?,
            Some(_) => lane.local.update(&incoming).map_err(store_err)?,
        }
        out.applied += 1;
        Ok(())
    }
}
