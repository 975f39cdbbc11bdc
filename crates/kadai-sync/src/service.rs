//! Application-facing sync trigger surface.
//!
//! [`SyncService`] wraps the engine behind a single `sync(user)` entry
//! point that is safe to call repeatedly and concurrently: one pass per
//! user runs at a time, callers that arrive mid-pass coalesce onto it,
//! and at most one follow-up pass is queued to cover requests that
//! arrived after the running pass had already read its inputs.
//!
//! It also hosts the realtime listener: a long-lived task that consumes
//! the remote change feed and schedules earlier passes. The feed is a
//! latency optimization only — a dropped or lagged event costs nothing,
//! because the next pass pulls from the checkpoint regardless.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kadai_remote::ChangeEvent;
use kadai_types::UserId;

use crate::engine::SyncEngine;
use crate::report::SyncReport;

/// Per-user pass coordination.
struct UserLane {
    /// Set by every caller; drained by whichever caller holds `running`.
    /// A flag rather than a queue: N requests during one pass collapse
    /// into one follow-up.
    pending: AtomicBool,
    /// Held by the caller currently driving passes for this user.
    running: tokio::sync::Mutex<()>,
    /// Completed-pass generation counter; followers wait on it.
    done: watch::Sender<u64>,
}

impl UserLane {
    fn new() -> Self {
        let (done, _) = watch::channel(0);
        Self {
            pending: AtomicBool::new(false),
            running: tokio::sync::Mutex::new(()),
            done,
        }
    }
}

/// The front door the rest of the application syncs through.
pub struct SyncService {
    engine: Arc<SyncEngine>,
    lanes: parking_lot::Mutex<HashMap<UserId, Arc<UserLane>>>,
    /// Root token: `shutdown` cancels every in-flight pass and listener.
    cancel: CancellationToken,
    listeners: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl SyncService {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            lanes: parking_lot::Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            listeners: parking_lot::Mutex::new(Vec::new()),
        }
    }

    fn lane(&self, user_id: UserId) -> Arc<UserLane> {
        self.lanes
            .lock()
            .entry(user_id)
            .or_insert_with(|| Arc::new(UserLane::new()))
            .clone()
    }

    /// Run (or join) a sync pass for the user.
    ///
    /// Returns the last pass report when this call ended up driving the
    /// engine, or `None` when the request coalesced onto a pass driven by
    /// a concurrent caller.
    pub async fn sync(&self, user_id: UserId) -> Option<SyncReport> {
        let lane = self.lane(user_id);
        lane.pending.store(true, Ordering::SeqCst);

        let mut done_rx = lane.done.subscribe();
        let entry_gen = *done_rx.borrow();

        loop {
            if let Ok(guard) = lane.running.try_lock() {
                let mut last = None;
                // Drain: a request that lands after the engine read its
                // inputs re-raises `pending` and gets a fresh pass.
                while lane.pending.swap(false, Ordering::SeqCst) {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    last = Some(self.engine.sync_user(user_id, &self.cancel).await);
                }
                // Release before signalling so a woken follower's
                // try_lock cannot race a still-held guard.
                drop(guard);
                lane.done.send_modify(|generation| *generation += 1);
                return last;
            }

            // Another caller is driving; wait for a pass to complete.
            if done_rx.changed().await.is_err() {
                return None;
            }
            // Covered if a pass finished after we raised `pending` and
            // nobody has re-raised it since the driver drained it.
            if *done_rx.borrow() > entry_gen && !lane.pending.load(Ordering::SeqCst) {
                debug!(user = %user_id.short(), "sync request coalesced");
                return None;
            }
        }
    }

    /// Spawn the realtime listener: every change event for `user_id`
    /// schedules a sync pass (events never mutate state directly). The
    /// task ends on [`shutdown`](Self::shutdown) or when the feed closes.
    pub fn attach_realtime(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<ChangeEvent>,
        user_id: UserId,
    ) {
        let service = Arc::clone(self);
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            info!(user = %user_id.short(), "realtime listener started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(ev) => {
                            if ev.user_id != user_id {
                                continue;
                            }
                            debug!(family = %ev.family, id = %ev.id, kind = ?ev.kind,
                                   "change hint; scheduling sync");
                            service.sync(user_id).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            // Lost hints are harmless; sync to be sure.
                            warn!(skipped, "realtime feed lagged");
                            service.sync(user_id).await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            info!(user = %user_id.short(), "realtime listener stopped");
        });
        self.listeners.lock().push(handle);
    }

    /// Cooperative teardown: cancel in-flight passes and listeners, then
    /// wait for the listeners to wind down.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = self.listeners.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "realtime listener panicked during shutdown");
            }
        }
    }
}
