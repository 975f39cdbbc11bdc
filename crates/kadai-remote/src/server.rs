//! In-memory reference backend.
//!
//! Implements the full remote contract for all four families: idempotent
//! upsert keyed by the client-generated id, tombstoning delete, ascending
//! paginated `fetch_since`, and a broadcast change feed. `updated_at` is
//! always server-assigned from a monotonic clock, so ordering never
//! depends on client wall clocks.
//!
//! Rows are stored as canonical JSON, the same shape the wire carries;
//! `fetch_since` deserializes them back, so every record a client pulls
//! has round-tripped through the wire format.
//!
//! Fault injection (`fail_next_network`, `reject_next`) lets tests
//! exercise partial-failure paths without a real network.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use kadai_types::{EntityFamily, Syncable, Timestamp, UserId};

use crate::error::RemoteError;
use crate::events::{ChangeEvent, ChangeKind};
use crate::repo::{PageRequest, RemoteRepository};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One stored record: envelope fields the server filters on, plus the
/// canonical JSON body.
struct StoredRow {
    user_id: UserId,
    updated_at: Timestamp,
    deleted_at: Option<Timestamp>,
    body: Value,
}

struct ServerState {
    shelves: HashMap<EntityFamily, HashMap<uuid::Uuid, StoredRow>>,
    /// Last assigned stamp; the next one is strictly greater.
    clock: Timestamp,
    /// Remaining calls to fail with `RemoteError::Network`.
    network_failures: u32,
    /// Remaining calls to fail with `RemoteError::Server`.
    rejections: u32,
}

/// The authoritative backend, shared by every per-family repository
/// handle (it implements [`RemoteRepository`] for all four families).
pub struct RemoteServer {
    state: Mutex<ServerState>,
    events: broadcast::Sender<ChangeEvent>,
}

impl Default for RemoteServer {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteServer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(ServerState {
                shelves: HashMap::new(),
                clock: chrono::DateTime::UNIX_EPOCH,
                network_failures: 0,
                rejections: 0,
            }),
            events,
        }
    }

    /// Subscribe to the change feed. Best-effort: a lagging receiver
    /// drops events, which is fine — the feed is a scheduling hint, not
    /// the sync mechanism.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Fail the next `n` remote calls with a network error.
    pub fn fail_next_network(&self, n: u32) {
        self.state.lock().network_failures += n;
    }

    /// Reject the next `n` remote calls with a server error.
    pub fn reject_next(&self, n: u32) {
        self.state.lock().rejections += n;
    }

    /// Rows stored for a family, tombstones included.
    pub fn record_count(&self, family: EntityFamily) -> usize {
        self.state
            .lock()
            .shelves
            .get(&family)
            .map_or(0, HashMap::len)
    }

    /// Store a record exactly as given — no restamping, no change event.
    /// Simulates data that reached the backend out of band (another
    /// device, an earlier epoch, a skewed clock).
    pub fn seed<E: Syncable>(&self, entity: &E) -> Result<(), RemoteError> {
        let meta = entity.meta();
        let body = normalized_body(entity, meta.updated_at, meta.deleted_at)?;
        let mut state = self.state.lock();
        state.shelves.entry(E::FAMILY).or_default().insert(
            entity.id().into(),
            StoredRow {
                user_id: meta.user_id,
                updated_at: meta.updated_at,
                deleted_at: meta.deleted_at,
                body,
            },
        );
        Ok(())
    }

    fn check_faults(state: &mut ServerState) -> Result<(), RemoteError> {
        if state.network_failures > 0 {
            state.network_failures -= 1;
            return Err(RemoteError::Network("connection dropped".into()));
        }
        if state.rejections > 0 {
            state.rejections -= 1;
            return Err(RemoteError::Server("payload rejected".into()));
        }
        Ok(())
    }

    /// Strictly-increasing server stamp: wall clock, clamped forward.
    fn next_stamp(state: &mut ServerState) -> Timestamp {
        let candidate = Utc::now();
        let floor = state.clock + Duration::milliseconds(1);
        state.clock = candidate.max(floor);
        state.clock
    }

    fn emit(&self, event: ChangeEvent) {
        // No receivers is fine; the feed is best-effort.
        let _ = self.events.send(event);
    }

    /// The shared upsert path behind `create`, `update`, and `delete`.
    fn upsert<E: Syncable>(&self, entity: &E) -> Result<E, RemoteError> {
        let (stored, event) = {
            let mut state = self.state.lock();
            Self::check_faults(&mut state)?;

            let stamp = Self::next_stamp(&mut state);
            let meta = entity.meta();
            let body = normalized_body(entity, stamp, meta.deleted_at)?;
            let stored: E = serde_json::from_value(body.clone())
                .map_err(|e| RemoteError::Server(format!("malformed payload: {e}")))?;

            let shelf = state.shelves.entry(E::FAMILY).or_default();
            let key: uuid::Uuid = entity.id().into();
            let kind = match (shelf.contains_key(&key), meta.deleted_at) {
                (_, Some(_)) => ChangeKind::Deleted,
                (false, None) => ChangeKind::Created,
                (true, None) => ChangeKind::Updated,
            };
            shelf.insert(
                key,
                StoredRow {
                    user_id: meta.user_id,
                    updated_at: stamp,
                    deleted_at: meta.deleted_at,
                    body,
                },
            );
            (
                stored,
                ChangeEvent {
                    user_id: meta.user_id,
                    family: E::FAMILY,
                    id: key,
                    kind,
                },
            )
        };
        debug!(family = %E::FAMILY, id = %event.id, kind = ?event.kind, "remote upsert");
        self.emit(event);
        Ok(stored)
    }
}

/// Canonical stored body: the record as the wire carries it, with the
/// server-authoritative envelope folded in. `needs_sync`/`remote_id` are
/// client bookkeeping — the canonical form is "confirmed": not dirty,
/// remote id equal to the primary id.
fn normalized_body<E: Syncable>(
    entity: &E,
    updated_at: Timestamp,
    deleted_at: Option<Timestamp>,
) -> Result<Value, RemoteError> {
    let mut body = serde_json::to_value(entity)
        .map_err(|e| RemoteError::Server(format!("unserializable payload: {e}")))?;
    let map = body
        .as_object_mut()
        .ok_or_else(|| RemoteError::Server("payload is not an object".into()))?;
    map.insert("updated_at".into(), timestamp_value(updated_at)?);
    map.insert(
        "deleted_at".into(),
        match deleted_at {
            Some(t) => timestamp_value(t)?,
            None => Value::Null,
        },
    );
    map.insert("needs_sync".into(), Value::Bool(false));
    let id = map
        .get("id")
        .cloned()
        .ok_or_else(|| RemoteError::Server("payload has no id".into()))?;
    map.insert("remote_id".into(), id);
    Ok(body)
}

fn timestamp_value(t: Timestamp) -> Result<Value, RemoteError> {
    serde_json::to_value(t).map_err(|e| RemoteError::Server(format!("bad timestamp: {e}")))
}

#[async_trait::async_trait]
impl<E: Syncable> RemoteRepository<E> for RemoteServer {
    async fn create(&self, entity: &E) -> Result<E, RemoteError> {
        self.upsert(entity)
    }

    async fn update(&self, entity: &E) -> Result<E, RemoteError> {
        self.upsert(entity)
    }

    async fn delete(&self, user_id: UserId, id: E::Id) -> Result<(), RemoteError> {
        let event = {
            let mut state = self.state.lock();
            Self::check_faults(&mut state)?;

            let stamp = Self::next_stamp(&mut state);
            let shelf = state.shelves.entry(E::FAMILY).or_default();
            let key: uuid::Uuid = id.into();
            match shelf.get_mut(&key) {
                // Already tombstoned or never seen: idempotent no-op.
                None => None,
                Some(row) if row.deleted_at.is_some() => None,
                Some(row) => {
                    row.deleted_at = Some(stamp);
                    row.updated_at = stamp;
                    if let Some(map) = row.body.as_object_mut() {
                        map.insert("deleted_at".into(), timestamp_value(stamp)?);
                        map.insert("updated_at".into(), timestamp_value(stamp)?);
                    }
                    Some(ChangeEvent {
                        user_id,
                        family: E::FAMILY,
                        id: key,
                        kind: ChangeKind::Deleted,
                    })
                }
            }
        };
        if let Some(event) = event {
            self.emit(event);
        }
        Ok(())
    }

    async fn fetch_since(&self, user_id: UserId, page: PageRequest) -> Result<Vec<E>, RemoteError> {
        let mut state = self.state.lock();
        Self::check_faults(&mut state)?;

        let Some(shelf) = state.shelves.get(&E::FAMILY) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<(&uuid::Uuid, &StoredRow)> = shelf
            .iter()
            .filter(|(_, row)| row.user_id == user_id && page.cursor.admits(row.updated_at))
            .collect();
        hits.sort_by_key(|(id, row)| (row.updated_at, **id));
        hits.truncate(page.limit);

        hits.into_iter()
            .map(|(_, row)| {
                serde_json::from_value(row.body.clone())
                    .map_err(|e| RemoteError::Server(format!("corrupt stored record: {e}")))
            })
            .collect()
    }
}
