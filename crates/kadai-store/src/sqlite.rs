//! SQLite persistence for all four entity families.
//!
//! One table per family, all with the same shape: the envelope fields the
//! store filters on (`user_id`, `updated_at`, `deleted_at`, `needs_sync`)
//! are mirrored into columns for indexing, and `data` holds the canonical
//! serialized record. Every write path goes through one encode helper so
//! the columns and `data` cannot drift apart.
//!
//! A single `Connection` is shared behind a mutex; the UI and the sync
//! engine both go through it, which makes each record write atomic with
//! respect to concurrent readers.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use kadai_types::{EntityFamily, Label, LogEntry, Syncable, Task, TaskLabelLink, Timestamp, UserId};

use crate::checkpoint::CheckpointStore;
use crate::error::StoreError;
use crate::repo::LocalRepository;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,
    needs_sync INTEGER NOT NULL DEFAULT 0,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_dirty ON tasks(user_id, needs_sync);
CREATE INDEX IF NOT EXISTS idx_tasks_updated ON tasks(user_id, updated_at);

CREATE TABLE IF NOT EXISTS labels (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,
    needs_sync INTEGER NOT NULL DEFAULT 0,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_labels_dirty ON labels(user_id, needs_sync);
CREATE INDEX IF NOT EXISTS idx_labels_updated ON labels(user_id, updated_at);

CREATE TABLE IF NOT EXISTS task_label_links (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,
    needs_sync INTEGER NOT NULL DEFAULT 0,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_task_label_links_dirty ON task_label_links(user_id, needs_sync);
CREATE INDEX IF NOT EXISTS idx_task_label_links_updated ON task_label_links(user_id, updated_at);

CREATE TABLE IF NOT EXISTS log_entries (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,
    needs_sync INTEGER NOT NULL DEFAULT 0,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_log_entries_dirty ON log_entries(user_id, needs_sync);
CREATE INDEX IF NOT EXISTS idx_log_entries_updated ON log_entries(user_id, updated_at);

CREATE TABLE IF NOT EXISTS sync_checkpoints (
    user_id TEXT NOT NULL,
    family TEXT NOT NULL,
    last_sync_at TEXT NOT NULL,
    PRIMARY KEY (user_id, family)
);
"#;

// =============================================================================
// Timestamp column helpers
// =============================================================================

/// Fixed-precision RFC 3339 with a `Z` suffix so the TEXT columns sort
/// lexicographically in timestamp order.
fn ts_to_sql(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_from_sql(s: &str, table: &'static str) -> Result<Timestamp, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            table,
            detail: format!("bad timestamp {s:?}: {e}"),
        })
}

// =============================================================================
// Store handle
// =============================================================================

/// Handle to the on-device SQLite database. Cheap to clone; all clones
/// share one connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn tasks(&self) -> SqliteRepo<Task> {
        SqliteRepo::new(self.conn.clone())
    }

    pub fn labels(&self) -> SqliteRepo<Label> {
        SqliteRepo::new(self.conn.clone())
    }

    pub fn links(&self) -> SqliteRepo<TaskLabelLink> {
        SqliteRepo::new(self.conn.clone())
    }

    pub fn log_entries(&self) -> SqliteRepo<LogEntry> {
        SqliteRepo::new(self.conn.clone())
    }

    pub fn checkpoints(&self) -> SqliteCheckpointStore {
        SqliteCheckpointStore {
            conn: self.conn.clone(),
        }
    }
}

// =============================================================================
// Per-family repository
// =============================================================================

/// [`LocalRepository`] over one family's table. The table name comes from
/// the entity's [`EntityFamily`]; everything else is shared.
pub struct SqliteRepo<E: Syncable> {
    conn: Arc<Mutex<Connection>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Syncable> SqliteRepo<E> {
    fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            _entity: PhantomData,
        }
    }

    fn table() -> &'static str {
        E::FAMILY.table()
    }

    fn encode(entity: &E) -> Result<String, StoreError> {
        serde_json::to_string(entity).map_err(|e| StoreError::Corrupt {
            table: Self::table(),
            detail: format!("encode: {e}"),
        })
    }

    fn decode(data: &str) -> Result<E, StoreError> {
        serde_json::from_str(data).map_err(|e| StoreError::Corrupt {
            table: Self::table(),
            detail: format!("decode: {e}"),
        })
    }

    /// Write one record's row inside an already-held connection. Keeps
    /// the mirrored columns and `data` in lockstep.
    fn write_row(conn: &Connection, sql: &str, entity: &E) -> Result<usize, StoreError> {
        let meta = entity.meta();
        let rows = conn.execute(
            sql,
            params![
                entity.id().to_string(),
                meta.user_id.to_string(),
                ts_to_sql(meta.updated_at),
                meta.deleted_at.map(ts_to_sql),
                meta.needs_sync,
                Self::encode(entity)?,
            ],
        )?;
        Ok(rows)
    }

    fn insert_sql() -> String {
        format!(
            "INSERT INTO {} (id, user_id, updated_at, deleted_at, needs_sync, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            Self::table()
        )
    }

    fn update_sql() -> String {
        format!(
            "UPDATE {} SET user_id = ?2, updated_at = ?3, deleted_at = ?4,
                           needs_sync = ?5, data = ?6
             WHERE id = ?1",
            Self::table()
        )
    }

    fn select_many(conn: &Connection, sql: &str, user_id: UserId) -> Result<Vec<E>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for data in rows {
            out.push(Self::decode(&data?)?);
        }
        Ok(out)
    }
}

impl<E: Syncable> LocalRepository<E> for SqliteRepo<E> {
    fn create(&self, entity: &E) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let exists = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE id = ?1", Self::table()),
                params![entity.id().to_string()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Err(StoreError::AlreadyExists(entity.id().to_string()));
        }
        Self::write_row(&conn, &Self::insert_sql(), entity)?;
        Ok(())
    }

    fn fetch_by_id(&self, id: E::Id) -> Result<Option<E>, StoreError> {
        let conn = self.conn.lock();
        let data = conn
            .query_row(
                &format!("SELECT data FROM {} WHERE id = ?1", Self::table()),
                params![id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        data.as_deref().map(Self::decode).transpose()
    }

    fn update(&self, entity: &E) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let rows = Self::write_row(&conn, &Self::update_sql(), entity)?;
        if rows == 0 {
            return Err(StoreError::NotFound(entity.id().to_string()));
        }
        Ok(())
    }

    fn fetch_needing_sync(&self, user_id: UserId) -> Result<Vec<E>, StoreError> {
        let conn = self.conn.lock();
        Self::select_many(
            &conn,
            &format!(
                "SELECT data FROM {} WHERE user_id = ?1 AND needs_sync = 1
                 ORDER BY updated_at ASC",
                Self::table()
            ),
            user_id,
        )
    }

    fn fetch_all(&self, user_id: UserId) -> Result<Vec<E>, StoreError> {
        let conn = self.conn.lock();
        Self::select_many(
            &conn,
            &format!(
                "SELECT data FROM {} WHERE user_id = ?1 AND deleted_at IS NULL
                 ORDER BY updated_at ASC",
                Self::table()
            ),
            user_id,
        )
    }

    fn delete_all(&self, user_id: UserId, now: Timestamp) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        let live = Self::select_many(
            &tx,
            &format!(
                "SELECT data FROM {} WHERE user_id = ?1 AND deleted_at IS NULL",
                Self::table()
            ),
            user_id,
        )?;
        let update_sql = Self::update_sql();
        for mut entity in live {
            entity.meta_mut().tombstone(now);
            Self::write_row(&tx, &update_sql, &entity)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn purge_tombstones(
        &self,
        user_id: UserId,
        older_than: Timestamp,
    ) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let purged = conn.execute(
            // Only pushed tombstones: an unpushed tombstone must survive
            // until the remote has seen it.
            &format!(
                "DELETE FROM {} WHERE user_id = ?1 AND deleted_at IS NOT NULL
                 AND needs_sync = 0 AND deleted_at < ?2",
                Self::table()
            ),
            params![user_id.to_string(), ts_to_sql(older_than)],
        )?;
        if purged > 0 {
            debug!(table = Self::table(), %user_id, purged, "purged tombstones");
        }
        Ok(purged)
    }
}

// =============================================================================
// Checkpoint store
// =============================================================================

/// SQLite-backed [`CheckpointStore`]: one row per `(user, family)`.
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl CheckpointStore for SqliteCheckpointStore {
    fn load(&self, user_id: UserId, family: EntityFamily) -> Result<Option<Timestamp>, StoreError> {
        let conn = self.conn.lock();
        let stored = conn
            .query_row(
                "SELECT last_sync_at FROM sync_checkpoints WHERE user_id = ?1 AND family = ?2",
                params![user_id.to_string(), family.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        stored
            .as_deref()
            .map(|s| ts_from_sql(s, "sync_checkpoints"))
            .transpose()
    }

    fn advance(
        &self,
        user_id: UserId,
        family: EntityFamily,
        to: Timestamp,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        // Clamp inside the upsert: MAX over lexicographically-ordered
        // RFC 3339 text keeps the cursor monotonic even when an older
        // pass finishes late.
        conn.execute(
            "INSERT INTO sync_checkpoints (user_id, family, last_sync_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, family)
             DO UPDATE SET last_sync_at = MAX(last_sync_at, excluded.last_sync_at)",
            params![user_id.to_string(), family.to_string(), ts_to_sql(to)],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kadai_types::Bucket;

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    fn task(user: UserId, title: &str, at: Timestamp) -> Task {
        Task::new(user, title, Bucket::Inbox, at)
    }

    #[test]
    fn test_create_then_fetch_round_trips() {
        let store = SqliteStore::in_memory().expect("open");
        let repo = store.tasks();
        let user = UserId::new();

        let t = task(user, "buy milk", ts(100));
        repo.create(&t).expect("create");

        let loaded = repo.fetch_by_id(t.id).expect("fetch").expect("present");
        assert_eq!(loaded, t);
    }

    #[test]
    fn test_duplicate_create_fails() {
        let store = SqliteStore::in_memory().expect("open");
        let repo = store.tasks();
        let t = task(UserId::new(), "once", ts(100));

        repo.create(&t).expect("create");
        let err = repo.create(&t).expect_err("duplicate id");
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = SqliteStore::in_memory().expect("open");
        let repo = store.tasks();
        let t = task(UserId::new(), "ghost", ts(100));

        let err = repo.update(&t).expect_err("no such row");
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_fetch_by_id_missing_is_none() {
        let store = SqliteStore::in_memory().expect("open");
        let repo = store.tasks();
        assert!(repo.fetch_by_id(kadai_types::TaskId::new()).expect("fetch").is_none());
    }

    #[test]
    fn test_needing_sync_includes_tombstones() {
        let store = SqliteStore::in_memory().expect("open");
        let repo = store.tasks();
        let user = UserId::new();

        let mut deleted = task(user, "deleted", ts(100));
        deleted.sync.tombstone(ts(150));
        let mut clean = task(user, "clean", ts(100));
        clean.sync.needs_sync = false;

        repo.create(&deleted).expect("create");
        repo.create(&clean).expect("create");

        let dirty = repo.fetch_needing_sync(user).expect("fetch");
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].id, deleted.id);
    }

    #[test]
    fn test_fetch_all_hides_tombstones() {
        let store = SqliteStore::in_memory().expect("open");
        let repo = store.tasks();
        let user = UserId::new();

        let live = task(user, "live", ts(100));
        let mut dead = task(user, "dead", ts(100));
        dead.sync.tombstone(ts(150));

        repo.create(&live).expect("create");
        repo.create(&dead).expect("create");

        let all = repo.fetch_all(user).expect("fetch");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, live.id);
    }

    #[test]
    fn test_queries_are_user_scoped() {
        let store = SqliteStore::in_memory().expect("open");
        let repo = store.tasks();
        let (alice, bob) = (UserId::new(), UserId::new());

        repo.create(&task(alice, "hers", ts(100))).expect("create");
        repo.create(&task(bob, "his", ts(100))).expect("create");

        assert_eq!(repo.fetch_all(alice).expect("fetch").len(), 1);
        assert_eq!(repo.fetch_needing_sync(bob).expect("fetch").len(), 1);
    }

    #[test]
    fn test_delete_all_tombstones_and_redirties() {
        let store = SqliteStore::in_memory().expect("open");
        let repo = store.tasks();
        let user = UserId::new();

        let mut synced = task(user, "synced", ts(100));
        synced.sync.needs_sync = false;
        repo.create(&synced).expect("create");

        repo.delete_all(user, ts(500)).expect("wipe");

        assert!(repo.fetch_all(user).expect("fetch").is_empty());
        let dirty = repo.fetch_needing_sync(user).expect("fetch");
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].sync.deleted_at, Some(ts(500)));
    }

    #[test]
    fn test_purge_spares_recent_and_unpushed_tombstones() {
        let store = SqliteStore::in_memory().expect("open");
        let repo = store.tasks();
        let user = UserId::new();

        let mut old_pushed = task(user, "old pushed", ts(10));
        old_pushed.sync.tombstone(ts(100));
        old_pushed.sync.needs_sync = false;

        let mut old_unpushed = task(user, "old unpushed", ts(10));
        old_unpushed.sync.tombstone(ts(100));

        let mut recent = task(user, "recent", ts(10));
        recent.sync.tombstone(ts(900));
        recent.sync.needs_sync = false;

        for t in [&old_pushed, &old_unpushed, &recent] {
            repo.create(t).expect("create");
        }

        let purged = repo.purge_tombstones(user, ts(500)).expect("purge");
        assert_eq!(purged, 1);
        assert!(repo.fetch_by_id(old_pushed.id).expect("fetch").is_none());
        assert!(repo.fetch_by_id(old_unpushed.id).expect("fetch").is_some());
        assert!(repo.fetch_by_id(recent.id).expect("fetch").is_some());
    }

    #[test]
    fn test_checkpoint_clamps_and_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kadai.db");
        let user = UserId::new();

        {
            let store = SqliteStore::open(&path).expect("open");
            let cp = store.checkpoints();
            cp.advance(user, EntityFamily::Labels, ts(300)).expect("advance");
            cp.advance(user, EntityFamily::Labels, ts(200)).expect("advance");
        }

        let store = SqliteStore::open(&path).expect("reopen");
        let cursor = store
            .checkpoints()
            .load(user, EntityFamily::Labels)
            .expect("load");
        assert_eq!(cursor, Some(ts(300)));
    }

    #[test]
    fn test_all_families_share_one_database() {
        let store = SqliteStore::in_memory().expect("open");
        let user = UserId::new();

        let label = Label::new(user, "home", "#336699", ts(100));
        store.labels().create(&label).expect("create label");

        let t = task(user, "tagged", ts(100));
        store.tasks().create(&t).expect("create task");

        let link = TaskLabelLink::new(user, t.id, label.id, ts(100));
        store.links().create(&link).expect("create link");

        let entry = LogEntry::new(user, "stand-up", "notes", ts(50), ts(100));
        store.log_entries().create(&entry).expect("create entry");

        assert_eq!(store.links().fetch_all(user).expect("fetch")[0].label_id, label.id);
        assert_eq!(store.log_entries().fetch_all(user).expect("fetch")[0].occurred_at, ts(50));
    }
}
