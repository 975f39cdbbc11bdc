//! End-to-end sync scenarios across simulated devices.
//!
//! Each "device" is an independent set of local repositories plus its own
//! checkpoint store; all devices share one [`RemoteServer`]. One device
//! runs on SQLite to exercise the persistent path end to end, the others
//! run in memory.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use kadai_remote::RemoteServer;
use kadai_store::{
    CheckpointStore, LocalRepository, MemoryCheckpointStore, MemoryRepo, SqliteStore,
};
use kadai_sync::{FamilyLane, SyncEngine, SyncReport, SyncService};
use kadai_types::{Bucket, Label, LogEntry, Task, TaskLabelLink, Timestamp, UserId};

fn ts(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One simulated install of the app.
struct Device {
    engine: Arc<SyncEngine>,
    tasks: Arc<dyn LocalRepository<Task>>,
    labels: Arc<dyn LocalRepository<Label>>,
    links: Arc<dyn LocalRepository<TaskLabelLink>>,
    entries: Arc<dyn LocalRepository<LogEntry>>,
}

impl Device {
    fn in_memory(server: &Arc<RemoteServer>) -> Self {
        let tasks: Arc<dyn LocalRepository<Task>> = Arc::new(MemoryRepo::new());
        let labels: Arc<dyn LocalRepository<Label>> = Arc::new(MemoryRepo::new());
        let links: Arc<dyn LocalRepository<TaskLabelLink>> = Arc::new(MemoryRepo::new());
        let entries: Arc<dyn LocalRepository<LogEntry>> = Arc::new(MemoryRepo::new());
        Self::wire(
            tasks,
            labels,
            links,
            entries,
            Arc::new(MemoryCheckpointStore::new()),
            server,
        )
    }

    fn on_sqlite(server: &Arc<RemoteServer>) -> Self {
        let store = SqliteStore::in_memory().expect("open sqlite");
        Self::wire(
            Arc::new(store.tasks()),
            Arc::new(store.labels()),
            Arc::new(store.links()),
            Arc::new(store.log_entries()),
            Arc::new(store.checkpoints()),
            server,
        )
    }

    fn wire(
        tasks: Arc<dyn LocalRepository<Task>>,
        labels: Arc<dyn LocalRepository<Label>>,
        links: Arc<dyn LocalRepository<TaskLabelLink>>,
        entries: Arc<dyn LocalRepository<LogEntry>>,
        checkpoints: Arc<dyn CheckpointStore>,
        server: &Arc<RemoteServer>,
    ) -> Self {
        let engine = SyncEngine::new(
            FamilyLane::new(tasks.clone(), server.clone()),
            FamilyLane::new(labels.clone(), server.clone()),
            FamilyLane::new(links.clone(), server.clone()),
            FamilyLane::new(entries.clone(), server.clone()),
            checkpoints,
        );
        Self {
            engine: Arc::new(engine),
            tasks,
            labels,
            links,
            entries,
        }
    }

    async fn sync(&self, user: UserId) -> SyncReport {
        self.engine.sync_user(user, &CancellationToken::new()).await
    }
}

#[tokio::test]
async fn test_two_devices_converge_on_an_edit() {
    init_tracing();
    let server = Arc::new(RemoteServer::new());
    let phone = Device::in_memory(&server);
    let laptop = Device::on_sqlite(&server);
    let user = UserId::new();

    // Phone creates a task and syncs it up.
    let task = Task::new(user, "pack bags", Bucket::Today, ts(100));
    phone.tasks.create(&task).expect("create");
    assert!(phone.sync(user).await.fully_succeeded());

    // Laptop pulls it.
    assert!(laptop.sync(user).await.fully_succeeded());
    let mut on_laptop = laptop
        .tasks
        .fetch_by_id(task.id)
        .expect("fetch")
        .expect("pulled");
    assert_eq!(on_laptop.title, "pack bags");

    // Laptop edits and syncs; phone picks the edit up.
    on_laptop.set_title("pack bags tonight", Utc::now());
    laptop.tasks.update(&on_laptop).expect("update");
    assert!(laptop.sync(user).await.fully_succeeded());
    assert!(phone.sync(user).await.fully_succeeded());

    let on_phone = phone
        .tasks
        .fetch_by_id(task.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(on_phone.title, "pack bags tonight");
    assert!(!on_phone.sync.needs_sync);
}

#[tokio::test]
async fn test_tombstone_propagates_to_second_device() {
    let server = Arc::new(RemoteServer::new());
    let phone = Device::in_memory(&server);
    let laptop = Device::on_sqlite(&server);
    let user = UserId::new();

    let task = Task::new(user, "ephemeral", Bucket::Inbox, ts(100));
    phone.tasks.create(&task).expect("create");
    phone.sync(user).await;
    laptop.sync(user).await;
    assert_eq!(laptop.tasks.fetch_all(user).expect("fetch").len(), 1);

    // Delete on the phone; the tombstone must reach the laptop.
    let mut doomed = phone
        .tasks
        .fetch_by_id(task.id)
        .expect("fetch")
        .expect("present");
    doomed.sync.tombstone(Utc::now());
    phone.tasks.update(&doomed).expect("update");
    phone.sync(user).await;
    laptop.sync(user).await;

    assert!(laptop.tasks.fetch_all(user).expect("fetch").is_empty());
    let row = laptop
        .tasks
        .fetch_by_id(task.id)
        .expect("fetch")
        .expect("tombstone retained");
    assert!(row.sync.deleted_at.is_some());
}

#[tokio::test]
async fn test_all_families_travel_together() {
    let server = Arc::new(RemoteServer::new());
    let phone = Device::in_memory(&server);
    let laptop = Device::on_sqlite(&server);
    let user = UserId::new();
    let now = ts(100);

    let task = Task::new(user, "tag me", Bucket::Inbox, now);
    let label = Label::new(user, "errand", "#e8a13f", now);
    let link = TaskLabelLink::new(user, task.id, label.id, now);
    let entry = LogEntry::new(user, "friday review", "shipped the sync engine", ts(50), now);

    phone.tasks.create(&task).expect("create task");
    phone.labels.create(&label).expect("create label");
    phone.links.create(&link).expect("create link");
    phone.entries.create(&entry).expect("create entry");

    assert!(phone.sync(user).await.fully_succeeded());
    assert!(laptop.sync(user).await.fully_succeeded());

    assert_eq!(laptop.tasks.fetch_all(user).expect("fetch").len(), 1);
    assert_eq!(laptop.labels.fetch_all(user).expect("fetch")[0].name, "errand");
    let pulled_link = &laptop.links.fetch_all(user).expect("fetch")[0];
    assert_eq!(pulled_link.task_id, task.id);
    assert_eq!(pulled_link.label_id, label.id);
    assert_eq!(
        laptop.entries.fetch_all(user).expect("fetch")[0].occurred_at,
        ts(50)
    );
}

#[tokio::test]
async fn test_second_sync_applies_nothing_new() {
    let server = Arc::new(RemoteServer::new());
    let phone = Device::in_memory(&server);
    let user = UserId::new();

    phone
        .tasks
        .create(&Task::new(user, "steady state", Bucket::Inbox, ts(100)))
        .expect("create");
    phone.sync(user).await;

    let report = phone.sync(user).await;
    assert!(report.fully_succeeded());
    for family in &report.families {
        assert_eq!(family.push.pushed, 0, "nothing left to push");
        assert_eq!(family.pull.applied, 0, "nothing new to apply");
    }
}

#[tokio::test]
async fn test_offline_edits_on_both_devices_resolve_lww() {
    let server = Arc::new(RemoteServer::new());
    let phone = Device::in_memory(&server);
    let laptop = Device::on_sqlite(&server);
    let user = UserId::new();

    let task = Task::new(user, "draft", Bucket::Inbox, ts(100));
    phone.tasks.create(&task).expect("create");
    phone.sync(user).await;
    laptop.sync(user).await;

    // Both edit offline; the laptop pushes first, then the phone. The
    // phone's push gets the later server stamp, so it must win
    // everywhere.
    let mut on_laptop = laptop.tasks.fetch_by_id(task.id).expect("fetch").expect("present");
    on_laptop.set_title("laptop edit", Utc::now());
    laptop.tasks.update(&on_laptop).expect("update");

    let mut on_phone = phone.tasks.fetch_by_id(task.id).expect("fetch").expect("present");
    on_phone.set_title("phone edit", Utc::now());
    phone.tasks.update(&on_phone).expect("update");

    laptop.sync(user).await;
    phone.sync(user).await;
    laptop.sync(user).await;

    let final_laptop = laptop.tasks.fetch_by_id(task.id).expect("fetch").expect("present");
    let final_phone = phone.tasks.fetch_by_id(task.id).expect("fetch").expect("present");
    assert_eq!(final_laptop.title, "phone edit");
    assert_eq!(final_phone.title, "phone edit");
    assert_eq!(final_laptop.sync.updated_at, final_phone.sync.updated_at);
}

#[tokio::test]
async fn test_realtime_hint_triggers_pull_on_second_device() {
    init_tracing();
    let server = Arc::new(RemoteServer::new());
    let phone = Device::in_memory(&server);
    let laptop = Device::in_memory(&server);
    let user = UserId::new();

    let laptop_service = Arc::new(SyncService::new(laptop.engine.clone()));
    laptop_service.attach_realtime(server.subscribe(), user);

    // Phone pushes; the server's change event should wake the laptop.
    let task = Task::new(user, "instant", Bucket::Inbox, ts(100));
    phone.tasks.create(&task).expect("create");
    phone.sync(user).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if laptop
            .tasks
            .fetch_by_id(task.id)
            .expect("fetch")
            .is_some()
        {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "realtime hint never produced a pull"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    laptop_service.shutdown().await;
}

#[tokio::test]
async fn test_account_wipe_propagates() {
    let server = Arc::new(RemoteServer::new());
    let phone = Device::in_memory(&server);
    let laptop = Device::in_memory(&server);
    let user = UserId::new();

    for title in ["one", "two", "three"] {
        phone
            .tasks
            .create(&Task::new(user, title, Bucket::Inbox, ts(100)))
            .expect("create");
    }
    phone.sync(user).await;
    laptop.sync(user).await;
    assert_eq!(laptop.tasks.fetch_all(user).expect("fetch").len(), 3);

    // Account-level wipe is a bulk soft-delete: it syncs like any edit.
    phone.tasks.delete_all(user, Utc::now()).expect("wipe");
    phone.sync(user).await;
    laptop.sync(user).await;

    assert!(phone.tasks.fetch_all(user).expect("fetch").is_empty());
    assert!(laptop.tasks.fetch_all(user).expect("fetch").is_empty());
}
