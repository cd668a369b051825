use almanac_client::{ChangeNotice, Client, LocalStorage, MemoryRemote, RemoteStore, SyncGate};
use almanac_core::errors::RemoteError;
use almanac_core::models::{Task, TaskId, TaskPatch};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Creates a fresh in-memory storage with migrations applied.
#[allow(dead_code)]
pub async fn setup_storage() -> Arc<LocalStorage> {
    Arc::new(LocalStorage::open("sqlite::memory:").await.unwrap())
}

#[allow(dead_code)]
pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A task with a fixed id and `updated_at`, for building remote snapshots.
#[allow(dead_code)]
pub fn make_task(id: &str, text: &str, updated_at: i64) -> Task {
    Task {
        id: TaskId::from(id),
        text: text.to_string(),
        completed: false,
        target_date: day(2025, 6, 1),
        created_at: updated_at,
        updated_at,
        completed_at: None,
    }
}

/// Client over a shared `MemoryRemote` with the gate open.
#[allow(dead_code)]
pub async fn online_client(remote: MemoryRemote) -> Client<MemoryRemote> {
    let storage = setup_storage().await;
    Client::open(storage, Arc::new(remote), SyncGate::new(true, true))
        .await
        .unwrap()
}

/// Client that starts offline (authenticated, but not connected).
#[allow(dead_code)]
pub async fn offline_client(remote: MemoryRemote) -> Client<MemoryRemote> {
    let storage = setup_storage().await;
    Client::open(storage, Arc::new(remote), SyncGate::new(false, true))
        .await
        .unwrap()
}

/// Wraps a `MemoryRemote`, delaying every write and counting calls, so that
/// overlapping drains can be observed. With a fetch delay, `fetch_all` reads
/// the rows first and returns them only after the delay.
#[derive(Clone)]
#[allow(dead_code)]
pub struct SlowRemote {
    pub inner: MemoryRemote,
    pub delay: Duration,
    pub fetch_delay: Duration,
    pub calls: Arc<AtomicUsize>,
    pub fetches: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl SlowRemote {
    pub fn new(inner: MemoryRemote, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            fetch_delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_fetch_delay(mut self, fetch_delay: Duration) -> Self {
        self.fetch_delay = fetch_delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
    }
}

impl RemoteStore for SlowRemote {
    async fn fetch_all(&self) -> Result<Vec<Task>, RemoteError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let rows = self.inner.fetch_all().await;
        tokio::time::sleep(self.fetch_delay).await;
        rows
    }

    async fn insert(&self, task: &Task) -> Result<(), RemoteError> {
        self.pause().await;
        self.inner.insert(task).await
    }

    async fn update(&self, id: &TaskId, patch: &TaskPatch) -> Result<(), RemoteError> {
        self.pause().await;
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &TaskId) -> Result<(), RemoteError> {
        self.pause().await;
        self.inner.delete(id).await
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<ChangeNotice>, RemoteError> {
        self.inner.subscribe().await
    }
}
