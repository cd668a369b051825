//! In-process [`RemoteStore`] used by tests and the offline demo mode.

use crate::remote::{ChangeKind, ChangeNotice, RemoteStore};
use almanac_core::errors::RemoteError;
use almanac_core::models::{Task, TaskId, TaskPatch};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Default)]
struct MemoryState {
    rows: Vec<Task>,
    offline: bool,
    injected: VecDeque<RemoteError>,
    writes: usize,
    subscribers: Vec<mpsc::Sender<ChangeNotice>>,
}

impl MemoryState {
    fn notify(&mut self, kind: ChangeKind, task_id: &TaskId) {
        let notice = ChangeNotice {
            kind,
            task_id: Some(task_id.clone()),
        };
        self.subscribers
            .retain(|tx| !matches!(tx.try_send(notice.clone()), Err(mpsc::error::TrySendError::Closed(_))));
    }

    /// Gate every call: offline switch first, then one injected failure.
    fn check(&mut self) -> Result<(), RemoteError> {
        if self.offline {
            return Err(RemoteError::Unavailable("offline".to_string()));
        }
        match self.injected.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let remote = Self::new();
        remote.lock().rows = tasks;
        remote
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Make the next call fail with `err`, whatever it is.
    pub fn fail_next(&self, err: RemoteError) {
        self.lock().injected.push_back(err);
    }

    pub fn rows(&self) -> Vec<Task> {
        self.lock().rows.clone()
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.lock().rows.iter().find(|t| &t.id == id).cloned()
    }

    /// Number of successful writes (insert, update, delete) applied so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Simulate another client writing a row.
    pub fn put_external(&self, task: Task) {
        let mut state = self.lock();
        let kind = match state.rows.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => {
                *existing = task.clone();
                ChangeKind::Update
            }
            None => {
                state.rows.push(task.clone());
                ChangeKind::Insert
            }
        };
        state.notify(kind, &task.id);
    }

    /// Simulate another client deleting a row.
    pub fn remove_external(&self, id: &TaskId) {
        let mut state = self.lock();
        state.rows.retain(|t| &t.id != id);
        state.notify(ChangeKind::Delete, id);
    }
}

impl RemoteStore for MemoryRemote {
    async fn fetch_all(&self) -> Result<Vec<Task>, RemoteError> {
        let mut state = self.lock();
        state.check()?;
        Ok(state.rows.clone())
    }

    async fn insert(&self, task: &Task) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.check()?;
        if state.rows.iter().any(|t| t.id == task.id) {
            return Err(RemoteError::Duplicate(task.id.clone()));
        }
        state.rows.push(task.clone());
        state.writes += 1;
        state.notify(ChangeKind::Insert, &task.id);
        Ok(())
    }

    async fn update(&self, id: &TaskId, patch: &TaskPatch) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.check()?;
        let Some(task) = state.rows.iter_mut().find(|t| &t.id == id) else {
            return Err(RemoteError::NotFound(id.clone()));
        };
        task.apply_patch(patch);
        state.writes += 1;
        state.notify(ChangeKind::Update, id);
        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.check()?;
        let before = state.rows.len();
        state.rows.retain(|t| &t.id != id);
        if state.rows.len() == before {
            return Err(RemoteError::NotFound(id.clone()));
        }
        state.writes += 1;
        state.notify(ChangeKind::Delete, id);
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<ChangeNotice>, RemoteError> {
        let (tx, rx) = mpsc::channel(64);
        let mut state = self.lock();
        state.check()?;
        state.subscribers.push(tx);
        Ok(rx)
    }
}
