use crate::database::{LocalStorage, TASKS_KEY};
use crate::errors::ClientResult;
use almanac_core::models::{Action, Task, TaskId};
use std::sync::Arc;

/// In-memory task list, the UI's source of truth, written through to local
/// storage on every change.
pub struct TaskStore {
    tasks: Vec<Task>,
    storage: Arc<LocalStorage>,
}

impl TaskStore {
    pub async fn open(storage: Arc<LocalStorage>) -> ClientResult<Self> {
        let tasks: Vec<Task> = storage.get_json(TASKS_KEY).await?.unwrap_or_default();
        tracing::info!("STORE: Loaded {} tasks from local storage", tasks.len());
        Ok(Self { tasks, storage })
    }

    pub fn list(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Apply an action to memory, then persist the whole list.
    ///
    /// Returns whether the list changed. On a storage error the in-memory
    /// state is already updated and stays that way for this session.
    pub async fn apply(&mut self, action: &Action) -> ClientResult<bool> {
        let changed = self.apply_in_memory(action);
        if changed {
            self.persist().await?;
        }
        Ok(changed)
    }

    fn apply_in_memory(&mut self, action: &Action) -> bool {
        match action {
            Action::Create { payload, .. } => {
                match self.tasks.iter_mut().find(|t| t.id == payload.id) {
                    Some(existing) => *existing = payload.clone(),
                    None => self.tasks.push(payload.clone()),
                }
                true
            }
            Action::Update { id, payload, .. } => match self.tasks.iter_mut().find(|t| &t.id == id) {
                Some(task) => {
                    task.apply_patch(payload);
                    true
                }
                None => {
                    tracing::debug!("STORE: Ignoring update for unknown task {}", id);
                    false
                }
            },
            Action::Delete { id, .. } => {
                let before = self.tasks.len();
                self.tasks.retain(|t| &t.id != id);
                self.tasks.len() != before
            }
        }
    }

    /// Swap in a reconciled list and persist it.
    pub async fn replace_all(&mut self, tasks: Vec<Task>) -> ClientResult<()> {
        self.tasks = tasks;
        self.persist().await
    }

    async fn persist(&self) -> ClientResult<()> {
        self.storage.put_json(TASKS_KEY, &self.tasks).await
    }
}
