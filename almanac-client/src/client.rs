use crate::action_log::ActionLog;
use crate::database::LocalStorage;
use crate::dispatcher::{Dispatcher, DrainReport};
use crate::errors::ClientResult;
use crate::events::{EventDispatcher, SyncEvent};
use crate::gate::SyncGate;
use crate::remote::{ChangeNotice, RemoteStore};
use crate::task_store::TaskStore;
use almanac_core::agenda;
use almanac_core::errors::SyncError;
use almanac_core::fingerprint::{plan_import, TaskDraft};
use almanac_core::models::{now_millis, Action, Task, TaskId, TaskPatch};
use almanac_core::reconcile::{reconcile, MergeReport};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

// A snapshot fetched while the drain confirmed entries is merged again from a
// fresh fetch, at most this many times per reconcile.
const RECONCILE_ATTEMPTS: usize = 3;

/// Messages driving the background sync loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    Drain,
    RemoteChanged,
    ConnectivityChanged { online: bool },
    AuthChanged { authenticated: bool },
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

pub struct Client<R: RemoteStore> {
    store: Arc<Mutex<TaskStore>>,
    log: Arc<Mutex<ActionLog>>,
    remote: Arc<R>,
    dispatcher: Arc<Dispatcher<R>>,
    gate: SyncGate,
    event_dispatcher: Arc<EventDispatcher>,
}

impl<R: RemoteStore> Client<R> {
    pub async fn open(storage: Arc<LocalStorage>, remote: Arc<R>, gate: SyncGate) -> ClientResult<Self> {
        let store = Arc::new(Mutex::new(TaskStore::open(storage.clone()).await?));
        let log = Arc::new(Mutex::new(ActionLog::open(storage).await?));
        let dispatcher = Arc::new(Dispatcher::new(remote.clone(), log.clone(), gate.clone()));

        Ok(Self {
            store,
            log,
            remote,
            dispatcher,
            gate,
            event_dispatcher: Arc::new(EventDispatcher::new()),
        })
    }

    pub fn event_dispatcher(&self) -> Arc<EventDispatcher> {
        self.event_dispatcher.clone()
    }

    pub fn gate(&self) -> &SyncGate {
        &self.gate
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub async fn list(&self) -> Vec<Task> {
        self.store.lock().await.list().to_vec()
    }

    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.store.lock().await.get(id).cloned()
    }

    /// Tasks shown for `date`; incomplete overdue tasks carry over to `today`.
    pub async fn tasks_for_date(&self, date: NaiveDate, today: NaiveDate) -> Vec<Task> {
        let store = self.store.lock().await;
        agenda::tasks_for_date(store.list(), date, today)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Completed tasks grouped by `YYYY-MM`, newest month first.
    pub async fn history(&self) -> Vec<(String, Vec<Task>)> {
        let store = self.store.lock().await;
        agenda::completed_history(store.list())
            .into_iter()
            .map(|group| (group.month, group.tasks.into_iter().cloned().collect()))
            .collect()
    }

    pub async fn search(&self, query: &str) -> Vec<Task> {
        let store = self.store.lock().await;
        agenda::search(store.list(), query).into_iter().cloned().collect()
    }

    pub async fn pending_actions(&self) -> Vec<Action> {
        self.log.lock().await.entries().to_vec()
    }

    pub async fn add_task(&self, text: &str, target_date: NaiveDate) -> ClientResult<Task> {
        let text = non_blank(text)?;
        let now = now_millis();
        let task = Task::new(text, target_date, now);

        let store = self.store.lock().await;
        self.commit(store, Action::create(task.clone(), now)).await;

        tracing::info!("CLIENT: Created task {}", task.id);
        self.event_dispatcher.emit_task_created(&task.id, &task.text);
        self.drain().await;
        Ok(task)
    }

    /// Flip completion. Completing an overdue task also moves it to `today`.
    pub async fn toggle_task(&self, id: &TaskId, today: NaiveDate) -> ClientResult<Task> {
        let now = now_millis();
        let store = self.store.lock().await;
        let task = store
            .get(id)
            .ok_or_else(|| SyncError::TaskNotFound(id.clone()))?;
        let patch = task.toggle_patch(today, now);
        let updated = self.commit_update(store, id, patch, now).await?;

        self.event_dispatcher.emit_task_updated(id, &updated.text);
        self.drain().await;
        Ok(updated)
    }

    pub async fn edit_task(&self, id: &TaskId, text: &str) -> ClientResult<Task> {
        let text = non_blank(text)?;
        let now = now_millis();
        let store = self.store.lock().await;
        let task = store
            .get(id)
            .ok_or_else(|| SyncError::TaskNotFound(id.clone()))?;
        let patch = TaskPatch::text(text, task.updated_at.max(now));
        let updated = self.commit_update(store, id, patch, now).await?;

        self.event_dispatcher.emit_task_updated(id, &updated.text);
        self.drain().await;
        Ok(updated)
    }

    pub async fn delete_task(&self, id: &TaskId) -> ClientResult<()> {
        let store = self.store.lock().await;
        if store.get(id).is_none() {
            return Err(SyncError::TaskNotFound(id.clone()).into());
        }
        self.commit(store, Action::delete(id.clone(), now_millis())).await;

        tracing::info!("CLIENT: Deleted task {}", id);
        self.event_dispatcher.emit_task_deleted(id);
        self.drain().await;
        Ok(())
    }

    /// Add drafts that are not already present by fingerprint (text + date).
    pub async fn import_tasks(&self, drafts: Vec<TaskDraft>) -> ClientResult<ImportSummary> {
        let now = now_millis();
        let mut store = self.store.lock().await;
        let plan = plan_import(store.list(), drafts, now);
        let summary = ImportSummary {
            imported: plan.accepted.len(),
            skipped: plan.skipped,
        };

        if !plan.accepted.is_empty() {
            let mut log = self.log.lock().await;
            for task in plan.accepted {
                let action = Action::create(task, now);
                if let Err(e) = store.apply(&action).await {
                    tracing::error!("CLIENT: Failed to persist imported task {}: {}", action.id(), e);
                }
                if let Err(e) = log.append(action).await {
                    tracing::error!("CLIENT: Failed to persist outbox during import: {}", e);
                }
            }
        }
        drop(store);

        tracing::info!(
            "CLIENT: Imported {} tasks, skipped {} duplicates",
            summary.imported,
            summary.skipped
        );
        self.event_dispatcher.emit(SyncEvent::ImportCompleted {
            imported: summary.imported,
            skipped: summary.skipped,
        });
        if summary.imported > 0 {
            self.drain().await;
        }
        Ok(summary)
    }

    /// Apply to the store, then queue in the outbox, under both locks.
    async fn commit(&self, mut store: MutexGuard<'_, TaskStore>, action: Action) {
        if let Err(e) = store.apply(&action).await {
            tracing::error!("CLIENT: Failed to persist task {}: {}", action.id(), e);
        }
        if let Err(e) = self.log.lock().await.append(action).await {
            tracing::error!("CLIENT: Failed to persist outbox: {}", e);
        }
    }

    async fn commit_update(
        &self,
        mut store: MutexGuard<'_, TaskStore>,
        id: &TaskId,
        patch: TaskPatch,
        now: i64,
    ) -> ClientResult<Task> {
        let action = Action::update(id.clone(), patch, now);
        if let Err(e) = store.apply(&action).await {
            tracing::error!("CLIENT: Failed to persist task {}: {}", id, e);
        }
        let updated = store.get(id).cloned();
        if let Err(e) = self.log.lock().await.append(action).await {
            tracing::error!("CLIENT: Failed to persist outbox: {}", e);
        }
        drop(store);

        tracing::info!("CLIENT: Updated task {}", id);
        updated.ok_or_else(|| SyncError::TaskNotFound(id.clone()).into())
    }

    /// Push pending outbox entries. Never fails; remote trouble stays queued.
    pub async fn drain(&self) -> DrainReport {
        let report = self.dispatcher.drain().await;
        if let Some(message) = &report.last_error {
            self.event_dispatcher.emit_sync_error(message);
        }
        report
    }

    /// Fetch the remote snapshot and merge it into the store.
    ///
    /// Returns `None` when the gate is closed or the fetch failed.
    pub async fn reconcile(&self) -> Option<MergeReport> {
        if !self.gate.is_open() {
            tracing::debug!("CLIENT: Gate closed, reconcile skipped");
            return None;
        }
        self.event_dispatcher.emit(SyncEvent::SyncStarted);

        for attempt in 1..=RECONCILE_ATTEMPTS {
            let seen = self.dispatcher.confirmations();
            let snapshot = match self.remote.fetch_all().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!("CLIENT: Reconcile fetch failed: {}", e);
                    self.event_dispatcher.emit_sync_error(&e.to_string());
                    return None;
                }
            };

            let store = self.store.lock().await;
            let log = self.log.lock().await;
            if self.dispatcher.confirmations() != seen {
                tracing::debug!(
                    "CLIENT: Outbox confirmed entries during fetch, refetching (attempt {})",
                    attempt
                );
                continue;
            }
            return Some(self.merge_locked(store, log, &snapshot).await);
        }

        tracing::info!("CLIENT: Reconcile deferred, drain kept racing the fetch");
        None
    }

    /// Merge an already fetched snapshot against the current store and outbox.
    pub async fn reconcile_snapshot(&self, snapshot: &[Task]) -> MergeReport {
        let store = self.store.lock().await;
        let log = self.log.lock().await;
        self.merge_locked(store, log, snapshot).await
    }

    async fn merge_locked(
        &self,
        mut store: MutexGuard<'_, TaskStore>,
        log: MutexGuard<'_, ActionLog>,
        snapshot: &[Task],
    ) -> MergeReport {
        let merged = reconcile(store.list(), snapshot, log.entries());
        drop(log);

        let report = merged.report;
        if report.changed() {
            if let Err(e) = store.replace_all(merged.tasks).await {
                tracing::error!("CLIENT: Failed to persist reconciled tasks: {}", e);
            }
        }
        let task_count = store.len();
        drop(store);

        tracing::info!(
            "CLIENT: Reconciled {} tasks ({} adopted, {} from remote, {} dropped)",
            task_count,
            report.adopted,
            report.updated_from_remote,
            report.dropped
        );
        self.event_dispatcher
            .emit(SyncEvent::SyncCompleted { task_count });
        report
    }

    /// Record connectivity. Coming online drains the outbox, then reconciles.
    pub async fn set_online(&self, online: bool) {
        let was_online = self.gate.set_online(online);
        if online == was_online {
            return;
        }
        if online {
            tracing::info!("CLIENT: Connection restored");
            self.event_dispatcher.emit(SyncEvent::ConnectionRestored);
            self.catch_up().await;
        } else {
            tracing::info!("CLIENT: Connection lost, working offline");
            self.event_dispatcher.emit(SyncEvent::ConnectionLost);
        }
    }

    pub async fn set_authenticated(&self, authenticated: bool) {
        let was_authenticated = self.gate.set_authenticated(authenticated);
        if authenticated && !was_authenticated {
            tracing::info!("CLIENT: Session authenticated");
            self.catch_up().await;
        } else if !authenticated && was_authenticated {
            tracing::info!("CLIENT: Session ended, sync paused");
        }
    }

    async fn catch_up(&self) {
        if self.gate.is_open() {
            self.drain().await;
            self.reconcile().await;
        }
    }

    /// Process one loop command. Returns `false` once the loop should stop.
    pub async fn handle(&self, command: SyncCommand) -> bool {
        tracing::debug!("CLIENT: Handling {:?}", command);
        match command {
            SyncCommand::Drain => {
                self.drain().await;
            }
            // Retained entries ride along with every remote change
            SyncCommand::RemoteChanged => self.catch_up().await,
            SyncCommand::ConnectivityChanged { online } => self.set_online(online).await,
            SyncCommand::AuthChanged { authenticated } => {
                self.set_authenticated(authenticated).await
            }
            SyncCommand::Shutdown => return false,
        }
        true
    }

    /// Run commands sequentially until `Shutdown` or every sender is gone.
    pub async fn run(&self, mut commands: mpsc::Receiver<SyncCommand>) {
        tracing::info!("CLIENT: Sync loop started");
        while let Some(command) = commands.recv().await {
            if !self.handle(command).await {
                break;
            }
        }
        tracing::info!("CLIENT: Sync loop stopped");
    }

    /// Subscribe to remote changes and feed them into `commands`.
    pub async fn connect_realtime(
        &self,
        commands: mpsc::Sender<SyncCommand>,
    ) -> ClientResult<JoinHandle<()>> {
        let notices = self.remote.subscribe().await.map_err(SyncError::from)?;
        Ok(forward_notices(notices, commands))
    }
}

/// Turn change notices into `RemoteChanged` commands until either side closes.
pub fn forward_notices(
    mut notices: mpsc::Receiver<ChangeNotice>,
    commands: mpsc::Sender<SyncCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            tracing::debug!("CLIENT: Remote change {:?} {:?}", notice.kind, notice.task_id);
            if commands.send(SyncCommand::RemoteChanged).await.is_err() {
                return;
            }
        }
        tracing::warn!("CLIENT: Change notices ended");
    })
}

fn non_blank(text: &str) -> Result<&str, SyncError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SyncError::InvalidOperation("task text must not be blank".into()));
    }
    Ok(text)
}
