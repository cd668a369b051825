//! Outbox drain against the remote store.
//!
//! `drain()` is cheap to call speculatively: it returns immediately while the
//! gate is closed, and only one drain runs at a time. A caller that arrives
//! while a drain is in flight does not wait; it flags one more pass, which the
//! running drain performs before it returns.

use crate::action_log::ActionLog;
use crate::gate::SyncGate;
use crate::remote::RemoteStore;
use almanac_core::errors::RemoteError;
use almanac_core::models::{Action, TaskId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Gate was closed, nothing attempted.
    pub skipped: bool,
    /// Another drain was in flight; it will run one more pass.
    pub deferred: bool,
    pub passes: usize,
    /// Entries removed from the outbox, including semantic no-ops.
    pub confirmed: usize,
    /// Confirmed entries whose remote call failed with an already-applied error.
    pub settled: usize,
    /// Entries left in the outbox after a failure (or behind one for the same task).
    pub retained: usize,
    pub last_error: Option<String>,
}

impl DrainReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }
}

pub struct Dispatcher<R: RemoteStore> {
    remote: Arc<R>,
    log: Arc<Mutex<ActionLog>>,
    gate: SyncGate,
    in_flight: AtomicBool,
    rerun: AtomicBool,
    confirmations: AtomicU64,
}

impl<R: RemoteStore> Dispatcher<R> {
    pub fn new(remote: Arc<R>, log: Arc<Mutex<ActionLog>>, gate: SyncGate) -> Self {
        Self {
            remote,
            log,
            gate,
            in_flight: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            confirmations: AtomicU64::new(0),
        }
    }

    pub fn is_draining(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Monotonic count of outbox entries confirmed so far. Bumped before the
    /// entry leaves the log, so a reader that sees the same value before a
    /// remote fetch and after locking the log knows no entry vanished between.
    pub fn confirmations(&self) -> u64 {
        self.confirmations.load(Ordering::Acquire)
    }

    pub async fn drain(&self) -> DrainReport {
        if !self.gate.is_open() {
            tracing::debug!("DISPATCH: Gate closed, drain skipped");
            return DrainReport::skipped();
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("DISPATCH: Drain in flight, scheduling another pass");
            self.rerun.store(true, Ordering::Release);
            return DrainReport::deferred();
        }

        let mut report = DrainReport::default();
        loop {
            self.rerun.store(false, Ordering::Release);
            self.drain_pass(&mut report).await;
            report.passes += 1;

            if self.rerun.load(Ordering::Acquire) && self.gate.is_open() {
                continue;
            }
            self.in_flight.store(false, Ordering::Release);
            // A rerun flagged between the check above and the release would
            // otherwise be lost.
            if !self.rerun.load(Ordering::Acquire)
                || !self.gate.is_open()
                || self.in_flight.swap(true, Ordering::AcqRel)
            {
                break;
            }
        }

        tracing::info!(
            "DISPATCH: Drain finished: {} confirmed, {} retained in {} pass(es)",
            report.confirmed,
            report.retained,
            report.passes
        );
        report
    }

    async fn drain_pass(&self, report: &mut DrainReport) {
        let snapshot = self.log.lock().await.drainable();
        let mut blocked: HashSet<TaskId> = HashSet::new();

        for action in snapshot {
            if blocked.contains(action.id()) {
                report.retained += 1;
                continue;
            }
            if !self.gate.is_open() {
                tracing::info!("DISPATCH: Gate closed mid-drain, stopping");
                break;
            }

            match self.send(&action).await {
                Ok(()) => {
                    tracing::debug!("DISPATCH: {} {} confirmed", action.kind(), action.id());
                }
                Err(err) if err.settles(action.kind()) => {
                    tracing::debug!(
                        "DISPATCH: {} {} already applied remotely ({})",
                        action.kind(),
                        action.id(),
                        err
                    );
                    report.settled += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        "DISPATCH: {} {} failed, keeping it queued: {}",
                        action.kind(),
                        action.id(),
                        err
                    );
                    report.retained += 1;
                    report.last_error = Some(err.to_string());
                    blocked.insert(action.id().clone());
                    continue;
                }
            }

            report.confirmed += 1;
            self.confirmations.fetch_add(1, Ordering::AcqRel);
            if let Err(e) = self.log.lock().await.remove(&action.key()).await {
                tracing::error!(
                    "DISPATCH: Failed to persist outbox after confirming {}: {}",
                    action.id(),
                    e
                );
            }
        }
    }

    async fn send(&self, action: &Action) -> Result<(), RemoteError> {
        match action {
            Action::Create { payload, .. } => self.remote.insert(payload).await,
            Action::Update { id, payload, .. } => self.remote.update(id, payload).await,
            Action::Delete { id, .. } => self.remote.delete(id).await,
        }
    }
}
