//! Merge of a remote bulk snapshot into the local task list.
//!
//! The outbox decides which local records must not be overwritten: an identity
//! with any pending action belongs to the local side until the dispatcher has
//! confirmed it. Everything else is last-write-wins on `updated_at`, with ties
//! going to the remote copy.
//!
//! [`reconcile`] is a pure function of its three inputs so that a merge can be
//! replayed in tests without a transport.

use crate::models::{Action, ActionKind, Task, TaskId};
use std::collections::{HashMap, HashSet};

/// Per-identity summary of pending outbox entries.
#[derive(Debug, Default, Clone, Copy)]
struct Pending {
    create: bool,
    delete: bool,
    any: bool,
}

fn index_pending(actions: &[Action]) -> HashMap<&TaskId, Pending> {
    let mut index: HashMap<&TaskId, Pending> = HashMap::new();
    for action in actions {
        let entry = index.entry(action.id()).or_default();
        entry.any = true;
        match action.kind() {
            ActionKind::Create => entry.create = true,
            ActionKind::Delete => entry.delete = true,
            ActionKind::Update => {}
        }
    }
    index
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Remote-only records taken into the local list.
    pub adopted: usize,
    /// Records present on both sides where the remote copy won.
    pub updated_from_remote: usize,
    /// Records kept as-is locally (pending edits, newer local copy, unsent creates).
    pub kept_local: usize,
    /// Local records removed because the remote no longer has them.
    pub dropped: usize,
    /// Remote records ignored because a local delete is still pending.
    pub suppressed: usize,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.adopted + self.updated_from_remote + self.dropped > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub tasks: Vec<Task>,
    pub report: MergeReport,
}

/// Newer `updated_at` wins; ties favor the remote copy.
pub fn newer<'a>(local: &'a Task, remote: &'a Task) -> &'a Task {
    if local.updated_at > remote.updated_at {
        local
    } else {
        remote
    }
}

/// Produce the new local task list from the current local list, a full remote
/// snapshot and the pending outbox at call time.
///
/// Output order: surviving local records in local order, followed by adopted
/// remote-only records in snapshot order.
pub fn reconcile(local: &[Task], remote: &[Task], pending: &[Action]) -> Reconciliation {
    let pending = index_pending(pending);
    // Duplicate ids in the snapshot: the first row wins everywhere
    let mut remote_by_id: HashMap<&TaskId, &Task> = HashMap::with_capacity(remote.len());
    for remote_task in remote {
        remote_by_id.entry(&remote_task.id).or_insert(remote_task);
    }
    let mut report = MergeReport::default();
    let mut tasks = Vec::with_capacity(local.len().max(remote.len()));

    for local_task in local {
        let flags = pending.get(&local_task.id).copied().unwrap_or_default();
        match remote_by_id.get(&local_task.id) {
            Some(remote_task) => {
                if flags.any {
                    report.kept_local += 1;
                    tasks.push(local_task.clone());
                    continue;
                }
                let winner = newer(local_task, remote_task);
                if std::ptr::eq(winner, local_task) || winner == local_task {
                    report.kept_local += 1;
                } else {
                    report.updated_from_remote += 1;
                }
                tasks.push(winner.clone());
            }
            None if flags.create => {
                report.kept_local += 1;
                tasks.push(local_task.clone());
            }
            None => {
                tracing::debug!("Dropping {} absent from remote snapshot", local_task.id);
                report.dropped += 1;
            }
        }
    }

    let local_ids: HashSet<&TaskId> = local.iter().map(|t| &t.id).collect();
    let mut seen: HashSet<&TaskId> = HashSet::new();
    for remote_task in remote {
        if local_ids.contains(&remote_task.id) || !seen.insert(&remote_task.id) {
            continue;
        }
        let flags = pending.get(&remote_task.id).copied().unwrap_or_default();
        if flags.delete {
            tracing::debug!(
                "Suppressing {}: local delete still pending",
                remote_task.id
            );
            report.suppressed += 1;
            continue;
        }
        report.adopted += 1;
        tasks.push(remote_task.clone());
    }

    Reconciliation { tasks, report }
}
