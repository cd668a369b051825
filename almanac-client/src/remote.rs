//! Contract of the hosted record store the engine mirrors to.

use almanac_core::errors::RemoteError;
use almanac_core::models::{Task, TaskId, TaskPatch};
use std::future::Future;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// The subscription reconnected; changes may have been missed meanwhile.
    Resync,
}

/// A push notification that something changed remotely. The row itself is
/// never trusted: receivers re-fetch the full snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotice {
    pub kind: ChangeKind,
    pub task_id: Option<TaskId>,
}

/// Bulk-readable, writable and subscribable remote task store scoped to the
/// current account. Any call may fail with [`RemoteError::Unavailable`].
pub trait RemoteStore: Send + Sync + 'static {
    fn fetch_all(&self) -> impl Future<Output = Result<Vec<Task>, RemoteError>> + Send;

    /// Fails with [`RemoteError::Duplicate`] when the id already exists.
    fn insert(&self, task: &Task) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Fails with [`RemoteError::NotFound`] when the id does not exist.
    fn update(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn delete(&self, id: &TaskId) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn subscribe(
        &self,
    ) -> impl Future<Output = Result<mpsc::Receiver<ChangeNotice>, RemoteError>> + Send;
}
