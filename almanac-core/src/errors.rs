use crate::models::{ActionKind, TaskId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// Failures reported by a remote task store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("Task {0} already exists remotely")]
    Duplicate(TaskId),

    #[error("Task {0} not found remotely")]
    NotFound(TaskId),

    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    #[error("Remote rejected request: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether this failure means the desired end state already holds for an
    /// action of `kind`, so the outbox entry can be dropped.
    pub fn settles(&self, kind: ActionKind) -> bool {
        matches!(
            (self, kind),
            (RemoteError::Duplicate(_), ActionKind::Create)
                | (RemoteError::NotFound(_), ActionKind::Update)
                | (RemoteError::NotFound(_), ActionKind::Delete)
        )
    }
}
