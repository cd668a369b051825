pub mod agenda;
pub mod errors;
pub mod fingerprint;
pub mod models;
pub mod reconcile;

pub use errors::{RemoteError, SyncError};
pub use models::{Action, ActionKey, ActionKind, Task, TaskId, TaskPatch};
pub use reconcile::{reconcile, MergeReport, Reconciliation};

pub type SyncResult<T> = Result<T, SyncError>;
