//! Almanac - Offline-first task synchronization for the calendar widget
//!
//! This crate provides a unified API over the Almanac crates.
//!
//! # Example
//!
//! ```ignore
//! use almanac::{Client, LocalStorage, MemoryRemote, SyncGate};
//!
//! let storage = Arc::new(LocalStorage::open("sqlite://almanac.db?mode=rwc").await?);
//! let client = Client::open(storage, Arc::new(MemoryRemote::new()), SyncGate::closed()).await?;
//! client.add_task("Water plants", today).await?;
//! ```

// Re-export client types
pub use almanac_client::{
    Client, ClientConfig, ClientError, ClientResult, EventDispatcher, EventType, ImportSummary,
    LocalStorage, MemoryRemote, RemoteConfig, RemoteStore, RestRemote, SyncCommand, SyncEvent,
    SyncGate,
};

// Re-export core types that external applications may need
pub use almanac_core::errors::{RemoteError, SyncError};
pub use almanac_core::fingerprint::TaskDraft;
pub use almanac_core::models::{Action, Task, TaskId, TaskPatch};
pub use almanac_core::reconcile::MergeReport;
pub use almanac_core::SyncResult;
