pub mod action_log;
pub mod client;
pub mod config;
pub mod database;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod gate;
pub mod memory;
pub mod queries;
pub mod realtime;
pub mod remote;
pub mod rest;
pub mod task_store;

pub use client::{forward_notices, Client, ImportSummary, SyncCommand};
pub use config::{ClientConfig, RemoteConfig};
pub use database::LocalStorage;
pub use dispatcher::{Dispatcher, DrainReport};
pub use errors::{ClientError, ClientResult};
pub use events::{EventDispatcher, EventType, SyncEvent};
pub use gate::SyncGate;
pub use memory::MemoryRemote;
pub use remote::{ChangeKind, ChangeNotice, RemoteStore};
pub use rest::RestRemote;
