use crate::database::{LocalStorage, ACTION_LOG_KEY};
use crate::errors::ClientResult;
use almanac_core::models::{Action, ActionKey};
use std::sync::Arc;

/// Durable, ordered outbox of mutations not yet confirmed by the remote.
///
/// Entries are only ever appended at the tail or removed by [`ActionKey`];
/// they are never reordered.
pub struct ActionLog {
    entries: Vec<Action>,
    storage: Arc<LocalStorage>,
}

impl ActionLog {
    pub async fn open(storage: Arc<LocalStorage>) -> ClientResult<Self> {
        let entries: Vec<Action> = storage.get_json(ACTION_LOG_KEY).await?.unwrap_or_default();
        if !entries.is_empty() {
            tracing::info!("OUTBOX: Restored {} pending actions", entries.len());
        }
        Ok(Self { entries, storage })
    }

    pub async fn append(&mut self, action: Action) -> ClientResult<()> {
        tracing::debug!(
            "OUTBOX: Queued {} for {} (ts {})",
            action.kind(),
            action.id(),
            action.timestamp()
        );
        self.entries.push(action);
        self.persist().await
    }

    /// Remove the first entry matching `key`. Returns whether one was found.
    pub async fn remove(&mut self, key: &ActionKey) -> ClientResult<bool> {
        let Some(position) = self.entries.iter().position(|a| key.matches(a)) else {
            return Ok(false);
        };
        self.entries.remove(position);
        self.persist().await?;
        Ok(true)
    }

    /// Snapshot to iterate while new entries keep being appended.
    pub fn drainable(&self) -> Vec<Action> {
        self.entries.clone()
    }

    pub fn entries(&self) -> &[Action] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn persist(&self) -> ClientResult<()> {
        self.storage.put_json(ACTION_LOG_KEY, &self.entries).await
    }
}
