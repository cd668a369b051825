use crate::errors::ClientResult;
use crate::queries::Queries;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

/// Storage key holding the JSON array of tasks.
pub const TASKS_KEY: &str = "tasks";
/// Storage key holding the JSON array of pending outbox actions.
pub const ACTION_LOG_KEY: &str = "action_log";

/// Window-scoped durable key-value storage. Values are whole JSON documents;
/// every write replaces the previous value for its key.
pub struct LocalStorage {
    pub pool: SqlitePool,
}

impl LocalStorage {
    pub async fn new(database_url: &str) -> ClientResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> ClientResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Connect and make sure the schema exists.
    pub async fn open(database_url: &str) -> ClientResult<Self> {
        let storage = Self::new(database_url).await?;
        storage.run_migrations().await?;
        tracing::info!("STORAGE: Opened local storage at {}", database_url);
        Ok(storage)
    }

    pub async fn get_raw(&self, key: &str) -> ClientResult<Option<String>> {
        let row = sqlx::query(Queries::GET_VALUE)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    pub async fn put_raw(&self, key: &str, value: &str) -> ClientResult<()> {
        sqlx::query(Queries::PUT_VALUE)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> ClientResult<Option<T>> {
        match self.get_raw(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> ClientResult<()> {
        let raw = serde_json::to_string(value)?;
        tracing::debug!("STORAGE: Writing {} bytes under '{}'", raw.len(), key);
        self.put_raw(key, &raw).await
    }
}
