//! [`RemoteStore`] backed by a PostgREST-style HTTP API (the hosted Supabase
//! table the widget syncs to).

use crate::config::RemoteConfig;
use crate::errors::ClientResult;
use crate::realtime;
use crate::remote::{ChangeNotice, RemoteStore};
use almanac_core::errors::RemoteError;
use almanac_core::models::{Task, TaskId, TaskPatch};
use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::mpsc;

/// Row layout of the remote table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    pub target_date: NaiveDate,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub completed_at: Option<i64>,
}

impl RemoteRow {
    pub fn from_task(task: &Task, user_id: &str) -> Self {
        Self {
            id: task.id.to_string(),
            user_id: Some(user_id.to_string()),
            text: task.text.clone(),
            completed: task.completed,
            target_date: task.target_date,
            created_at: Some(task.created_at),
            updated_at: Some(task.updated_at),
            completed_at: task.completed_at,
        }
    }

    pub fn into_task(self) -> Task {
        Task {
            id: TaskId::from(self.id),
            text: self.text,
            completed: self.completed,
            target_date: self.target_date,
            created_at: self.created_at.unwrap_or_default(),
            updated_at: self.updated_at.unwrap_or_default(),
            completed_at: self.completed_at,
        }
    }
}

/// Column map for a partial update. Un-completing also clears `completed_at`.
pub fn patch_columns(patch: &TaskPatch) -> Map<String, Value> {
    let mut columns = Map::new();
    if let Some(text) = &patch.text {
        columns.insert("text".into(), Value::from(text.clone()));
    }
    if let Some(completed) = patch.completed {
        columns.insert("completed".into(), Value::from(completed));
        if !completed {
            columns.insert("completed_at".into(), Value::Null);
        }
    }
    if let Some(date) = patch.target_date {
        columns.insert("target_date".into(), Value::from(date.format("%Y-%m-%d").to_string()));
    }
    if let Some(completed_at) = patch.completed_at {
        columns.insert("completed_at".into(), Value::from(completed_at));
    }
    if let Some(updated_at) = patch.updated_at {
        columns.insert("updated_at".into(), Value::from(updated_at));
    }
    columns
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    RemoteError::Unavailable(err.to_string())
}

// Postgres unique_violation, reported by PostgREST in the error body.
const UNIQUE_VIOLATION: &str = "23505";

fn error_code(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("code")?.as_str().map(str::to_string)
}

/// Map a non-success status to the error taxonomy.
///
/// Only a unique violation on insert counts as an already-applied Create.
/// A 404 names a missing table or route, never a missing row: row misses are
/// detected from the echoed representation instead.
pub fn status_error(status: StatusCode, body: &str, id: Option<&TaskId>) -> RemoteError {
    match (status, id) {
        (StatusCode::CONFLICT, Some(id))
            if error_code(body).as_deref() == Some(UNIQUE_VIOLATION) =>
        {
            RemoteError::Duplicate(id.clone())
        }
        (s, _) if s.is_server_error()
            || s == StatusCode::REQUEST_TIMEOUT
            || s == StatusCode::TOO_MANY_REQUESTS =>
        {
            RemoteError::Unavailable(format!("{s}: {body}"))
        }
        (s, _) => RemoteError::Rejected(format!("{s}: {body}")),
    }
}

/// Check the rows echoed back with `Prefer: return=representation`; none
/// means the filter matched nothing.
pub fn require_match(body: &str, id: &TaskId) -> Result<(), RemoteError> {
    let rows: Vec<Value> = serde_json::from_str(body)
        .map_err(|e| RemoteError::Rejected(format!("unreadable response: {e}")))?;
    if rows.is_empty() {
        return Err(RemoteError::NotFound(id.clone()));
    }
    Ok(())
}

pub struct RestRemote {
    http: reqwest::Client,
    config: RemoteConfig,
}

impl RestRemote {
    pub fn new(config: RemoteConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.url.trim_end_matches('/'),
            self.config.table
        )
    }

    fn request(&self, method: Method) -> RequestBuilder {
        self.http
            .request(method, self.table_url())
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.config.bearer())
    }

    fn scoped(&self, builder: RequestBuilder, id: &TaskId) -> RequestBuilder {
        builder.query(&[
            ("id", format!("eq.{id}")),
            ("user_id", format!("eq.{}", self.config.user_id)),
        ])
    }

    async fn check(response: Response, id: Option<&TaskId>) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body, id))
    }
}

impl RemoteStore for RestRemote {
    async fn fetch_all(&self) -> Result<Vec<Task>, RemoteError> {
        let response = self
            .request(Method::GET)
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{}", self.config.user_id)),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check(response, None).await?;
        let rows: Vec<RemoteRow> = response
            .json()
            .await
            .map_err(|e| RemoteError::Rejected(format!("unreadable snapshot: {e}")))?;
        tracing::debug!("REMOTE: Fetched {} rows", rows.len());
        Ok(rows.into_iter().map(RemoteRow::into_task).collect())
    }

    async fn insert(&self, task: &Task) -> Result<(), RemoteError> {
        let row = RemoteRow::from_task(task, &self.config.user_id);
        let response = self
            .request(Method::POST)
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response, Some(&task.id)).await?;
        Ok(())
    }

    async fn update(&self, id: &TaskId, patch: &TaskPatch) -> Result<(), RemoteError> {
        let columns = patch_columns(patch);
        let response = self
            .scoped(self.request(Method::PATCH), id)
            .header("Prefer", "return=representation")
            .json(&columns)
            .send()
            .await
            .map_err(transport_error)?;
        let body = Self::check(response, Some(id))
            .await?
            .text()
            .await
            .map_err(transport_error)?;
        require_match(&body, id)
    }

    async fn delete(&self, id: &TaskId) -> Result<(), RemoteError> {
        let response = self
            .scoped(self.request(Method::DELETE), id)
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(transport_error)?;
        let body = Self::check(response, Some(id))
            .await?
            .text()
            .await
            .map_err(transport_error)?;
        require_match(&body, id)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<ChangeNotice>, RemoteError> {
        realtime::subscribe(&self.config).await
    }
}
