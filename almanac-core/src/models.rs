use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::Display;
use uuid::Uuid;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Client-generated task identity. Opaque: any string loaded from storage or
/// the remote is accepted, new tasks get a UUID v4.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    pub target_date: NaiveDate,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl Task {
    pub fn new(text: impl Into<String>, target_date: NaiveDate, now: i64) -> Self {
        Self {
            id: TaskId::generate(),
            text: text.into(),
            completed: false,
            target_date,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Advance `updated_at` without ever moving it backwards.
    pub fn touch(&mut self, now: i64) -> i64 {
        self.updated_at = self.updated_at.max(now);
        self.updated_at
    }

    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(text) = &patch.text {
            self.text = text.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
            if !completed {
                self.completed_at = None;
            }
        }
        if let Some(date) = patch.target_date {
            self.target_date = date;
        }
        if patch.completed_at.is_some() {
            self.completed_at = patch.completed_at;
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = self.updated_at.max(updated_at);
        }
    }

    /// Patch that flips completion. Completing an overdue task moves it to
    /// `today` so it shows up in today's list.
    pub fn toggle_patch(&self, today: NaiveDate, now: i64) -> TaskPatch {
        let updated_at = Some(self.updated_at.max(now));
        if self.completed {
            TaskPatch {
                completed: Some(false),
                updated_at,
                ..TaskPatch::default()
            }
        } else {
            TaskPatch {
                completed: Some(true),
                completed_at: Some(now),
                target_date: (self.target_date < today).then_some(today),
                updated_at,
                ..TaskPatch::default()
            }
        }
    }
}

/// Partial field set carried by an Update action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl TaskPatch {
    pub fn text(text: impl Into<String>, now: i64) -> Self {
        Self {
            text: Some(text.into()),
            updated_at: Some(now),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

/// One outbox entry. Serialized as `{"type": "INSERT", "id", "payload", "timestamp"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "INSERT")]
    Create {
        id: TaskId,
        payload: Task,
        timestamp: i64,
    },
    #[serde(rename = "UPDATE")]
    Update {
        id: TaskId,
        payload: TaskPatch,
        timestamp: i64,
    },
    #[serde(rename = "DELETE")]
    Delete { id: TaskId, timestamp: i64 },
}

impl Action {
    pub fn create(task: Task, timestamp: i64) -> Self {
        Action::Create {
            id: task.id.clone(),
            payload: task,
            timestamp,
        }
    }

    pub fn update(id: TaskId, patch: TaskPatch, timestamp: i64) -> Self {
        Action::Update {
            id,
            payload: patch,
            timestamp,
        }
    }

    pub fn delete(id: TaskId, timestamp: i64) -> Self {
        Action::Delete { id, timestamp }
    }

    pub fn id(&self) -> &TaskId {
        match self {
            Action::Create { id, .. } | Action::Update { id, .. } | Action::Delete { id, .. } => id,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Create { .. } => ActionKind::Create,
            Action::Update { .. } => ActionKind::Update,
            Action::Delete { .. } => ActionKind::Delete,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Action::Create { timestamp, .. }
            | Action::Update { timestamp, .. }
            | Action::Delete { timestamp, .. } => *timestamp,
        }
    }

    pub fn key(&self) -> ActionKey {
        ActionKey {
            id: self.id().clone(),
            kind: self.kind(),
            timestamp: self.timestamp(),
        }
    }
}

/// Identity used to remove a confirmed entry. Position in the log is never
/// used since entries may be appended while a drain is running.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub id: TaskId,
    pub kind: ActionKind,
    pub timestamp: i64,
}

impl ActionKey {
    pub fn matches(&self, action: &Action) -> bool {
        action.kind() == self.kind && action.timestamp() == self.timestamp && action.id() == &self.id
    }
}
