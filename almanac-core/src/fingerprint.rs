use crate::models::{Task, TaskId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Duplicate-detection key for bulk import: exact text plus target date.
/// Text is compared as stored, without normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub text: String,
    pub target_date: NaiveDate,
}

impl Fingerprint {
    pub fn new(text: &str, target_date: NaiveDate) -> Self {
        Self {
            text: text.to_string(),
            target_date,
        }
    }

    pub fn of(task: &Task) -> Self {
        Self::new(&task.text, task.target_date)
    }
}

/// A row handed over by the import collaborator, before an identity exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub text: String,
    pub target_date: NaiveDate,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportPlan {
    pub accepted: Vec<Task>,
    pub skipped: usize,
}

/// Turn drafts into new tasks, skipping any whose trimmed text and date match
/// a task in `existing` exactly. Rows are only checked against `existing`, so
/// repeats within one batch are all imported. Blank rows are ignored and not
/// counted as duplicates.
pub fn plan_import(existing: &[Task], drafts: Vec<TaskDraft>, now: i64) -> ImportPlan {
    let known: HashSet<Fingerprint> = existing.iter().map(Fingerprint::of).collect();
    let mut plan = ImportPlan::default();

    for draft in drafts {
        let text = draft.text.trim();
        if text.is_empty() {
            continue;
        }
        if known.contains(&Fingerprint::new(text, draft.target_date)) {
            plan.skipped += 1;
            continue;
        }
        let completed_at = if draft.completed { draft.completed_at } else { None };
        plan.accepted.push(Task {
            id: TaskId::generate(),
            text: text.to_string(),
            completed: draft.completed,
            target_date: draft.target_date,
            created_at: draft.created_at.unwrap_or(now),
            updated_at: now,
            completed_at,
        });
    }

    plan
}
