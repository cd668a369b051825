//! Read-side views over the task list used by the calendar grid, the history
//! archive and the search box.

use crate::models::Task;
use chrono::NaiveDate;

/// Tasks to show in the cell for `date`.
///
/// Completed tasks appear on their target date only. Incomplete tasks carry
/// over: today's cell lists everything still open with a target on or before
/// today, future cells list their own open tasks, past cells list none.
pub fn tasks_for_date<'a>(tasks: &'a [Task], date: NaiveDate, today: NaiveDate) -> Vec<&'a Task> {
    let mut shown: Vec<&Task> = tasks
        .iter()
        .filter(|task| {
            if task.completed {
                task.target_date == date
            } else if date == today {
                task.target_date <= date
            } else if date > today {
                task.target_date == date
            } else {
                false
            }
        })
        .collect();
    shown.sort_by_key(|task| task.completed);
    shown
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthGroup<'a> {
    /// `YYYY-MM`
    pub month: String,
    pub tasks: Vec<&'a Task>,
}

/// Completed tasks grouped by month of their target date, newest month first.
pub fn completed_history(tasks: &[Task]) -> Vec<MonthGroup<'_>> {
    let mut completed: Vec<&Task> = tasks.iter().filter(|t| t.completed).collect();
    completed.sort_by(|a, b| b.target_date.cmp(&a.target_date));

    let mut groups: Vec<MonthGroup<'_>> = Vec::new();
    for task in completed {
        let month = task.target_date.format("%Y-%m").to_string();
        match groups.last_mut() {
            Some(group) if group.month == month => group.tasks.push(task),
            _ => groups.push(MonthGroup {
                month,
                tasks: vec![task],
            }),
        }
    }
    groups
}

/// Case-insensitive substring search on task text, newest target date first.
/// A blank query matches nothing; otherwise the query is matched as typed,
/// surrounding spaces included.
pub fn search<'a>(tasks: &'a [Task], query: &str) -> Vec<&'a Task> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let needle = query.to_lowercase();
    let mut hits: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.text.to_lowercase().contains(&needle))
        .collect();
    hits.sort_by(|a, b| b.target_date.cmp(&a.target_date));
    hits
}
