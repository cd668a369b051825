use almanac_core::{reconcile, Action, Task};
use serde_json::json;

fn tasks(value: serde_json::Value) -> Vec<Task> {
    serde_json::from_value(value).unwrap()
}

fn actions(value: serde_json::Value) -> Vec<Action> {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_uncontested_remote_update_is_adopted() {
    let local = tasks(json!([{"id": "1", "text": "A", "targetDate": "2025-01-01", "updatedAt": 100}]));
    let remote = tasks(json!([{"id": "1", "text": "A2", "targetDate": "2025-01-01", "updatedAt": 200}]));

    let result = reconcile(&local, &remote, &[]);

    assert_eq!(result.tasks.len(), 1);
    assert_eq!(result.tasks[0].text, "A2");
    assert_eq!(result.tasks[0].updated_at, 200);
}

#[test]
fn test_racing_edit_survives_stale_snapshot() {
    let local = tasks(json!([{"id": "1", "text": "A-edited", "targetDate": "2025-01-01", "updatedAt": 300}]));
    let pending = actions(json!([
        {"type": "UPDATE", "id": "1", "payload": {"text": "A-edited"}, "timestamp": 300}
    ]));
    let remote = tasks(json!([{"id": "1", "text": "A", "targetDate": "2025-01-01", "updatedAt": 200}]));

    let result = reconcile(&local, &remote, &pending);

    assert_eq!(result.tasks.len(), 1);
    assert_eq!(result.tasks[0].id.as_str(), "1");
    assert_eq!(result.tasks[0].text, "A-edited");
}

#[test]
fn test_deleted_task_is_not_resurrected() {
    let pending = actions(json!([{"type": "DELETE", "id": "2", "timestamp": 60}]));
    let remote = tasks(json!([{"id": "2", "text": "B", "targetDate": "2025-01-01", "updatedAt": 50}]));

    let result = reconcile(&[], &remote, &pending);

    assert!(result.tasks.is_empty());
}

#[test]
fn test_merge_is_deterministic() {
    let local = tasks(json!([
        {"id": "1", "text": "one", "targetDate": "2025-01-01", "updatedAt": 10},
        {"id": "2", "text": "two", "targetDate": "2025-01-02", "updatedAt": 90},
        {"id": "3", "text": "three", "targetDate": "2025-01-03", "updatedAt": 10}
    ]));
    let remote = tasks(json!([
        {"id": "1", "text": "one*", "targetDate": "2025-01-01", "updatedAt": 20},
        {"id": "2", "text": "two*", "targetDate": "2025-01-02", "updatedAt": 20},
        {"id": "4", "text": "four", "targetDate": "2025-01-04", "updatedAt": 20},
        {"id": "5", "text": "five", "targetDate": "2025-01-05", "updatedAt": 20}
    ]));
    let pending = actions(json!([
        {"type": "INSERT", "id": "3", "payload": {"id": "3", "text": "three", "targetDate": "2025-01-03", "updatedAt": 10}, "timestamp": 10},
        {"type": "DELETE", "id": "5", "timestamp": 30}
    ]));

    let first = reconcile(&local, &remote, &pending);
    let second = reconcile(&local, &remote, &pending);

    assert_eq!(first, second);
    let texts: Vec<&str> = first.tasks.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["one*", "two", "three", "four"]);
    assert_eq!(first.report.adopted, 1);
    assert_eq!(first.report.suppressed, 1);
    assert_eq!(first.report.updated_from_remote, 1);
    assert_eq!(first.report.kept_local, 2);
}

#[test]
fn test_merge_against_own_output_is_stable() {
    let local = tasks(json!([{"id": "1", "text": "x", "targetDate": "2025-01-01", "updatedAt": 5}]));
    let remote = tasks(json!([
        {"id": "1", "text": "x", "targetDate": "2025-01-01", "updatedAt": 5},
        {"id": "2", "text": "y", "targetDate": "2025-01-01", "updatedAt": 5}
    ]));

    let once = reconcile(&local, &remote, &[]);
    let twice = reconcile(&once.tasks, &remote, &[]);

    assert_eq!(once.tasks, twice.tasks);
    assert!(!twice.report.changed());
}
