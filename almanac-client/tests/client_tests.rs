mod common;

use almanac_client::{
    Client, ClientError, EventType, LocalStorage, MemoryRemote, SyncCommand, SyncEvent, SyncGate,
};
use almanac_core::errors::SyncError;
use almanac_core::fingerprint::TaskDraft;
use almanac_core::models::{ActionKind, TaskId};
use common::{day, make_task, offline_client, online_client, setup_storage, SlowRemote};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_add_task_reaches_remote_when_online() {
    let remote = MemoryRemote::new();
    let client = online_client(remote.clone()).await;

    let task = client.add_task("  Buy milk ", day(2025, 6, 2)).await.unwrap();

    assert_eq!(task.text, "Buy milk");
    assert_eq!(remote.rows(), vec![task.clone()]);
    assert!(client.pending_actions().await.is_empty());
    assert_eq!(client.list().await, vec![task]);
}

#[tokio::test]
async fn test_offline_changes_are_pushed_on_reconnect() {
    let remote = MemoryRemote::new();
    let client = offline_client(remote.clone()).await;

    let task = client.add_task("Draft", day(2025, 6, 2)).await.unwrap();
    client.edit_task(&task.id, "Final").await.unwrap();

    let pending = client.pending_actions().await;
    assert_eq!(
        pending.iter().map(|a| a.kind()).collect::<Vec<_>>(),
        vec![ActionKind::Create, ActionKind::Update]
    );
    assert!(remote.rows().is_empty());

    client.set_online(true).await;

    assert!(client.pending_actions().await.is_empty());
    assert_eq!(remote.get(&task.id).unwrap().text, "Final");
    let local = client.list().await;
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].text, "Final");
}

#[tokio::test]
async fn test_deleted_task_is_not_resurrected_by_stale_snapshot() {
    let x = make_task("x", "Old chore", 10);
    let remote = MemoryRemote::with_tasks(vec![x.clone()]);
    let client = online_client(remote.clone()).await;
    client.reconcile().await.unwrap();
    assert_eq!(client.list().await.len(), 1);

    client.set_online(false).await;
    client.delete_task(&x.id).await.unwrap();

    // Remote still has the row; the pending delete wins
    let report = client.reconcile_snapshot(&remote.rows()).await;
    assert_eq!(report.suppressed, 1);
    assert!(client.list().await.is_empty());

    client.set_online(true).await;
    assert!(remote.rows().is_empty());
    assert!(client.list().await.is_empty());
    assert!(client.pending_actions().await.is_empty());
}

#[tokio::test]
async fn test_pending_edit_survives_newer_remote_copy() {
    let x = make_task("x", "Original", 10);
    let remote = MemoryRemote::with_tasks(vec![x.clone()]);
    let client = online_client(remote.clone()).await;
    client.reconcile().await.unwrap();

    client.set_online(false).await;
    client.edit_task(&x.id, "Mine").await.unwrap();

    let mut theirs = x.clone();
    theirs.text = "Theirs".to_string();
    theirs.updated_at = i64::MAX / 2;
    client.reconcile_snapshot(&[theirs]).await;

    assert_eq!(client.get(&x.id).await.unwrap().text, "Mine");
    assert_eq!(client.pending_actions().await.len(), 1);
}

#[tokio::test]
async fn test_last_write_wins_without_pending_edits() {
    let x = make_task("x", "Original", 10);
    let remote = MemoryRemote::with_tasks(vec![x.clone()]);
    let client = online_client(remote.clone()).await;
    client.reconcile().await.unwrap();

    let mut newer = x.clone();
    newer.text = "Edited elsewhere".to_string();
    newer.updated_at = 20;
    remote.put_external(newer);

    let report = client.reconcile().await.unwrap();
    assert_eq!(report.updated_from_remote, 1);
    assert_eq!(client.get(&x.id).await.unwrap().text, "Edited elsewhere");

    let mut stale = x.clone();
    stale.text = "Stale".to_string();
    stale.updated_at = 5;
    client.reconcile_snapshot(&[stale]).await;
    assert_eq!(client.get(&x.id).await.unwrap().text, "Edited elsewhere");
}

#[tokio::test]
async fn test_task_removed_remotely_is_dropped_locally() {
    let x = make_task("x", "Shared", 10);
    let remote = MemoryRemote::with_tasks(vec![x.clone()]);
    let client = online_client(remote.clone()).await;
    client.reconcile().await.unwrap();

    remote.remove_external(&x.id);
    let report = client.reconcile().await.unwrap();

    assert_eq!(report.dropped, 1);
    assert!(client.list().await.is_empty());
}

#[tokio::test]
async fn test_reconcile_refetches_when_drain_confirms_during_fetch() {
    let inner = MemoryRemote::new();
    let remote = SlowRemote::new(inner.clone(), Duration::ZERO)
        .with_fetch_delay(Duration::from_millis(50));
    let client = Client::open(
        setup_storage().await,
        Arc::new(remote.clone()),
        SyncGate::new(false, true),
    )
    .await
    .unwrap();
    let task = client.add_task("Mid-flight", day(2025, 6, 4)).await.unwrap();
    client.gate().set_online(true);

    // The first snapshot is read before the create lands remotely and is
    // returned after the outbox entry is already gone.
    let late_drain = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.drain().await
    };
    let (report, drained) = tokio::join!(client.reconcile(), late_drain);

    assert_eq!(drained.confirmed, 1);
    assert_eq!(report.unwrap().dropped, 0);
    assert_eq!(remote.fetches(), 2);
    assert_eq!(client.get(&task.id).await, Some(task.clone()));
    assert_eq!(inner.rows(), vec![task]);
    assert!(client.pending_actions().await.is_empty());
}

#[tokio::test]
async fn test_outbox_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("widget.db").display());
    let remote = MemoryRemote::new();

    let task_id = {
        let storage = Arc::new(LocalStorage::open(&url).await.unwrap());
        let client = Client::open(storage.clone(), Arc::new(remote.clone()), SyncGate::new(false, true))
            .await
            .unwrap();
        let task = client.add_task("Survive restart", day(2025, 6, 3)).await.unwrap();
        storage.pool.close().await;
        task.id
    };

    let storage = Arc::new(LocalStorage::open(&url).await.unwrap());
    let client = Client::open(storage, Arc::new(remote.clone()), SyncGate::new(false, true))
        .await
        .unwrap();
    assert_eq!(client.pending_actions().await.len(), 1);
    assert_eq!(client.list().await[0].id, task_id);

    client.set_online(true).await;
    assert!(remote.get(&task_id).is_some());
    assert!(client.pending_actions().await.is_empty());
}

#[tokio::test]
async fn test_import_skips_rows_matching_existing_tasks() {
    let client = offline_client(MemoryRemote::new()).await;
    let date = day(2025, 7, 1);
    client.add_task("Water plants", date).await.unwrap();

    let draft = |text: &str| TaskDraft {
        text: text.to_string(),
        target_date: date,
        completed: false,
        created_at: None,
        completed_at: None,
    };
    let summary = client
        .import_tasks(vec![
            draft("Water plants"),
            draft("Pay rent"),
            draft("Pay rent"),
            draft("   "),
        ])
        .await
        .unwrap();

    // Only rows matching an existing task are skipped; batch repeats all land
    assert_eq!(summary.imported, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(client.list().await.len(), 3);
    assert_eq!(client.pending_actions().await.len(), 3);
}

#[tokio::test]
async fn test_toggle_moves_overdue_task_to_today() {
    let client = offline_client(MemoryRemote::new()).await;
    let today = day(2025, 8, 10);
    let task = client.add_task("Overdue", day(2025, 8, 1)).await.unwrap();

    assert_eq!(client.tasks_for_date(today, today).await.len(), 1);

    let done = client.toggle_task(&task.id, today).await.unwrap();
    assert!(done.completed);
    assert_eq!(done.target_date, today);
    assert!(done.completed_at.is_some());

    let history = client.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].0, "2025-08");

    let undone = client.toggle_task(&task.id, today).await.unwrap();
    assert!(!undone.completed);
    assert_eq!(undone.completed_at, None);
}

#[tokio::test]
async fn test_invalid_mutations_are_rejected() {
    let client = offline_client(MemoryRemote::new()).await;

    let blank = client.add_task("   ", day(2025, 1, 1)).await;
    assert!(matches!(
        blank,
        Err(ClientError::Sync(SyncError::InvalidOperation(_)))
    ));

    let missing = TaskId::from("missing");
    assert!(matches!(
        client.edit_task(&missing, "x").await,
        Err(ClientError::Sync(SyncError::TaskNotFound(_)))
    ));
    assert!(matches!(
        client.delete_task(&missing).await,
        Err(ClientError::Sync(SyncError::TaskNotFound(_)))
    ));
    assert!(client.pending_actions().await.is_empty());
}

#[tokio::test]
async fn test_events_are_queued_until_processed() {
    let remote = MemoryRemote::new();
    let client = online_client(remote.clone()).await;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let events = client.event_dispatcher();
    events
        .register_callback(move |event| sink.lock().unwrap().push(event))
        .unwrap();

    remote.fail_next(almanac_core::errors::RemoteError::Unavailable("flaky".into()));
    let task = client.add_task("Observed", day(2025, 6, 1)).await.unwrap();
    assert!(seen.lock().unwrap().is_empty());

    events.process_events().unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(
        seen[0],
        SyncEvent::TaskCreated {
            id: task.id.clone(),
            text: "Observed".to_string()
        }
    );
    assert_eq!(seen[1].event_type(), EventType::SyncError);
}

#[tokio::test]
async fn test_remote_change_notice_triggers_reconcile() {
    let remote = MemoryRemote::new();
    let client = Arc::new(online_client(remote.clone()).await);
    let (tx, rx) = mpsc::channel(16);

    let runner = {
        let client = client.clone();
        tokio::spawn(async move { client.run(rx).await })
    };
    let forwarder = client.connect_realtime(tx.clone()).await.unwrap();

    remote.put_external(make_task("ext", "From phone", 50));

    let mut adopted = false;
    for _ in 0..50 {
        if client.get(&TaskId::from("ext")).await.is_some() {
            adopted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(adopted, "remote change was not reconciled");

    tx.send(SyncCommand::Shutdown).await.unwrap();
    runner.await.unwrap();
    forwarder.abort();
}

#[tokio::test]
async fn test_remote_change_retries_retained_entries() {
    let remote = MemoryRemote::new();
    let client = online_client(remote.clone()).await;

    remote.fail_next(almanac_core::errors::RemoteError::Unavailable("dropped".into()));
    let task = client.add_task("Retry me", day(2025, 6, 1)).await.unwrap();
    assert_eq!(client.pending_actions().await.len(), 1);
    assert!(remote.rows().is_empty());

    // A resync after the live channel rejoins is just another remote change
    assert!(client.handle(SyncCommand::RemoteChanged).await);

    assert!(client.pending_actions().await.is_empty());
    assert_eq!(remote.rows(), vec![task.clone()]);
    assert_eq!(client.list().await, vec![task]);
}

#[tokio::test]
async fn test_connectivity_commands_drive_sync() {
    let remote = MemoryRemote::new();
    let client = offline_client(remote.clone()).await;
    let task = client.add_task("Queued", day(2025, 6, 1)).await.unwrap();

    assert!(client.handle(SyncCommand::Drain).await);
    assert!(remote.rows().is_empty());

    assert!(
        client
            .handle(SyncCommand::ConnectivityChanged { online: true })
            .await
    );
    assert_eq!(remote.rows(), vec![task]);

    assert!(
        client
            .handle(SyncCommand::AuthChanged {
                authenticated: false
            })
            .await
    );
    assert!(!client.gate().is_open());
    assert!(!client.handle(SyncCommand::Shutdown).await);
}
