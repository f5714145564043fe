//! Coordinator lifecycle properties: per-manager FIFO, cross-manager
//! overlap, truthful cancellation, durable terminal states.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;

use helm_core::models::{ManagerId, TaskId, TaskLabel, TaskStatus, TaskType};
use helm_core::orchestration::coordinator::{TaskCoordinator, TaskSpec, boxed_operation};
use helm_core::persistence::MigrationStore;
use helm_core::sqlite::SqliteStore;

fn coordinator(test_name: &str) -> TaskCoordinator {
    let store = Arc::new(
        SqliteStore::open(common::temp_data_dir(test_name).join("helm.sqlite3"))
            .expect("store should open"),
    );
    store.migrate_to_latest().expect("migrations should apply");
    let (events, _) = broadcast::channel(64);
    TaskCoordinator::new(store, events).expect("coordinator should build")
}

fn spec(manager: ManagerId, task_type: TaskType) -> TaskSpec {
    TaskSpec {
        manager,
        task_type,
        label: TaskLabel::new("service.task.label.test"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn serial_tasks_for_one_manager_start_in_submit_order() {
    let coordinator = coordinator("fifo");
    let order: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

    let mut ids = Vec::new();
    for index in 0..4_u32 {
        let order = order.clone();
        let id = coordinator
            .submit(
                spec(ManagerId::Npm, TaskType::Upgrade),
                boxed_operation(move |_, _| async move {
                    order.lock().unwrap().push(index);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(())
                }),
            )
            .await
            .expect("submit should succeed");
        ids.push(id);
    }

    for id in ids {
        let record = coordinator
            .wait_terminal(id, Some(Duration::from_secs(5)))
            .await
            .expect("task should terminalize");
        assert_eq!(record.status, TaskStatus::Completed);
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn serial_tasks_for_different_managers_overlap() {
    let coordinator = coordinator("parallel");

    // Each task waits for the other before finishing; only cross-manager
    // concurrency lets both complete.
    let (first_tx, first_rx) = tokio::sync::oneshot::channel::<()>();
    let (second_tx, second_rx) = tokio::sync::oneshot::channel::<()>();

    let first = coordinator
        .submit(
            spec(ManagerId::Npm, TaskType::Upgrade),
            boxed_operation(move |_, _| async move {
                let _ = first_tx.send(());
                let _ = second_rx.await;
                Ok(())
            }),
        )
        .await
        .unwrap();
    let second = coordinator
        .submit(
            spec(ManagerId::HomebrewFormula, TaskType::Upgrade),
            boxed_operation(move |_, _| async move {
                let _ = second_tx.send(());
                let _ = first_rx.await;
                Ok(())
            }),
        )
        .await
        .unwrap();

    let timeout = Some(Duration::from_secs(5));
    assert_eq!(
        coordinator.wait_terminal(first, timeout).await.unwrap().status,
        TaskStatus::Completed
    );
    assert_eq!(
        coordinator.wait_terminal(second, timeout).await.unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelling_a_queued_task_skips_its_operation() {
    let coordinator = coordinator("queued-cancel");
    let ran = Arc::new(Mutex::new(false));

    // Occupy the manager's serial slot.
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let blocker = coordinator
        .submit(
            spec(ManagerId::Npm, TaskType::Upgrade),
            boxed_operation(move |_, _| async move {
                let _ = release_rx.await;
                Ok(())
            }),
        )
        .await
        .unwrap();

    let ran_flag = ran.clone();
    let queued = coordinator
        .submit(
            spec(ManagerId::Npm, TaskType::Upgrade),
            boxed_operation(move |_, _| async move {
                *ran_flag.lock().unwrap() = true;
                Ok(())
            }),
        )
        .await
        .unwrap();

    assert!(coordinator.cancel(queued).await.unwrap());
    let record = coordinator
        .wait_terminal(queued, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(record.status, TaskStatus::Cancelled);
    assert!(!*ran.lock().unwrap(), "a queued-cancelled task never runs");

    let _ = release_tx.send(());
    let record = coordinator
        .wait_terminal(blocker, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(record.status, TaskStatus::Completed);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelling_a_running_task_reports_cancelled_not_completed() {
    let coordinator = coordinator("running-cancel");

    let task = coordinator
        .submit(
            spec(ManagerId::Npm, TaskType::Upgrade),
            boxed_operation(move |_, cancel| async move {
                cancel.cancelled().await;
                Ok(())
            }),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(coordinator.cancel(task).await.unwrap());
    // Idempotent.
    assert!(coordinator.cancel(task).await.unwrap());

    let record = coordinator
        .wait_terminal(task, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(record.status, TaskStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_operations_record_the_error_kind() {
    let coordinator = coordinator("failure");

    let task = coordinator
        .submit(
            spec(ManagerId::Npm, TaskType::Refresh),
            boxed_operation(move |_, _| async move {
                Err(helm_core::models::CoreError::process_failure("exit 1"))
            }),
        )
        .await
        .unwrap();

    let record = coordinator
        .wait_terminal(task, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(
        record.error_kind,
        Some(helm_core::models::ErrorKind::ProcessFailure)
    );
    assert!(record.terminal_at.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_reservations_terminalize_at_submission() {
    let coordinator = coordinator("reserved");

    let reserved = coordinator.reserve_id();
    assert!(coordinator.cancel(reserved).await.unwrap());

    let ran = Arc::new(Mutex::new(false));
    let ran_flag = ran.clone();
    let id = coordinator
        .submit_reserved(
            reserved,
            spec(ManagerId::Npm, TaskType::Upgrade),
            boxed_operation(move |_, _| async move {
                *ran_flag.lock().unwrap() = true;
                Ok(())
            }),
        )
        .await
        .unwrap();
    assert_eq!(id, reserved);

    let record = coordinator
        .wait_terminal(reserved, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(record.status, TaskStatus::Cancelled);
    assert!(!*ran.lock().unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_task_ids_are_not_cancellable() {
    let coordinator = coordinator("unknown-cancel");
    assert!(!coordinator.cancel(TaskId(999_999)).await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn recent_tasks_come_back_newest_first() {
    let coordinator = coordinator("recent-order");

    for _ in 0..3 {
        let task = coordinator
            .submit(
                spec(ManagerId::Npm, TaskType::Refresh),
                boxed_operation(|_, _| async { Ok(()) }),
            )
            .await
            .unwrap();
        coordinator
            .wait_terminal(task, Some(Duration::from_secs(5)))
            .await
            .unwrap();
    }

    let tasks = coordinator.list_recent(10).unwrap();
    assert_eq!(tasks.len(), 3);
    assert!(tasks[0].id > tasks[1].id);
    assert!(tasks[1].id > tasks[2].id);
}
