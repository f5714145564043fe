//! Authority-phased refresh: detection feeds listing, capability gaps skip
//! silently, and guarded managers only start once authoritative managers
//! are terminal.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedAdapter, engine_with, outdated};
use helm_core::models::{
    InstalledPackage, ManagerId, Operation, PackageRef, TaskStatus, TaskType,
};

fn installed(manager: ManagerId, name: &str, version: &str) -> InstalledPackage {
    InstalledPackage {
        package: PackageRef::new(manager, name),
        installed_version: Some(version.to_string()),
        pinned: false,
    }
}

async fn wait_refresh_settled(engine: &Arc<helm_core::engine::CoreEngine>) {
    // Refresh chains submit follow-up tasks after earlier ones terminalize,
    // so require a few consecutive quiet polls before declaring it settled.
    let mut quiet = 0;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        let tasks = engine.list_tasks(100).expect("tasks should list");
        if !tasks.is_empty() && tasks.iter().all(|task| task.status.is_terminal()) {
            quiet += 1;
            if quiet >= 4 {
                return;
            }
        } else {
            quiet = 0;
        }
    }
    panic!("refresh did not settle in time");
}

#[tokio::test(flavor = "multi_thread")]
async fn refresh_runs_detection_then_capability_gated_listings() {
    // Mise (authoritative): detect + list installed + list outdated.
    // SoftwareUpdate (guarded): detect + list outdated, no installed listing.
    let mise = ScriptedAdapter::new(ManagerId::Mise)
        .with_installed(vec![installed(ManagerId::Mise, "node", "22.2.0")])
        .with_outdated(vec![outdated(ManagerId::Mise, "node", "20.11.0", "22.2.0")]);
    let mise_requests = mise.requests();

    let software_update = ScriptedAdapter::new(ManagerId::SoftwareUpdate).with_outdated(vec![
        outdated(ManagerId::SoftwareUpdate, "macOS Sequoia 15.3.2", "", "15.3.2"),
    ]);
    let su_requests = software_update.requests();

    let engine = engine_with(
        "refresh-phasing",
        vec![Arc::new(mise), Arc::new(software_update)],
    );

    let batch_id = engine.trigger_refresh();
    assert!(batch_id > 0);
    wait_refresh_settled(&engine).await;

    // Capability gating: mise saw all three operations, softwareupdate never
    // saw a ListInstalled.
    let mise_ops: Vec<Operation> = mise_requests
        .lock()
        .unwrap()
        .iter()
        .map(|(_, operation, _)| *operation)
        .collect();
    assert!(mise_ops.contains(&Operation::Detect));
    assert!(mise_ops.contains(&Operation::ListInstalled));
    assert!(mise_ops.contains(&Operation::ListOutdated));

    let su_ops: Vec<Operation> = su_requests
        .lock()
        .unwrap()
        .iter()
        .map(|(_, operation, _)| *operation)
        .collect();
    assert!(su_ops.contains(&Operation::Detect));
    assert!(su_ops.contains(&Operation::ListOutdated));
    assert!(!su_ops.contains(&Operation::ListInstalled));

    // Authority phasing: every mise task id precedes every softwareupdate
    // task id (task ids are allocation-ordered).
    let tasks = engine.list_tasks(100).unwrap();
    let max_mise = tasks
        .iter()
        .filter(|task| task.manager == ManagerId::Mise)
        .map(|task| task.id)
        .max()
        .expect("mise tasks should exist");
    let min_su = tasks
        .iter()
        .filter(|task| task.manager == ManagerId::SoftwareUpdate)
        .map(|task| task.id)
        .min()
        .expect("softwareupdate tasks should exist");
    assert!(
        max_mise < min_su,
        "guarded phase must start after the authoritative phase drains"
    );

    // Detection results landed in manager status.
    let statuses = engine.list_manager_status().unwrap();
    for manager in [ManagerId::Mise, ManagerId::SoftwareUpdate] {
        let status = statuses
            .iter()
            .find(|status| status.manager_id == manager)
            .unwrap();
        assert!(status.detected, "{manager} should be detected");
    }

    // Listings replaced the cached package state.
    let outdated_packages = engine.list_outdated_packages().unwrap();
    assert!(outdated_packages
        .iter()
        .any(|package| package.package.manager == ManagerId::Mise));
    assert!(outdated_packages
        .iter()
        .any(|package| package.package.manager == ManagerId::SoftwareUpdate));
}

#[tokio::test(flavor = "multi_thread")]
async fn undetected_managers_are_not_listed() {
    let npm = ScriptedAdapter::new(ManagerId::Npm)
        .not_detected()
        .with_installed(vec![installed(ManagerId::Npm, "eslint", "8.57.0")]);
    let npm_requests = npm.requests();

    let engine = engine_with("refresh-undetected", vec![Arc::new(npm)]);
    engine.trigger_refresh();
    wait_refresh_settled(&engine).await;

    let ops: Vec<Operation> = npm_requests
        .lock()
        .unwrap()
        .iter()
        .map(|(_, operation, _)| *operation)
        .collect();
    assert_eq!(ops, vec![Operation::Detect]);

    let statuses = engine.list_manager_status().unwrap();
    let npm_status = statuses
        .iter()
        .find(|status| status.manager_id == ManagerId::Npm)
        .unwrap();
    assert!(!npm_status.detected);
    assert!(engine.list_installed_packages().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn one_failing_manager_does_not_block_the_others() {
    struct FailingDetect;
    impl helm_core::adapters::contract::ManagerAdapter for FailingDetect {
        fn id(&self) -> ManagerId {
            ManagerId::Rustup
        }
        fn execute(
            &self,
            _request: helm_core::adapters::contract::AdapterRequest,
        ) -> helm_core::models::CoreResult<helm_core::adapters::contract::AdapterResponse> {
            Err(helm_core::models::CoreError::process_failure("probe blew up"))
        }
    }

    let npm = ScriptedAdapter::new(ManagerId::Npm)
        .with_installed(vec![installed(ManagerId::Npm, "eslint", "8.57.0")]);

    let engine = engine_with(
        "refresh-partial-failure",
        vec![Arc::new(FailingDetect), Arc::new(npm)],
    );
    engine.trigger_refresh();
    wait_refresh_settled(&engine).await;

    let tasks = engine.list_tasks(100).unwrap();
    assert!(tasks.iter().any(|task| {
        task.manager == ManagerId::Rustup
            && task.task_type == TaskType::Detection
            && task.status == TaskStatus::Failed
    }));

    // npm still refreshed to completion.
    let packages = engine.list_installed_packages().unwrap();
    assert!(packages
        .iter()
        .any(|package| package.package.manager == ManagerId::Npm));
    assert!(engine.take_last_error_key().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn triggering_twice_reuses_the_inflight_batch() {
    let mise = ScriptedAdapter::new(ManagerId::Mise)
        .with_work_delay(Duration::from_millis(150));

    let engine = engine_with("refresh-dedupe", vec![Arc::new(mise)]);
    let first = engine.trigger_refresh();
    let second = engine.trigger_refresh();
    assert_eq!(first, second, "an in-flight refresh is reused");

    wait_refresh_settled(&engine).await;
    // The tracking flag clears just after the final task terminalizes.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let third = engine.trigger_refresh();
    assert_ne!(first, third, "a settled refresh starts a new batch");
    wait_refresh_settled(&engine).await;
}
