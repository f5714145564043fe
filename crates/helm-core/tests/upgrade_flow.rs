//! Bulk upgrade execution: plan determinism through the engine, pin and
//! safe-mode gates, cancellation truth, and the outdated oracle.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{ScriptedAdapter, UpgradeScript, engine_with, outdated};
use helm_core::models::plan::OS_UPDATES_STEP_NAME;
use helm_core::models::{ErrorKind, ManagerId, TaskStatus, TaskType};
use helm_core::persistence::PackageStore;

fn seed_outdated(engine: &Arc<helm_core::engine::CoreEngine>, packages: &[(ManagerId, &str)]) {
    let mut by_manager: std::collections::BTreeMap<ManagerId, Vec<_>> =
        std::collections::BTreeMap::new();
    for (manager, name) in packages {
        by_manager
            .entry(*manager)
            .or_default()
            .push(outdated(*manager, name, "1.0.0", "2.0.0"));
    }
    for (manager, rows) in by_manager {
        engine
            .store()
            .replace_outdated(manager, &rows)
            .expect("outdated seed should persist");
    }
}

async fn wait_upgrades_settled(engine: &Arc<helm_core::engine::CoreEngine>) {
    // Phases submit lazily, so require a few consecutive quiet polls before
    // declaring the batch settled.
    let mut quiet = 0;
    for _ in 0..400 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        let tasks = engine.list_tasks(200).expect("tasks should list");
        let upgrades: Vec<_> = tasks
            .iter()
            .filter(|task| task.task_type == TaskType::Upgrade)
            .collect();
        if !upgrades.is_empty() && upgrades.iter().all(|task| task.status.is_terminal()) {
            quiet += 1;
            if quiet >= 4 {
                return;
            }
        } else {
            quiet = 0;
        }
    }
    panic!("upgrade batch did not settle");
}

#[tokio::test(flavor = "multi_thread")]
async fn preview_plan_is_authority_ordered_and_deterministic() {
    let engine = engine_with("plan-preview", vec![]);
    seed_outdated(
        &engine,
        &[
            (ManagerId::HomebrewFormula, "git"),
            (ManagerId::Npm, "eslint"),
            (ManagerId::Mise, "node"),
            (ManagerId::SoftwareUpdate, "macOS 14.5"),
        ],
    );
    engine.pin_package(ManagerId::Npm, "eslint", None).await.unwrap();

    let plan = engine.preview_upgrade_plan(false, true).unwrap();
    let ids: Vec<&str> = plan.iter().map(|step| step.step_id.as_str()).collect();
    assert_eq!(
        ids,
        [
            "mise:node",
            "homebrew_formula:git",
            "softwareupdate:__confirm_os_updates__"
        ],
        "pinned eslint is excluded; authority order holds"
    );
    assert_eq!(
        plan.iter().map(|step| step.order_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    let again = engine.preview_upgrade_plan(false, true).unwrap();
    assert_eq!(plan, again, "identical inputs produce the identical plan");

    let with_pinned = engine.preview_upgrade_plan(true, true).unwrap();
    assert!(with_pinned.iter().any(|step| step.step_id == "npm:eslint"));
}

#[tokio::test(flavor = "multi_thread")]
async fn upgrade_all_executes_phases_and_stamps_plan_step_ids() {
    let mise = ScriptedAdapter::new(ManagerId::Mise)
        .with_outdated(vec![outdated(ManagerId::Mise, "node", "20.0.0", "22.0.0")]);
    let npm = ScriptedAdapter::new(ManagerId::Npm)
        .with_outdated(vec![outdated(ManagerId::Npm, "typescript", "5.4.0", "5.5.0")]);

    let engine = engine_with("upgrade-all", vec![Arc::new(mise), Arc::new(npm)]);
    seed_outdated(
        &engine,
        &[(ManagerId::Mise, "node"), (ManagerId::Npm, "typescript")],
    );

    let batch_id = engine.upgrade_all(false, false).unwrap();
    assert!(batch_id > 0);
    wait_upgrades_settled(&engine).await;

    let tasks = engine.list_tasks(100).unwrap();
    let upgrades: Vec<_> = tasks
        .iter()
        .filter(|task| task.task_type == TaskType::Upgrade)
        .collect();
    assert_eq!(upgrades.len(), 2);
    for task in &upgrades {
        assert_eq!(task.status, TaskStatus::Completed);
        let step_id = task
            .label
            .args
            .get("plan_step_id")
            .expect("plan tasks carry their step id");
        assert_eq!(
            step_id,
            &format!("{}:{}", task.manager.as_str(), task.label.args["package"])
        );
    }

    // Authoritative phase ran before the standard phase.
    let mise_id = upgrades
        .iter()
        .find(|task| task.manager == ManagerId::Mise)
        .unwrap()
        .id;
    let npm_id = upgrades
        .iter()
        .find(|task| task.manager == ManagerId::Npm)
        .unwrap()
        .id;
    assert!(mise_id < npm_id);

    // Verified upgrades drop out of the outdated snapshot.
    assert!(engine.list_outdated_packages().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn safe_mode_excludes_os_updates_from_plans_and_rejects_direct_upgrades() {
    let software_update = ScriptedAdapter::new(ManagerId::SoftwareUpdate);
    let spawn_count = software_update.spawn_count();

    let engine = engine_with("safe-mode", vec![Arc::new(software_update)]);
    engine.set_safe_mode(true).unwrap();
    seed_outdated(&engine, &[(ManagerId::SoftwareUpdate, "macOS 14.5")]);

    let plan = engine.preview_upgrade_plan(false, true).unwrap();
    assert!(plan.is_empty(), "safe mode drops the os-update step");

    let batch = engine.upgrade_all(false, true).unwrap();
    assert!(batch > 0);
    tokio::time::sleep(Duration::from_millis(300)).await;
    let tasks = engine.list_tasks(100).unwrap();
    assert!(
        tasks.iter().all(|task| task.task_type != TaskType::Upgrade),
        "no softwareupdate upgrade task may exist under safe mode"
    );

    let error = engine
        .upgrade_package(ManagerId::SoftwareUpdate, OS_UPDATES_STEP_NAME)
        .await
        .expect_err("direct upgrade must be rejected at submission");
    assert_eq!(error.kind, ErrorKind::InvalidInput);
    assert_eq!(
        spawn_count.load(Ordering::SeqCst),
        0,
        "no adapter invocation, no child process"
    );
    assert_eq!(
        engine.take_last_error_key().as_deref(),
        Some("service.error.invalid_input")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn ineffective_upgrades_fail_and_keep_the_package_outdated() {
    // The adapter's re-query sees wget pending at the same candidate the
    // upgrade was planned against, which is the ineffective-upgrade case.
    let brew = ScriptedAdapter::new(ManagerId::HomebrewFormula)
        .with_outdated(vec![outdated(
            ManagerId::HomebrewFormula,
            "wget",
            "1.0.0",
            "2.0.0",
        )])
        .with_upgrade_script(UpgradeScript::Ineffective);

    let engine = engine_with("ineffective", vec![Arc::new(brew)]);
    seed_outdated(&engine, &[(ManagerId::HomebrewFormula, "wget")]);

    let task_id = engine
        .upgrade_package(ManagerId::HomebrewFormula, "wget")
        .await
        .unwrap();
    wait_upgrades_settled(&engine).await;

    let tasks = engine.list_tasks(50).unwrap();
    let task = tasks.iter().find(|task| task.id == task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_kind, Some(ErrorKind::ProcessFailure));

    // list_outdated is the oracle: wget is still there at the same
    // candidate.
    let outdated_packages = engine.list_outdated_packages().unwrap();
    let wget = outdated_packages
        .iter()
        .find(|package| package.package.name == "wget")
        .expect("wget must remain outdated");
    assert_eq!(wget.candidate_version, "2.0.0");
}

#[tokio::test(flavor = "multi_thread")]
async fn upgrades_superseded_by_a_newer_candidate_complete() {
    // The upgrade lands, but a newer release is published before the
    // verification re-query: same-candidate comparison must read this as
    // success with a follow-up, not as an ineffective upgrade.
    let brew = ScriptedAdapter::new(ManagerId::HomebrewFormula)
        .with_outdated(vec![outdated(
            ManagerId::HomebrewFormula,
            "wget",
            "1.0.0",
            "2.0.0",
        )])
        .with_upgrade_script(UpgradeScript::SupersededCandidate);

    let engine = engine_with("superseded", vec![Arc::new(brew)]);
    seed_outdated(&engine, &[(ManagerId::HomebrewFormula, "wget")]);

    let task_id = engine
        .upgrade_package(ManagerId::HomebrewFormula, "wget")
        .await
        .unwrap();
    wait_upgrades_settled(&engine).await;

    let tasks = engine.list_tasks(50).unwrap();
    let task = tasks.iter().find(|task| task.id == task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.error_kind, None);

    // The package stays in the outdated snapshot until the next refresh
    // rewrites it with the newer candidate.
    let outdated_packages = engine.list_outdated_packages().unwrap();
    assert!(outdated_packages
        .iter()
        .any(|package| package.package.name == "wget"));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelling_a_running_upgrade_is_truthful() {
    let brew = ScriptedAdapter::new(ManagerId::HomebrewFormula)
        .with_outdated(vec![outdated(
            ManagerId::HomebrewFormula,
            "wget",
            "1.24.5",
            "1.25.0",
        )])
        .with_upgrade_script(UpgradeScript::BlockUntilCancelled);

    let engine = engine_with("cancel-truth", vec![Arc::new(brew)]);
    seed_outdated(&engine, &[(ManagerId::HomebrewFormula, "wget")]);

    let task_id = engine
        .upgrade_package(ManagerId::HomebrewFormula, "wget")
        .await
        .unwrap();

    // Let it reach Running, then cancel.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(engine.cancel_task(task_id).await);
    wait_upgrades_settled(&engine).await;

    let tasks = engine.list_tasks(50).unwrap();
    let task = tasks.iter().find(|task| task.id == task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);

    // Nothing was upgraded: the candidate is still pending.
    let outdated_packages = engine.list_outdated_packages().unwrap();
    let wget = outdated_packages
        .iter()
        .find(|package| package.package.name == "wget")
        .expect("wget must remain outdated");
    assert_eq!(wget.candidate_version, "2.0.0");
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_remaining_reaches_queued_running_and_unsubmitted_steps() {
    // Three upgrades on one manager serialize; cancelling mid-run must
    // terminalize all of them without any completing afterwards.
    let npm = ScriptedAdapter::new(ManagerId::Npm)
        .with_outdated(vec![
            outdated(ManagerId::Npm, "a-package", "1.0.0", "2.0.0"),
            outdated(ManagerId::Npm, "b-package", "1.0.0", "2.0.0"),
            outdated(ManagerId::Npm, "c-package", "1.0.0", "2.0.0"),
        ])
        .with_work_delay(Duration::from_secs(2));

    let engine = engine_with("cancel-remaining", vec![Arc::new(npm)]);
    seed_outdated(
        &engine,
        &[
            (ManagerId::Npm, "a-package"),
            (ManagerId::Npm, "b-package"),
            (ManagerId::Npm, "c-package"),
        ],
    );

    let batch = engine.upgrade_all(false, false).unwrap();
    assert!(batch > 0);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let cancelled = engine.cancel_remaining_upgrades().await.unwrap();
    assert!(cancelled >= 3, "every scoped step is addressed");

    // Bounded settling: every scoped task reaches a terminal, non-running
    // status.
    let mut settled = false;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        let tasks = engine.list_tasks(100).unwrap();
        let upgrades: Vec<_> = tasks
            .iter()
            .filter(|task| task.task_type == TaskType::Upgrade)
            .collect();
        if upgrades.iter().all(|task| task.status.is_terminal()) {
            settled = true;
            assert!(
                upgrades
                    .iter()
                    .all(|task| task.status != TaskStatus::Completed),
                "a cancelled run must not report completions after the cut"
            );
            break;
        }
    }
    assert!(settled, "cancel-remaining must settle within bounded time");
}
