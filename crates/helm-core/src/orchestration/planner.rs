//! Upgrade planning and scoped execution. Planning is a pure, deterministic
//! function of its inputs; execution drives the plan phase-by-phase under a
//! run token so superseded runs cannot act.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use crate::adapters::contract::AdapterRequest;
use crate::models::plan::OS_UPDATES_STEP_NAME;
use crate::models::{
    CoreResult, ManagerId, OutdatedPackage, PackageRef, PlanStepStatus, TaskId, TaskLabel,
    UpgradePlanStep,
};
use crate::orchestration::runtime::AdapterRuntime;
use crate::registry;

/// A phase that has not drained within this budget invalidates the run.
pub const PHASE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PlanOptions {
    pub include_pinned: bool,
    pub allow_os_updates: bool,
}

/// Compute the ordered upgrade plan. Sort keys, in order: authority rank,
/// the manager's registry table position, the manager id, the package name.
/// Re-running with identical inputs yields identical ids and indices.
pub fn compute_plan(
    outdated: &[OutdatedPackage],
    pinned_external_ids: &HashSet<String>,
    enabled_managers: &HashSet<ManagerId>,
    safe_mode: bool,
    options: PlanOptions,
) -> Vec<UpgradePlanStep> {
    let mut steps: Vec<UpgradePlanStep> = Vec::new();
    let mut seen = HashSet::new();
    let mut os_updates_pending = false;

    for package in outdated {
        let manager = package.package.manager;
        let descriptor = registry::descriptor(manager);

        if !descriptor.is_implemented || !enabled_managers.contains(&manager) {
            continue;
        }
        let pinned =
            package.pinned || pinned_external_ids.contains(&package.package.external_id());
        if pinned && !options.include_pinned {
            continue;
        }
        if manager == ManagerId::SoftwareUpdate {
            if options.allow_os_updates && !safe_mode {
                os_updates_pending = true;
            }
            continue;
        }

        if !seen.insert((manager, package.package.name.clone())) {
            continue;
        }

        let mut args = BTreeMap::new();
        args.insert("package".to_string(), package.package.name.clone());
        args.insert("manager".to_string(), descriptor.display_name.to_string());

        steps.push(UpgradePlanStep {
            step_id: UpgradePlanStep::step_id_for(manager, &package.package.name),
            order_index: 0,
            manager,
            authority: descriptor.authority,
            package_name: package.package.name.clone(),
            candidate_version: Some(package.candidate_version.clone()),
            reason_label_key: "service.task.label.upgrade.package".to_string(),
            reason_label_args: args,
            status: PlanStepStatus::Pending,
        });
    }

    if os_updates_pending {
        let descriptor = registry::descriptor(ManagerId::SoftwareUpdate);
        let mut args = BTreeMap::new();
        args.insert("manager".to_string(), descriptor.display_name.to_string());
        steps.push(UpgradePlanStep {
            step_id: UpgradePlanStep::step_id_for(ManagerId::SoftwareUpdate, OS_UPDATES_STEP_NAME),
            order_index: 0,
            manager: ManagerId::SoftwareUpdate,
            authority: descriptor.authority,
            package_name: OS_UPDATES_STEP_NAME.to_string(),
            candidate_version: None,
            reason_label_key: "service.task.label.upgrade.os_updates".to_string(),
            reason_label_args: args,
            status: PlanStepStatus::Pending,
        });
    }

    steps.sort_by(|a, b| {
        a.authority
            .rank()
            .cmp(&b.authority.rank())
            .then_with(|| registry::order_index(a.manager).cmp(&registry::order_index(b.manager)))
            .then_with(|| a.manager.as_str().cmp(b.manager.as_str()))
            .then_with(|| a.package_name.cmp(&b.package_name))
    });
    for (index, step) in steps.iter_mut().enumerate() {
        step.order_index = index;
    }
    steps
}

struct PlannedTask {
    step_id: String,
    package: PackageRef,
    candidate_version: Option<String>,
    authority_rank: u8,
    task_id: TaskId,
    label: TaskLabel,
}

struct ActiveRun {
    token: u64,
    tasks: Vec<TaskId>,
}

/// Clones share the run token and the active-run scope.
#[derive(Clone)]
pub struct PlanExecutor {
    runtime: AdapterRuntime,
    run_token: Arc<AtomicU64>,
    active: Arc<StdMutex<Option<ActiveRun>>>,
}

impl PlanExecutor {
    pub fn new(runtime: AdapterRuntime) -> Self {
        Self {
            runtime,
            run_token: Arc::new(AtomicU64::new(0)),
            active: Arc::new(StdMutex::new(None)),
        }
    }

    fn token_is_current(&self, token: u64) -> bool {
        self.run_token.load(Ordering::SeqCst) == token
    }

    /// Start executing a plan. Task ids for every step are reserved before
    /// anything runs, so cancel-remaining can address steps that have not
    /// yet been submitted. Returns the run token, which doubles as the
    /// batch id.
    pub fn execute(&self, plan: Vec<UpgradePlanStep>) -> u64 {
        let token = self.run_token.fetch_add(1, Ordering::SeqCst) + 1;

        let planned: Vec<PlannedTask> = plan
            .into_iter()
            .map(|step| {
                let mut label = TaskLabel::new(&step.reason_label_key);
                label.args = step.reason_label_args.clone();
                label = label.arg("plan_step_id", &step.step_id);
                PlannedTask {
                    package: PackageRef::new(step.manager, &step.package_name),
                    candidate_version: step.candidate_version,
                    authority_rank: step.authority.rank(),
                    task_id: self.runtime.coordinator().reserve_id(),
                    step_id: step.step_id,
                    label,
                }
            })
            .collect();

        {
            let mut active = self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            *active = Some(ActiveRun {
                token,
                tasks: planned.iter().map(|planned| planned.task_id).collect(),
            });
        }

        let executor = self.clone();
        tokio::spawn(async move {
            executor.drive(token, planned).await;
        });

        token
    }

    async fn drive(self, token: u64, planned: Vec<PlannedTask>) {
        let mut ranks: Vec<u8> = planned.iter().map(|planned| planned.authority_rank).collect();
        ranks.sort_unstable();
        ranks.dedup();

        for rank in ranks {
            if !self.token_is_current(token) {
                tracing::debug!(token, "upgrade run superseded; stopping");
                return;
            }

            let mut submitted = Vec::new();
            for step in planned.iter().filter(|step| step.authority_rank == rank) {
                let request = AdapterRequest::Upgrade {
                    package: step.package.clone(),
                    candidate_version: step.candidate_version.clone(),
                };
                match self
                    .runtime
                    .submit_reserved(
                        step.task_id,
                        step.package.manager,
                        request,
                        step.label.clone(),
                    )
                    .await
                {
                    Ok(task_id) => submitted.push(task_id),
                    Err(error) => {
                        tracing::warn!(
                            step = %step.step_id,
                            kind = error.kind.as_str(),
                            "plan step rejected at submission: {}",
                            error.message
                        );
                    }
                }
            }

            // Phase barrier: every submitted step terminal, or the phase
            // timeout invalidates the whole run.
            let deadline = tokio::time::Instant::now() + PHASE_TIMEOUT;
            for task_id in submitted {
                if !self.token_is_current(token) {
                    return;
                }
                let remaining = deadline
                    .checked_duration_since(tokio::time::Instant::now())
                    .unwrap_or(Duration::ZERO);
                let waited = self
                    .runtime
                    .coordinator()
                    .wait_terminal(task_id, Some(remaining.max(Duration::from_millis(1))))
                    .await;
                if waited.is_err() {
                    tracing::warn!(token, task = %task_id, "phase timed out; invalidating run");
                    let _ = self.run_token.compare_exchange(
                        token,
                        token + 1,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                    return;
                }
            }
        }
    }

    /// Invalidate the current run and cancel every scoped task: running,
    /// queued, and reserved-but-unsubmitted alike.
    pub async fn cancel_remaining(&self) -> CoreResult<usize> {
        self.run_token.fetch_add(1, Ordering::SeqCst);

        let tasks = {
            let mut active = self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            active.take().map(|run| run.tasks).unwrap_or_default()
        };

        let mut cancelled = 0_usize;
        for task_id in tasks {
            if self.runtime.coordinator().cancel(task_id).await? {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    /// True while a run token is live and unconsumed.
    pub fn has_active_run(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ManagerAuthority;

    fn outdated(manager: ManagerId, name: &str) -> OutdatedPackage {
        OutdatedPackage {
            package: PackageRef::new(manager, name),
            installed_version: Some("1.0.0".to_string()),
            candidate_version: "2.0.0".to_string(),
            pinned: false,
            restart_required: false,
        }
    }

    fn all_enabled() -> HashSet<ManagerId> {
        ManagerId::ALL.into_iter().collect()
    }

    #[test]
    fn plan_orders_by_authority_then_registry_position() {
        let packages = vec![
            outdated(ManagerId::HomebrewFormula, "git"),
            outdated(ManagerId::Npm, "eslint"),
            outdated(ManagerId::Mise, "node"),
            outdated(ManagerId::SoftwareUpdate, "macOS Sequoia 15.3.2"),
        ];
        let plan = compute_plan(
            &packages,
            &HashSet::new(),
            &all_enabled(),
            false,
            PlanOptions {
                include_pinned: false,
                allow_os_updates: true,
            },
        );

        let ids: Vec<&str> = plan.iter().map(|step| step.step_id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "mise:node",
                "npm:eslint",
                "homebrew_formula:git",
                "softwareupdate:__confirm_os_updates__"
            ]
        );
        let indices: Vec<usize> = plan.iter().map(|step| step.order_index).collect();
        assert_eq!(indices, [0, 1, 2, 3]);
        assert_eq!(plan[0].authority, ManagerAuthority::Authoritative);

        // Package steps carry the candidate they were planned against; the
        // synthetic OS step covers a set of labels and carries none.
        assert_eq!(plan[0].candidate_version.as_deref(), Some("2.0.0"));
        assert_eq!(plan[3].candidate_version, None);
    }

    #[test]
    fn plan_is_deterministic_across_recomputation() {
        let packages = vec![
            outdated(ManagerId::Npm, "typescript"),
            outdated(ManagerId::Npm, "eslint"),
            outdated(ManagerId::Mise, "node"),
        ];
        let first = compute_plan(
            &packages,
            &HashSet::new(),
            &all_enabled(),
            false,
            PlanOptions::default(),
        );
        let second = compute_plan(
            &packages,
            &HashSet::new(),
            &all_enabled(),
            false,
            PlanOptions::default(),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn pinned_packages_are_excluded_unless_requested() {
        let mut eslint = outdated(ManagerId::Npm, "eslint");
        eslint.pinned = true;
        let packages = vec![eslint, outdated(ManagerId::Npm, "typescript")];

        let without = compute_plan(
            &packages,
            &HashSet::new(),
            &all_enabled(),
            false,
            PlanOptions::default(),
        );
        assert_eq!(without.len(), 1);
        assert_eq!(without[0].package_name, "typescript");

        let with = compute_plan(
            &packages,
            &HashSet::new(),
            &all_enabled(),
            false,
            PlanOptions {
                include_pinned: true,
                allow_os_updates: false,
            },
        );
        assert_eq!(with.len(), 2);
    }

    #[test]
    fn virtual_pins_filter_by_external_id() {
        let packages = vec![outdated(ManagerId::Npm, "eslint")];
        let pins: HashSet<String> = ["npm:eslint".to_string()].into();
        let plan = compute_plan(
            &packages,
            &pins,
            &all_enabled(),
            false,
            PlanOptions::default(),
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn safe_mode_and_allow_flag_gate_os_updates() {
        let packages = vec![outdated(ManagerId::SoftwareUpdate, "macOS 15")];

        let safe = compute_plan(
            &packages,
            &HashSet::new(),
            &all_enabled(),
            true,
            PlanOptions {
                include_pinned: false,
                allow_os_updates: true,
            },
        );
        assert!(safe.is_empty());

        let not_allowed = compute_plan(
            &packages,
            &HashSet::new(),
            &all_enabled(),
            false,
            PlanOptions::default(),
        );
        assert!(not_allowed.is_empty());

        let allowed = compute_plan(
            &packages,
            &HashSet::new(),
            &all_enabled(),
            false,
            PlanOptions {
                include_pinned: false,
                allow_os_updates: true,
            },
        );
        assert_eq!(allowed.len(), 1);
        assert_eq!(allowed[0].step_id, "softwareupdate:__confirm_os_updates__");
    }

    #[test]
    fn disabled_managers_contribute_no_steps() {
        let packages = vec![outdated(ManagerId::Npm, "eslint")];
        let enabled: HashSet<ManagerId> = [ManagerId::HomebrewFormula].into();
        let plan = compute_plan(
            &packages,
            &HashSet::new(),
            &enabled,
            false,
            PlanOptions::default(),
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn duplicate_outdated_rows_collapse_to_one_step() {
        let packages = vec![
            outdated(ManagerId::Npm, "eslint"),
            outdated(ManagerId::Npm, "eslint"),
        ];
        let plan = compute_plan(
            &packages,
            &HashSet::new(),
            &all_enabled(),
            false,
            PlanOptions::default(),
        );
        assert_eq!(plan.len(), 1);
    }
}
