use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{ManagerAuthority, ManagerId};

/// Fixed synthetic step name for the single macOS system-update confirmation
/// step a plan may contain.
pub const OS_UPDATES_STEP_NAME: &str = "__confirm_os_updates__";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStepStatus {
    Pending,
    Submitted,
    Skipped,
}

/// One action of a computed upgrade plan. Derived, never persisted; the step
/// id is deterministic and round-trips through the `plan_step_id` label arg
/// of the task that executes it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UpgradePlanStep {
    pub step_id: String,
    pub order_index: usize,
    pub manager: ManagerId,
    pub authority: ManagerAuthority,
    pub package_name: String,
    /// Candidate the step was planned against; post-upgrade verification
    /// compares the re-queried candidate to this. None for the synthetic
    /// OS-updates step, which covers a whole set of labels.
    pub candidate_version: Option<String>,
    pub reason_label_key: String,
    pub reason_label_args: BTreeMap<String, String>,
    pub status: PlanStepStatus,
}

impl UpgradePlanStep {
    pub fn step_id_for(manager: ManagerId, package_name: &str) -> String {
        format!("{}:{package_name}", manager.as_str())
    }
}
