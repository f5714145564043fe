//! JSON-shaped boundary DTOs. The C ABI facade and the RPC host both encode
//! engine state through these types, so the wire shape is defined once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::{
    InstalledPackage, ManagerStatus, OutdatedPackage, PinRecord, SearchHit, TaskLogRecord,
    TaskOutput, TaskRecord, UpgradePlanStep,
};

fn unix(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
    pub id: u64,
    pub manager_id: String,
    pub task_type: String,
    pub status: String,
    pub label_key: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub label_args: BTreeMap<String, String>,
    pub created_at_unix: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub terminal_at_unix: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_kind: Option<String>,
}

impl From<&TaskRecord> for TaskDto {
    fn from(task: &TaskRecord) -> Self {
        Self {
            id: task.id.0,
            manager_id: task.manager.as_str().to_string(),
            task_type: task.task_type.as_str().to_string(),
            status: task.status.as_str().to_string(),
            label_key: task.label.key.clone(),
            label_args: task.label.args.clone(),
            created_at_unix: unix(task.created_at),
            terminal_at_unix: task.terminal_at.map(unix),
            error_kind: task.error_kind.map(|kind| kind.as_str().to_string()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPackageDto {
    pub manager_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub installed_version: Option<String>,
    pub pinned: bool,
}

impl From<&InstalledPackage> for InstalledPackageDto {
    fn from(package: &InstalledPackage) -> Self {
        Self {
            manager_id: package.package.manager.as_str().to_string(),
            name: package.package.name.clone(),
            installed_version: package.installed_version.clone(),
            pinned: package.pinned,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutdatedPackageDto {
    pub manager_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub installed_version: Option<String>,
    pub candidate_version: String,
    pub pinned: bool,
    pub restart_required: bool,
}

impl From<&OutdatedPackage> for OutdatedPackageDto {
    fn from(package: &OutdatedPackage) -> Self {
        Self {
            manager_id: package.package.manager.as_str().to_string(),
            name: package.package.name.clone(),
            installed_version: package.installed_version.clone(),
            candidate_version: package.candidate_version.clone(),
            pinned: package.pinned,
            restart_required: package.restart_required,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStatusDto {
    pub manager_id: String,
    pub detected: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub executable_path: Option<String>,
    pub enabled: bool,
    pub is_implemented: bool,
    pub capabilities: Vec<String>,
}

impl From<&ManagerStatus> for ManagerStatusDto {
    fn from(status: &ManagerStatus) -> Self {
        Self {
            manager_id: status.manager_id.as_str().to_string(),
            detected: status.detected,
            version: status.version.clone(),
            executable_path: status.executable_path.clone(),
            enabled: status.enabled,
            is_implemented: status.is_implemented,
            capabilities: status
                .capabilities
                .iter()
                .map(|capability| format!("{capability:?}"))
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHitDto {
    pub manager_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<String>,
    pub source_manager: String,
    pub origin_query: String,
}

impl From<&SearchHit> for SearchHitDto {
    fn from(hit: &SearchHit) -> Self {
        Self {
            manager_id: hit.candidate.package.manager.as_str().to_string(),
            name: hit.candidate.package.name.clone(),
            version: hit.candidate.version.clone(),
            summary: hit.candidate.summary.clone(),
            source_manager: hit.source_manager.as_str().to_string(),
            origin_query: hit.origin_query.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinDto {
    pub manager_id: String,
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub version: Option<String>,
    pub pinned_at_unix: i64,
}

impl From<&PinRecord> for PinDto {
    fn from(pin: &PinRecord) -> Self {
        Self {
            manager_id: pin.package.manager.as_str().to_string(),
            name: pin.package.name.clone(),
            kind: pin.kind.as_str().to_string(),
            version: pin.version.clone(),
            pinned_at_unix: unix(pin.pinned_at),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStepDto {
    pub step_id: String,
    pub order_index: usize,
    pub manager_id: String,
    pub authority: String,
    pub package_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub candidate_version: Option<String>,
    pub reason_label_key: String,
    pub reason_label_args: BTreeMap<String, String>,
}

impl From<&UpgradePlanStep> for PlanStepDto {
    fn from(step: &UpgradePlanStep) -> Self {
        Self {
            step_id: step.step_id.clone(),
            order_index: step.order_index,
            manager_id: step.manager.as_str().to_string(),
            authority: format!("{:?}", step.authority),
            package_name: step.package_name.clone(),
            candidate_version: step.candidate_version.clone(),
            reason_label_key: step.reason_label_key.clone(),
            reason_label_args: step.reason_label_args.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutputDto {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exit_code: Option<i32>,
    pub truncated: bool,
}

impl From<&TaskOutput> for TaskOutputDto {
    fn from(output: &TaskOutput) -> Self {
        Self {
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            exit_code: output.exit_code,
            truncated: output.truncated,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLogDto {
    pub id: u64,
    pub task_id: u64,
    pub level: String,
    pub message: String,
    pub created_at_unix: i64,
}

impl From<&TaskLogRecord> for TaskLogDto {
    fn from(log: &TaskLogRecord) -> Self {
        Self {
            id: log.id,
            task_id: log.task_id.0,
            level: log.level.as_str().to_string(),
            message: log.message.clone(),
            created_at_unix: unix(log.created_at),
        }
    }
}

pub fn to_dtos<'a, T, D: From<&'a T>>(items: &'a [T]) -> Vec<D> {
    items.iter().map(D::from).collect()
}
