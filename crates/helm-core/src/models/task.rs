use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::models::{ErrorKind, ManagerId, Operation};

#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Detection,
    Refresh,
    Search,
    Install,
    Uninstall,
    Upgrade,
    Pin,
    Unpin,
    SelfUpdate,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detection => "detection",
            Self::Refresh => "refresh",
            Self::Search => "search",
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Upgrade => "upgrade",
            Self::Pin => "pin",
            Self::Unpin => "unpin",
            Self::SelfUpdate => "self_update",
        }
    }

    pub fn for_operation(operation: Operation) -> Self {
        match operation {
            Operation::Detect => Self::Detection,
            Operation::ListInstalled | Operation::ListOutdated => Self::Refresh,
            Operation::Search => Self::Search,
            Operation::Install => Self::Install,
            Operation::Uninstall => Self::Uninstall,
            Operation::Upgrade => Self::Upgrade,
            Operation::Pin => Self::Pin,
            Operation::Unpin => Self::Unpin,
            Operation::SelfUpdate => Self::SelfUpdate,
        }
    }

    /// Task types that hold the per-manager serial slot. Detection and Search
    /// may overlap with them and with each other.
    pub fn is_serial(self) -> bool {
        !matches!(self, Self::Detection | Self::Search)
    }
}

impl std::str::FromStr for TaskType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "detection" => Ok(Self::Detection),
            "refresh" => Ok(Self::Refresh),
            "search" => Ok(Self::Search),
            "install" => Ok(Self::Install),
            "uninstall" => Ok(Self::Uninstall),
            "upgrade" => Ok(Self::Upgrade),
            "pin" => Ok(Self::Pin),
            "unpin" => Ok(Self::Unpin),
            "self_update" => Ok(Self::SelfUpdate),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Legal transitions form a DAG:
    /// Queued → Running → {Completed, Failed, Cancelled}; Queued → Cancelled.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match (self, next) {
            (Self::Queued, Self::Running) => true,
            (Self::Queued, Self::Cancelled) => true,
            (Self::Running, Self::Completed | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

/// Presentation label as a localization key plus structured arguments. The
/// engine never emits display strings.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskLabel {
    pub key: String,
    pub args: BTreeMap<String, String>,
}

impl TaskLabel {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub manager: ManagerId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub label: TaskLabel,
    pub created_at: SystemTime,
    pub terminal_at: Option<SystemTime>,
    pub error_kind: Option<ErrorKind>,
}

/// Captured child-process output for a task. Present only for tasks whose
/// adapter spawned a process.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_form_the_expected_dag() {
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Cancelled));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Cancelled));

        assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Cancelled.can_transition_to(TaskStatus::Queued));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Cancelled));
    }

    #[test]
    fn list_operations_share_the_refresh_task_type() {
        assert_eq!(
            TaskType::for_operation(Operation::ListInstalled),
            TaskType::Refresh
        );
        assert_eq!(
            TaskType::for_operation(Operation::ListOutdated),
            TaskType::Refresh
        );
    }

    #[test]
    fn detection_and_search_are_not_serial() {
        assert!(!TaskType::Detection.is_serial());
        assert!(!TaskType::Search.is_serial());
        assert!(TaskType::Upgrade.is_serial());
        assert!(TaskType::Refresh.is_serial());
        assert!(TaskType::SelfUpdate.is_serial());
    }
}
