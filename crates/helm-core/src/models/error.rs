use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ManagerId, Operation, TaskType};

pub type CoreResult<T> = Result<T, CoreError>;

/// Tagged failure classification shared by every layer of the engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotInstalled,
    UnsupportedCapability,
    InvalidInput,
    ParseFailure,
    Timeout,
    Cancelled,
    ProcessFailure,
    StorageFailure,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotInstalled => "not_installed",
            Self::UnsupportedCapability => "unsupported_capability",
            Self::InvalidInput => "invalid_input",
            Self::ParseFailure => "parse_failure",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::ProcessFailure => "process_failure",
            Self::StorageFailure => "storage_failure",
            Self::Internal => "internal",
        }
    }

    /// Localization key handed to presentation layers. The engine never emits
    /// raw subprocess text across the boundary.
    pub fn error_key(self) -> &'static str {
        match self {
            Self::NotInstalled => "service.error.not_installed",
            Self::UnsupportedCapability => "service.error.unsupported_capability",
            Self::InvalidInput => "service.error.invalid_input",
            Self::ParseFailure => "service.error.parse_failure",
            Self::Timeout => "service.error.timeout",
            Self::Cancelled => "service.error.cancelled",
            Self::ProcessFailure => "service.error.process_failure",
            Self::StorageFailure => "service.error.storage_failure",
            Self::Internal => "service.error.internal",
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "not_installed" => Ok(Self::NotInstalled),
            "unsupported_capability" => Ok(Self::UnsupportedCapability),
            "invalid_input" => Ok(Self::InvalidInput),
            "parse_failure" => Ok(Self::ParseFailure),
            "timeout" => Ok(Self::Timeout),
            "cancelled" => Ok(Self::Cancelled),
            "process_failure" => Ok(Self::ProcessFailure),
            "storage_failure" => Ok(Self::StorageFailure),
            "internal" => Ok(Self::Internal),
            _ => Err(()),
        }
    }
}

/// Engine error with attribution. Attribution fields are filled in as the
/// error propagates; layers only set fields that are still `None`.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{}: {message}", kind.as_str())]
pub struct CoreError {
    pub kind: ErrorKind,
    pub manager: Option<ManagerId>,
    pub task_type: Option<TaskType>,
    pub operation: Option<Operation>,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            manager: None,
            task_type: None,
            operation: None,
            message: message.into(),
        }
    }

    pub fn not_installed(manager: ManagerId, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotInstalled, message).for_manager(manager)
    }

    pub fn unsupported(manager: ManagerId, operation: Operation) -> Self {
        Self {
            operation: Some(operation),
            ..Self::new(
                ErrorKind::UnsupportedCapability,
                format!(
                    "manager '{}' does not declare the capability required by '{operation:?}'",
                    manager.as_str()
                ),
            )
            .for_manager(manager)
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn parse_failure(manager: ManagerId, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailure, message).for_manager(manager)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn process_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProcessFailure, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageFailure, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn for_manager(mut self, manager: ManagerId) -> Self {
        self.manager.get_or_insert(manager);
        self
    }

    pub fn for_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type.get_or_insert(task_type);
        self
    }

    pub fn for_operation(mut self, operation: Operation) -> Self {
        self.operation.get_or_insert(operation);
        self
    }

    /// Fill any attribution field the originating layer left blank.
    pub fn attributed(self, manager: ManagerId, task_type: TaskType, operation: Operation) -> Self {
        self.for_manager(manager)
            .for_task_type(task_type)
            .for_operation(operation)
    }

    pub fn error_key(&self) -> &'static str {
        self.kind.error_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ManagerId, Operation, TaskType};

    #[test]
    fn attribution_does_not_overwrite_existing_fields() {
        let error = CoreError::parse_failure(ManagerId::Npm, "bad json").attributed(
            ManagerId::HomebrewFormula,
            TaskType::Refresh,
            Operation::ListOutdated,
        );

        assert_eq!(error.manager, Some(ManagerId::Npm));
        assert_eq!(error.task_type, Some(TaskType::Refresh));
        assert_eq!(error.operation, Some(Operation::ListOutdated));
    }

    #[test]
    fn error_kind_round_trips_through_str() {
        for kind in [
            ErrorKind::NotInstalled,
            ErrorKind::UnsupportedCapability,
            ErrorKind::InvalidInput,
            ErrorKind::ParseFailure,
            ErrorKind::Timeout,
            ErrorKind::Cancelled,
            ErrorKind::ProcessFailure,
            ErrorKind::StorageFailure,
            ErrorKind::Internal,
        ] {
            assert_eq!(kind.as_str().parse::<ErrorKind>(), Ok(kind));
        }
    }

    #[test]
    fn display_carries_kind_and_message() {
        let error = CoreError::invalid_input("package name cannot be empty");
        assert_eq!(
            error.to_string(),
            "invalid_input: package name cannot be empty"
        );
    }
}
