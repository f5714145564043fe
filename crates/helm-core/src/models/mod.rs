pub mod error;
pub mod manager;
pub mod package;
pub mod pin;
pub mod plan;
pub mod policy;
pub mod search;
pub mod task;
pub mod task_log;

pub use error::{CoreError, CoreResult, ErrorKind};
pub use manager::{
    Capability, DetectionInfo, ManagerAuthority, ManagerCategory, ManagerDescriptor, ManagerId,
    ManagerStatus, Operation,
};
pub use package::{InstalledPackage, OutdatedPackage, PackageCandidate, PackageRef};
pub use pin::{PinKind, PinRecord};
pub use plan::{PlanStepStatus, UpgradePlanStep};
pub use policy::{KegPolicy, PackageKegPolicy, PolicyState};
pub use search::{SearchHit, SearchQuery};
pub use task::{TaskId, TaskLabel, TaskOutput, TaskRecord, TaskStatus, TaskType};
pub use task_log::{TaskLogLevel, TaskLogRecord};
