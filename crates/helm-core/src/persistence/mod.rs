//! Store contracts. The engine talks to these traits; `crate::sqlite` is the
//! durable implementation and tests swap in whatever they need.

use std::collections::HashMap;

use crate::models::{
    CoreResult, DetectionInfo, InstalledPackage, KegPolicy, ManagerId, OutdatedPackage,
    PackageKegPolicy, PackageRef, PinRecord, SearchHit, TaskLogLevel, TaskLogRecord, TaskOutput,
    TaskRecord,
};

pub trait MigrationStore: Send + Sync {
    fn schema_version(&self) -> CoreResult<i64>;

    fn migrate_to_latest(&self) -> CoreResult<()>;

    /// Drop everything and re-apply migrations. The destructive reset behind
    /// the boundary's `reset_database`.
    fn reset(&self) -> CoreResult<()>;
}

pub trait PackageStore: Send + Sync {
    /// Atomically replace the manager's installed set with a fresh listing.
    fn replace_installed(
        &self,
        manager: ManagerId,
        packages: &[InstalledPackage],
    ) -> CoreResult<()>;

    /// Atomically replace the manager's outdated set with a fresh listing.
    fn replace_outdated(&self, manager: ManagerId, packages: &[OutdatedPackage])
    -> CoreResult<()>;

    fn remove_outdated(&self, package: &PackageRef) -> CoreResult<()>;

    fn list_installed(&self) -> CoreResult<Vec<InstalledPackage>>;

    fn list_outdated(&self) -> CoreResult<Vec<OutdatedPackage>>;
}

pub trait PinStore: Send + Sync {
    fn upsert_pin(&self, pin: &PinRecord) -> CoreResult<()>;

    fn remove_pin(&self, package: &PackageRef) -> CoreResult<()>;

    fn pin_for(&self, package: &PackageRef) -> CoreResult<Option<PinRecord>>;

    fn list_pins(&self) -> CoreResult<Vec<PinRecord>>;
}

pub trait SearchCacheStore: Send + Sync {
    /// Insert hits keyed by `(source_manager, name)`. An existing row keeps
    /// its summary unless it was empty and the new hit carries one.
    fn merge_hits(&self, hits: &[SearchHit]) -> CoreResult<()>;

    fn query_local(&self, query: &str, limit: usize) -> CoreResult<Vec<SearchHit>>;
}

pub trait TaskStore: Send + Sync {
    fn insert_task(&self, task: &TaskRecord) -> CoreResult<()>;

    fn update_task(&self, task: &TaskRecord) -> CoreResult<()>;

    fn task(&self, task_id: crate::models::TaskId) -> CoreResult<Option<TaskRecord>>;

    /// Newest first.
    fn list_recent_tasks(&self, limit: usize) -> CoreResult<Vec<TaskRecord>>;

    fn max_task_id(&self) -> CoreResult<Option<u64>>;

    /// Delete terminal tasks older than `max_age_secs`, always keeping the
    /// newest `keep_newest` terminal records.
    fn prune_terminal_tasks(&self, max_age_secs: i64, keep_newest: usize) -> CoreResult<()>;

    fn record_output(&self, task_id: crate::models::TaskId, output: &TaskOutput)
    -> CoreResult<()>;

    fn task_output(&self, task_id: crate::models::TaskId) -> CoreResult<Option<TaskOutput>>;

    fn append_task_log(
        &self,
        task_id: crate::models::TaskId,
        level: TaskLogLevel,
        message: &str,
    ) -> CoreResult<()>;

    fn task_logs(
        &self,
        task_id: crate::models::TaskId,
        limit: usize,
    ) -> CoreResult<Vec<TaskLogRecord>>;
}

pub trait StatusStore: Send + Sync {
    fn upsert_detection(&self, manager: ManagerId, info: &DetectionInfo) -> CoreResult<()>;

    fn list_detections(&self) -> CoreResult<Vec<(ManagerId, DetectionInfo)>>;

    /// True when the manager has a detection row newer than `window_secs`.
    fn detection_fresh(&self, manager: ManagerId, window_secs: i64) -> CoreResult<bool>;

    fn set_manager_enabled(&self, manager: ManagerId, enabled: bool) -> CoreResult<()>;

    fn manager_enabled_overrides(&self) -> CoreResult<HashMap<ManagerId, bool>>;

    fn set_safe_mode(&self, enabled: bool) -> CoreResult<()>;

    fn safe_mode(&self) -> CoreResult<bool>;

    fn set_keg_auto_cleanup(&self, enabled: bool) -> CoreResult<()>;

    fn keg_auto_cleanup(&self) -> CoreResult<bool>;

    fn set_package_keg_policy(
        &self,
        package: &PackageRef,
        policy: Option<KegPolicy>,
    ) -> CoreResult<()>;

    fn package_keg_policy(&self, package: &PackageRef) -> CoreResult<Option<KegPolicy>>;

    fn list_package_keg_policies(&self) -> CoreResult<Vec<PackageKegPolicy>>;
}
