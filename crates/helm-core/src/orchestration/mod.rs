pub mod coordinator;
pub mod planner;
pub mod refresh;
pub mod runtime;
pub mod search;

pub use coordinator::{TaskCoordinator, TaskSpec};
pub use planner::{PlanExecutor, PlanOptions, compute_plan};
pub use refresh::RefreshOrchestrator;
pub use runtime::AdapterRuntime;
pub use search::SearchPipeline;

/// Change notification published to embedders that subscribe for push
/// semantics. Consumers re-read snapshots; events carry no payload beyond
/// the changed domain.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EngineEvent {
    TasksChanged,
    PackagesChanged,
    ManagersChanged,
    SearchCacheChanged,
}

use std::collections::HashSet;

use crate::models::ManagerId;
use crate::persistence::StatusStore;
use crate::registry;
use crate::sqlite::SqliteStore;

/// Effective enabled state: descriptor default unless the user has toggled.
pub(crate) fn manager_enabled(store: &SqliteStore, manager: ManagerId) -> bool {
    let default = registry::descriptor(manager).default_enabled;
    store
        .manager_enabled_overrides()
        .ok()
        .and_then(|overrides| overrides.get(&manager).copied())
        .unwrap_or(default)
}

pub(crate) fn detected_managers(store: &SqliteStore) -> HashSet<ManagerId> {
    store
        .list_detections()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(manager, info)| info.installed.then_some(manager))
        .collect()
}
