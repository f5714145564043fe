//! Authority-phased refresh: detect, then list, phase by phase. A phase
//! advances only when every task it spawned is terminal; one manager's
//! failure never blocks the others.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::adapters::contract::{AdapterRequest, AdapterResponse};
use crate::models::{
    Capability, CoreError, CoreResult, DetectionInfo, ManagerAuthority, ManagerId, SearchQuery,
    TaskLabel, TaskType,
};
use crate::orchestration::runtime::AdapterRuntime;
use crate::orchestration::{detected_managers, manager_enabled};
use crate::persistence::StatusStore;
use crate::registry;
use crate::sqlite::SqliteStore;

/// Detection-only managers are re-probed only outside this window.
pub const DETECTION_FRESHNESS_SECS: i64 = 300;

/// Ceiling on a single manager's refresh chain.
const MANAGER_CHAIN_TIMEOUT: Duration = Duration::from_secs(300);

pub struct RefreshOrchestrator {
    runtime: AdapterRuntime,
    store: Arc<SqliteStore>,
    warmup_search: bool,
}

impl RefreshOrchestrator {
    pub fn new(runtime: AdapterRuntime, store: Arc<SqliteStore>) -> Self {
        Self {
            runtime,
            store,
            warmup_search: false,
        }
    }

    /// Opportunistic empty-query searches after a successful refresh chain,
    /// for managers that declare Search.
    pub fn with_warmup_search(mut self, warmup_search: bool) -> Self {
        self.warmup_search = warmup_search;
        self
    }

    /// Run every enabled, implemented manager through detection and listing,
    /// one authority phase at a time. Returns per-manager outcomes.
    pub async fn refresh_all_ordered(&self) -> Vec<(ManagerId, CoreResult<()>)> {
        let mut results = Vec::new();

        for phase in registry::authority_phases(true) {
            let mut join_set: JoinSet<(ManagerId, CoreResult<()>)> = JoinSet::new();

            for manager in phase {
                let descriptor = registry::descriptor(manager);
                if !descriptor.is_implemented
                    || !self.runtime.has_adapter(manager)
                    || !manager_enabled(&self.store, manager)
                {
                    continue;
                }

                let runtime = self.runtime.clone();
                let store = self.store.clone();
                let warmup_search = self.warmup_search;
                join_set.spawn(async move {
                    let outcome =
                        refresh_manager(&runtime, &store, manager, warmup_search).await;
                    (manager, outcome)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((manager, outcome)) => {
                        if let Err(error) = &outcome {
                            tracing::warn!(
                                manager = %manager,
                                kind = error.kind.as_str(),
                                "refresh failed: {}",
                                error.message
                            );
                        }
                        results.push((manager, outcome));
                    }
                    Err(join_error) => {
                        tracing::error!("refresh chain panicked: {join_error}");
                    }
                }
            }
        }

        results
    }
}

async fn refresh_manager(
    runtime: &AdapterRuntime,
    store: &Arc<SqliteStore>,
    manager: ManagerId,
    warmup_search: bool,
) -> CoreResult<()> {
    let descriptor = registry::descriptor(manager);
    let timeout = Some(MANAGER_CHAIN_TIMEOUT);

    // Detection-only managers re-probe lazily; everything else always does.
    let skip_detection = descriptor.authority == ManagerAuthority::DetectionOnly
        && detected_managers(store).contains(&manager)
        && store
            .detection_fresh(manager, DETECTION_FRESHNESS_SECS)
            .unwrap_or(false);

    let detected = if skip_detection {
        true
    } else {
        let label = TaskLabel::new("service.task.label.detection")
            .arg("manager", descriptor.display_name);
        let task_id = match runtime
            .coordinator()
            .find_inflight(manager, TaskType::Detection, None)?
        {
            Some(existing) => existing,
            None => {
                runtime
                    .submit(manager, AdapterRequest::Detect, label)
                    .await?
            }
        };
        let (_, outcome) = runtime.wait_for_response(task_id, timeout).await?;
        match outcome {
            Ok(AdapterResponse::Detection(info)) => info.installed,
            Ok(other) => {
                return Err(CoreError::internal(format!(
                    "detection returned unexpected response {other:?}"
                ))
                .for_manager(manager));
            }
            Err(error) => {
                // Detection truth follows the latest terminal detection
                // task: a failed probe reads as not detected.
                let _ = store.upsert_detection(manager, &DetectionInfo::default());
                return Err(error);
            }
        }
    };

    if !detected {
        return Ok(());
    }

    if descriptor.supports(Capability::ListInstalled) {
        let label = TaskLabel::new("service.task.label.refresh.installed")
            .arg("manager", descriptor.display_name);
        let task_id = runtime
            .submit(manager, AdapterRequest::ListInstalled, label)
            .await?;
        let (_, outcome) = runtime.wait_for_response(task_id, timeout).await?;
        outcome?;
    }

    if descriptor.supports(Capability::ListOutdated) {
        let label = TaskLabel::new("service.task.label.refresh.outdated")
            .arg("manager", descriptor.display_name);
        let task_id = runtime
            .submit(manager, AdapterRequest::ListOutdated, label)
            .await?;
        let (_, outcome) = runtime.wait_for_response(task_id, timeout).await?;
        outcome?;
    }

    if warmup_search && descriptor.supports(Capability::Search) {
        let label = TaskLabel::new("service.task.label.search.manager")
            .arg("manager", descriptor.display_name);
        let task_id = runtime
            .submit(
                manager,
                AdapterRequest::Search {
                    query: SearchQuery::new(""),
                },
                label,
            )
            .await?;
        // Warmup results are cache enrichment only; a failure is logged by
        // the coordinator and does not fail the refresh.
        let _ = runtime.wait_for_response(task_id, timeout).await;
    }

    Ok(())
}
