//! Progressive search: the local cache answers synchronously, remote
//! fan-outs are debounced, superseded fan-outs are cancelled after a short
//! grace, and completions enrich the cache instead of replacing it.
//! Clones share all state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use crate::adapters::contract::AdapterRequest;
use crate::models::{
    Capability, CoreResult, ManagerId, SearchHit, SearchQuery, TaskId, TaskLabel, TaskType,
};
use crate::orchestration::runtime::AdapterRuntime;
use crate::orchestration::{detected_managers, manager_enabled};
use crate::persistence::SearchCacheStore;
use crate::registry;
use crate::sqlite::SqliteStore;

/// Single documented debounce between the last query change and the remote
/// fan-out.
pub const REMOTE_DEBOUNCE: Duration = Duration::from_millis(300);

/// Near-complete remote searches get this long to land and enrich the cache
/// before a superseding query kills them.
pub const SUPERSEDE_GRACE: Duration = Duration::from_millis(200);

const LOCAL_RESULT_LIMIT: usize = 500;

#[derive(Default)]
struct PipelineState {
    active_fanout: Vec<TaskId>,
    debounce: Option<tokio::task::JoinHandle<()>>,
}

#[derive(Clone)]
pub struct SearchPipeline {
    runtime: AdapterRuntime,
    store: Arc<SqliteStore>,
    state: Arc<StdMutex<PipelineState>>,
    generation: Arc<AtomicU64>,
}

impl SearchPipeline {
    pub fn new(runtime: AdapterRuntime, store: Arc<SqliteStore>) -> Self {
        Self {
            runtime,
            store,
            state: Arc::new(StdMutex::new(PipelineState::default())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Query the local cache synchronously.
    pub fn search_local(&self, query: &str) -> CoreResult<Vec<SearchHit>> {
        self.store.query_local(query, LOCAL_RESULT_LIMIT)
    }

    /// Record a query change: answer locally now, supersede the in-flight
    /// fan-out, and schedule a debounced remote fan-out for non-empty text.
    pub fn set_query(&self, query: &str) -> CoreResult<Vec<SearchHit>> {
        let local = self.search_local(query)?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let superseded = {
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(debounce) = state.debounce.take() {
                debounce.abort();
            }
            std::mem::take(&mut state.active_fanout)
        };
        self.cancel_after_grace(superseded);

        let trimmed = query.trim().to_string();
        if !trimmed.is_empty() {
            let pipeline = self.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(REMOTE_DEBOUNCE).await;
                if pipeline.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                pipeline.fan_out(generation, &trimmed).await;
            });
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.debounce = Some(handle);
        }

        Ok(local)
    }

    /// Debounce fired and the query is still current: one Search task per
    /// eligible manager.
    async fn fan_out(&self, generation: u64, query: &str) {
        let detected = detected_managers(&self.store);
        let mut submitted = Vec::new();

        for manager in ManagerId::ALL {
            if !self.eligible_for_remote(manager, &detected) {
                continue;
            }
            match self.submit_remote(manager, query).await {
                Ok(task_id) => submitted.push(task_id),
                Err(error) => {
                    tracing::debug!(
                        manager = %manager,
                        kind = error.kind.as_str(),
                        "remote search not submitted: {}",
                        error.message
                    );
                }
            }
        }

        let stale = {
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if self.generation.load(Ordering::SeqCst) == generation {
                state.active_fanout = submitted;
                Vec::new()
            } else {
                // Superseded while submitting; these are already stale.
                submitted
            }
        };
        self.cancel_after_grace(stale);
    }

    /// Submit a remote search for one manager, reusing a matching in-flight
    /// task when one exists.
    pub async fn trigger_remote_for_manager(
        &self,
        manager: ManagerId,
        query: &str,
    ) -> CoreResult<TaskId> {
        self.submit_remote(manager, query.trim()).await
    }

    /// Warmup fan-out (empty query). Deliberately not tracked as the active
    /// interactive fan-out, so query changes never cancel it.
    pub async fn warmup(&self) -> Vec<TaskId> {
        let detected = detected_managers(&self.store);
        let mut submitted = Vec::new();
        for manager in ManagerId::ALL {
            if !self.eligible_for_remote(manager, &detected) {
                continue;
            }
            if let Ok(task_id) = self.submit_remote(manager, "").await {
                submitted.push(task_id);
            }
        }
        submitted
    }

    async fn submit_remote(&self, manager: ManagerId, query: &str) -> CoreResult<TaskId> {
        let label = search_label(manager, query);
        if let Some(existing) =
            self.runtime
                .coordinator()
                .find_inflight(manager, TaskType::Search, Some(&label))?
        {
            return Ok(existing);
        }
        self.runtime
            .submit(
                manager,
                AdapterRequest::Search {
                    query: SearchQuery::new(query),
                },
                label,
            )
            .await
    }

    fn eligible_for_remote(
        &self,
        manager: ManagerId,
        detected: &std::collections::HashSet<ManagerId>,
    ) -> bool {
        let descriptor = registry::descriptor(manager);
        descriptor.is_implemented
            && descriptor.supports(Capability::Search)
            && self.runtime.has_adapter(manager)
            && manager_enabled(&self.store, manager)
            && detected.contains(&manager)
    }

    fn cancel_after_grace(&self, task_ids: Vec<TaskId>) {
        if task_ids.is_empty() {
            return;
        }
        let coordinator = self.runtime.coordinator().clone();
        tokio::spawn(async move {
            tokio::time::sleep(SUPERSEDE_GRACE).await;
            for task_id in task_ids {
                if let Err(error) = coordinator.cancel(task_id).await {
                    tracing::debug!(
                        task = %task_id,
                        "stale search cancel failed: {}",
                        error.message
                    );
                }
            }
        });
    }
}

fn search_label(manager: ManagerId, query: &str) -> TaskLabel {
    let display_name = registry::descriptor(manager).display_name;
    if query.is_empty() {
        TaskLabel::new("service.task.label.search.manager").arg("manager", display_name)
    } else {
        TaskLabel::new("service.task.label.search.package")
            .arg("manager", display_name)
            .arg("query", query)
    }
}
