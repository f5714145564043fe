//! Adapter execution runtime: resolves the adapter, gates on capability and
//! input validity before anything is queued, runs the adapter on a blocking
//! thread under the task's ambient context, and folds the typed response
//! into the store. Clones share all state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::adapters::contract::{
    AdapterRequest, AdapterResponse, ManagerAdapter, UpgradeVerification, ensure_supported,
    execute_checked,
};
use crate::models::{CoreError, CoreResult, ManagerId, TaskId, TaskLabel, TaskRecord, TaskType};
use crate::orchestration::EngineEvent;
use crate::orchestration::coordinator::{TaskCoordinator, TaskSpec, boxed_operation};
use crate::persistence::{PackageStore, SearchCacheStore, StatusStore};
use crate::registry;
use crate::sqlite::SqliteStore;
use crate::task_context;

const OUTCOME_CAP: usize = 512;

type OutcomeMap = Arc<StdMutex<HashMap<TaskId, CoreResult<AdapterResponse>>>>;

#[derive(Clone)]
pub struct AdapterRuntime {
    adapters: Arc<HashMap<ManagerId, Arc<dyn ManagerAdapter>>>,
    coordinator: TaskCoordinator,
    store: Arc<SqliteStore>,
    events: broadcast::Sender<EngineEvent>,
    outcomes: OutcomeMap,
}

impl AdapterRuntime {
    pub fn new(
        adapters: impl IntoIterator<Item = Arc<dyn ManagerAdapter>>,
        coordinator: TaskCoordinator,
        store: Arc<SqliteStore>,
        events: broadcast::Sender<EngineEvent>,
    ) -> CoreResult<Self> {
        let mut mapped = HashMap::new();
        for adapter in adapters {
            let manager = adapter.id();
            if mapped.insert(manager, adapter).is_some() {
                return Err(CoreError::internal(format!(
                    "duplicate adapter registration for manager '{manager}'"
                )));
            }
        }
        Ok(Self {
            adapters: Arc::new(mapped),
            coordinator,
            store,
            events,
            outcomes: Arc::new(StdMutex::new(HashMap::new())),
        })
    }

    pub fn coordinator(&self) -> &TaskCoordinator {
        &self.coordinator
    }

    pub fn has_adapter(&self, manager: ManagerId) -> bool {
        self.adapters.contains_key(&manager)
    }

    /// Validate and queue an adapter request. Capability and input failures
    /// are rejected here, before any task exists or process spawns.
    pub async fn submit(
        &self,
        manager: ManagerId,
        request: AdapterRequest,
        label: TaskLabel,
    ) -> CoreResult<TaskId> {
        let task_id = self.coordinator.reserve_id();
        self.submit_reserved(task_id, manager, request, label).await
    }

    pub async fn submit_reserved(
        &self,
        task_id: TaskId,
        manager: ManagerId,
        request: AdapterRequest,
        label: TaskLabel,
    ) -> CoreResult<TaskId> {
        let operation = request.operation();
        let task_type = TaskType::for_operation(operation);

        let descriptor = registry::descriptor(manager);
        if !descriptor.is_implemented {
            return Err(CoreError::not_installed(
                manager,
                format!("manager '{manager}' has no adapter in this build"),
            )
            .for_task_type(task_type)
            .for_operation(operation));
        }
        ensure_supported(descriptor, operation).map_err(|error| error.for_task_type(task_type))?;
        if let Some(package) = request.package() {
            crate::adapters::support::validate_package_name(manager, operation, &package.name)?;
        }

        let adapter = self.adapters.get(&manager).cloned().ok_or_else(|| {
            CoreError::internal(format!("no adapter registered for manager '{manager}'"))
        })?;

        let runtime = self.clone();
        let spec = TaskSpec {
            manager,
            task_type,
            label,
        };

        self.coordinator
            .submit_reserved(
                task_id,
                spec,
                boxed_operation(move |task_id, cancel| async move {
                    let executed = tokio::task::spawn_blocking({
                        let adapter = adapter.clone();
                        let cancel = cancel.clone();
                        move || {
                            task_context::scoped(task_id, cancel, || {
                                execute_checked(adapter.as_ref(), request)
                            })
                        }
                    })
                    .await
                    .map_err(|join_error| {
                        CoreError::internal(format!(
                            "adapter execution join failure: {join_error}"
                        ))
                    })?;

                    match executed {
                        Ok(response) => {
                            runtime.apply_effects(manager, &response);
                            runtime.stash(task_id, Ok(response));
                            Ok(())
                        }
                        Err(error) => {
                            let attributed = error.attributed(manager, task_type, operation);
                            runtime.stash(task_id, Err(attributed.clone()));
                            Err(attributed)
                        }
                    }
                }),
            )
            .await
    }

    /// Fold a successful adapter response into durable state.
    fn apply_effects(&self, manager: ManagerId, response: &AdapterResponse) {
        let applied = match response {
            AdapterResponse::Detection(info) => {
                let result = self.store.upsert_detection(manager, info);
                self.publish(EngineEvent::ManagersChanged);
                result
            }
            AdapterResponse::Installed(packages) => {
                let result = self.store.replace_installed(manager, packages);
                self.publish(EngineEvent::PackagesChanged);
                result
            }
            AdapterResponse::Outdated(packages) => {
                let result = self.store.replace_outdated(manager, packages);
                self.publish(EngineEvent::PackagesChanged);
                result
            }
            AdapterResponse::SearchResults(hits) => {
                let result = self.store.merge_hits(hits);
                self.publish(EngineEvent::SearchCacheChanged);
                result
            }
            AdapterResponse::Upgraded(report) => {
                // The adapter verified against a fresh outdated listing;
                // drop the row so snapshots agree with the oracle. A package
                // still pending at a newer candidate keeps its row until the
                // next refresh rewrites it.
                let result = match &report.verification {
                    UpgradeVerification::StillOutdated { .. } => Ok(()),
                    _ => self.store.remove_outdated(&report.package),
                };
                self.publish(EngineEvent::PackagesChanged);
                result
            }
            AdapterResponse::Mutated(_) => Ok(()),
        };

        if let Err(error) = applied {
            tracing::warn!(
                manager = %manager,
                kind = error.kind.as_str(),
                "failed to persist adapter response: {}",
                error.message
            );
        }
    }

    fn stash(&self, task_id: TaskId, outcome: CoreResult<AdapterResponse>) {
        let mut outcomes = self.outcomes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if outcomes.len() >= OUTCOME_CAP
            && let Some(&oldest) = outcomes.keys().min()
        {
            outcomes.remove(&oldest);
        }
        outcomes.insert(task_id, outcome);
    }

    /// Wait for a submitted task and return the adapter's typed response.
    /// A task that reached a terminal status without an outcome is an
    /// internal fault, surfaced as such rather than left Running.
    pub async fn wait_for_response(
        &self,
        task_id: TaskId,
        timeout: Option<Duration>,
    ) -> CoreResult<(TaskRecord, CoreResult<AdapterResponse>)> {
        let record = self.coordinator.wait_terminal(task_id, timeout).await?;
        let outcome = {
            let mut outcomes = self.outcomes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            outcomes.remove(&task_id)
        };

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => match record.status {
                crate::models::TaskStatus::Cancelled => {
                    Err(CoreError::cancelled("task cancelled before execution")
                        .for_manager(record.manager)
                        .for_task_type(record.task_type))
                }
                _ => Err(CoreError::internal(format!(
                    "task '{task_id}' reached {:?} without an adapter outcome",
                    record.status
                ))
                .for_manager(record.manager)
                .for_task_type(record.task_type)),
            },
        };

        Ok((record, outcome))
    }

    fn publish(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}
