//! `CoreEngine` — the typed in-process boundary. One engine per data
//! directory; embedders construct as many as they need (tests point them at
//! temp dirs). No process-global state lives here.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::broadcast;

use crate::adapters::contract::{AdapterRequest, ManagerAdapter};
use crate::adapters::homebrew::KegPolicyLookup;
use crate::models::plan::OS_UPDATES_STEP_NAME;
use crate::models::{
    Capability, CoreError, CoreResult, InstalledPackage, KegPolicy, ManagerId, ManagerStatus,
    Operation, OutdatedPackage, PackageKegPolicy, PackageRef, PinKind, PinRecord, SearchHit,
    TaskId, TaskLabel, TaskLogRecord, TaskOutput, TaskRecord, UpgradePlanStep,
};
use crate::orchestration::{
    AdapterRuntime, EngineEvent, PlanExecutor, PlanOptions, RefreshOrchestrator, SearchPipeline,
    TaskCoordinator, compute_plan, manager_enabled,
};
use crate::persistence::{
    MigrationStore, PackageStore, PinStore, StatusStore, TaskStore,
};
use crate::registry;
use crate::sqlite::SqliteStore;

/// A refresh tracked longer than this is assumed wedged and its tracking
/// flag is released; the underlying tasks still reach terminal states
/// through runner timeouts.
pub const STUCK_REFRESH_VALVE: Duration = Duration::from_secs(120);

const WAIT_FOR_PIN: Duration = Duration::from_secs(120);
const TASK_PRUNE_MAX_AGE_SECS: i64 = 300;
const TASK_TERMINAL_KEEP: usize = 50;

pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub warmup_search: bool,
}

impl EngineConfig {
    /// `HELM_DATA_DIR` is the single recognized environment override.
    pub fn from_env() -> Self {
        let data_dir = std::env::var_os("HELM_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        Self {
            data_dir,
            warmup_search: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join("Library/Application Support/Helm"))
        .unwrap_or_else(|| PathBuf::from("."))
}

struct RefreshTracking {
    batch_id: u64,
    started: Instant,
}

type ErrorKeySlot = Arc<StdMutex<Option<String>>>;

fn note_error_key(slot: &ErrorKeySlot, error: &CoreError) {
    let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = Some(error.error_key().to_string());
}

pub struct CoreEngine {
    store: Arc<SqliteStore>,
    coordinator: TaskCoordinator,
    runtime: AdapterRuntime,
    search: SearchPipeline,
    plan_executor: PlanExecutor,
    events: broadcast::Sender<EngineEvent>,
    warmup_search: bool,
    last_error_key: ErrorKeySlot,
    refresh_tracking: Arc<StdMutex<Option<RefreshTracking>>>,
    batch_ids: AtomicU64,
}

/// Keg policy resolution backed by the settings store: per-package override
/// first, then the global auto-cleanup flag.
struct StoreKegPolicy {
    store: Arc<SqliteStore>,
}

impl KegPolicyLookup for StoreKegPolicy {
    fn effective_policy(&self, package_name: &str) -> KegPolicy {
        let package = PackageRef::new(ManagerId::HomebrewFormula, package_name);
        if let Ok(Some(policy)) = self.store.package_keg_policy(&package) {
            return policy;
        }
        match self.store.keg_auto_cleanup() {
            Ok(true) => KegPolicy::Cleanup,
            _ => KegPolicy::Keep,
        }
    }
}

impl CoreEngine {
    /// Open against the production adapter set and process runner.
    #[cfg(unix)]
    pub fn open(config: EngineConfig) -> CoreResult<Arc<Self>> {
        let store = Arc::new(SqliteStore::open(config.data_dir.join("helm.sqlite3"))?);
        store.migrate_to_latest()?;

        let keg_policy: Arc<dyn KegPolicyLookup> = Arc::new(StoreKegPolicy {
            store: store.clone(),
        });
        let adapters = crate::adapters::production_adapters(
            Arc::new(crate::exec::TokioProcessRunner),
            Some(keg_policy),
        );
        Self::assemble(store, adapters, config.warmup_search)
    }

    /// Open with an explicit adapter set. The constructor tests and
    /// embedders with custom sources use.
    pub fn open_with_adapters(
        config: EngineConfig,
        adapters: Vec<Arc<dyn ManagerAdapter>>,
    ) -> CoreResult<Arc<Self>> {
        let store = Arc::new(SqliteStore::open(config.data_dir.join("helm.sqlite3"))?);
        store.migrate_to_latest()?;
        Self::assemble(store, adapters, config.warmup_search)
    }

    fn assemble(
        store: Arc<SqliteStore>,
        adapters: Vec<Arc<dyn ManagerAdapter>>,
        warmup_search: bool,
    ) -> CoreResult<Arc<Self>> {
        let (events, _) = broadcast::channel(256);
        let coordinator = TaskCoordinator::new(store.clone(), events.clone())?;
        let runtime = AdapterRuntime::new(
            adapters,
            coordinator.clone(),
            store.clone(),
            events.clone(),
        )?;
        let search = SearchPipeline::new(runtime.clone(), store.clone());
        let plan_executor = PlanExecutor::new(runtime.clone());

        Ok(Arc::new(Self {
            store,
            coordinator,
            runtime,
            search,
            plan_executor,
            events,
            warmup_search,
            last_error_key: Arc::new(StdMutex::new(None)),
            refresh_tracking: Arc::new(StdMutex::new(None)),
            batch_ids: AtomicU64::new(1),
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    fn note_error(&self, error: &CoreError) {
        note_error_key(&self.last_error_key, error);
    }

    fn fail<T>(&self, error: CoreError) -> CoreResult<T> {
        self.note_error(&error);
        Err(error)
    }

    /// Drain the most recent boundary-facing error key.
    pub fn take_last_error_key(&self) -> Option<String> {
        match self.last_error_key.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    // ----- refresh ---------------------------------------------------------

    /// Kick off an authority-phased refresh. Returns the batch id; a refresh
    /// already in flight (and younger than the stuck valve) is reused.
    pub fn trigger_refresh(&self) -> u64 {
        let mut tracking = self
            .refresh_tracking
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(live) = tracking.as_ref() {
            if live.started.elapsed() < STUCK_REFRESH_VALVE {
                return live.batch_id;
            }
            tracing::warn!(
                batch = live.batch_id,
                "refresh tracking flag stuck past valve; releasing"
            );
            *tracking = None;
        }

        let batch_id = self.batch_ids.fetch_add(1, Ordering::SeqCst);
        *tracking = Some(RefreshTracking {
            batch_id,
            started: Instant::now(),
        });
        drop(tracking);

        let runtime = self.runtime.clone();
        let store = self.store.clone();
        let warmup_search = self.warmup_search;
        let refresh_tracking = self.refresh_tracking.clone();
        let error_slot = self.last_error_key.clone();
        tokio::spawn(async move {
            let orchestrator = RefreshOrchestrator::new(runtime, store.clone())
                .with_warmup_search(warmup_search);
            let results = orchestrator.refresh_all_ordered().await;
            for (manager, outcome) in &results {
                if let Err(error) = outcome {
                    note_error_key(&error_slot, error);
                    tracing::warn!(manager = %manager, "refresh error: {}", error.message);
                }
            }
            let mut tracking = refresh_tracking
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if tracking.as_ref().is_some_and(|live| live.batch_id == batch_id) {
                *tracking = None;
            }
            drop(tracking);
            let _ = store.prune_terminal_tasks(TASK_PRUNE_MAX_AGE_SECS, TASK_TERMINAL_KEEP);
        });

        batch_id
    }

    // ----- task queries ----------------------------------------------------

    pub fn list_tasks(&self, limit: usize) -> CoreResult<Vec<TaskRecord>> {
        self.coordinator.list_recent(limit)
    }

    pub async fn cancel_task(&self, task_id: TaskId) -> bool {
        match self.coordinator.cancel(task_id).await {
            Ok(accepted) => accepted,
            Err(error) => {
                self.note_error(&error);
                false
            }
        }
    }

    pub fn get_task_output(&self, task_id: TaskId) -> CoreResult<Option<TaskOutput>> {
        self.store.task_output(task_id)
    }

    pub fn list_task_logs(&self, task_id: TaskId, limit: usize) -> CoreResult<Vec<TaskLogRecord>> {
        self.store.task_logs(task_id, limit)
    }

    // ----- package snapshots -----------------------------------------------

    pub fn list_installed_packages(&self) -> CoreResult<Vec<InstalledPackage>> {
        let pins = self.pin_keys()?;
        let mut packages = self.store.list_installed()?;
        for package in &mut packages {
            package.pinned = package.pinned || pins.contains(&package.package.external_id());
        }
        Ok(packages)
    }

    pub fn list_outdated_packages(&self) -> CoreResult<Vec<OutdatedPackage>> {
        let pins = self.pin_keys()?;
        let mut packages = self.store.list_outdated()?;
        for package in &mut packages {
            package.pinned = package.pinned || pins.contains(&package.package.external_id());
        }
        Ok(packages)
    }

    fn pin_keys(&self) -> CoreResult<HashSet<String>> {
        Ok(self
            .store
            .list_pins()?
            .into_iter()
            .map(|pin| pin.package.external_id())
            .collect())
    }

    pub fn list_manager_status(&self) -> CoreResult<Vec<ManagerStatus>> {
        let detections: std::collections::HashMap<_, _> =
            self.store.list_detections()?.into_iter().collect();

        Ok(ManagerId::ALL
            .into_iter()
            .map(|manager| {
                let descriptor = registry::descriptor(manager);
                let detection = detections.get(&manager);
                ManagerStatus {
                    manager_id: manager,
                    detected: detection.is_some_and(|info| info.installed),
                    version: detection
                        .and_then(|info| info.version.clone())
                        .map(|version| version.trim().to_string())
                        .filter(|version| !version.is_empty()),
                    executable_path: detection
                        .and_then(|info| info.executable_path.clone())
                        .map(|path| path.to_string_lossy().into_owned()),
                    enabled: manager_enabled(&self.store, manager),
                    is_implemented: descriptor.is_implemented,
                    capabilities: descriptor.capabilities.to_vec(),
                }
            })
            .collect())
    }

    pub fn set_manager_enabled(&self, manager: ManagerId, enabled: bool) -> CoreResult<()> {
        self.store.set_manager_enabled(manager, enabled)?;
        let _ = self.events.send(EngineEvent::ManagersChanged);
        Ok(())
    }

    // ----- search ----------------------------------------------------------

    /// Local-first search. Every call counts as a query change: cached rows
    /// come back synchronously and a debounced remote fan-out is scheduled.
    pub fn search_local(&self, query: &str) -> CoreResult<Vec<SearchHit>> {
        self.search
            .set_query(query)
            .or_else(|error| self.fail(error))
    }

    pub async fn trigger_remote_search_for_manager(
        &self,
        manager: ManagerId,
        query: &str,
    ) -> CoreResult<TaskId> {
        match self.search.trigger_remote_for_manager(manager, query).await {
            Ok(task_id) => Ok(task_id),
            Err(error) => self.fail(error),
        }
    }

    // ----- mutations -------------------------------------------------------

    pub async fn install_package(
        &self,
        manager: ManagerId,
        package_name: &str,
        version: Option<String>,
    ) -> CoreResult<TaskId> {
        let package = PackageRef::new(manager, package_name);
        let label = TaskLabel::new("service.task.label.install")
            .arg("manager", registry::descriptor(manager).display_name)
            .arg("package", package_name);
        match self
            .runtime
            .submit(manager, AdapterRequest::Install { package, version }, label)
            .await
        {
            Ok(task_id) => Ok(task_id),
            Err(error) => self.fail(error),
        }
    }

    pub async fn uninstall_package(
        &self,
        manager: ManagerId,
        package_name: &str,
    ) -> CoreResult<TaskId> {
        let package = PackageRef::new(manager, package_name);
        let label = TaskLabel::new("service.task.label.uninstall")
            .arg("manager", registry::descriptor(manager).display_name)
            .arg("package", package_name);
        match self
            .runtime
            .submit(manager, AdapterRequest::Uninstall { package }, label)
            .await
        {
            Ok(task_id) => Ok(task_id),
            Err(error) => self.fail(error),
        }
    }

    pub async fn upgrade_package(
        &self,
        manager: ManagerId,
        package_name: &str,
    ) -> CoreResult<TaskId> {
        // Safe mode rejects system updates before any task exists.
        if manager == ManagerId::SoftwareUpdate && self.store.safe_mode()? {
            return self.fail(
                CoreError::invalid_input("safe mode forbids macOS system updates")
                    .for_manager(manager)
                    .for_operation(Operation::Upgrade),
            );
        }

        // Verification compares against the candidate known right now; a
        // release landing mid-upgrade must not read as a failed upgrade.
        let candidate_version = self
            .store
            .list_outdated()?
            .into_iter()
            .find(|row| row.package.manager == manager && row.package.name == package_name)
            .map(|row| row.candidate_version);

        let package = PackageRef::new(manager, package_name);
        let label = TaskLabel::new("service.task.label.upgrade.package")
            .arg("manager", registry::descriptor(manager).display_name)
            .arg("package", package_name);
        match self
            .runtime
            .submit(
                manager,
                AdapterRequest::Upgrade {
                    package,
                    candidate_version,
                },
                label,
            )
            .await
        {
            Ok(task_id) => Ok(task_id),
            Err(error) => self.fail(error),
        }
    }

    // ----- pins ------------------------------------------------------------

    /// Pin natively when the manager supports it; otherwise record a virtual
    /// pin. Conflicting virtual writes over a native pin are refused.
    pub async fn pin_package(
        &self,
        manager: ManagerId,
        package_name: &str,
        version: Option<String>,
    ) -> CoreResult<bool> {
        let package = PackageRef::new(manager, package_name);
        let descriptor = registry::descriptor(manager);

        if descriptor.supports(Capability::Pin) && descriptor.is_implemented {
            let label = TaskLabel::new("service.task.label.pin")
                .arg("manager", descriptor.display_name)
                .arg("package", package_name);
            let task_id = match self
                .runtime
                .submit(
                    manager,
                    AdapterRequest::Pin {
                        package: package.clone(),
                        version: version.clone(),
                    },
                    label,
                )
                .await
            {
                Ok(task_id) => task_id,
                Err(error) => return self.fail(error),
            };
            let (_, outcome) = match self
                .runtime
                .wait_for_response(task_id, Some(WAIT_FOR_PIN))
                .await
            {
                Ok(result) => result,
                Err(error) => return self.fail(error),
            };
            if let Err(error) = outcome {
                return self.fail(error);
            }
            self.store.upsert_pin(&PinRecord {
                package,
                kind: PinKind::Native,
                version,
                pinned_at: SystemTime::now(),
            })?;
            let _ = self.events.send(EngineEvent::PackagesChanged);
            return Ok(true);
        }

        // Virtual pin. Native truth wins on conflict.
        if let Some(existing) = self.store.pin_for(&package)?
            && existing.kind == PinKind::Native
            && existing.version != version
        {
            return self.fail(
                CoreError::invalid_input(format!(
                    "'{}' carries a native pin at {:?}; refusing a conflicting virtual pin",
                    package.external_id(),
                    existing.version
                ))
                .for_manager(manager)
                .for_operation(Operation::Pin),
            );
        }

        self.store.upsert_pin(&PinRecord {
            package,
            kind: PinKind::Virtual,
            version,
            pinned_at: SystemTime::now(),
        })?;
        let _ = self.events.send(EngineEvent::PackagesChanged);
        Ok(true)
    }

    pub async fn unpin_package(&self, manager: ManagerId, package_name: &str) -> CoreResult<bool> {
        let package = PackageRef::new(manager, package_name);
        let descriptor = registry::descriptor(manager);

        if descriptor.supports(Capability::Unpin) && descriptor.is_implemented {
            let label = TaskLabel::new("service.task.label.unpin")
                .arg("manager", descriptor.display_name)
                .arg("package", package_name);
            let task_id = match self
                .runtime
                .submit(
                    manager,
                    AdapterRequest::Unpin {
                        package: package.clone(),
                    },
                    label,
                )
                .await
            {
                Ok(task_id) => task_id,
                Err(error) => return self.fail(error),
            };
            let (_, outcome) = match self
                .runtime
                .wait_for_response(task_id, Some(WAIT_FOR_PIN))
                .await
            {
                Ok(result) => result,
                Err(error) => return self.fail(error),
            };
            if let Err(error) = outcome {
                return self.fail(error);
            }
        }

        self.store.remove_pin(&package)?;
        let _ = self.events.send(EngineEvent::PackagesChanged);
        Ok(true)
    }

    pub fn list_pins(&self) -> CoreResult<Vec<PinRecord>> {
        self.store.list_pins()
    }

    // ----- manager lifecycle ----------------------------------------------

    /// Managers are installed through Homebrew where a formula exists.
    pub async fn install_manager(&self, manager: ManagerId) -> CoreResult<TaskId> {
        let Some(formula) = homebrew_formula_for_manager(manager) else {
            return self.fail(CoreError::unsupported(manager, Operation::Install));
        };
        let label = TaskLabel::new("service.task.label.manager.install")
            .arg("manager", registry::descriptor(manager).display_name);
        match self
            .runtime
            .submit(
                ManagerId::HomebrewFormula,
                AdapterRequest::Install {
                    package: PackageRef::new(ManagerId::HomebrewFormula, formula),
                    version: None,
                },
                label,
            )
            .await
        {
            Ok(task_id) => Ok(task_id),
            Err(error) => self.fail(error),
        }
    }

    /// Self-update for managers that can update themselves; Homebrew formula
    /// upgrade for the rest.
    pub async fn update_manager(&self, manager: ManagerId) -> CoreResult<TaskId> {
        let descriptor = registry::descriptor(manager);
        let label = TaskLabel::new("service.task.label.manager.update")
            .arg("manager", descriptor.display_name);

        if descriptor.supports(Capability::SelfUpdate) && descriptor.is_implemented {
            return match self
                .runtime
                .submit(manager, AdapterRequest::SelfUpdate, label)
                .await
            {
                Ok(task_id) => Ok(task_id),
                Err(error) => self.fail(error),
            };
        }

        let Some(formula) = homebrew_formula_for_manager(manager) else {
            return self.fail(CoreError::unsupported(manager, Operation::SelfUpdate));
        };
        match self
            .runtime
            .submit(
                ManagerId::HomebrewFormula,
                AdapterRequest::Upgrade {
                    package: PackageRef::new(ManagerId::HomebrewFormula, formula),
                    candidate_version: None,
                },
                label,
            )
            .await
        {
            Ok(task_id) => Ok(task_id),
            Err(error) => self.fail(error),
        }
    }

    pub async fn uninstall_manager(&self, manager: ManagerId) -> CoreResult<TaskId> {
        let Some(formula) = homebrew_formula_for_manager(manager) else {
            return self.fail(CoreError::unsupported(manager, Operation::Uninstall));
        };
        let label = TaskLabel::new("service.task.label.manager.uninstall")
            .arg("manager", registry::descriptor(manager).display_name);
        match self
            .runtime
            .submit(
                ManagerId::HomebrewFormula,
                AdapterRequest::Uninstall {
                    package: PackageRef::new(ManagerId::HomebrewFormula, formula),
                },
                label,
            )
            .await
        {
            Ok(task_id) => Ok(task_id),
            Err(error) => self.fail(error),
        }
    }

    // ----- upgrade planning ------------------------------------------------

    pub fn preview_upgrade_plan(
        &self,
        include_pinned: bool,
        allow_os_updates: bool,
    ) -> CoreResult<Vec<UpgradePlanStep>> {
        let outdated = self.store.list_outdated()?;
        let pins = self.pin_keys()?;
        let enabled = self.enabled_managers();
        let safe_mode = self.store.safe_mode()?;
        Ok(compute_plan(
            &outdated,
            &pins,
            &enabled,
            safe_mode,
            PlanOptions {
                include_pinned,
                allow_os_updates,
            },
        ))
    }

    /// Plan and execute a bulk upgrade. Safe mode silently excludes system
    /// updates from the plan; a plan is a batch, its run token the batch id.
    pub fn upgrade_all(
        &self,
        include_pinned: bool,
        allow_os_updates: bool,
    ) -> CoreResult<u64> {
        let plan = self.preview_upgrade_plan(include_pinned, allow_os_updates)?;
        debug_assert!(
            plan.iter().all(|step| {
                step.manager != ManagerId::SoftwareUpdate
                    || step.package_name == OS_UPDATES_STEP_NAME
            }),
            "system updates must be collapsed into the confirm step"
        );
        Ok(self.plan_executor.execute(plan))
    }

    pub async fn cancel_remaining_upgrades(&self) -> CoreResult<usize> {
        self.plan_executor.cancel_remaining().await
    }

    fn enabled_managers(&self) -> HashSet<ManagerId> {
        ManagerId::ALL
            .into_iter()
            .filter(|manager| manager_enabled(&self.store, *manager))
            .collect()
    }

    // ----- policy ----------------------------------------------------------

    pub fn get_safe_mode(&self) -> CoreResult<bool> {
        self.store.safe_mode()
    }

    pub fn set_safe_mode(&self, enabled: bool) -> CoreResult<bool> {
        self.store.set_safe_mode(enabled)?;
        Ok(true)
    }

    pub fn get_homebrew_keg_auto_cleanup(&self) -> CoreResult<bool> {
        self.store.keg_auto_cleanup()
    }

    pub fn set_homebrew_keg_auto_cleanup(&self, enabled: bool) -> CoreResult<bool> {
        self.store.set_keg_auto_cleanup(enabled)?;
        Ok(true)
    }

    pub fn list_package_keg_policies(&self) -> CoreResult<Vec<PackageKegPolicy>> {
        self.store.list_package_keg_policies()
    }

    /// `mode`: `-1` clears the override, `0` keeps kegs, `1` cleans them up.
    pub fn set_package_keg_policy(
        &self,
        manager: ManagerId,
        package_name: &str,
        mode: i64,
    ) -> CoreResult<bool> {
        let package = PackageRef::new(manager, package_name);
        let policy = match mode {
            -1 => None,
            0 => Some(KegPolicy::Keep),
            1 => Some(KegPolicy::Cleanup),
            _ => {
                return self.fail(
                    CoreError::invalid_input(format!("unknown keg policy mode '{mode}'"))
                        .for_manager(manager),
                );
            }
        };
        self.store.set_package_keg_policy(&package, policy)?;
        Ok(true)
    }

    // ----- maintenance -----------------------------------------------------

    pub fn reset_database(&self) -> CoreResult<bool> {
        self.store.reset()?;
        let _ = self.events.send(EngineEvent::PackagesChanged);
        let _ = self.events.send(EngineEvent::TasksChanged);
        let _ = self.events.send(EngineEvent::ManagersChanged);
        let _ = self.events.send(EngineEvent::SearchCacheChanged);
        Ok(true)
    }
}

/// Homebrew formula that installs a given manager, where one exists.
fn homebrew_formula_for_manager(manager: ManagerId) -> Option<&'static str> {
    match manager {
        ManagerId::Mise => Some("mise"),
        ManagerId::Rustup => Some("rustup"),
        ManagerId::Npm => Some("node"),
        ManagerId::Pnpm => Some("pnpm"),
        ManagerId::Yarn => Some("yarn"),
        ManagerId::Pip => Some("python"),
        ManagerId::Mas => Some("mas"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_formula_mapping_covers_self_installable_managers() {
        assert_eq!(homebrew_formula_for_manager(ManagerId::Mise), Some("mise"));
        assert_eq!(homebrew_formula_for_manager(ManagerId::Npm), Some("node"));
        assert_eq!(homebrew_formula_for_manager(ManagerId::SoftwareUpdate), None);
        assert_eq!(homebrew_formula_for_manager(ManagerId::Sparkle), None);
    }
}
