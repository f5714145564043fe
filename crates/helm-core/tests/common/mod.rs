//! Shared test support: scripted adapters with recorded invocations and an
//! engine constructor against a throwaway data directory.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use helm_core::adapters::contract::{
    AdapterRequest, AdapterResponse, ManagerAdapter, MutationReport, UpgradeReport,
    UpgradeVerification,
};
use helm_core::engine::{CoreEngine, EngineConfig};
use helm_core::models::{
    CoreError, CoreResult, DetectionInfo, InstalledPackage, ManagerId, Operation, OutdatedPackage,
    PackageCandidate, PackageRef, SearchHit,
};

pub fn temp_data_dir(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("helm-test-{test_name}-{nanos}"))
}

pub fn engine_with(
    test_name: &str,
    adapters: Vec<Arc<dyn ManagerAdapter>>,
) -> Arc<CoreEngine> {
    let config = EngineConfig {
        data_dir: temp_data_dir(test_name),
        warmup_search: false,
    };
    CoreEngine::open_with_adapters(config, adapters).expect("engine should open")
}

pub fn outdated(manager: ManagerId, name: &str, installed: &str, candidate: &str) -> OutdatedPackage {
    OutdatedPackage {
        package: PackageRef::new(manager, name),
        installed_version: Some(installed.to_string()),
        candidate_version: candidate.to_string(),
        pinned: false,
        restart_required: false,
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpgradeScript {
    /// Upgrade succeeds and the package leaves the outdated set.
    Effective,
    /// The invocation "succeeds" but the package stays outdated at the same
    /// candidate.
    Ineffective,
    /// The upgrade lands, but a newer candidate is published before the
    /// verification re-query.
    SupersededCandidate,
    /// Block until the ambient cancel token fires, then report cancellation.
    BlockUntilCancelled,
}

pub struct ScriptedAdapter {
    manager: ManagerId,
    detection: DetectionInfo,
    installed: Vec<InstalledPackage>,
    outdated: Mutex<Vec<OutdatedPackage>>,
    upgrade_script: UpgradeScript,
    work_delay: Option<Duration>,
    requests: Arc<Mutex<Vec<(ManagerId, Operation, Option<String>)>>>,
    spawn_count: Arc<AtomicUsize>,
    search_queries: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAdapter {
    pub fn new(manager: ManagerId) -> Self {
        Self {
            manager,
            detection: DetectionInfo {
                installed: true,
                executable_path: Some(PathBuf::from(format!("/usr/local/bin/{manager}"))),
                version: Some("1.0.0".to_string()),
            },
            installed: Vec::new(),
            outdated: Mutex::new(Vec::new()),
            upgrade_script: UpgradeScript::Effective,
            work_delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
            spawn_count: Arc::new(AtomicUsize::new(0)),
            search_queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn not_detected(mut self) -> Self {
        self.detection = DetectionInfo::default();
        self
    }

    pub fn with_installed(mut self, packages: Vec<InstalledPackage>) -> Self {
        self.installed = packages;
        self
    }

    pub fn with_outdated(mut self, packages: Vec<OutdatedPackage>) -> Self {
        self.outdated = Mutex::new(packages);
        self
    }

    pub fn with_upgrade_script(mut self, script: UpgradeScript) -> Self {
        self.upgrade_script = script;
        self
    }

    /// Simulated subprocess latency inside the blocking adapter call.
    pub fn with_work_delay(mut self, delay: Duration) -> Self {
        self.work_delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<(ManagerId, Operation, Option<String>)>>> {
        self.requests.clone()
    }

    pub fn spawn_count(&self) -> Arc<AtomicUsize> {
        self.spawn_count.clone()
    }

    pub fn search_queries(&self) -> Arc<Mutex<Vec<String>>> {
        self.search_queries.clone()
    }

    fn record(&self, request: &AdapterRequest) {
        self.requests.lock().unwrap().push((
            self.manager,
            request.operation(),
            request.package().map(|package| package.name.clone()),
        ));
    }

    fn wait_or_cancel(&self) -> CoreResult<()> {
        let token = helm_core::task_context::current_cancel_token();
        if let Some(delay) = self.work_delay {
            let deadline = std::time::Instant::now() + delay;
            while std::time::Instant::now() < deadline {
                if token.as_ref().is_some_and(|token| token.is_cancelled()) {
                    return Err(CoreError::cancelled("scripted work interrupted"));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        Ok(())
    }
}

impl ManagerAdapter for ScriptedAdapter {
    fn id(&self) -> ManagerId {
        self.manager
    }

    fn execute(&self, request: AdapterRequest) -> CoreResult<AdapterResponse> {
        self.record(&request);
        self.spawn_count.fetch_add(1, Ordering::SeqCst);
        self.wait_or_cancel()?;

        match request {
            AdapterRequest::Detect => Ok(AdapterResponse::Detection(self.detection.clone())),
            AdapterRequest::ListInstalled => {
                Ok(AdapterResponse::Installed(self.installed.clone()))
            }
            AdapterRequest::ListOutdated => {
                Ok(AdapterResponse::Outdated(self.outdated.lock().unwrap().clone()))
            }
            AdapterRequest::Search { query } => {
                self.search_queries.lock().unwrap().push(query.text.clone());
                let name = format!("{}-hit-{}", self.manager, query.text);
                Ok(AdapterResponse::SearchResults(vec![SearchHit {
                    candidate: PackageCandidate {
                        package: PackageRef::new(self.manager, name),
                        version: Some("1.0.0".to_string()),
                        summary: Some(format!("result for '{}'", query.text)),
                    },
                    source_manager: self.manager,
                    origin_query: query.text,
                    inserted_at: query.issued_at,
                }]))
            }
            AdapterRequest::Upgrade {
                package,
                candidate_version,
            } => match self.upgrade_script {
                UpgradeScript::Effective => {
                    let mut outdated = self.outdated.lock().unwrap();
                    outdated.retain(|entry| entry.package != package);
                    Ok(AdapterResponse::Upgraded(UpgradeReport {
                        package,
                        executed: true,
                        verification: UpgradeVerification::Confirmed,
                    }))
                }
                UpgradeScript::Ineffective => {
                    // Nothing changed; the verification re-query still sees
                    // the same pending candidate.
                    let still = self
                        .outdated
                        .lock()
                        .unwrap()
                        .iter()
                        .find(|entry| entry.package == package)
                        .cloned();
                    helm_core::adapters::contract::verify_against_requery(
                        self.manager,
                        package,
                        candidate_version.as_deref(),
                        still.as_ref(),
                    )
                }
                UpgradeScript::SupersededCandidate => {
                    // The upgrade took, but a newer release appeared before
                    // the re-query.
                    let still = {
                        let mut outdated = self.outdated.lock().unwrap();
                        match outdated.iter_mut().find(|entry| entry.package == package) {
                            Some(row) => {
                                row.installed_version = Some(row.candidate_version.clone());
                                row.candidate_version =
                                    format!("{}-next", row.candidate_version);
                                Some(row.clone())
                            }
                            None => None,
                        }
                    };
                    helm_core::adapters::contract::verify_against_requery(
                        self.manager,
                        package,
                        candidate_version.as_deref(),
                        still.as_ref(),
                    )
                }
                UpgradeScript::BlockUntilCancelled => {
                    let token = helm_core::task_context::current_cancel_token()
                        .expect("scripted upgrade needs a cancel token");
                    while !token.is_cancelled() {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Err(CoreError::cancelled("upgrade terminated by signal")
                        .for_manager(self.manager)
                        .for_operation(Operation::Upgrade))
                }
            },
            AdapterRequest::Install { package, .. } => {
                Ok(AdapterResponse::Mutated(MutationReport {
                    package: Some(package),
                    operation: Operation::Install,
                }))
            }
            AdapterRequest::Uninstall { package } => {
                Ok(AdapterResponse::Mutated(MutationReport {
                    package: Some(package),
                    operation: Operation::Uninstall,
                }))
            }
            AdapterRequest::Pin { package, .. } => Ok(AdapterResponse::Mutated(MutationReport {
                package: Some(package),
                operation: Operation::Pin,
            })),
            AdapterRequest::Unpin { package } => Ok(AdapterResponse::Mutated(MutationReport {
                package: Some(package),
                operation: Operation::Unpin,
            })),
            AdapterRequest::SelfUpdate => Ok(AdapterResponse::Mutated(MutationReport {
                package: None,
                operation: Operation::SelfUpdate,
            })),
        }
    }
}
