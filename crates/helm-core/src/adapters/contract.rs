use crate::models::{
    CoreError, CoreResult, DetectionInfo, InstalledPackage, ManagerDescriptor, ManagerId,
    Operation, OutdatedPackage, PackageRef, SearchHit, SearchQuery,
};
use crate::registry;

/// Tagged request across adapter capabilities. Each variant carries exactly
/// the typed inputs its operation needs; the ambient task id and cancel token
/// travel through the task context.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdapterRequest {
    Detect,
    ListInstalled,
    ListOutdated,
    Search {
        query: SearchQuery,
    },
    Install {
        package: PackageRef,
        version: Option<String>,
    },
    Uninstall {
        package: PackageRef,
    },
    Upgrade {
        package: PackageRef,
        /// Candidate version observed when the upgrade was decided.
        /// Verification compares the re-queried candidate against it.
        candidate_version: Option<String>,
    },
    Pin {
        package: PackageRef,
        version: Option<String>,
    },
    Unpin {
        package: PackageRef,
    },
    SelfUpdate,
}

impl AdapterRequest {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Detect => Operation::Detect,
            Self::ListInstalled => Operation::ListInstalled,
            Self::ListOutdated => Operation::ListOutdated,
            Self::Search { .. } => Operation::Search,
            Self::Install { .. } => Operation::Install,
            Self::Uninstall { .. } => Operation::Uninstall,
            Self::Upgrade { .. } => Operation::Upgrade,
            Self::Pin { .. } => Operation::Pin,
            Self::Unpin { .. } => Operation::Unpin,
            Self::SelfUpdate => Operation::SelfUpdate,
        }
    }

    pub fn package(&self) -> Option<&PackageRef> {
        match self {
            Self::Install { package, .. }
            | Self::Uninstall { package }
            | Self::Upgrade { package, .. }
            | Self::Pin { package, .. }
            | Self::Unpin { package } => Some(package),
            _ => None,
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Install { version, .. } | Self::Pin { version, .. } => version.as_deref(),
            Self::Upgrade {
                candidate_version, ..
            } => candidate_version.as_deref(),
            _ => None,
        }
    }
}

/// Outcome of re-querying the outdated set after an upgrade invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UpgradeVerification {
    /// The package no longer appears outdated.
    Confirmed,
    /// Still outdated at the given candidate; the upgrade was ineffective.
    StillOutdated { candidate_version: String },
    /// The manager cannot list outdated packages, so nothing was checked.
    Unverified,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpgradeReport {
    pub package: PackageRef,
    pub executed: bool,
    pub verification: UpgradeVerification,
}

/// Typed acknowledgement for install/uninstall/pin/unpin/self-update.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MutationReport {
    pub package: Option<PackageRef>,
    pub operation: Operation,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdapterResponse {
    Detection(DetectionInfo),
    Installed(Vec<InstalledPackage>),
    Outdated(Vec<OutdatedPackage>),
    SearchResults(Vec<SearchHit>),
    Upgraded(UpgradeReport),
    Mutated(MutationReport),
}

pub trait ManagerAdapter: Send + Sync {
    fn id(&self) -> ManagerId;

    fn descriptor(&self) -> &'static ManagerDescriptor {
        registry::descriptor(self.id())
    }

    fn execute(&self, request: AdapterRequest) -> CoreResult<AdapterResponse>;
}

pub fn ensure_supported(
    descriptor: &ManagerDescriptor,
    operation: Operation,
) -> CoreResult<()> {
    if descriptor.supports(operation.required_capability()) {
        Ok(())
    } else {
        Err(CoreError::unsupported(descriptor.id, operation))
    }
}

/// Fold a post-upgrade outdated re-query into the upgrade verdict.
///
/// Absent from the re-query: the upgrade is confirmed. Still pending at the
/// candidate the upgrade was decided against: the invocation was ineffective
/// and the task must fail. Pending at a *different* candidate: the upgrade
/// landed and a newer release appeared in between, which is success with a
/// follow-up.
pub fn verify_against_requery(
    manager: ManagerId,
    package: PackageRef,
    expected_candidate: Option<&str>,
    still_outdated: Option<&OutdatedPackage>,
) -> CoreResult<AdapterResponse> {
    let Some(pending) = still_outdated else {
        return Ok(AdapterResponse::Upgraded(UpgradeReport {
            package,
            executed: true,
            verification: UpgradeVerification::Confirmed,
        }));
    };

    let requeried = pending.candidate_version.as_str();
    let superseded = expected_candidate.is_some_and(|expected| expected != requeried);
    if superseded {
        return Ok(AdapterResponse::Upgraded(UpgradeReport {
            package,
            executed: true,
            verification: UpgradeVerification::StillOutdated {
                candidate_version: requeried.to_owned(),
            },
        }));
    }

    Err(CoreError::process_failure(format!(
        "ineffective upgrade: '{}' still outdated at candidate {requeried}",
        package.name
    ))
    .for_manager(manager)
    .for_operation(Operation::Upgrade))
}

/// Capability gate + input validation in front of every adapter call. This is
/// the only path orchestration uses to reach an adapter.
pub fn execute_checked(
    adapter: &dyn ManagerAdapter,
    request: AdapterRequest,
) -> CoreResult<AdapterResponse> {
    let descriptor = adapter.descriptor();
    let operation = request.operation();
    ensure_supported(descriptor, operation)?;
    if let Some(package) = request.package() {
        super::support::validate_package_name(descriptor.id, operation, &package.name)?;
        if package.manager != descriptor.id {
            return Err(CoreError::invalid_input(format!(
                "package '{}' does not belong to manager '{}'",
                package.external_id(),
                descriptor.id
            ))
            .for_manager(descriptor.id)
            .for_operation(operation));
        }
    }
    if let Some(version) = request.version() {
        super::support::validate_version(descriptor.id, operation, version)?;
    }
    adapter.execute(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;

    struct PanickingAdapter(ManagerId);

    impl ManagerAdapter for PanickingAdapter {
        fn id(&self) -> ManagerId {
            self.0
        }

        fn execute(&self, _request: AdapterRequest) -> CoreResult<AdapterResponse> {
            panic!("gate should reject before execute");
        }
    }

    #[test]
    fn gate_rejects_undeclared_capability_before_execute() {
        let adapter = PanickingAdapter(ManagerId::Sparkle);
        let error = execute_checked(
            &adapter,
            AdapterRequest::Upgrade {
                package: PackageRef::new(ManagerId::Sparkle, "anything"),
                candidate_version: None,
            },
        )
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnsupportedCapability);
        assert_eq!(error.manager, Some(ManagerId::Sparkle));
    }

    fn pending(candidate: &str) -> OutdatedPackage {
        OutdatedPackage {
            package: PackageRef::new(ManagerId::Npm, "eslint"),
            installed_version: Some("8.57.0".to_string()),
            candidate_version: candidate.to_string(),
            pinned: false,
            restart_required: false,
        }
    }

    #[test]
    fn requery_absence_confirms_the_upgrade() {
        let response = verify_against_requery(
            ManagerId::Npm,
            PackageRef::new(ManagerId::Npm, "eslint"),
            Some("9.5.0"),
            None,
        )
        .unwrap();
        assert!(matches!(
            response,
            AdapterResponse::Upgraded(UpgradeReport {
                executed: true,
                verification: UpgradeVerification::Confirmed,
                ..
            })
        ));
    }

    #[test]
    fn requery_at_the_same_candidate_is_ineffective() {
        let row = pending("9.5.0");
        let error = verify_against_requery(
            ManagerId::Npm,
            PackageRef::new(ManagerId::Npm, "eslint"),
            Some("9.5.0"),
            Some(&row),
        )
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::ProcessFailure);
        assert!(error.message.contains("ineffective upgrade"));
    }

    #[test]
    fn requery_at_a_newer_candidate_counts_as_landed() {
        let row = pending("9.6.0");
        let response = verify_against_requery(
            ManagerId::Npm,
            PackageRef::new(ManagerId::Npm, "eslint"),
            Some("9.5.0"),
            Some(&row),
        )
        .unwrap();
        let AdapterResponse::Upgraded(report) = response else {
            panic!("expected an upgrade report");
        };
        assert!(report.executed);
        assert_eq!(
            report.verification,
            UpgradeVerification::StillOutdated {
                candidate_version: "9.6.0".to_string()
            }
        );
    }

    #[test]
    fn requery_without_a_known_candidate_stays_conservative() {
        // No pre-upgrade candidate to compare against: a package that is
        // still pending reads as ineffective.
        let row = pending("9.5.0");
        let error = verify_against_requery(
            ManagerId::Npm,
            PackageRef::new(ManagerId::Npm, "eslint"),
            None,
            Some(&row),
        )
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::ProcessFailure);
    }

    #[test]
    fn gate_rejects_package_names_that_look_like_flags() {
        let adapter = PanickingAdapter(ManagerId::Npm);
        let error = execute_checked(
            &adapter,
            AdapterRequest::Install {
                package: PackageRef::new(ManagerId::Npm, "--global"),
                version: None,
            },
        )
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn gate_rejects_cross_manager_package_refs() {
        let adapter = PanickingAdapter(ManagerId::Npm);
        let error = execute_checked(
            &adapter,
            AdapterRequest::Uninstall {
                package: PackageRef::new(ManagerId::Pip, "requests"),
            },
        )
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidInput);
    }
}
