//! macOS `softwareupdate`. Guarded authority: system updates are listed per
//! label but executed collectively through the single synthetic confirm step,
//! and only when policy allows.

use std::path::PathBuf;

use crate::adapters::contract::{
    AdapterRequest, AdapterResponse, ManagerAdapter, UpgradeReport, UpgradeVerification,
};
use crate::models::plan::OS_UPDATES_STEP_NAME;
use crate::models::{
    CoreError, CoreResult, DetectionInfo, ManagerId, Operation, OutdatedPackage, PackageRef,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SoftwareUpdateProbe {
    pub executable_path: Option<PathBuf>,
    pub sw_vers_output: String,
}

pub trait SoftwareUpdateSource: Send + Sync {
    fn probe(&self) -> CoreResult<SoftwareUpdateProbe>;

    fn list_available(&self) -> CoreResult<String>;

    fn install_all(&self) -> CoreResult<String>;
}

pub struct SoftwareUpdateAdapter<S: SoftwareUpdateSource> {
    source: S,
}

impl<S: SoftwareUpdateSource> SoftwareUpdateAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: SoftwareUpdateSource> ManagerAdapter for SoftwareUpdateAdapter<S> {
    fn id(&self) -> ManagerId {
        ManagerId::SoftwareUpdate
    }

    fn execute(&self, request: AdapterRequest) -> CoreResult<AdapterResponse> {
        match request {
            AdapterRequest::Detect => {
                let probe = self.source.probe()?;
                let version = parse_product_version(&probe.sw_vers_output);
                Ok(AdapterResponse::Detection(DetectionInfo {
                    installed: probe.executable_path.is_some() || version.is_some(),
                    executable_path: probe.executable_path,
                    version,
                }))
            }
            AdapterRequest::ListOutdated => {
                let raw = self.source.list_available()?;
                Ok(AdapterResponse::Outdated(parse_available_updates(&raw)?))
            }
            AdapterRequest::Upgrade { package, .. } => {
                if package.name != OS_UPDATES_STEP_NAME {
                    return Err(CoreError::invalid_input(
                        "system updates are applied collectively through the confirm step",
                    )
                    .for_manager(ManagerId::SoftwareUpdate)
                    .for_operation(Operation::Upgrade));
                }

                // The confirm step applies every pending update, so the
                // candidate comparison works on the full pending set: a
                // (label, version) pair that survives the install was not
                // applied; pairs that only appeared afterwards are new
                // releases, not a failure.
                let before = parse_available_updates(&self.source.list_available()?)?;
                let _ = self.source.install_all()?;
                let after = parse_available_updates(&self.source.list_available()?)?;

                let stuck = after.iter().find(|update| {
                    before.iter().any(|previous| {
                        previous.package == update.package
                            && previous.candidate_version == update.candidate_version
                    })
                });
                if let Some(update) = stuck {
                    return Err(CoreError::process_failure(format!(
                        "ineffective upgrade: '{}' still pending at {}",
                        update.package.name, update.candidate_version
                    ))
                    .for_manager(ManagerId::SoftwareUpdate)
                    .for_operation(Operation::Upgrade));
                }

                let verification = match after.first() {
                    Some(update) => UpgradeVerification::StillOutdated {
                        candidate_version: update.candidate_version.clone(),
                    },
                    None => UpgradeVerification::Confirmed,
                };
                Ok(AdapterResponse::Upgraded(UpgradeReport {
                    package,
                    executed: true,
                    verification,
                }))
            }
            other => Err(CoreError::unsupported(
                ManagerId::SoftwareUpdate,
                other.operation(),
            )),
        }
    }
}

/// `sw_vers` output, e.g. `ProductVersion:\t15.3.1`.
fn parse_product_version(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("ProductVersion:"))
        .map(|rest| rest.trim().to_owned())
        .filter(|version| !version.is_empty())
}

/// `softwareupdate -l` update blocks:
///
/// ```text
/// * Label: macOS Sequoia 15.3.2-15.3.2
///     Title: macOS Sequoia 15.3.2, Version: 15.3.2, Size: 1803133KiB, Recommended: YES, Action: restart,
/// ```
///
/// Blocks without a version line are skipped; "No new software available" is
/// an empty list.
fn parse_available_updates(output: &str) -> CoreResult<Vec<OutdatedPackage>> {
    let mut updates = Vec::new();
    let mut block: Option<UpdateBlock> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(label) = trimmed.strip_prefix("* Label:") {
            flush(&mut block, &mut updates);
            block = Some(UpdateBlock {
                label: label.trim().to_owned(),
                version: None,
                restart: false,
            });
            continue;
        }

        if let Some(current) = block.as_mut()
            && (line.starts_with('\t') || line.starts_with("    "))
        {
            for field in trimmed.split(',') {
                let Some((key, value)) = field.trim().split_once(':') else {
                    continue;
                };
                match key.trim() {
                    "Version" => current.version = Some(value.trim().to_owned()),
                    "Action" if value.trim().eq_ignore_ascii_case("restart") => {
                        current.restart = true;
                    }
                    _ => {}
                }
            }
        }
    }
    flush(&mut block, &mut updates);

    Ok(updates)
}

struct UpdateBlock {
    label: String,
    version: Option<String>,
    restart: bool,
}

fn flush(block: &mut Option<UpdateBlock>, updates: &mut Vec<OutdatedPackage>) {
    let Some(block) = block.take() else {
        return;
    };
    let Some(version) = block.version else {
        return;
    };
    updates.push(OutdatedPackage {
        package: PackageRef::new(ManagerId::SoftwareUpdate, block.label),
        installed_version: None,
        candidate_version: version,
        pinned: false,
        restart_required: block.restart,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use std::sync::Mutex;

    const SW_VERS_FIXTURE: &str = include_str!("../../tests/fixtures/softwareupdate/sw_vers.txt");
    const LIST_FIXTURE: &str =
        include_str!("../../tests/fixtures/softwareupdate/list_available.txt");
    const LIST_EMPTY_FIXTURE: &str =
        include_str!("../../tests/fixtures/softwareupdate/list_empty.txt");

    #[test]
    fn product_version_parses_from_sw_vers() {
        assert_eq!(
            parse_product_version(SW_VERS_FIXTURE).as_deref(),
            Some("15.3.1")
        );
        assert!(parse_product_version("").is_none());
        assert!(parse_product_version("macOS 15.3.1").is_none());
    }

    #[test]
    fn available_updates_parse_labels_versions_and_restart() {
        let updates = parse_available_updates(LIST_FIXTURE).unwrap();
        assert_eq!(updates.len(), 2);

        assert_eq!(updates[0].package.name, "macOS Sequoia 15.3.2-15.3.2");
        assert_eq!(updates[0].candidate_version, "15.3.2");
        assert!(updates[0].restart_required);

        assert_eq!(updates[1].package.name, "Safari 18.3.1-18.3.1");
        assert_eq!(updates[1].candidate_version, "18.3.1");
        assert!(!updates[1].restart_required);
    }

    #[test]
    fn no_new_software_is_an_empty_list() {
        assert!(parse_available_updates(LIST_EMPTY_FIXTURE).unwrap().is_empty());
        assert!(parse_available_updates("").unwrap().is_empty());
    }

    #[test]
    fn upgrade_requires_the_synthetic_confirm_name() {
        let adapter = SoftwareUpdateAdapter::new(ScriptedSource::default());
        let error = adapter
            .execute(AdapterRequest::Upgrade {
                package: PackageRef::new(ManagerId::SoftwareUpdate, "Safari-18.3.1"),
                candidate_version: None,
            })
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn upgrade_fails_when_the_same_updates_remain_after_install() {
        let adapter = SoftwareUpdateAdapter::new(ScriptedSource {
            remaining_after_install: LIST_FIXTURE,
            ..ScriptedSource::default()
        });
        let error = adapter
            .execute(AdapterRequest::Upgrade {
                package: PackageRef::new(ManagerId::SoftwareUpdate, OS_UPDATES_STEP_NAME),
                candidate_version: None,
            })
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::ProcessFailure);
        assert!(error.message.contains("ineffective upgrade"));
    }

    #[test]
    fn upgrade_confirms_when_the_queue_drains() {
        let adapter = SoftwareUpdateAdapter::new(ScriptedSource::default());
        let response = adapter
            .execute(AdapterRequest::Upgrade {
                package: PackageRef::new(ManagerId::SoftwareUpdate, OS_UPDATES_STEP_NAME),
                candidate_version: None,
            })
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
    fn updates_published_during_the_install_count_as_landed() {
        // Everything pending beforehand was applied; Safari 18.4 appeared
        // while the install ran.
        const PUBLISHED_DURING_INSTALL: &str = "Software Update Tool\n\
            \n\
            Finding available software\n\
            Software Update found the following new or updated software:\n\
            * Label: Safari 18.4-18.4\n\
            \tTitle: Safari, Version: 18.4, Size: 180244KiB, Recommended: YES,\n";

        let adapter = SoftwareUpdateAdapter::new(ScriptedSource {
            remaining_after_install: PUBLISHED_DURING_INSTALL,
            ..ScriptedSource::default()
        });
        let response = adapter
            .execute(AdapterRequest::Upgrade {
                package: PackageRef::new(ManagerId::SoftwareUpdate, OS_UPDATES_STEP_NAME),
                candidate_version: None,
            })
            .unwrap();
        let AdapterResponse::Upgraded(report) = response else {
            panic!("expected an upgrade report");
        };
        assert!(report.executed);
        assert_eq!(
            report.verification,
            UpgradeVerification::StillOutdated {
                candidate_version: "18.4".to_string()
            }
        );
    }

    struct ScriptedSource {
        remaining_after_install: &'static str,
        installed: Mutex<bool>,
    }

    impl Default for ScriptedSource {
        fn default() -> Self {
            Self {
                remaining_after_install: LIST_EMPTY_FIXTURE,
                installed: Mutex::new(false),
            }
        }
    }

    impl SoftwareUpdateSource for ScriptedSource {
        fn probe(&self) -> CoreResult<SoftwareUpdateProbe> {
            Ok(SoftwareUpdateProbe {
                executable_path: Some(PathBuf::from("/usr/sbin/softwareupdate")),
                sw_vers_output: SW_VERS_FIXTURE.to_string(),
            })
        }

        fn list_available(&self) -> CoreResult<String> {
            if *self.installed.lock().unwrap() {
                Ok(self.remaining_after_install.to_string())
            } else {
                Ok(LIST_FIXTURE.to_string())
            }
        }

        fn install_all(&self) -> CoreResult<String> {
            *self.installed.lock().unwrap() = true;
            Ok(String::new())
        }
    }
}
