//! pip, driven through `python3 -m pip` so the probe and the mutations agree
//! on the interpreter. No remote search: PyPI retired the search endpoint.

use std::path::PathBuf;

use serde_json::Value;

use crate::adapters::contract::{AdapterRequest, AdapterResponse, ManagerAdapter, MutationReport};
use crate::models::{
    CoreError, CoreResult, DetectionInfo, InstalledPackage, ManagerId, Operation, OutdatedPackage,
    PackageRef,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PipProbe {
    pub executable_path: Option<PathBuf>,
    pub version_output: String,
}

pub trait PipSource: Send + Sync {
    fn probe(&self) -> CoreResult<PipProbe>;

    fn list_json(&self) -> CoreResult<String>;

    fn outdated_json(&self) -> CoreResult<String>;

    fn install(&self, spec: &str) -> CoreResult<String>;

    fn uninstall(&self, name: &str) -> CoreResult<String>;

    fn upgrade(&self, name: &str) -> CoreResult<String>;
}

pub struct PipAdapter<S: PipSource> {
    source: S,
}

impl<S: PipSource> PipAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    fn list_outdated(&self) -> CoreResult<Vec<OutdatedPackage>> {
        parse_outdated_json(&self.source.outdated_json()?)
    }
}

impl<S: PipSource> ManagerAdapter for PipAdapter<S> {
    fn id(&self) -> ManagerId {
        ManagerId::Pip
    }

    fn execute(&self, request: AdapterRequest) -> CoreResult<AdapterResponse> {
        match request {
            AdapterRequest::Detect => {
                let probe = self.source.probe()?;
                let version = parse_version(&probe.version_output);
                Ok(AdapterResponse::Detection(DetectionInfo {
                    installed: probe.executable_path.is_some() || version.is_some(),
                    executable_path: probe.executable_path,
                    version,
                }))
            }
            AdapterRequest::ListInstalled => Ok(AdapterResponse::Installed(parse_list_json(
                &self.source.list_json()?,
            )?)),
            AdapterRequest::ListOutdated => Ok(AdapterResponse::Outdated(self.list_outdated()?)),
            AdapterRequest::Install { package, version } => {
                let spec = match version {
                    Some(version) => format!("{}=={version}", package.name),
                    None => package.name.clone(),
                };
                let _ = self.source.install(&spec)?;
                Ok(AdapterResponse::Mutated(MutationReport {
                    package: Some(package),
                    operation: Operation::Install,
                }))
            }
            AdapterRequest::Uninstall { package } => {
                let _ = self.source.uninstall(&package.name)?;
                Ok(AdapterResponse::Mutated(MutationReport {
                    package: Some(package),
                    operation: Operation::Uninstall,
                }))
            }
            AdapterRequest::Upgrade {
                package,
                candidate_version,
            } => {
                let _ = self.source.upgrade(&package.name)?;
                let still = self
                    .list_outdated()?
                    .into_iter()
                    .find(|outdated| outdated.package.name == package.name);
                crate::adapters::contract::verify_against_requery(
                    ManagerId::Pip,
                    package,
                    candidate_version.as_deref(),
                    still.as_ref(),
                )
            }
            other => Err(CoreError::unsupported(ManagerId::Pip, other.operation())),
        }
    }
}

/// `pip 24.0 from /usr/lib/python3/... (python 3.11)` → `24.0`.
fn parse_version(output: &str) -> Option<String> {
    crate::adapters::support::first_line(output)?
        .strip_prefix("pip ")
        .and_then(|rest| rest.split_whitespace().next())
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

/// `pip list --format=json`: array of `{name, version}`.
fn parse_list_json(raw: &str) -> CoreResult<Vec<InstalledPackage>> {
    parse_package_array(raw, "list")?
        .into_iter()
        .map(|(name, version, _)| {
            Ok(InstalledPackage {
                package: PackageRef::new(ManagerId::Pip, name),
                installed_version: version,
                pinned: false,
            })
        })
        .collect()
}

/// `pip list --outdated --format=json`: array of `{name, version,
/// latest_version}`.
fn parse_outdated_json(raw: &str) -> CoreResult<Vec<OutdatedPackage>> {
    Ok(parse_package_array(raw, "list --outdated")?
        .into_iter()
        .filter_map(|(name, version, latest)| {
            latest.map(|candidate| OutdatedPackage {
                package: PackageRef::new(ManagerId::Pip, name),
                installed_version: version,
                candidate_version: candidate,
                pinned: false,
                restart_required: false,
            })
        })
        .collect())
}

type PackageRow = (String, Option<String>, Option<String>);

fn parse_package_array(raw: &str, which: &str) -> CoreResult<Vec<PackageRow>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(raw).map_err(|error| {
        CoreError::parse_failure(
            ManagerId::Pip,
            format!("pip {which} JSON output unreadable: {error}"),
        )
    })?;
    let Value::Array(entries) = value else {
        return Err(CoreError::parse_failure(
            ManagerId::Pip,
            format!("pip {which} JSON output is not an array"),
        ));
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let name = entry.get("name").and_then(Value::as_str)?.to_owned();
            let version = entry
                .get("version")
                .and_then(Value::as_str)
                .map(str::to_owned);
            let latest = entry
                .get("latest_version")
                .and_then(Value::as_str)
                .map(str::to_owned);
            Some((name, version, latest))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;

    const LIST_FIXTURE: &str = include_str!("../../tests/fixtures/pip/list.json");
    const OUTDATED_FIXTURE: &str = include_str!("../../tests/fixtures/pip/list_outdated.json");

    #[test]
    fn version_parses_from_pip_banner() {
        assert_eq!(
            parse_version("pip 24.0 from /usr/lib/python3.11/site-packages/pip (python 3.11)")
                .as_deref(),
            Some("24.0")
        );
        assert!(parse_version("").is_none());
    }

    #[test]
    fn list_fixture_parses_names_and_versions() {
        let packages = parse_list_json(LIST_FIXTURE).unwrap();
        assert_eq!(packages.len(), 3);
        assert_eq!(packages[0].package.name, "requests");
        assert_eq!(packages[0].installed_version.as_deref(), Some("2.31.0"));
    }

    #[test]
    fn outdated_fixture_requires_latest_version() {
        let packages = parse_outdated_json(OUTDATED_FIXTURE).unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].package.name, "requests");
        assert_eq!(packages[0].candidate_version, "2.32.3");
    }

    #[test]
    fn empty_array_and_empty_output_are_empty_lists() {
        assert!(parse_list_json("[]").unwrap().is_empty());
        assert!(parse_outdated_json("").unwrap().is_empty());
    }

    #[test]
    fn non_array_json_is_a_parse_failure() {
        assert_eq!(
            parse_list_json("{\"oops\": 1}").unwrap_err().kind,
            ErrorKind::ParseFailure
        );
    }
}
