//! mise toolchain manager. Authoritative: it shadows language-level managers,
//! so it refreshes and upgrades first. Speaks JSON.

use std::path::PathBuf;

use serde_json::Value;

use crate::adapters::contract::{AdapterRequest, AdapterResponse, ManagerAdapter, MutationReport};
use crate::models::{
    CoreError, CoreResult, DetectionInfo, InstalledPackage, ManagerId, Operation, OutdatedPackage,
    PackageRef,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MiseProbe {
    pub executable_path: Option<PathBuf>,
    pub version_output: String,
}

pub trait MiseSource: Send + Sync {
    fn probe(&self) -> CoreResult<MiseProbe>;

    fn list_json(&self) -> CoreResult<String>;

    fn outdated_json(&self) -> CoreResult<String>;

    fn install(&self, tool: &str, version: Option<&str>) -> CoreResult<String>;

    fn uninstall(&self, tool: &str) -> CoreResult<String>;

    fn upgrade(&self, tool: &str) -> CoreResult<String>;

    fn self_update(&self) -> CoreResult<String>;
}

pub struct MiseAdapter<S: MiseSource> {
    source: S,
}

impl<S: MiseSource> MiseAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    fn list_outdated(&self) -> CoreResult<Vec<OutdatedPackage>> {
        parse_outdated_json(&self.source.outdated_json()?)
    }
}

impl<S: MiseSource> ManagerAdapter for MiseAdapter<S> {
    fn id(&self) -> ManagerId {
        ManagerId::Mise
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
                let _ = self.source.install(&package.name, version.as_deref())?;
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
                    ManagerId::Mise,
                    package,
                    candidate_version.as_deref(),
                    still.as_ref(),
                )
            }
            AdapterRequest::SelfUpdate => {
                let _ = self.source.self_update()?;
                Ok(AdapterResponse::Mutated(MutationReport {
                    package: None,
                    operation: Operation::SelfUpdate,
                }))
            }
            other => Err(CoreError::unsupported(ManagerId::Mise, other.operation())),
        }
    }
}

/// `mise --version` leads with the version token: `2026.2.6 macos-arm64 (...)`
/// or `mise 2026.2.6 ...` depending on the release line.
fn parse_version(output: &str) -> Option<String> {
    let line = crate::adapters::support::first_line(output)?;
    let token = line
        .split_whitespace()
        .find(|token| token.chars().next().is_some_and(|ch| ch.is_ascii_digit()))?;
    Some(token.to_owned())
}

/// `mise ls --json`: object keyed by tool, each value a list of installed
/// versions. The active version wins; otherwise the last entry.
fn parse_list_json(raw: &str) -> CoreResult<Vec<InstalledPackage>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|error| json_error("ls", &error.to_string()))?;
    let Value::Object(tools) = value else {
        return Err(json_error("ls", "expected a top-level object"));
    };

    let mut packages = Vec::new();
    for (tool, versions) in tools {
        let Value::Array(entries) = versions else {
            continue;
        };
        let mut active: Option<String> = None;
        let mut last: Option<String> = None;
        for entry in &entries {
            let Some(version) = entry.get("version").and_then(Value::as_str) else {
                continue;
            };
            last = Some(version.to_owned());
            if entry.get("active").and_then(Value::as_bool).unwrap_or(false) {
                active = Some(version.to_owned());
            }
        }
        if let Some(version) = active.or(last) {
            packages.push(InstalledPackage {
                package: PackageRef::new(ManagerId::Mise, tool),
                installed_version: Some(version),
                pinned: false,
            });
        }
    }
    Ok(packages)
}

/// `mise outdated --json`: object keyed by tool with `current` and `latest`.
fn parse_outdated_json(raw: &str) -> CoreResult<Vec<OutdatedPackage>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|error| json_error("outdated", &error.to_string()))?;
    let Value::Object(tools) = value else {
        return Err(json_error("outdated", "expected a top-level object"));
    };

    let mut packages = Vec::new();
    for (tool, entry) in tools {
        let Some(latest) = entry.get("latest").and_then(Value::as_str) else {
            continue;
        };
        let current = entry
            .get("current")
            .and_then(Value::as_str)
            .map(str::to_owned);
        packages.push(OutdatedPackage {
            package: PackageRef::new(ManagerId::Mise, tool),
            installed_version: current,
            candidate_version: latest.to_owned(),
            pinned: false,
            restart_required: false,
        });
    }
    Ok(packages)
}

fn json_error(which: &str, detail: &str) -> CoreError {
    CoreError::parse_failure(
        ManagerId::Mise,
        format!("mise {which} --json output unreadable: {detail}"),
    )
}
