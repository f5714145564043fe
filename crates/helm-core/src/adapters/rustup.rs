//! rustup. Toolchains are the packages; the toolchain label is the stable
//! package name (`stable-x86_64-apple-darwin`).

use std::path::PathBuf;

use crate::adapters::contract::{AdapterRequest, AdapterResponse, ManagerAdapter, MutationReport};
use crate::models::{
    CoreError, CoreResult, DetectionInfo, InstalledPackage, ManagerId, Operation, OutdatedPackage,
    PackageRef,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RustupProbe {
    pub executable_path: Option<PathBuf>,
    pub version_output: String,
}

pub trait RustupSource: Send + Sync {
    fn probe(&self) -> CoreResult<RustupProbe>;

    fn toolchain_list(&self) -> CoreResult<String>;

    fn check(&self) -> CoreResult<String>;

    fn install_toolchain(&self, toolchain: &str) -> CoreResult<String>;

    fn uninstall_toolchain(&self, toolchain: &str) -> CoreResult<String>;

    fn update_toolchain(&self, toolchain: &str) -> CoreResult<String>;

    fn self_update(&self) -> CoreResult<String>;
}

pub struct RustupAdapter<S: RustupSource> {
    source: S,
}

impl<S: RustupSource> RustupAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    fn list_outdated(&self) -> CoreResult<Vec<OutdatedPackage>> {
        parse_check(&self.source.check()?)
    }
}

impl<S: RustupSource> ManagerAdapter for RustupAdapter<S> {
    fn id(&self) -> ManagerId {
        ManagerId::Rustup
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
            AdapterRequest::ListInstalled => Ok(AdapterResponse::Installed(
                parse_toolchain_list(&self.source.toolchain_list()?),
            )),
            AdapterRequest::ListOutdated => Ok(AdapterResponse::Outdated(self.list_outdated()?)),
            AdapterRequest::Install { package, .. } => {
                let _ = self.source.install_toolchain(&package.name)?;
                Ok(AdapterResponse::Mutated(MutationReport {
                    package: Some(package),
                    operation: Operation::Install,
                }))
            }
            AdapterRequest::Uninstall { package } => {
                let _ = self.source.uninstall_toolchain(&package.name)?;
                Ok(AdapterResponse::Mutated(MutationReport {
                    package: Some(package),
                    operation: Operation::Uninstall,
                }))
            }
            AdapterRequest::Upgrade {
                package,
                candidate_version,
            } => {
                let _ = self.source.update_toolchain(&package.name)?;
                let still = self
                    .list_outdated()?
                    .into_iter()
                    .find(|outdated| outdated.package.name == package.name);
                crate::adapters::contract::verify_against_requery(
                    ManagerId::Rustup,
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
            other => Err(CoreError::unsupported(ManagerId::Rustup, other.operation())),
        }
    }
}

/// `rustup 1.28.2 (54dd3d00f 2024-04-24)` → `1.28.2`.
fn parse_version(output: &str) -> Option<String> {
    crate::adapters::support::first_line(output)?
        .strip_prefix("rustup ")
        .and_then(|rest| rest.split_whitespace().next())
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

/// `rustup toolchain list`: one toolchain per line, optional ` (active,
/// default)` suffix. No version column; the toolchain label is the identity.
fn parse_toolchain_list(output: &str) -> Vec<InstalledPackage> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let name = line.split_once(" (").map_or(line, |(name, _)| name).trim();
            if name.is_empty() {
                return None;
            }
            Some(InstalledPackage {
                package: PackageRef::new(ManagerId::Rustup, name),
                installed_version: None,
                pinned: false,
            })
        })
        .collect()
}

/// `rustup check` lines:
///
/// ```text
/// stable-x86_64-apple-darwin - Update available : 1.78.0 (9b00956e5 2024-04-29) -> 1.79.0 (129f3b996 2024-06-10)
/// nightly-x86_64-apple-darwin - Up to date : 1.80.0-nightly
/// rustup - Update available : 1.27.0 -> 1.27.1
/// ```
///
/// The `rustup` row is the binary itself (a SelfUpdate concern), not a
/// toolchain, and is excluded here.
fn parse_check(output: &str) -> CoreResult<Vec<OutdatedPackage>> {
    let mut packages = Vec::new();
    let mut skipped = 0_usize;

    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((name, rest)) = line.split_once(" - ") else {
            skipped += 1;
            continue;
        };
        let name = name.trim();
        if name == "rustup" || !rest.contains("Update available") {
            continue;
        }
        let Some((_, versions)) = rest.split_once(':') else {
            skipped += 1;
            continue;
        };
        let Some((current, latest)) = versions.split_once("->") else {
            skipped += 1;
            continue;
        };

        let installed = current.split_whitespace().next().map(str::to_owned);
        let Some(candidate) = latest.split_whitespace().next().map(str::to_owned) else {
            skipped += 1;
            continue;
        };

        packages.push(OutdatedPackage {
            package: PackageRef::new(ManagerId::Rustup, name),
            installed_version: installed,
            candidate_version: candidate,
            pinned: false,
            restart_required: false,
        });
    }

    if packages.is_empty() && skipped > 0 {
        return Err(CoreError::parse_failure(
            ManagerId::Rustup,
            format!("no parseable check lines ({skipped} skipped)"),
        ));
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOOLCHAINS_FIXTURE: &str = include_str!("../../tests/fixtures/rustup/toolchain_list.txt");
    const CHECK_FIXTURE: &str = include_str!("../../tests/fixtures/rustup/check.txt");

    #[test]
    fn version_parses_from_banner() {
        assert_eq!(
            parse_version("rustup 1.28.2 (54dd3d00f 2024-04-24)\n").as_deref(),
            Some("1.28.2")
        );
        assert!(parse_version("").is_none());
    }

    #[test]
    fn toolchain_list_strips_annotations() {
        let packages = parse_toolchain_list(TOOLCHAINS_FIXTURE);
        let names: Vec<&str> = packages
            .iter()
            .map(|package| package.package.name.as_str())
            .collect();
        assert_eq!(
            names,
            [
                "stable-x86_64-apple-darwin",
                "nightly-x86_64-apple-darwin",
                "1.75.0-x86_64-apple-darwin"
            ]
        );
    }

    #[test]
    fn check_reports_only_toolchains_with_updates() {
        let packages = parse_check(CHECK_FIXTURE).unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].package.name, "stable-x86_64-apple-darwin");
        assert_eq!(packages[0].installed_version.as_deref(), Some("1.78.0"));
        assert_eq!(packages[0].candidate_version, "1.79.0");
    }

    #[test]
    fn check_excludes_the_rustup_binary_row() {
        let packages = parse_check("rustup - Update available : 1.27.0 -> 1.27.1\n").unwrap();
        assert!(packages.is_empty());
    }

    #[test]
    fn empty_check_output_is_an_empty_list() {
        assert!(parse_check("").unwrap().is_empty());
    }
}
