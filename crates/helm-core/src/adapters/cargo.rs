//! Cargo installed binaries. Cargo has no native outdated listing, so the
//! descriptor omits ListOutdated and upgrades report unverified.

use std::path::PathBuf;

use crate::adapters::contract::{
    AdapterRequest, AdapterResponse, ManagerAdapter, MutationReport, UpgradeReport,
    UpgradeVerification,
};
use crate::models::{
    CoreError, CoreResult, DetectionInfo, InstalledPackage, ManagerId, Operation, PackageCandidate,
    PackageRef, SearchHit, SearchQuery,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CargoProbe {
    pub executable_path: Option<PathBuf>,
    pub version_output: String,
}

pub trait CargoSource: Send + Sync {
    fn probe(&self) -> CoreResult<CargoProbe>;

    fn install_list(&self) -> CoreResult<String>;

    fn search(&self, query: &str) -> CoreResult<String>;

    fn install(&self, name: &str, version: Option<&str>) -> CoreResult<String>;

    fn uninstall(&self, name: &str) -> CoreResult<String>;

    fn reinstall_latest(&self, name: &str) -> CoreResult<String>;
}

pub struct CargoAdapter<S: CargoSource> {
    source: S,
}

impl<S: CargoSource> CargoAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: CargoSource> ManagerAdapter for CargoAdapter<S> {
    fn id(&self) -> ManagerId {
        ManagerId::Cargo
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
            AdapterRequest::ListInstalled => Ok(AdapterResponse::Installed(parse_install_list(
                &self.source.install_list()?,
            )?)),
            AdapterRequest::Search { query } => Ok(AdapterResponse::SearchResults(parse_search(
                &self.source.search(query.text.trim())?,
                &query,
            )?)),
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
            // No outdated listing to re-query, so the pre-upgrade candidate
            // (if any) has nothing to compare against.
            AdapterRequest::Upgrade { package, .. } => {
                let _ = self.source.reinstall_latest(&package.name)?;
                Ok(AdapterResponse::Upgraded(UpgradeReport {
                    package,
                    executed: true,
                    verification: UpgradeVerification::Unverified,
                }))
            }
            other => Err(CoreError::unsupported(ManagerId::Cargo, other.operation())),
        }
    }
}

/// `cargo 1.78.0 (54d8815d0 2024-03-26)` → `1.78.0`.
fn parse_version(output: &str) -> Option<String> {
    crate::adapters::support::first_line(output)?
        .strip_prefix("cargo ")
        .and_then(|rest| rest.split_whitespace().next())
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

/// `cargo install --list`: header lines `name vX.Y.Z:` followed by indented
/// binary names. Only the headers matter here.
fn parse_install_list(output: &str) -> CoreResult<Vec<InstalledPackage>> {
    let mut packages = Vec::new();
    let mut skipped = 0_usize;

    for line in output.lines() {
        if line.starts_with(char::is_whitespace) || line.trim().is_empty() {
            continue;
        }
        let Some(header) = line.trim().strip_suffix(':') else {
            skipped += 1;
            continue;
        };
        let mut tokens = header.split_whitespace();
        let Some(name) = tokens.next() else {
            skipped += 1;
            continue;
        };
        let version = tokens
            .next()
            .and_then(|token| token.strip_prefix('v'))
            .map(str::to_owned);
        packages.push(InstalledPackage {
            package: PackageRef::new(ManagerId::Cargo, name),
            installed_version: version,
            pinned: false,
        });
    }

    if packages.is_empty() && skipped > 0 {
        return Err(CoreError::parse_failure(
            ManagerId::Cargo,
            format!("no parseable install --list headers ({skipped} skipped)"),
        ));
    }
    Ok(packages)
}

/// `cargo search`: `name = "1.0.0"    # description`. The closing
/// `... and N crates more` line is informational.
fn parse_search(output: &str, query: &SearchQuery) -> CoreResult<Vec<SearchHit>> {
    let mut hits = Vec::new();

    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if line.starts_with("...") {
            continue;
        }
        let Some((name_part, rest)) = line.split_once('=') else {
            continue;
        };
        let name = name_part.trim();
        if name.is_empty() {
            continue;
        }

        let (version_part, summary) = match rest.split_once('#') {
            Some((version, summary)) => (version, Some(summary.trim())),
            None => (rest, None),
        };
        let version = version_part.trim().trim_matches('"');

        hits.push(SearchHit {
            candidate: PackageCandidate {
                package: PackageRef::new(ManagerId::Cargo, name),
                version: (!version.is_empty()).then(|| version.to_owned()),
                summary: summary
                    .filter(|summary| !summary.is_empty())
                    .map(str::to_owned),
            },
            source_manager: ManagerId::Cargo,
            origin_query: query.text.clone(),
            inserted_at: query.issued_at,
        });
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;

    const INSTALL_LIST_FIXTURE: &str = include_str!("../../tests/fixtures/cargo/install_list.txt");
    const SEARCH_FIXTURE: &str = include_str!("../../tests/fixtures/cargo/search.txt");

    #[test]
    fn version_parses_from_banner() {
        assert_eq!(
            parse_version("cargo 1.78.0 (54d8815d0 2024-03-26)").as_deref(),
            Some("1.78.0")
        );
        assert!(parse_version("").is_none());
    }

    #[test]
    fn install_list_parses_headers_only() {
        let packages = parse_install_list(INSTALL_LIST_FIXTURE).unwrap();
        assert_eq!(packages.len(), 3);
        assert_eq!(packages[0].package.name, "cargo-edit");
        assert_eq!(packages[0].installed_version.as_deref(), Some("0.12.2"));
        assert_eq!(packages[2].package.name, "ripgrep");
    }

    #[test]
    fn search_parses_versions_and_summaries() {
        let query = SearchQuery::new("rip");
        let hits = parse_search(SEARCH_FIXTURE, &query).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].candidate.package.name, "ripgrep");
        assert_eq!(hits[0].candidate.version.as_deref(), Some("14.1.0"));
        assert!(hits[0].candidate.summary.as_deref().unwrap().contains("line-oriented"));
    }

    #[test]
    fn empty_outputs_are_empty_lists() {
        assert!(parse_install_list("").unwrap().is_empty());
        assert!(parse_search("", &SearchQuery::new("x")).unwrap().is_empty());
    }

    #[test]
    fn garbage_install_list_is_a_parse_failure() {
        assert_eq!(
            parse_install_list("error: no such subcommand").unwrap_err().kind,
            ErrorKind::ParseFailure
        );
    }
}
