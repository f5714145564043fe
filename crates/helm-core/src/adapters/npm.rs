//! npm global packages. JSON in, JSON out; `npm outdated` signals pending
//! work with exit code 1, which the source treats as success.

use std::path::PathBuf;

use serde_json::Value;

use crate::adapters::contract::{AdapterRequest, AdapterResponse, ManagerAdapter, MutationReport};
use crate::models::{
    CoreError, CoreResult, DetectionInfo, InstalledPackage, ManagerId, Operation, OutdatedPackage,
    PackageCandidate, PackageRef, SearchHit, SearchQuery,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NpmProbe {
    pub executable_path: Option<PathBuf>,
    pub version_output: String,
}

pub trait NpmSource: Send + Sync {
    fn probe(&self) -> CoreResult<NpmProbe>;

    fn list_global_json(&self) -> CoreResult<String>;

    fn outdated_global_json(&self) -> CoreResult<String>;

    fn search_json(&self, query: &str) -> CoreResult<String>;

    fn install_global(&self, spec: &str) -> CoreResult<String>;

    fn uninstall_global(&self, name: &str) -> CoreResult<String>;
}

pub struct NpmAdapter<S: NpmSource> {
    source: S,
}

impl<S: NpmSource> NpmAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    fn list_outdated(&self) -> CoreResult<Vec<OutdatedPackage>> {
        parse_outdated_json(&self.source.outdated_global_json()?)
    }
}

impl<S: NpmSource> ManagerAdapter for NpmAdapter<S> {
    fn id(&self) -> ManagerId {
        ManagerId::Npm
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
                &self.source.list_global_json()?,
            )?)),
            AdapterRequest::ListOutdated => Ok(AdapterResponse::Outdated(self.list_outdated()?)),
            AdapterRequest::Search { query } => Ok(AdapterResponse::SearchResults(
                parse_search_json(&self.source.search_json(query.text.trim())?, &query)?,
            )),
            AdapterRequest::Install { package, version } => {
                let spec = match version {
                    Some(version) => format!("{}@{version}", package.name),
                    None => package.name.clone(),
                };
                let _ = self.source.install_global(&spec)?;
                Ok(AdapterResponse::Mutated(MutationReport {
                    package: Some(package),
                    operation: Operation::Install,
                }))
            }
            AdapterRequest::Uninstall { package } => {
                let _ = self.source.uninstall_global(&package.name)?;
                Ok(AdapterResponse::Mutated(MutationReport {
                    package: Some(package),
                    operation: Operation::Uninstall,
                }))
            }
            AdapterRequest::Upgrade {
                package,
                candidate_version,
            } => {
                let _ = self
                    .source
                    .install_global(&format!("{}@latest", package.name))?;
                let still = self
                    .list_outdated()?
                    .into_iter()
                    .find(|outdated| outdated.package.name == package.name);
                crate::adapters::contract::verify_against_requery(
                    ManagerId::Npm,
                    package,
                    candidate_version.as_deref(),
                    still.as_ref(),
                )
            }
            other => Err(CoreError::unsupported(ManagerId::Npm, other.operation())),
        }
    }
}

/// `npm --version` prints the bare version.
fn parse_version(output: &str) -> Option<String> {
    crate::adapters::support::first_line(output)
        .filter(|line| line.chars().next().is_some_and(|ch| ch.is_ascii_digit()))
        .map(str::to_owned)
}

/// `npm ls -g --depth=0 --json`: `dependencies` object keyed by package name.
fn parse_list_json(raw: &str) -> CoreResult<Vec<InstalledPackage>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|error| json_error("ls", &error.to_string()))?;

    let mut packages = Vec::new();
    if let Some(Value::Object(dependencies)) = value.get("dependencies") {
        for (name, entry) in dependencies {
            let version = entry
                .get("version")
                .and_then(Value::as_str)
                .map(str::to_owned);
            packages.push(InstalledPackage {
                package: PackageRef::new(ManagerId::Npm, name),
                installed_version: version,
                pinned: false,
            });
        }
    }
    Ok(packages)
}

/// `npm outdated -g --json`: object keyed by package name with `current`,
/// `wanted`, `latest`.
fn parse_outdated_json(raw: &str) -> CoreResult<Vec<OutdatedPackage>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|error| json_error("outdated", &error.to_string()))?;
    let Value::Object(entries) = value else {
        return Err(json_error("outdated", "expected a top-level object"));
    };

    let mut packages = Vec::new();
    for (name, entry) in entries {
        let candidate = entry
            .get("latest")
            .or_else(|| entry.get("wanted"))
            .and_then(Value::as_str);
        let Some(candidate) = candidate else {
            continue;
        };
        packages.push(OutdatedPackage {
            package: PackageRef::new(ManagerId::Npm, name),
            installed_version: entry
                .get("current")
                .and_then(Value::as_str)
                .map(str::to_owned),
            candidate_version: candidate.to_owned(),
            pinned: false,
            restart_required: false,
        });
    }
    Ok(packages)
}

/// `npm search --json`: array of `{name, version, description}`.
fn parse_search_json(raw: &str, query: &SearchQuery) -> CoreResult<Vec<SearchHit>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|error| json_error("search", &error.to_string()))?;
    let Value::Array(entries) = value else {
        return Err(json_error("search", "expected a top-level array"));
    };

    let mut hits = Vec::new();
    for entry in entries {
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            continue;
        };
        hits.push(SearchHit {
            candidate: PackageCandidate {
                package: PackageRef::new(ManagerId::Npm, name),
                version: entry
                    .get("version")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                summary: entry
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .filter(|summary| !summary.trim().is_empty()),
            },
            source_manager: ManagerId::Npm,
            origin_query: query.text.clone(),
            inserted_at: query.issued_at,
        });
    }
    Ok(hits)
}

fn json_error(which: &str, detail: &str) -> CoreError {
    CoreError::parse_failure(
        ManagerId::Npm,
        format!("npm {which} --json output unreadable: {detail}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;

    const LS_FIXTURE: &str = include_str!("../../tests/fixtures/npm/ls_global.json");
    const OUTDATED_FIXTURE: &str = include_str!("../../tests/fixtures/npm/outdated_global.json");
    const SEARCH_FIXTURE: &str = include_str!("../../tests/fixtures/npm/search.json");

    #[test]
    fn version_is_the_bare_line() {
        assert_eq!(parse_version("10.5.0\n").as_deref(), Some("10.5.0"));
        assert!(parse_version("npm: command not found").is_none());
    }

    #[test]
    fn ls_fixture_parses_dependencies() {
        let packages = parse_list_json(LS_FIXTURE).unwrap();
        assert_eq!(packages.len(), 3);
        let eslint = packages
            .iter()
            .find(|package| package.package.name == "eslint")
            .unwrap();
        assert_eq!(eslint.installed_version.as_deref(), Some("8.57.0"));
    }

    #[test]
    fn outdated_fixture_prefers_latest_over_wanted() {
        let packages = parse_outdated_json(OUTDATED_FIXTURE).unwrap();
        assert_eq!(packages.len(), 2);
        let eslint = packages
            .iter()
            .find(|package| package.package.name == "eslint")
            .unwrap();
        assert_eq!(eslint.installed_version.as_deref(), Some("8.57.0"));
        assert_eq!(eslint.candidate_version, "9.5.0");
    }

    #[test]
    fn search_fixture_keeps_descriptions_as_summaries() {
        let query = SearchQuery::new("eslint");
        let hits = parse_search_json(SEARCH_FIXTURE, &query).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].candidate.package.name, "eslint");
        assert!(hits[0].candidate.summary.as_deref().unwrap().contains("linter"));
    }

    #[test]
    fn empty_documents_are_empty_lists() {
        assert!(parse_list_json("").unwrap().is_empty());
        assert!(parse_outdated_json("{}").unwrap().is_empty());
        assert!(parse_search_json("[]", &SearchQuery::new("x")).unwrap().is_empty());
    }

    #[test]
    fn malformed_json_is_a_parse_failure() {
        assert_eq!(
            parse_outdated_json("<html>").unwrap_err().kind,
            ErrorKind::ParseFailure
        );
        assert_eq!(
            parse_search_json("{}", &SearchQuery::new("x")).unwrap_err().kind,
            ErrorKind::ParseFailure
        );
    }
}
