//! Mac App Store via `mas`. The numeric product id is the stable package
//! name; app titles ride along as search summaries.

use std::path::PathBuf;

use crate::adapters::contract::{AdapterRequest, AdapterResponse, ManagerAdapter};
use crate::models::{
    CoreError, CoreResult, DetectionInfo, InstalledPackage, ManagerId, OutdatedPackage,
    PackageCandidate, PackageRef, SearchHit, SearchQuery,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MasProbe {
    pub executable_path: Option<PathBuf>,
    pub version_output: String,
}

pub trait MasSource: Send + Sync {
    fn probe(&self) -> CoreResult<MasProbe>;

    fn list_installed(&self) -> CoreResult<String>;

    fn list_outdated(&self) -> CoreResult<String>;

    fn search(&self, query: &str) -> CoreResult<String>;

    fn upgrade(&self, product_id: &str) -> CoreResult<String>;
}

pub struct MasAdapter<S: MasSource> {
    source: S,
}

impl<S: MasSource> MasAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    fn outdated(&self) -> CoreResult<Vec<OutdatedPackage>> {
        parse_outdated(&self.source.list_outdated()?)
    }
}

impl<S: MasSource> ManagerAdapter for MasAdapter<S> {
    fn id(&self) -> ManagerId {
        ManagerId::Mas
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
            AdapterRequest::ListInstalled => Ok(AdapterResponse::Installed(parse_installed(
                &self.source.list_installed()?,
            )?)),
            AdapterRequest::ListOutdated => Ok(AdapterResponse::Outdated(self.outdated()?)),
            AdapterRequest::Search { query } => Ok(AdapterResponse::SearchResults(parse_search(
                &self.source.search(query.text.trim())?,
                &query,
            )?)),
            AdapterRequest::Upgrade {
                package,
                candidate_version,
            } => {
                let _ = self.source.upgrade(&package.name)?;
                let still = self
                    .outdated()?
                    .into_iter()
                    .find(|outdated| outdated.package.name == package.name);
                crate::adapters::contract::verify_against_requery(
                    ManagerId::Mas,
                    package,
                    candidate_version.as_deref(),
                    still.as_ref(),
                )
            }
            other => Err(CoreError::unsupported(ManagerId::Mas, other.operation())),
        }
    }
}

fn parse_version(output: &str) -> Option<String> {
    crate::adapters::support::first_line(output)
        .filter(|line| line.chars().next().is_some_and(|ch| ch.is_ascii_digit()))
        .map(str::to_owned)
}

/// `mas list`: `497799835   Xcode   (15.3)`.
fn parse_installed(output: &str) -> CoreResult<Vec<InstalledPackage>> {
    let mut packages = Vec::new();
    let mut skipped = 0_usize;

    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let mut tokens = line.split_whitespace();
        let Some(product_id) = tokens.next().filter(|id| is_product_id(id)) else {
            skipped += 1;
            continue;
        };
        let version = tokens
            .last()
            .and_then(|token| token.strip_prefix('('))
            .and_then(|token| token.strip_suffix(')'))
            .map(str::to_owned);
        packages.push(InstalledPackage {
            package: PackageRef::new(ManagerId::Mas, product_id),
            installed_version: version,
            pinned: false,
        });
    }

    if packages.is_empty() && skipped > 0 {
        return Err(CoreError::parse_failure(
            ManagerId::Mas,
            format!("no parseable app lines ({skipped} skipped)"),
        ));
    }
    Ok(packages)
}

/// `mas outdated`: `497799835 Xcode (15.3 -> 15.4)`.
fn parse_outdated(output: &str) -> CoreResult<Vec<OutdatedPackage>> {
    let mut packages = Vec::new();
    let mut skipped = 0_usize;

    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some(package) = parse_outdated_line(line) else {
            skipped += 1;
            continue;
        };
        packages.push(package);
    }

    if packages.is_empty() && skipped > 0 {
        return Err(CoreError::parse_failure(
            ManagerId::Mas,
            format!("no parseable outdated lines ({skipped} skipped)"),
        ));
    }
    Ok(packages)
}

fn parse_outdated_line(line: &str) -> Option<OutdatedPackage> {
    let product_id = line.split_whitespace().next().filter(|id| is_product_id(id))?;
    let versions = line.rfind('(').map(|start| &line[start + 1..])?;
    let versions = versions.strip_suffix(')').unwrap_or(versions);
    let (current, latest) = versions.split_once("->")?;

    Some(OutdatedPackage {
        package: PackageRef::new(ManagerId::Mas, product_id),
        installed_version: Some(current.trim().to_owned()).filter(|v| !v.is_empty()),
        candidate_version: latest.trim().to_owned(),
        pinned: false,
        restart_required: false,
    })
}

/// `mas search`: `  497799835  Xcode  (15.4)`; the title becomes the summary.
fn parse_search(output: &str, query: &SearchQuery) -> CoreResult<Vec<SearchHit>> {
    let mut hits = Vec::new();

    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let mut tokens = line.split_whitespace();
        let Some(product_id) = tokens.next().filter(|id| is_product_id(id)) else {
            continue;
        };
        let remainder: Vec<&str> = tokens.collect();
        let (title_tokens, version) = match remainder.last() {
            Some(last) if last.starts_with('(') && last.ends_with(')') => (
                &remainder[..remainder.len() - 1],
                Some(last.trim_matches(|ch| ch == '(' || ch == ')').to_owned()),
            ),
            _ => (&remainder[..], None),
        };
        let title = title_tokens.join(" ");

        hits.push(SearchHit {
            candidate: PackageCandidate {
                package: PackageRef::new(ManagerId::Mas, product_id),
                version,
                summary: (!title.is_empty()).then_some(title),
            },
            source_manager: ManagerId::Mas,
            origin_query: query.text.clone(),
            inserted_at: query.issued_at,
        });
    }

    Ok(hits)
}

fn is_product_id(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|ch| ch.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;

    const LIST_FIXTURE: &str = include_str!("../../tests/fixtures/mas/list.txt");
    const OUTDATED_FIXTURE: &str = include_str!("../../tests/fixtures/mas/outdated.txt");
    const SEARCH_FIXTURE: &str = include_str!("../../tests/fixtures/mas/search.txt");

    #[test]
    fn installed_fixture_keys_by_product_id() {
        let packages = parse_installed(LIST_FIXTURE).unwrap();
        assert_eq!(packages.len(), 3);
        assert_eq!(packages[0].package.name, "497799835");
        assert_eq!(packages[0].installed_version.as_deref(), Some("15.3"));
    }

    #[test]
    fn outdated_fixture_parses_version_arrow() {
        let packages = parse_outdated(OUTDATED_FIXTURE).unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].package.name, "497799835");
        assert_eq!(packages[0].installed_version.as_deref(), Some("15.3"));
        assert_eq!(packages[0].candidate_version, "15.4");
    }

    #[test]
    fn search_fixture_moves_titles_into_summaries() {
        let hits = parse_search(SEARCH_FIXTURE, &SearchQuery::new("xcode")).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].candidate.package.name, "497799835");
        assert_eq!(hits[0].candidate.summary.as_deref(), Some("Xcode"));
        assert_eq!(hits[0].candidate.version.as_deref(), Some("15.4"));
    }

    #[test]
    fn empty_lists_parse_to_empty() {
        assert!(parse_installed("").unwrap().is_empty());
        assert!(parse_outdated("").unwrap().is_empty());
    }

    #[test]
    fn non_app_noise_is_a_parse_failure_when_nothing_parses() {
        assert_eq!(
            parse_outdated("Error: failed to reach the App Store").unwrap_err().kind,
            ErrorKind::ParseFailure
        );
    }
}
