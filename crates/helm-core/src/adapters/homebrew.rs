//! Homebrew formulae. The only manager with native pins; also the only one
//! with a keg retention policy consulted after upgrades.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::contract::{
    AdapterRequest, AdapterResponse, ManagerAdapter, MutationReport, UpgradeReport,
    UpgradeVerification,
};
use crate::models::{
    CoreError, CoreResult, DetectionInfo, InstalledPackage, KegPolicy, ManagerId, Operation,
    OutdatedPackage, PackageCandidate, PackageRef, SearchHit, SearchQuery,
};

/// Resolves the effective keg policy for a formula (global flag merged with
/// per-package overrides). The engine supplies a store-backed implementation.
pub trait KegPolicyLookup: Send + Sync {
    fn effective_policy(&self, package_name: &str) -> KegPolicy;
}

/// Default when no policy source is wired in (tests, bare adapters).
pub struct KeepAllKegs;

impl KegPolicyLookup for KeepAllKegs {
    fn effective_policy(&self, _package_name: &str) -> KegPolicy {
        KegPolicy::Keep
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HomebrewProbe {
    pub executable_path: Option<PathBuf>,
    pub version_output: String,
}

pub trait HomebrewSource: Send + Sync {
    fn probe(&self) -> CoreResult<HomebrewProbe>;

    fn installed_formulae(&self) -> CoreResult<String>;

    fn outdated_formulae(&self) -> CoreResult<String>;

    fn pinned_formulae(&self) -> CoreResult<String>;

    fn search_formulae(&self, query: &str) -> CoreResult<String>;

    fn install(&self, name: &str) -> CoreResult<String>;

    fn uninstall(&self, name: &str) -> CoreResult<String>;

    fn upgrade(&self, name: &str) -> CoreResult<String>;

    fn cleanup(&self, name: &str) -> CoreResult<String>;

    fn pin(&self, name: &str) -> CoreResult<String>;

    fn unpin(&self, name: &str) -> CoreResult<String>;
}

pub struct HomebrewAdapter<S: HomebrewSource> {
    source: S,
    keg_policy: Arc<dyn KegPolicyLookup>,
}

impl<S: HomebrewSource> HomebrewAdapter<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            keg_policy: Arc::new(KeepAllKegs),
        }
    }

    pub fn with_keg_policy(mut self, keg_policy: Arc<dyn KegPolicyLookup>) -> Self {
        self.keg_policy = keg_policy;
        self
    }

    fn list_installed(&self) -> CoreResult<Vec<InstalledPackage>> {
        let raw = self.source.installed_formulae()?;
        let pinned = self.pinned_set()?;
        let mut packages = parse_installed(&raw)?;
        for package in &mut packages {
            package.pinned = pinned.contains(&package.package.name);
        }
        Ok(packages)
    }

    fn list_outdated(&self) -> CoreResult<Vec<OutdatedPackage>> {
        let raw = self.source.outdated_formulae()?;
        let pinned = self.pinned_set()?;
        let mut packages = parse_outdated(&raw)?;
        for package in &mut packages {
            package.pinned = pinned.contains(&package.package.name);
        }
        Ok(packages)
    }

    fn pinned_set(&self) -> CoreResult<HashSet<String>> {
        let raw = self.source.pinned_formulae()?;
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }

    fn upgrade_verified(
        &self,
        package: PackageRef,
        candidate_version: Option<String>,
    ) -> CoreResult<AdapterResponse> {
        let _ = self.source.upgrade(&package.name)?;

        let still_outdated = self
            .list_outdated()?
            .into_iter()
            .find(|outdated| outdated.package.name == package.name);

        let response = crate::adapters::contract::verify_against_requery(
            ManagerId::HomebrewFormula,
            package,
            candidate_version.as_deref(),
            still_outdated.as_ref(),
        )?;

        // Old kegs are only swept once the formula is fully current.
        if let AdapterResponse::Upgraded(UpgradeReport {
            package,
            verification: UpgradeVerification::Confirmed,
            ..
        }) = &response
            && self.keg_policy.effective_policy(&package.name) == KegPolicy::Cleanup
            && let Err(error) = self.source.cleanup(&package.name)
        {
            tracing::warn!(
                manager = %ManagerId::HomebrewFormula,
                package = %package.name,
                %error,
                "keg cleanup after upgrade failed"
            );
        }

        Ok(response)
    }
}

impl<S: HomebrewSource> ManagerAdapter for HomebrewAdapter<S> {
    fn id(&self) -> ManagerId {
        ManagerId::HomebrewFormula
    }

    fn execute(&self, request: AdapterRequest) -> CoreResult<AdapterResponse> {
        match request {
            AdapterRequest::Detect => {
                let probe = self.source.probe()?;
                Ok(AdapterResponse::Detection(parse_probe(probe)))
            }
            AdapterRequest::ListInstalled => Ok(AdapterResponse::Installed(self.list_installed()?)),
            AdapterRequest::ListOutdated => Ok(AdapterResponse::Outdated(self.list_outdated()?)),
            AdapterRequest::Search { query } => {
                let raw = self.source.search_formulae(query.text.trim())?;
                Ok(AdapterResponse::SearchResults(parse_search(&raw, &query)?))
            }
            AdapterRequest::Install { package, .. } => {
                let _ = self.source.install(&package.name)?;
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
            } => self.upgrade_verified(package, candidate_version),
            AdapterRequest::Pin { package, .. } => {
                let _ = self.source.pin(&package.name)?;
                Ok(AdapterResponse::Mutated(MutationReport {
                    package: Some(package),
                    operation: Operation::Pin,
                }))
            }
            AdapterRequest::Unpin { package } => {
                let _ = self.source.unpin(&package.name)?;
                Ok(AdapterResponse::Mutated(MutationReport {
                    package: Some(package),
                    operation: Operation::Unpin,
                }))
            }
            AdapterRequest::SelfUpdate => Err(CoreError::unsupported(
                ManagerId::HomebrewFormula,
                Operation::SelfUpdate,
            )),
        }
    }
}

fn parse_probe(probe: HomebrewProbe) -> DetectionInfo {
    let version = parse_version_banner(&probe.version_output);
    DetectionInfo {
        installed: probe.executable_path.is_some() || version.is_some(),
        executable_path: probe.executable_path,
        version,
    }
}

/// `brew --version` banner: `Homebrew 4.2.21`.
pub fn parse_version_banner(output: &str) -> Option<String> {
    crate::adapters::support::first_line(output)
        .and_then(|line| line.strip_prefix("Homebrew "))
        .map(|rest| rest.split_whitespace().next().unwrap_or(rest).to_owned())
        .filter(|version| !version.is_empty())
}

/// `brew list --formula --versions`: one formula per line, name then one or
/// more installed versions; the newest (last) token is the active version.
fn parse_installed(output: &str) -> CoreResult<Vec<InstalledPackage>> {
    let mut packages = Vec::new();
    let mut skipped = 0_usize;

    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some(name) if !name.starts_with('-') => {
                packages.push(InstalledPackage {
                    package: PackageRef::new(ManagerId::HomebrewFormula, name),
                    installed_version: tokens.last().map(str::to_owned),
                    pinned: false,
                });
            }
            _ => skipped += 1,
        }
    }

    if packages.is_empty() && skipped > 0 {
        return Err(CoreError::parse_failure(
            ManagerId::HomebrewFormula,
            format!("no parseable formula lines ({skipped} skipped)"),
        ));
    }
    Ok(packages)
}

/// `brew outdated --formula --verbose`: `git (2.44.0) < 2.45.1`.
fn parse_outdated(output: &str) -> CoreResult<Vec<OutdatedPackage>> {
    let mut packages = Vec::new();
    let mut skipped = 0_usize;

    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        match parse_outdated_line(line) {
            Some(package) => packages.push(package),
            None => skipped += 1,
        }
    }

    if packages.is_empty() && skipped > 0 {
        return Err(CoreError::parse_failure(
            ManagerId::HomebrewFormula,
            format!("no parseable outdated lines ({skipped} skipped)"),
        ));
    }
    Ok(packages)
}

fn parse_outdated_line(line: &str) -> Option<OutdatedPackage> {
    let (left, candidate) = line.split_once(" < ")?;
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }

    let mut left_tokens = left.split_whitespace();
    let name = left_tokens.next()?;
    let installed_version = left_tokens
        .next()
        .map(|token| token.trim_matches(|ch| ch == '(' || ch == ')').to_owned())
        .filter(|version| !version.is_empty());

    Some(OutdatedPackage {
        package: PackageRef::new(ManagerId::HomebrewFormula, name),
        installed_version,
        candidate_version: candidate.to_owned(),
        pinned: false,
        restart_required: false,
    })
}

/// `brew search` output: `==> Formulae` / `==> Casks` sections with
/// whitespace-separated names. Casks belong to a different manager and are
/// skipped here.
fn parse_search(output: &str, query: &SearchQuery) -> CoreResult<Vec<SearchHit>> {
    #[derive(Eq, PartialEq)]
    enum Section {
        Formulae,
        Casks,
    }

    let mut hits = Vec::new();
    let mut seen = HashSet::new();
    let mut section = Section::Formulae;

    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(header) = line.strip_prefix("==>") {
            section = if header.to_ascii_lowercase().contains("cask") {
                Section::Casks
            } else {
                Section::Formulae
            };
            continue;
        }
        if section == Section::Casks || is_no_match_diagnostic(line) {
            continue;
        }

        for token in line.split_whitespace().filter(|token| is_formula_token(token)) {
            if seen.insert(token.to_owned()) {
                hits.push(SearchHit {
                    candidate: PackageCandidate {
                        package: PackageRef::new(ManagerId::HomebrewFormula, token),
                        version: None,
                        summary: None,
                    },
                    source_manager: ManagerId::HomebrewFormula,
                    origin_query: query.text.clone(),
                    inserted_at: query.issued_at,
                });
            }
        }
    }

    Ok(hits)
}

fn is_formula_token(token: &str) -> bool {
    !token.is_empty()
        && token.chars().all(|ch| {
            ch.is_ascii_alphanumeric() || matches!(ch, '@' | '+' | '-' | '_' | '.' | '/')
        })
        && !token.starts_with('-')
}

fn is_no_match_diagnostic(line: &str) -> bool {
    line.to_ascii_lowercase().starts_with("no formula")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::adapters::contract::execute_checked;
    use crate::models::ErrorKind;

    const INSTALLED_FIXTURE: &str =
        include_str!("../../tests/fixtures/homebrew/list_installed_versions.txt");
    const OUTDATED_FIXTURE: &str =
        include_str!("../../tests/fixtures/homebrew/outdated_verbose.txt");
    const SEARCH_FIXTURE: &str = include_str!("../../tests/fixtures/homebrew/search.txt");

    #[test]
    fn version_banner_parses() {
        assert_eq!(
            parse_version_banner("Homebrew 4.2.21\n").as_deref(),
            Some("4.2.21")
        );
        assert!(parse_version_banner("").is_none());
        assert!(parse_version_banner("brew: command not found").is_none());
    }

    #[test]
    fn installed_fixture_parses_with_latest_version_token() {
        let packages = parse_installed(INSTALLED_FIXTURE).unwrap();
        assert_eq!(packages.len(), 4);
        assert_eq!(packages[0].package.name, "git");
        assert_eq!(packages[0].installed_version.as_deref(), Some("2.44.0"));
        assert_eq!(packages[1].package.name, "python@3.12");
        assert_eq!(packages[1].installed_version.as_deref(), Some("3.12.3"));
    }

    #[test]
    fn outdated_fixture_parses_installed_and_candidate() {
        let packages = parse_outdated(OUTDATED_FIXTURE).unwrap();
        assert_eq!(packages.len(), 3);
        assert_eq!(packages[0].package.name, "git");
        assert_eq!(packages[0].installed_version.as_deref(), Some("2.44.0"));
        assert_eq!(packages[0].candidate_version, "2.45.1");
        assert!(!packages[0].restart_required);
    }

    #[test]
    fn empty_outdated_output_is_an_empty_list() {
        assert!(parse_outdated("").unwrap().is_empty());
        assert!(parse_outdated("  \n \n").unwrap().is_empty());
    }

    #[test]
    fn fully_malformed_outdated_output_is_a_parse_failure() {
        let error = parse_outdated("Error: API rate limit").unwrap_err();
        assert_eq!(error.kind, ErrorKind::ParseFailure);
    }

    #[test]
    fn search_fixture_skips_casks_and_diagnostics() {
        let query = SearchQuery::new("rip");
        let hits = parse_search(SEARCH_FIXTURE, &query).unwrap();
        let names: Vec<&str> = hits
            .iter()
            .map(|hit| hit.candidate.package.name.as_str())
            .collect();
        assert_eq!(names, ["ripgrep", "ripgrep-all", "ripsecrets"]);
        assert!(hits.iter().all(|hit| hit.origin_query == "rip"));
    }

    #[test]
    fn upgrade_still_pending_at_the_same_candidate_is_ineffective() {
        let source = ScriptedSource {
            outdated_after_upgrade: "wget (1.24.5) < 1.25.0",
            ..ScriptedSource::default()
        };
        let adapter = HomebrewAdapter::new(source);
        let error = adapter
            .execute(AdapterRequest::Upgrade {
                package: PackageRef::new(ManagerId::HomebrewFormula, "wget"),
                candidate_version: Some("1.25.0".to_string()),
            })
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::ProcessFailure);
        assert!(error.message.contains("ineffective upgrade"));
    }

    #[test]
    fn upgrade_superseded_by_a_newer_candidate_counts_as_landed() {
        // The 1.25.0 upgrade took; 1.26.0 was published in between.
        let source = ScriptedSource {
            outdated_after_upgrade: "wget (1.25.0) < 1.26.0",
            ..ScriptedSource::default()
        };
        let cleanups = source.cleanups.clone();
        let adapter = HomebrewAdapter::new(source);
        let response = adapter
            .execute(AdapterRequest::Upgrade {
                package: PackageRef::new(ManagerId::HomebrewFormula, "wget"),
                candidate_version: Some("1.25.0".to_string()),
            })
            .unwrap();
        let AdapterResponse::Upgraded(report) = response else {
            panic!("expected an upgrade report");
        };
        assert!(report.executed);
        assert_eq!(
            report.verification,
            UpgradeVerification::StillOutdated {
                candidate_version: "1.26.0".to_string()
            }
        );
        assert!(
            cleanups.lock().unwrap().is_empty(),
            "kegs are only swept once the formula is fully current"
        );
    }

    #[test]
    fn verified_upgrade_runs_cleanup_only_under_cleanup_policy() {
        struct CleanupAll;
        impl KegPolicyLookup for CleanupAll {
            fn effective_policy(&self, _package_name: &str) -> KegPolicy {
                KegPolicy::Cleanup
            }
        }

        let source = ScriptedSource::default();
        let cleanups = source.cleanups.clone();
        let adapter = HomebrewAdapter::new(source).with_keg_policy(Arc::new(CleanupAll));

        let response = adapter
            .execute(AdapterRequest::Upgrade {
                package: PackageRef::new(ManagerId::HomebrewFormula, "wget"),
                candidate_version: Some("1.25.0".to_string()),
            })
            .unwrap();
        assert!(matches!(
            response,
            AdapterResponse::Upgraded(UpgradeReport {
                verification: UpgradeVerification::Confirmed,
                ..
            })
        ));
        assert_eq!(*cleanups.lock().unwrap(), vec!["wget".to_string()]);
    }

    #[test]
    fn pinned_formulae_flag_installed_and_outdated_rows() {
        let source = ScriptedSource {
            pinned: "git\n",
            ..ScriptedSource::default()
        };
        let adapter = HomebrewAdapter::new(source);

        let response = execute_checked(&adapter, AdapterRequest::ListOutdated).unwrap();
        let AdapterResponse::Outdated(packages) = response else {
            panic!("expected outdated packages");
        };
        let git = packages
            .iter()
            .find(|package| package.package.name == "git")
            .unwrap();
        assert!(git.pinned);
        assert!(
            !packages
                .iter()
                .any(|package| package.package.name != "git" && package.pinned)
        );
    }

    struct ScriptedSource {
        pinned: &'static str,
        outdated_after_upgrade: &'static str,
        upgraded: Mutex<bool>,
        cleanups: Arc<Mutex<Vec<String>>>,
    }

    impl Default for ScriptedSource {
        fn default() -> Self {
            Self {
                pinned: "",
                outdated_after_upgrade: "",
                upgraded: Mutex::new(false),
                cleanups: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl HomebrewSource for ScriptedSource {
        fn probe(&self) -> CoreResult<HomebrewProbe> {
            Ok(HomebrewProbe {
                executable_path: Some(PathBuf::from("/opt/homebrew/bin/brew")),
                version_output: "Homebrew 4.2.21".to_string(),
            })
        }

        fn installed_formulae(&self) -> CoreResult<String> {
            Ok(INSTALLED_FIXTURE.to_string())
        }

        fn outdated_formulae(&self) -> CoreResult<String> {
            if *self.upgraded.lock().unwrap() {
                Ok(self.outdated_after_upgrade.to_string())
            } else {
                Ok(OUTDATED_FIXTURE.to_string())
            }
        }

        fn pinned_formulae(&self) -> CoreResult<String> {
            Ok(self.pinned.to_string())
        }

        fn search_formulae(&self, _query: &str) -> CoreResult<String> {
            Ok(SEARCH_FIXTURE.to_string())
        }

        fn install(&self, _name: &str) -> CoreResult<String> {
            Ok(String::new())
        }

        fn uninstall(&self, _name: &str) -> CoreResult<String> {
            Ok(String::new())
        }

        fn upgrade(&self, _name: &str) -> CoreResult<String> {
            *self.upgraded.lock().unwrap() = true;
            Ok(String::new())
        }

        fn cleanup(&self, name: &str) -> CoreResult<String> {
            self.cleanups.lock().unwrap().push(name.to_string());
            Ok(String::new())
        }

        fn pin(&self, _name: &str) -> CoreResult<String> {
            Ok(String::new())
        }

        fn unpin(&self, _name: &str) -> CoreResult<String> {
            Ok(String::new())
        }
    }
}
