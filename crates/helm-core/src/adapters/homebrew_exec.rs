use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::homebrew::{HomebrewProbe, HomebrewSource};
use crate::adapters::support::{augmented_path, run_for_stdout, which_executable};
use crate::exec::{CommandLine, ExecRequest, ProcessRunner};
use crate::models::{CoreResult, ManagerId, Operation};

const BREW: &str = "brew";
const BREW_PATHS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin"];
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(120);
const MUTATE_TIMEOUT: Duration = Duration::from_secs(1800);

pub struct ProcessHomebrewSource {
    runner: Arc<dyn ProcessRunner>,
}

impl ProcessHomebrewSource {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    fn brew(&self, operation: Operation, args: &[&str], timeout: Duration) -> ExecRequest {
        ExecRequest::new(
            ManagerId::HomebrewFormula,
            operation,
            CommandLine::new(BREW).args(args.iter().copied()),
        )
        .env("PATH", augmented_path(BREW_PATHS))
        .env("HOMEBREW_NO_AUTO_UPDATE", "1")
        .env("HOMEBREW_NO_ENV_HINTS", "1")
        .timeout(timeout)
    }

    fn brew_with_package(
        &self,
        operation: Operation,
        args: &[&str],
        name: &str,
        timeout: Duration,
    ) -> ExecRequest {
        ExecRequest::new(
            ManagerId::HomebrewFormula,
            operation,
            CommandLine::new(BREW)
                .args(args.iter().copied())
                .arg(name),
        )
        .env("PATH", augmented_path(BREW_PATHS))
        .env("HOMEBREW_NO_AUTO_UPDATE", "1")
        .env("HOMEBREW_NO_ENV_HINTS", "1")
        .timeout(timeout)
    }
}

impl HomebrewSource for ProcessHomebrewSource {
    fn probe(&self) -> CoreResult<HomebrewProbe> {
        let executable_path: Option<PathBuf> = which_executable(
            self.runner.as_ref(),
            ManagerId::HomebrewFormula,
            BREW,
            BREW_PATHS,
        );
        let version_output = run_for_stdout(
            self.runner.as_ref(),
            self.brew(Operation::Detect, &["--version"], PROBE_TIMEOUT),
        )
        .unwrap_or_default();

        Ok(HomebrewProbe {
            executable_path,
            version_output,
        })
    }

    fn installed_formulae(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.brew(
                Operation::ListInstalled,
                &["list", "--formula", "--versions"],
                LIST_TIMEOUT,
            ),
        )
    }

    fn outdated_formulae(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.brew(
                Operation::ListOutdated,
                &["outdated", "--formula", "--verbose"],
                LIST_TIMEOUT,
            ),
        )
    }

    fn pinned_formulae(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.brew(Operation::ListInstalled, &["list", "--pinned"], LIST_TIMEOUT),
        )
    }

    fn search_formulae(&self, query: &str) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.brew_with_package(
                Operation::Search,
                &["search", "--formula", "--"],
                query,
                LIST_TIMEOUT,
            ),
        )
    }

    fn install(&self, name: &str) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.brew_with_package(Operation::Install, &["install", "--"], name, MUTATE_TIMEOUT),
        )
    }

    fn uninstall(&self, name: &str) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.brew_with_package(
                Operation::Uninstall,
                &["uninstall", "--"],
                name,
                MUTATE_TIMEOUT,
            ),
        )
    }

    fn upgrade(&self, name: &str) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.brew_with_package(Operation::Upgrade, &["upgrade", "--"], name, MUTATE_TIMEOUT),
        )
    }

    fn cleanup(&self, name: &str) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.brew_with_package(Operation::Upgrade, &["cleanup", "--"], name, LIST_TIMEOUT),
        )
    }

    fn pin(&self, name: &str) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.brew_with_package(Operation::Pin, &["pin", "--"], name, LIST_TIMEOUT),
        )
    }

    fn unpin(&self, name: &str) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.brew_with_package(Operation::Unpin, &["unpin", "--"], name, LIST_TIMEOUT),
        )
    }
}
