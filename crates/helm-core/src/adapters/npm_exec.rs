use std::sync::Arc;
use std::time::Duration;

use crate::adapters::npm::{NpmProbe, NpmSource};
use crate::adapters::support::{
    augmented_path, run_for_stdout, run_for_stdout_accepting, which_executable,
};
use crate::exec::{CommandLine, ExecRequest, ProcessRunner};
use crate::models::{CoreResult, ManagerId, Operation};

const NPM: &str = "npm";
const NPM_PATHS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin"];
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(120);
const MUTATE_TIMEOUT: Duration = Duration::from_secs(900);

pub struct ProcessNpmSource {
    runner: Arc<dyn ProcessRunner>,
}

impl ProcessNpmSource {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    fn npm(&self, operation: Operation, args: &[&str], timeout: Duration) -> ExecRequest {
        ExecRequest::new(
            ManagerId::Npm,
            operation,
            CommandLine::new(NPM).args(args.iter().copied()),
        )
        .env("PATH", augmented_path(NPM_PATHS))
        .env("NO_UPDATE_NOTIFIER", "1")
        .timeout(timeout)
    }
}

impl NpmSource for ProcessNpmSource {
    fn probe(&self) -> CoreResult<NpmProbe> {
        let executable_path =
            which_executable(self.runner.as_ref(), ManagerId::Npm, NPM, NPM_PATHS);
        let version_output = run_for_stdout(
            self.runner.as_ref(),
            self.npm(Operation::Detect, &["--version"], PROBE_TIMEOUT),
        )
        .unwrap_or_default();
        Ok(NpmProbe {
            executable_path,
            version_output,
        })
    }

    fn list_global_json(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.npm(
                Operation::ListInstalled,
                &["ls", "--global", "--depth=0", "--json"],
                LIST_TIMEOUT,
            ),
        )
    }

    fn outdated_global_json(&self) -> CoreResult<String> {
        // Exit code 1 means "something is outdated", which is the answer.
        run_for_stdout_accepting(
            self.runner.as_ref(),
            self.npm(
                Operation::ListOutdated,
                &["outdated", "--global", "--json"],
                LIST_TIMEOUT,
            ),
            &[0, 1],
        )
    }

    fn search_json(&self, query: &str) -> CoreResult<String> {
        let mut request = self.npm(Operation::Search, &["search", "--json", "--"], LIST_TIMEOUT);
        request.command = request.command.arg(query);
        run_for_stdout(self.runner.as_ref(), request)
    }

    fn install_global(&self, spec: &str) -> CoreResult<String> {
        let mut request = self.npm(
            Operation::Install,
            &["install", "--global", "--"],
            MUTATE_TIMEOUT,
        );
        request.command = request.command.arg(spec);
        run_for_stdout(self.runner.as_ref(), request)
    }

    fn uninstall_global(&self, name: &str) -> CoreResult<String> {
        let mut request = self.npm(
            Operation::Uninstall,
            &["uninstall", "--global", "--"],
            MUTATE_TIMEOUT,
        );
        request.command = request.command.arg(name);
        run_for_stdout(self.runner.as_ref(), request)
    }
}
