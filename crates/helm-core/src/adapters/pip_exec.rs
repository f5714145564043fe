use std::sync::Arc;
use std::time::Duration;

use crate::adapters::pip::{PipProbe, PipSource};
use crate::adapters::support::{augmented_path, run_for_stdout, which_executable};
use crate::exec::{CommandLine, ExecRequest, ProcessRunner};
use crate::models::{CoreResult, ManagerId, Operation};

const PYTHON: &str = "python3";
const PIP_PATHS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin"];
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(120);
const MUTATE_TIMEOUT: Duration = Duration::from_secs(900);

pub struct ProcessPipSource {
    runner: Arc<dyn ProcessRunner>,
}

impl ProcessPipSource {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    fn pip(&self, operation: Operation, args: &[&str], timeout: Duration) -> ExecRequest {
        ExecRequest::new(
            ManagerId::Pip,
            operation,
            CommandLine::new(PYTHON)
                .args(["-m", "pip"])
                .args(args.iter().copied()),
        )
        .env("PATH", augmented_path(PIP_PATHS))
        .env("PIP_DISABLE_PIP_VERSION_CHECK", "1")
        .timeout(timeout)
    }
}

impl PipSource for ProcessPipSource {
    fn probe(&self) -> CoreResult<PipProbe> {
        let executable_path = which_executable(
            self.runner.as_ref(),
            ManagerId::Pip,
            PYTHON,
            PIP_PATHS,
        );
        let version_output = run_for_stdout(
            self.runner.as_ref(),
            self.pip(Operation::Detect, &["--version"], PROBE_TIMEOUT),
        )
        .unwrap_or_default();
        Ok(PipProbe {
            executable_path,
            version_output,
        })
    }

    fn list_json(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.pip(
                Operation::ListInstalled,
                &["list", "--format=json"],
                LIST_TIMEOUT,
            ),
        )
    }

    fn outdated_json(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.pip(
                Operation::ListOutdated,
                &["list", "--outdated", "--format=json"],
                LIST_TIMEOUT,
            ),
        )
    }

    fn install(&self, spec: &str) -> CoreResult<String> {
        let mut request = self.pip(Operation::Install, &["install", "--"], MUTATE_TIMEOUT);
        request.command = request.command.arg(spec);
        run_for_stdout(self.runner.as_ref(), request)
    }

    fn uninstall(&self, name: &str) -> CoreResult<String> {
        let mut request = self.pip(
            Operation::Uninstall,
            &["uninstall", "--yes", "--"],
            MUTATE_TIMEOUT,
        );
        request.command = request.command.arg(name);
        run_for_stdout(self.runner.as_ref(), request)
    }

    fn upgrade(&self, name: &str) -> CoreResult<String> {
        let mut request = self.pip(
            Operation::Upgrade,
            &["install", "--upgrade", "--"],
            MUTATE_TIMEOUT,
        );
        request.command = request.command.arg(name);
        run_for_stdout(self.runner.as_ref(), request)
    }
}
