use std::sync::Arc;
use std::time::Duration;

use crate::adapters::cargo::{CargoProbe, CargoSource};
use crate::adapters::support::{augmented_path, run_for_stdout, which_executable};
use crate::exec::{CommandLine, ExecRequest, ProcessRunner};
use crate::models::{CoreResult, ManagerId, Operation};

const CARGO: &str = "cargo";
const CARGO_PATHS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin"];
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(60);
// Installs compile from source.
const MUTATE_TIMEOUT: Duration = Duration::from_secs(3600);

pub struct ProcessCargoSource {
    runner: Arc<dyn ProcessRunner>,
}

impl ProcessCargoSource {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    fn cargo(&self, operation: Operation, args: &[&str], timeout: Duration) -> ExecRequest {
        ExecRequest::new(
            ManagerId::Cargo,
            operation,
            CommandLine::new(CARGO).args(args.iter().copied()),
        )
        .env("PATH", augmented_path(CARGO_PATHS))
        .timeout(timeout)
    }
}

impl CargoSource for ProcessCargoSource {
    fn probe(&self) -> CoreResult<CargoProbe> {
        let executable_path =
            which_executable(self.runner.as_ref(), ManagerId::Cargo, CARGO, CARGO_PATHS);
        let version_output = run_for_stdout(
            self.runner.as_ref(),
            self.cargo(Operation::Detect, &["--version"], PROBE_TIMEOUT),
        )
        .unwrap_or_default();
        Ok(CargoProbe {
            executable_path,
            version_output,
        })
    }

    fn install_list(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.cargo(
                Operation::ListInstalled,
                &["install", "--list"],
                LIST_TIMEOUT,
            ),
        )
    }

    fn search(&self, query: &str) -> CoreResult<String> {
        let mut request = self.cargo(
            Operation::Search,
            &["search", "--limit", "25", "--"],
            LIST_TIMEOUT,
        );
        request.command = request.command.arg(query);
        run_for_stdout(self.runner.as_ref(), request)
    }

    fn install(&self, name: &str, version: Option<&str>) -> CoreResult<String> {
        let mut request = self.cargo(Operation::Install, &["install"], MUTATE_TIMEOUT);
        if let Some(version) = version {
            request.command = request.command.args(["--version", version]);
        }
        request.command = request.command.arg("--").arg(name);
        run_for_stdout(self.runner.as_ref(), request)
    }

    fn uninstall(&self, name: &str) -> CoreResult<String> {
        let mut request = self.cargo(Operation::Uninstall, &["uninstall", "--"], MUTATE_TIMEOUT);
        request.command = request.command.arg(name);
        run_for_stdout(self.runner.as_ref(), request)
    }

    fn reinstall_latest(&self, name: &str) -> CoreResult<String> {
        let mut request = self.cargo(
            Operation::Upgrade,
            &["install", "--force", "--"],
            MUTATE_TIMEOUT,
        );
        request.command = request.command.arg(name);
        run_for_stdout(self.runner.as_ref(), request)
    }
}
