use std::sync::Arc;
use std::time::Duration;

use crate::adapters::mise::{MiseProbe, MiseSource};
use crate::adapters::support::{augmented_path, run_for_stdout, which_executable};
use crate::exec::{CommandLine, ExecRequest, ProcessRunner};
use crate::models::{CoreResult, ManagerId, Operation};

const MISE: &str = "mise";
const MISE_PATHS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin"];
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(60);
const MUTATE_TIMEOUT: Duration = Duration::from_secs(900);

pub struct ProcessMiseSource {
    runner: Arc<dyn ProcessRunner>,
}

impl ProcessMiseSource {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    fn mise(&self, operation: Operation, timeout: Duration) -> ExecRequest {
        ExecRequest::new(ManagerId::Mise, operation, CommandLine::new(MISE))
            .env("PATH", augmented_path(MISE_PATHS))
            .timeout(timeout)
    }
}

impl MiseSource for ProcessMiseSource {
    fn probe(&self) -> CoreResult<MiseProbe> {
        let executable_path =
            which_executable(self.runner.as_ref(), ManagerId::Mise, MISE, MISE_PATHS);
        let mut request = self.mise(Operation::Detect, PROBE_TIMEOUT);
        request.command = request.command.arg("--version");
        let version_output = run_for_stdout(self.runner.as_ref(), request).unwrap_or_default();
        Ok(MiseProbe {
            executable_path,
            version_output,
        })
    }

    fn list_json(&self) -> CoreResult<String> {
        let mut request = self.mise(Operation::ListInstalled, LIST_TIMEOUT);
        request.command = request.command.args(["ls", "--json"]);
        run_for_stdout(self.runner.as_ref(), request)
    }

    fn outdated_json(&self) -> CoreResult<String> {
        let mut request = self.mise(Operation::ListOutdated, LIST_TIMEOUT);
        request.command = request.command.args(["outdated", "--json"]);
        run_for_stdout(self.runner.as_ref(), request)
    }

    fn install(&self, tool: &str, version: Option<&str>) -> CoreResult<String> {
        let spec = match version {
            Some(version) => format!("{tool}@{version}"),
            None => tool.to_owned(),
        };
        let mut request = self.mise(Operation::Install, MUTATE_TIMEOUT);
        request.command = request.command.args(["use", "--global"]).arg(spec);
        run_for_stdout(self.runner.as_ref(), request)
    }

    fn uninstall(&self, tool: &str) -> CoreResult<String> {
        let mut request = self.mise(Operation::Uninstall, MUTATE_TIMEOUT);
        request.command = request.command.arg("uninstall").arg(tool);
        run_for_stdout(self.runner.as_ref(), request)
    }

    fn upgrade(&self, tool: &str) -> CoreResult<String> {
        let mut request = self.mise(Operation::Upgrade, MUTATE_TIMEOUT);
        request.command = request.command.args(["upgrade", "--bump"]).arg(tool);
        run_for_stdout(self.runner.as_ref(), request)
    }

    fn self_update(&self) -> CoreResult<String> {
        let mut request = self.mise(Operation::SelfUpdate, MUTATE_TIMEOUT);
        request.command = request.command.args(["self-update", "--yes"]);
        run_for_stdout(self.runner.as_ref(), request)
    }
}
