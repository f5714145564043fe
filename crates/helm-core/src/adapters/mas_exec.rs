use std::sync::Arc;
use std::time::Duration;

use crate::adapters::mas::{MasProbe, MasSource};
use crate::adapters::support::{augmented_path, run_for_stdout, which_executable};
use crate::exec::{CommandLine, ExecRequest, ProcessRunner};
use crate::models::{CoreResult, ManagerId, Operation};

const MAS: &str = "mas";
const MAS_PATHS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin"];
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(120);
const UPGRADE_TIMEOUT: Duration = Duration::from_secs(3600);

pub struct ProcessMasSource {
    runner: Arc<dyn ProcessRunner>,
}

impl ProcessMasSource {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    fn mas(&self, operation: Operation, args: &[&str], timeout: Duration) -> ExecRequest {
        ExecRequest::new(
            ManagerId::Mas,
            operation,
            CommandLine::new(MAS).args(args.iter().copied()),
        )
        .env("PATH", augmented_path(MAS_PATHS))
        .timeout(timeout)
    }
}

impl MasSource for ProcessMasSource {
    fn probe(&self) -> CoreResult<MasProbe> {
        let executable_path =
            which_executable(self.runner.as_ref(), ManagerId::Mas, MAS, MAS_PATHS);
        let version_output = run_for_stdout(
            self.runner.as_ref(),
            self.mas(Operation::Detect, &["version"], PROBE_TIMEOUT),
        )
        .unwrap_or_default();
        Ok(MasProbe {
            executable_path,
            version_output,
        })
    }

    fn list_installed(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.mas(Operation::ListInstalled, &["list"], LIST_TIMEOUT),
        )
    }

    fn list_outdated(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.mas(Operation::ListOutdated, &["outdated"], LIST_TIMEOUT),
        )
    }

    fn search(&self, query: &str) -> CoreResult<String> {
        let mut request = self.mas(Operation::Search, &["search"], LIST_TIMEOUT);
        request.command = request.command.arg(query);
        run_for_stdout(self.runner.as_ref(), request)
    }

    fn upgrade(&self, product_id: &str) -> CoreResult<String> {
        let mut request = self.mas(Operation::Upgrade, &["upgrade"], UPGRADE_TIMEOUT);
        request.command = request.command.arg(product_id);
        run_for_stdout(self.runner.as_ref(), request)
    }
}
