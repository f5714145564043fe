use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::softwareupdate::{SoftwareUpdateProbe, SoftwareUpdateSource};
use crate::adapters::support::run_for_stdout;
use crate::exec::{CommandLine, ExecRequest, ProcessRunner};
use crate::models::{CoreResult, ManagerId, Operation};

const SW_VERS: &str = "/usr/bin/sw_vers";
const SOFTWAREUPDATE: &str = "/usr/sbin/softwareupdate";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
// The scan talks to Apple's CDN; installs can run for a very long time.
const LIST_TIMEOUT: Duration = Duration::from_secs(120);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(3600);

pub struct ProcessSoftwareUpdateSource {
    runner: Arc<dyn ProcessRunner>,
}

impl ProcessSoftwareUpdateSource {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

impl SoftwareUpdateSource for ProcessSoftwareUpdateSource {
    fn probe(&self) -> CoreResult<SoftwareUpdateProbe> {
        let sw_vers_output = run_for_stdout(
            self.runner.as_ref(),
            ExecRequest::new(
                ManagerId::SoftwareUpdate,
                Operation::Detect,
                CommandLine::new(SW_VERS),
            )
            .timeout(PROBE_TIMEOUT),
        )
        .unwrap_or_default();

        let executable = PathBuf::from(SOFTWAREUPDATE);
        Ok(SoftwareUpdateProbe {
            executable_path: executable.is_file().then_some(executable),
            sw_vers_output,
        })
    }

    fn list_available(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            ExecRequest::new(
                ManagerId::SoftwareUpdate,
                Operation::ListOutdated,
                CommandLine::new(SOFTWAREUPDATE).arg("--list"),
            )
            .timeout(LIST_TIMEOUT),
        )
    }

    fn install_all(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            ExecRequest::new(
                ManagerId::SoftwareUpdate,
                Operation::Upgrade,
                CommandLine::new(SOFTWAREUPDATE)
                    .arg("--install")
                    .arg("--all")
                    .arg("--restart"),
            )
            .timeout(INSTALL_TIMEOUT),
        )
    }
}
