use std::sync::Arc;
use std::time::Duration;

use crate::adapters::rustup::{RustupProbe, RustupSource};
use crate::adapters::support::{augmented_path, run_for_stdout, which_executable};
use crate::exec::{CommandLine, ExecRequest, ProcessRunner};
use crate::models::{CoreResult, ManagerId, Operation};

const RUSTUP: &str = "rustup";
const RUSTUP_PATHS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin"];
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(60);
const MUTATE_TIMEOUT: Duration = Duration::from_secs(1800);

pub struct ProcessRustupSource {
    runner: Arc<dyn ProcessRunner>,
}

impl ProcessRustupSource {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    fn rustup(&self, operation: Operation, args: &[&str], timeout: Duration) -> ExecRequest {
        ExecRequest::new(
            ManagerId::Rustup,
            operation,
            CommandLine::new(RUSTUP).args(args.iter().copied()),
        )
        .env("PATH", augmented_path(RUSTUP_PATHS))
        .timeout(timeout)
    }
}

impl RustupSource for ProcessRustupSource {
    fn probe(&self) -> CoreResult<RustupProbe> {
        let executable_path = which_executable(
            self.runner.as_ref(),
            ManagerId::Rustup,
            RUSTUP,
            RUSTUP_PATHS,
        );
        let version_output = run_for_stdout(
            self.runner.as_ref(),
            self.rustup(Operation::Detect, &["--version"], PROBE_TIMEOUT),
        )
        .unwrap_or_default();
        Ok(RustupProbe {
            executable_path,
            version_output,
        })
    }

    fn toolchain_list(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.rustup(
                Operation::ListInstalled,
                &["toolchain", "list"],
                LIST_TIMEOUT,
            ),
        )
    }

    fn check(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.rustup(Operation::ListOutdated, &["check"], LIST_TIMEOUT),
        )
    }

    fn install_toolchain(&self, toolchain: &str) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.rustup(
                Operation::Install,
                &["toolchain", "install", toolchain],
                MUTATE_TIMEOUT,
            ),
        )
    }

    fn uninstall_toolchain(&self, toolchain: &str) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.rustup(
                Operation::Uninstall,
                &["toolchain", "uninstall", toolchain],
                MUTATE_TIMEOUT,
            ),
        )
    }

    fn update_toolchain(&self, toolchain: &str) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.rustup(Operation::Upgrade, &["update", toolchain], MUTATE_TIMEOUT),
        )
    }

    fn self_update(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            self.rustup(Operation::SelfUpdate, &["self", "update"], MUTATE_TIMEOUT),
        )
    }
}
