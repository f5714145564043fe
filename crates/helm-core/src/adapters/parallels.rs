//! Parallels Desktop. Detection-only; the installed list enumerates the
//! virtual machines `prlctl` knows about.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::contract::{AdapterRequest, AdapterResponse, ManagerAdapter};
use crate::adapters::support::{augmented_path, run_for_stdout, which_executable};
use crate::exec::{CommandLine, ExecRequest, ProcessRunner};
use crate::models::{
    CoreError, CoreResult, DetectionInfo, InstalledPackage, ManagerId, Operation, PackageRef,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParallelsProbe {
    pub executable_path: Option<PathBuf>,
    pub version_output: String,
}

pub trait ParallelsSource: Send + Sync {
    fn probe(&self) -> CoreResult<ParallelsProbe>;

    fn vm_names(&self) -> CoreResult<String>;
}

pub struct ParallelsAdapter<S: ParallelsSource> {
    source: S,
}

impl<S: ParallelsSource> ParallelsAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: ParallelsSource> ManagerAdapter for ParallelsAdapter<S> {
    fn id(&self) -> ManagerId {
        ManagerId::ParallelsDesktop
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
            AdapterRequest::ListInstalled => {
                let raw = self.source.vm_names()?;
                Ok(AdapterResponse::Installed(parse_vm_names(&raw)))
            }
            other => Err(CoreError::unsupported(
                ManagerId::ParallelsDesktop,
                other.operation(),
            )),
        }
    }
}

/// `prlctl version` → `prlctl version 19.3.0 (54924)`.
fn parse_version(output: &str) -> Option<String> {
    let line = crate::adapters::support::first_line(output)?;
    line.strip_prefix("prlctl version ")
        .and_then(|rest| rest.split_whitespace().next())
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

/// `prlctl list --all --output name`: a `NAME` header then one VM per line.
fn parse_vm_names(output: &str) -> Vec<InstalledPackage> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "NAME")
        .map(|name| InstalledPackage {
            package: PackageRef::new(ManagerId::ParallelsDesktop, name),
            installed_version: None,
            pinned: false,
        })
        .collect()
}

pub struct ProcessParallelsSource {
    runner: Arc<dyn ProcessRunner>,
}

const PRLCTL: &str = "prlctl";
const PRLCTL_PATHS: &[&str] = &["/usr/local/bin"];
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_TIMEOUT: Duration = Duration::from_secs(30);

impl ProcessParallelsSource {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

impl ParallelsSource for ProcessParallelsSource {
    fn probe(&self) -> CoreResult<ParallelsProbe> {
        let executable_path = which_executable(
            self.runner.as_ref(),
            ManagerId::ParallelsDesktop,
            PRLCTL,
            PRLCTL_PATHS,
        );
        let version_output = run_for_stdout(
            self.runner.as_ref(),
            ExecRequest::new(
                ManagerId::ParallelsDesktop,
                Operation::Detect,
                CommandLine::new(PRLCTL).arg("version"),
            )
            .env("PATH", augmented_path(PRLCTL_PATHS))
            .timeout(PROBE_TIMEOUT),
        )
        .unwrap_or_default();
        Ok(ParallelsProbe {
            executable_path,
            version_output,
        })
    }

    fn vm_names(&self) -> CoreResult<String> {
        run_for_stdout(
            self.runner.as_ref(),
            ExecRequest::new(
                ManagerId::ParallelsDesktop,
                Operation::ListInstalled,
                CommandLine::new(PRLCTL).args(["list", "--all", "--output", "name"]),
            )
            .env("PATH", augmented_path(PRLCTL_PATHS))
            .timeout(LIST_TIMEOUT),
        )
    }
}
