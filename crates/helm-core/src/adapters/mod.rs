pub mod cargo;
pub mod cargo_exec;
pub mod contract;
pub mod homebrew;
pub mod homebrew_exec;
pub mod mas;
pub mod mas_exec;
pub mod mise;
pub mod mise_exec;
pub mod npm;
pub mod npm_exec;
pub mod parallels;
pub mod pip;
pub mod pip_exec;
pub mod rustup;
pub mod rustup_exec;
pub mod setapp;
pub mod softwareupdate;
pub mod softwareupdate_exec;
pub mod sparkle;
pub mod support;

pub use contract::{
    AdapterRequest, AdapterResponse, ManagerAdapter, MutationReport, UpgradeReport,
    UpgradeVerification, ensure_supported, execute_checked,
};

use std::sync::Arc;

use crate::exec::ProcessRunner;

/// Build the full production adapter set over one process runner. The keg
/// policy lookup is store-backed in the engine; bare callers get keep-all.
pub fn production_adapters(
    runner: Arc<dyn ProcessRunner>,
    keg_policy: Option<Arc<dyn homebrew::KegPolicyLookup>>,
) -> Vec<Arc<dyn ManagerAdapter>> {
    let mut brew = homebrew::HomebrewAdapter::new(homebrew_exec::ProcessHomebrewSource::new(
        runner.clone(),
    ));
    if let Some(keg_policy) = keg_policy {
        brew = brew.with_keg_policy(keg_policy);
    }

    vec![
        Arc::new(brew),
        Arc::new(mise::MiseAdapter::new(mise_exec::ProcessMiseSource::new(
            runner.clone(),
        ))),
        Arc::new(rustup::RustupAdapter::new(
            rustup_exec::ProcessRustupSource::new(runner.clone()),
        )),
        Arc::new(npm::NpmAdapter::new(npm_exec::ProcessNpmSource::new(
            runner.clone(),
        ))),
        Arc::new(pip::PipAdapter::new(pip_exec::ProcessPipSource::new(
            runner.clone(),
        ))),
        Arc::new(cargo::CargoAdapter::new(cargo_exec::ProcessCargoSource::new(
            runner.clone(),
        ))),
        Arc::new(mas::MasAdapter::new(mas_exec::ProcessMasSource::new(
            runner.clone(),
        ))),
        Arc::new(softwareupdate::SoftwareUpdateAdapter::new(
            softwareupdate_exec::ProcessSoftwareUpdateSource::new(runner.clone()),
        )),
        Arc::new(sparkle::SparkleAdapter::new(sparkle::FsSparkleProbe::new())),
        Arc::new(setapp::SetappAdapter::new(setapp::FsSetappProbe::new())),
        Arc::new(parallels::ParallelsAdapter::new(
            parallels::ProcessParallelsSource::new(runner),
        )),
    ]
}
