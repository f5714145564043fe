//! Setapp subscription apps. Detection-only.

use std::path::PathBuf;

use crate::adapters::contract::{AdapterRequest, AdapterResponse, ManagerAdapter};
use crate::models::{
    CoreError, CoreResult, DetectionInfo, InstalledPackage, ManagerId, PackageRef,
};

pub trait SetappProbe: Send + Sync {
    fn setapp_installed(&self) -> CoreResult<bool>;

    fn managed_apps(&self) -> CoreResult<Vec<String>>;
}

pub struct SetappAdapter<P: SetappProbe> {
    probe: P,
}

impl<P: SetappProbe> SetappAdapter<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }
}

impl<P: SetappProbe> ManagerAdapter for SetappAdapter<P> {
    fn id(&self) -> ManagerId {
        ManagerId::Setapp
    }

    fn execute(&self, request: AdapterRequest) -> CoreResult<AdapterResponse> {
        match request {
            AdapterRequest::Detect => Ok(AdapterResponse::Detection(DetectionInfo {
                installed: self.probe.setapp_installed()?,
                executable_path: None,
                version: None,
            })),
            AdapterRequest::ListInstalled => Ok(AdapterResponse::Installed(
                self.probe
                    .managed_apps()?
                    .into_iter()
                    .map(|name| InstalledPackage {
                        package: PackageRef::new(ManagerId::Setapp, name),
                        installed_version: None,
                        pinned: false,
                    })
                    .collect(),
            )),
            other => Err(CoreError::unsupported(ManagerId::Setapp, other.operation())),
        }
    }
}

/// Filesystem probe: the Setapp launcher lives at `/Applications/Setapp.app`
/// and managed apps under `/Applications/Setapp/`.
pub struct FsSetappProbe {
    launcher: PathBuf,
    apps_dir: PathBuf,
}

impl FsSetappProbe {
    pub fn new() -> Self {
        Self {
            launcher: PathBuf::from("/Applications/Setapp.app"),
            apps_dir: PathBuf::from("/Applications/Setapp"),
        }
    }

    pub fn with_paths(launcher: PathBuf, apps_dir: PathBuf) -> Self {
        Self { launcher, apps_dir }
    }
}

impl Default for FsSetappProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SetappProbe for FsSetappProbe {
    fn setapp_installed(&self) -> CoreResult<bool> {
        Ok(self.launcher.is_dir())
    }

    fn managed_apps(&self) -> CoreResult<Vec<String>> {
        let mut apps = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.apps_dir) else {
            return Ok(apps);
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("app") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                apps.push(stem.to_owned());
            }
        }
        apps.sort();
        Ok(apps)
    }
}
