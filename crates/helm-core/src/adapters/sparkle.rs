//! Sparkle-updated applications. Detection-only: Helm surfaces which apps
//! self-update through an embedded Sparkle.framework, nothing more.

use std::path::PathBuf;

use crate::adapters::contract::{AdapterRequest, AdapterResponse, ManagerAdapter};
use crate::models::{
    CoreError, CoreResult, DetectionInfo, InstalledPackage, ManagerId, PackageRef,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SparkleApp {
    pub name: String,
    pub version: Option<String>,
}

pub trait SparkleProbe: Send + Sync {
    fn sparkle_apps(&self) -> CoreResult<Vec<SparkleApp>>;
}

pub struct SparkleAdapter<P: SparkleProbe> {
    probe: P,
}

impl<P: SparkleProbe> SparkleAdapter<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }
}

impl<P: SparkleProbe> ManagerAdapter for SparkleAdapter<P> {
    fn id(&self) -> ManagerId {
        ManagerId::Sparkle
    }

    fn execute(&self, request: AdapterRequest) -> CoreResult<AdapterResponse> {
        match request {
            AdapterRequest::Detect => {
                let apps = self.probe.sparkle_apps()?;
                Ok(AdapterResponse::Detection(DetectionInfo {
                    installed: !apps.is_empty(),
                    executable_path: None,
                    version: None,
                }))
            }
            AdapterRequest::ListInstalled => {
                let apps = self.probe.sparkle_apps()?;
                Ok(AdapterResponse::Installed(
                    apps.into_iter()
                        .map(|app| InstalledPackage {
                            package: PackageRef::new(ManagerId::Sparkle, app.name),
                            installed_version: app.version,
                            pinned: false,
                        })
                        .collect(),
                ))
            }
            other => Err(CoreError::unsupported(ManagerId::Sparkle, other.operation())),
        }
    }
}

/// Filesystem probe: an app is Sparkle-updated when its bundle embeds
/// `Contents/Frameworks/Sparkle.framework`.
pub struct FsSparkleProbe {
    roots: Vec<PathBuf>,
}

impl FsSparkleProbe {
    pub fn new() -> Self {
        Self {
            roots: vec![PathBuf::from("/Applications")],
        }
    }

    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl Default for FsSparkleProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SparkleProbe for FsSparkleProbe {
    fn sparkle_apps(&self) -> CoreResult<Vec<SparkleApp>> {
        let mut apps = Vec::new();
        for root in &self.roots {
            let Ok(entries) = std::fs::read_dir(root) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("app") {
                    continue;
                }
                if !path
                    .join("Contents/Frameworks/Sparkle.framework")
                    .is_dir()
                {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    apps.push(SparkleApp {
                        name: stem.to_owned(),
                        version: None,
                    });
                }
            }
        }
        apps.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(apps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct FixedProbe(Vec<SparkleApp>);

    impl SparkleProbe for FixedProbe {
        fn sparkle_apps(&self) -> CoreResult<Vec<SparkleApp>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn detection_reflects_presence_of_sparkle_apps() {
        let empty = SparkleAdapter::new(FixedProbe(Vec::new()));
        let AdapterResponse::Detection(info) = empty.execute(AdapterRequest::Detect).unwrap()
        else {
            panic!("expected detection");
        };
        assert!(!info.installed);

        let populated = SparkleAdapter::new(FixedProbe(vec![SparkleApp {
            name: "Rectangle".to_string(),
            version: None,
        }]));
        let AdapterResponse::Detection(info) = populated.execute(AdapterRequest::Detect).unwrap()
        else {
            panic!("expected detection");
        };
        assert!(info.installed);
    }

    #[test]
    fn mutating_requests_are_rejected() {
        let adapter = SparkleAdapter::new(FixedProbe(Vec::new()));
        let error = adapter
            .execute(AdapterRequest::Upgrade {
                package: PackageRef::new(ManagerId::Sparkle, "Rectangle"),
                candidate_version: None,
            })
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnsupportedCapability);
    }

    #[test]
    fn fs_probe_finds_bundles_with_embedded_sparkle() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before epoch")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("helm-sparkle-{nanos}"));
        fs::create_dir_all(root.join("Plain.app/Contents")).unwrap();
        fs::create_dir_all(root.join("Updated.app/Contents/Frameworks/Sparkle.framework"))
            .unwrap();

        let probe = FsSparkleProbe::with_roots(vec![root.clone()]);
        let apps = probe.sparkle_apps().unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name, "Updated");

        let _ = fs::remove_dir_all(root);
    }
}
