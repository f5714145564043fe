use serde::{Deserialize, Serialize};

use crate::models::PackageRef;

/// Whether Homebrew upgrades leave superseded kegs on disk or clean them up.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KegPolicy {
    Keep,
    Cleanup,
}

impl KegPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Cleanup => "cleanup",
        }
    }
}

impl std::str::FromStr for KegPolicy {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "keep" => Ok(Self::Keep),
            "cleanup" => Ok(Self::Cleanup),
            _ => Err(()),
        }
    }
}

/// Per-package override of the global keg policy.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PackageKegPolicy {
    pub package: PackageRef,
    pub policy: KegPolicy,
}

/// Snapshot of the durable policy flags consulted during planning.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PolicyState {
    pub safe_mode: bool,
    pub homebrew_keg_auto_cleanup: bool,
}
