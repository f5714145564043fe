use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::models::PackageRef;

/// Native pins mirror state the manager itself enforces (e.g. `brew pin`).
/// Virtual pins are enforced by Helm alone, through the upgrade planner.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinKind {
    Native,
    Virtual,
}

impl PinKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Virtual => "virtual",
        }
    }
}

impl std::str::FromStr for PinKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "native" => Ok(Self::Native),
            "virtual" => Ok(Self::Virtual),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PinRecord {
    pub package: PackageRef,
    pub kind: PinKind,
    pub version: Option<String>,
    pub pinned_at: SystemTime,
}
