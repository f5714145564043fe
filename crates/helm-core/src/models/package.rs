use serde::{Deserialize, Serialize};

use crate::models::ManagerId;

/// A package is uniquely `(manager, name)`. The stringified `manager:name`
/// form is the external id.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    pub manager: ManagerId,
    pub name: String,
}

impl PackageRef {
    pub fn new(manager: ManagerId, name: impl Into<String>) -> Self {
        Self {
            manager,
            name: name.into(),
        }
    }

    pub fn external_id(&self) -> String {
        format!("{}:{}", self.manager.as_str(), self.name)
    }

    /// Parse `manager:name`. Names may themselves contain `:`; only the first
    /// separator is structural.
    pub fn parse_external_id(value: &str) -> Option<Self> {
        let (manager, name) = value.split_once(':')?;
        let manager: ManagerId = manager.parse().ok()?;
        if name.is_empty() {
            return None;
        }
        Some(Self::new(manager, name))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub package: PackageRef,
    pub installed_version: Option<String>,
    pub pinned: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OutdatedPackage {
    pub package: PackageRef,
    pub installed_version: Option<String>,
    pub candidate_version: String,
    pub pinned: bool,
    pub restart_required: bool,
}

/// A package that may or may not be installed; produced by search.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PackageCandidate {
    pub package: PackageRef,
    pub version: Option<String>,
    pub summary: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_id_round_trips() {
        let package = PackageRef::new(ManagerId::Npm, "eslint");
        assert_eq!(package.external_id(), "npm:eslint");
        assert_eq!(
            PackageRef::parse_external_id("npm:eslint"),
            Some(package)
        );
    }

    #[test]
    fn external_id_keeps_colons_inside_names() {
        let parsed = PackageRef::parse_external_id("rustup:stable-x86_64-apple-darwin").unwrap();
        assert_eq!(parsed.manager, ManagerId::Rustup);
        assert_eq!(parsed.name, "stable-x86_64-apple-darwin");
    }

    #[test]
    fn external_id_rejects_unknown_manager_and_empty_name() {
        assert!(PackageRef::parse_external_id("frobnicator:wget").is_none());
        assert!(PackageRef::parse_external_id("npm:").is_none());
        assert!(PackageRef::parse_external_id("npm").is_none());
    }
}
