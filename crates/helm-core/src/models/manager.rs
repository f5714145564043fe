use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Stable identity for every manager Helm knows about, implemented or not.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerId {
    Mise,
    Asdf,
    Rustup,
    HomebrewFormula,
    HomebrewCask,
    SoftwareUpdate,
    MacPorts,
    NixDarwin,
    Npm,
    Pnpm,
    Yarn,
    Pip,
    Pipx,
    Poetry,
    RubyGems,
    Bundler,
    Cargo,
    CargoBinstall,
    Mas,
    Sparkle,
    Setapp,
    DockerDesktop,
    Podman,
    Colima,
    ParallelsDesktop,
    XcodeCommandLineTools,
    Rosetta2,
    FirmwareUpdates,
}

impl ManagerId {
    pub const ALL: [Self; 28] = [
        Self::Mise,
        Self::Asdf,
        Self::Rustup,
        Self::HomebrewFormula,
        Self::HomebrewCask,
        Self::SoftwareUpdate,
        Self::MacPorts,
        Self::NixDarwin,
        Self::Npm,
        Self::Pnpm,
        Self::Yarn,
        Self::Pip,
        Self::Pipx,
        Self::Poetry,
        Self::RubyGems,
        Self::Bundler,
        Self::Cargo,
        Self::CargoBinstall,
        Self::Mas,
        Self::Sparkle,
        Self::Setapp,
        Self::DockerDesktop,
        Self::Podman,
        Self::Colima,
        Self::ParallelsDesktop,
        Self::XcodeCommandLineTools,
        Self::Rosetta2,
        Self::FirmwareUpdates,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mise => "mise",
            Self::Asdf => "asdf",
            Self::Rustup => "rustup",
            Self::HomebrewFormula => "homebrew_formula",
            Self::HomebrewCask => "homebrew_cask",
            Self::SoftwareUpdate => "softwareupdate",
            Self::MacPorts => "macports",
            Self::NixDarwin => "nix_darwin",
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Pip => "pip",
            Self::Pipx => "pipx",
            Self::Poetry => "poetry",
            Self::RubyGems => "rubygems",
            Self::Bundler => "bundler",
            Self::Cargo => "cargo",
            Self::CargoBinstall => "cargo_binstall",
            Self::Mas => "mas",
            Self::Sparkle => "sparkle",
            Self::Setapp => "setapp",
            Self::DockerDesktop => "docker_desktop",
            Self::Podman => "podman",
            Self::Colima => "colima",
            Self::ParallelsDesktop => "parallels_desktop",
            Self::XcodeCommandLineTools => "xcode_command_line_tools",
            Self::Rosetta2 => "rosetta2",
            Self::FirmwareUpdates => "firmware_updates",
        }
    }
}

impl std::str::FromStr for ManagerId {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == value)
            .ok_or(())
    }
}

impl std::fmt::Display for ManagerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerCategory {
    ToolRuntime,
    Language,
    SystemOs,
    GuiApp,
    ContainerVm,
    SecurityFirmware,
}

/// Execution-phase class. Declared on the descriptor, never inferred.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerAuthority {
    Authoritative,
    Standard,
    Guarded,
    DetectionOnly,
}

impl ManagerAuthority {
    pub fn rank(self) -> u8 {
        match self {
            Self::Authoritative => 0,
            Self::Standard => 1,
            Self::Guarded => 2,
            Self::DetectionOnly => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Detect,
    ListInstalled,
    ListOutdated,
    Search,
    Install,
    Uninstall,
    Upgrade,
    Pin,
    Unpin,
    SelfUpdate,
}

/// A single request an adapter can be asked to perform. One-to-one with the
/// capability it requires.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Detect,
    ListInstalled,
    ListOutdated,
    Search,
    Install,
    Uninstall,
    Upgrade,
    Pin,
    Unpin,
    SelfUpdate,
}

impl Operation {
    pub fn required_capability(self) -> Capability {
        match self {
            Self::Detect => Capability::Detect,
            Self::ListInstalled => Capability::ListInstalled,
            Self::ListOutdated => Capability::ListOutdated,
            Self::Search => Capability::Search,
            Self::Install => Capability::Install,
            Self::Uninstall => Capability::Uninstall,
            Self::Upgrade => Capability::Upgrade,
            Self::Pin => Capability::Pin,
            Self::Unpin => Capability::Unpin,
            Self::SelfUpdate => Capability::SelfUpdate,
        }
    }

    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Self::Install | Self::Uninstall | Self::Upgrade | Self::Pin | Self::Unpin
                | Self::SelfUpdate
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManagerDescriptor {
    pub id: ManagerId,
    pub display_name: &'static str,
    pub category: ManagerCategory,
    pub authority: ManagerAuthority,
    pub capabilities: &'static [Capability],
    pub is_implemented: bool,
    pub default_enabled: bool,
}

impl ManagerDescriptor {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Result of running a manager's detection probe.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DetectionInfo {
    pub installed: bool,
    pub executable_path: Option<PathBuf>,
    pub version: Option<String>,
}

/// Persisted per-manager state as exposed across the boundary. Mutated only
/// by detection completion and user toggles.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ManagerStatus {
    pub manager_id: ManagerId,
    pub detected: bool,
    pub version: Option<String>,
    pub executable_path: Option<String>,
    pub enabled: bool,
    pub is_implemented: bool,
    pub capabilities: Vec<Capability>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_ids_round_trip_through_str() {
        for id in ManagerId::ALL {
            assert_eq!(id.as_str().parse::<ManagerId>(), Ok(id));
        }
    }

    #[test]
    fn authority_ranks_are_ordered() {
        assert!(ManagerAuthority::Authoritative.rank() < ManagerAuthority::Standard.rank());
        assert!(ManagerAuthority::Standard.rank() < ManagerAuthority::Guarded.rank());
        assert!(ManagerAuthority::Guarded.rank() < ManagerAuthority::DetectionOnly.rank());
    }

    #[test]
    fn mutating_operations_are_classified() {
        assert!(Operation::Upgrade.is_mutating());
        assert!(Operation::SelfUpdate.is_mutating());
        assert!(!Operation::ListOutdated.is_mutating());
        assert!(!Operation::Search.is_mutating());
    }
}
