//! Static manager descriptor table. Everything the orchestrators need to
//! know about a manager without talking to it lives here: authority phase,
//! declared capabilities, implementation state, and the stable table order
//! the upgrade planner uses as its per-manager tiebreak.

use crate::models::{Capability, ManagerAuthority, ManagerCategory, ManagerDescriptor, ManagerId};

const DETECT_ONLY: &[Capability] = &[Capability::Detect, Capability::ListInstalled];

const STATUS_ONLY: &[Capability] = &[
    Capability::Detect,
    Capability::ListInstalled,
    Capability::ListOutdated,
];

const TOOLCHAIN: &[Capability] = &[
    Capability::Detect,
    Capability::ListInstalled,
    Capability::ListOutdated,
    Capability::Install,
    Capability::Uninstall,
    Capability::Upgrade,
    Capability::SelfUpdate,
];

const PACKAGE_FULL: &[Capability] = &[
    Capability::Detect,
    Capability::ListInstalled,
    Capability::ListOutdated,
    Capability::Search,
    Capability::Install,
    Capability::Uninstall,
    Capability::Upgrade,
];

const HOMEBREW_FORMULA: &[Capability] = &[
    Capability::Detect,
    Capability::ListInstalled,
    Capability::ListOutdated,
    Capability::Search,
    Capability::Install,
    Capability::Uninstall,
    Capability::Upgrade,
    Capability::Pin,
    Capability::Unpin,
];

const CARGO: &[Capability] = &[
    Capability::Detect,
    Capability::ListInstalled,
    Capability::Search,
    Capability::Install,
    Capability::Uninstall,
    Capability::Upgrade,
];

const MAS: &[Capability] = &[
    Capability::Detect,
    Capability::ListInstalled,
    Capability::ListOutdated,
    Capability::Search,
    Capability::Upgrade,
];

const SOFTWARE_UPDATE: &[Capability] = &[
    Capability::Detect,
    Capability::ListOutdated,
    Capability::Upgrade,
];

const TABLE: [ManagerDescriptor; 28] = [
    ManagerDescriptor {
        id: ManagerId::Mise,
        display_name: "mise",
        category: ManagerCategory::ToolRuntime,
        authority: ManagerAuthority::Authoritative,
        capabilities: TOOLCHAIN,
        is_implemented: true,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Rustup,
        display_name: "rustup",
        category: ManagerCategory::ToolRuntime,
        authority: ManagerAuthority::Authoritative,
        capabilities: TOOLCHAIN,
        is_implemented: true,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Asdf,
        display_name: "asdf",
        category: ManagerCategory::ToolRuntime,
        authority: ManagerAuthority::Authoritative,
        capabilities: TOOLCHAIN,
        is_implemented: false,
        default_enabled: false,
    },
    ManagerDescriptor {
        id: ManagerId::Npm,
        display_name: "npm",
        category: ManagerCategory::Language,
        authority: ManagerAuthority::Standard,
        capabilities: PACKAGE_FULL,
        is_implemented: true,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Pnpm,
        display_name: "pnpm",
        category: ManagerCategory::Language,
        authority: ManagerAuthority::Standard,
        capabilities: PACKAGE_FULL,
        is_implemented: false,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Yarn,
        display_name: "Yarn",
        category: ManagerCategory::Language,
        authority: ManagerAuthority::Standard,
        capabilities: PACKAGE_FULL,
        is_implemented: false,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Pip,
        display_name: "pip",
        category: ManagerCategory::Language,
        authority: ManagerAuthority::Standard,
        capabilities: &[
            Capability::Detect,
            Capability::ListInstalled,
            Capability::ListOutdated,
            Capability::Install,
            Capability::Uninstall,
            Capability::Upgrade,
        ],
        is_implemented: true,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Pipx,
        display_name: "pipx",
        category: ManagerCategory::Language,
        authority: ManagerAuthority::Standard,
        capabilities: PACKAGE_FULL,
        is_implemented: false,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Poetry,
        display_name: "Poetry",
        category: ManagerCategory::Language,
        authority: ManagerAuthority::Standard,
        capabilities: PACKAGE_FULL,
        is_implemented: false,
        default_enabled: false,
    },
    ManagerDescriptor {
        id: ManagerId::RubyGems,
        display_name: "RubyGems",
        category: ManagerCategory::Language,
        authority: ManagerAuthority::Standard,
        capabilities: PACKAGE_FULL,
        is_implemented: false,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Bundler,
        display_name: "Bundler",
        category: ManagerCategory::Language,
        authority: ManagerAuthority::Standard,
        capabilities: PACKAGE_FULL,
        is_implemented: false,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Cargo,
        display_name: "Cargo",
        category: ManagerCategory::Language,
        authority: ManagerAuthority::Standard,
        capabilities: CARGO,
        is_implemented: true,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::CargoBinstall,
        display_name: "cargo-binstall",
        category: ManagerCategory::Language,
        authority: ManagerAuthority::Standard,
        capabilities: CARGO,
        is_implemented: false,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Mas,
        display_name: "App Store",
        category: ManagerCategory::GuiApp,
        authority: ManagerAuthority::Standard,
        capabilities: MAS,
        is_implemented: true,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::HomebrewFormula,
        display_name: "Homebrew (formulae)",
        category: ManagerCategory::SystemOs,
        authority: ManagerAuthority::Guarded,
        capabilities: HOMEBREW_FORMULA,
        is_implemented: true,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::HomebrewCask,
        display_name: "Homebrew (casks)",
        category: ManagerCategory::GuiApp,
        authority: ManagerAuthority::Standard,
        capabilities: STATUS_ONLY,
        is_implemented: false,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::SoftwareUpdate,
        display_name: "Software Update",
        category: ManagerCategory::SystemOs,
        authority: ManagerAuthority::Guarded,
        capabilities: SOFTWARE_UPDATE,
        is_implemented: true,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::MacPorts,
        display_name: "MacPorts",
        category: ManagerCategory::SystemOs,
        authority: ManagerAuthority::Guarded,
        capabilities: PACKAGE_FULL,
        is_implemented: false,
        default_enabled: false,
    },
    ManagerDescriptor {
        id: ManagerId::NixDarwin,
        display_name: "nix-darwin",
        category: ManagerCategory::SystemOs,
        authority: ManagerAuthority::Guarded,
        capabilities: PACKAGE_FULL,
        is_implemented: false,
        default_enabled: false,
    },
    ManagerDescriptor {
        id: ManagerId::XcodeCommandLineTools,
        display_name: "Xcode Command Line Tools",
        category: ManagerCategory::SystemOs,
        authority: ManagerAuthority::Guarded,
        capabilities: STATUS_ONLY,
        is_implemented: false,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Rosetta2,
        display_name: "Rosetta 2",
        category: ManagerCategory::SecurityFirmware,
        authority: ManagerAuthority::Guarded,
        capabilities: &[Capability::Detect, Capability::Install],
        is_implemented: false,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::FirmwareUpdates,
        display_name: "Firmware updates",
        category: ManagerCategory::SecurityFirmware,
        authority: ManagerAuthority::Guarded,
        capabilities: &[Capability::Detect],
        is_implemented: false,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Sparkle,
        display_name: "Sparkle updater",
        category: ManagerCategory::GuiApp,
        authority: ManagerAuthority::DetectionOnly,
        capabilities: DETECT_ONLY,
        is_implemented: true,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Setapp,
        display_name: "Setapp",
        category: ManagerCategory::GuiApp,
        authority: ManagerAuthority::DetectionOnly,
        capabilities: DETECT_ONLY,
        is_implemented: true,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::ParallelsDesktop,
        display_name: "Parallels Desktop",
        category: ManagerCategory::ContainerVm,
        authority: ManagerAuthority::DetectionOnly,
        capabilities: DETECT_ONLY,
        is_implemented: true,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::DockerDesktop,
        display_name: "Docker Desktop",
        category: ManagerCategory::ContainerVm,
        authority: ManagerAuthority::Standard,
        capabilities: STATUS_ONLY,
        is_implemented: false,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Podman,
        display_name: "podman",
        category: ManagerCategory::ContainerVm,
        authority: ManagerAuthority::Standard,
        capabilities: STATUS_ONLY,
        is_implemented: false,
        default_enabled: true,
    },
    ManagerDescriptor {
        id: ManagerId::Colima,
        display_name: "colima",
        category: ManagerCategory::ContainerVm,
        authority: ManagerAuthority::Standard,
        capabilities: STATUS_ONLY,
        is_implemented: false,
        default_enabled: true,
    },
];

pub fn managers() -> &'static [ManagerDescriptor] {
    &TABLE
}

pub fn descriptor(id: ManagerId) -> &'static ManagerDescriptor {
    TABLE
        .iter()
        .find(|descriptor| descriptor.id == id)
        .expect("every ManagerId has a registry row")
}

/// Position of a manager in the registry table. Stable across runs; the
/// upgrade planner uses it as the within-phase ordering key.
pub fn order_index(id: ManagerId) -> usize {
    TABLE
        .iter()
        .position(|descriptor| descriptor.id == id)
        .expect("every ManagerId has a registry row")
}

/// Managers grouped into execution phases by ascending authority rank.
/// Detection-only managers form the final phase; pass `include_detection_only
/// = false` to omit them (mutating orchestration never addresses them).
pub fn authority_phases(include_detection_only: bool) -> Vec<Vec<ManagerId>> {
    let mut phases: [Vec<ManagerId>; 4] = Default::default();
    for descriptor in &TABLE {
        phases[descriptor.authority.rank() as usize].push(descriptor.id);
    }
    if !include_detection_only {
        phases[3].clear();
    }
    phases.into_iter().filter(|phase| !phase.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_manager_id_has_exactly_one_row() {
        let ids: HashSet<ManagerId> = TABLE.iter().map(|descriptor| descriptor.id).collect();
        assert_eq!(ids.len(), ManagerId::ALL.len());
    }

    #[test]
    fn detection_only_managers_expose_no_mutating_capabilities() {
        for descriptor in managers() {
            if descriptor.authority == ManagerAuthority::DetectionOnly {
                assert!(
                    descriptor
                        .capabilities
                        .iter()
                        .all(|capability| DETECT_ONLY.contains(capability)),
                    "{} declares more than detect/list",
                    descriptor.id
                );
            }
        }
    }

    #[test]
    fn phases_are_sorted_by_rank_and_exclude_detection_only_when_asked() {
        let phases = authority_phases(false);
        assert_eq!(phases.len(), 3);
        assert!(phases[0].contains(&ManagerId::Mise));
        assert!(phases[0].contains(&ManagerId::Rustup));
        assert!(phases[1].contains(&ManagerId::Npm));
        assert!(phases[2].contains(&ManagerId::HomebrewFormula));
        assert!(phases[2].contains(&ManagerId::SoftwareUpdate));
        assert!(!phases.iter().flatten().any(|id| *id == ManagerId::Sparkle));

        let with_detection = authority_phases(true);
        assert_eq!(with_detection.len(), 4);
        assert!(with_detection[3].contains(&ManagerId::Sparkle));
    }

    #[test]
    fn order_index_matches_table_position() {
        assert_eq!(order_index(ManagerId::Mise), 0);
        assert!(order_index(ManagerId::Mise) < order_index(ManagerId::Rustup));
        assert!(order_index(ManagerId::Npm) < order_index(ManagerId::Cargo));
    }

    #[test]
    fn softwareupdate_does_not_declare_install_or_search() {
        let descriptor = descriptor(ManagerId::SoftwareUpdate);
        assert!(!descriptor.supports(Capability::Install));
        assert!(!descriptor.supports(Capability::Search));
        assert!(descriptor.supports(Capability::Upgrade));
    }
}
