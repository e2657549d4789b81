use serde::Serialize;

use crate::config::BootstrapConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    DependencyInstall,
    InstallVerification,
    SchemaMigration,
    SeedData,
    StaticAssets,
}

impl Phase {
    /// Execution order.
    pub const ALL: [Phase; 5] = [
        Phase::DependencyInstall,
        Phase::InstallVerification,
        Phase::SchemaMigration,
        Phase::SeedData,
        Phase::StaticAssets,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DependencyInstall => "dependency_install",
            Self::InstallVerification => "install_verification",
            Self::SchemaMigration => "schema_migration",
            Self::SeedData => "seed_data",
            Self::StaticAssets => "static_assets",
        }
    }

    /// 1-based position shown in progress markers.
    pub fn ordinal(self) -> usize {
        Self::ALL
            .iter()
            .position(|phase| *phase == self)
            .map_or(0, |index| index + 1)
    }

    pub fn policy(self, config: &BootstrapConfig) -> PhasePolicy {
        match self {
            Self::DependencyInstall | Self::InstallVerification | Self::SchemaMigration => {
                PhasePolicy::Fatal
            }
            Self::SeedData => PhasePolicy::Optional,
            Self::StaticAssets if config.assets.fatal => PhasePolicy::Fatal,
            Self::StaticAssets => PhasePolicy::BestEffort,
        }
    }
}

/// How a phase failure affects the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhasePolicy {
    /// Halts the pipeline; the run ends `failed at <phase>`.
    Fatal,
    /// Reported as failed; later phases still run.
    Optional,
    /// Reported as a warning; later phases still run.
    BestEffort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_phase_order_and_names_are_stable() {
        let names = Phase::ALL.iter().map(|phase| phase.as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "dependency_install",
                "install_verification",
                "schema_migration",
                "seed_data",
                "static_assets"
            ]
        );
        assert_eq!(Phase::DependencyInstall.ordinal(), 1);
        assert_eq!(Phase::StaticAssets.ordinal(), 5);
    }

    #[test]
    fn unit_asset_policy_follows_config() {
        let mut config = BootstrapConfig::default();
        assert_eq!(Phase::StaticAssets.policy(&config), PhasePolicy::BestEffort);
        config.assets.fatal = true;
        assert_eq!(Phase::StaticAssets.policy(&config), PhasePolicy::Fatal);
        assert_eq!(Phase::SeedData.policy(&config), PhasePolicy::Optional);
    }
}
