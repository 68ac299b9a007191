use std::path::Path;

use mines_core::{CellCount, DEFAULT_GRID_SIZE, PayoutPolicy};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Where bomb layouts come from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fairness {
    /// HMAC seeded layouts, the server seed is disclosed once a round ends.
    #[default]
    Provable,
    /// Plain pseudo-random layouts, reproducible when `seed` is set.
    Seeded,
}

/// House rules, usually read from a TOML file. Missing keys keep their defaults.
///
/// ```toml
/// grid_size = 25
/// min_bet = 10
/// max_bet = 50000
/// fairness = "provable"
///
/// [payout]
/// kind = "margin"
/// basis_points = 100
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HouseConfig {
    pub grid_size: CellCount,
    pub min_bet: u64,
    pub max_bet: u64,
    pub payout: PayoutPolicy,
    pub fairness: Fairness,
    pub seed: Option<u64>,
    /// Finished rounds kept for [`crate::Table::recent`].
    pub archive_limit: usize,
}

impl Default for HouseConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            min_bet: 1,
            max_bet: 1_000_000,
            payout: PayoutPolicy::Fair,
            fairness: Fairness::Provable,
            seed: None,
            archive_limit: 100,
        }
    }
}

impl HouseConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Loading house config from {}", path.display());
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_size < 2 {
            return Err(ConfigError::Invalid("grid_size must be at least 2"));
        }
        if self.min_bet == 0 {
            return Err(ConfigError::Invalid("min_bet must be at least 1"));
        }
        if self.min_bet > self.max_bet {
            return Err(ConfigError::Invalid("min_bet must not exceed max_bet"));
        }
        if let PayoutPolicy::Margin { basis_points } = self.payout {
            if basis_points >= PayoutPolicy::MAX_BASIS_POINTS {
                return Err(ConfigError::Invalid("margin must stay below 10000 basis points"));
            }
        }
        Ok(())
    }
}
