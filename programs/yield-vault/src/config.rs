//! Deployment configuration.
//!
//! Read from TOML; every section and field is optional and falls back to
//! the values below.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_SLIPPAGE_BPS, MAX_SLIPPAGE_BPS};
use crate::error::{Result, VaultError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Label the owner identity is derived from
    pub owner: String,
    pub vault: VaultConfig,
    pub rewards: RewardsConfig,
    pub strategy: StrategyConfig,
    pub pool: PoolConfig,
    pub faucet: FaucetConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub name: String,
    pub symbol: String,
    /// Per-call ceiling on deposited LP; unlimited when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    /// Reward units emitted per second
    pub rate: u64,
    /// Reward tokens minted to the owner and paid into the engine's reserve
    /// at deployment
    pub funding: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub slippage_bps: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Initial reserves of each side of the A/B pair
    pub seed_a: u64,
    pub seed_b: u64,
    /// Initial depth of the reward/A and reward/B pairs used for compounding
    pub seed_reward: u64,
}

/// Balances a new simulated user receives of each pool asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            owner: "owner".to_string(),
            vault: VaultConfig::default(),
            rewards: RewardsConfig::default(),
            strategy: StrategyConfig::default(),
            pool: PoolConfig::default(),
            faucet: FaucetConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            name: "Yield Vault LP".to_string(),
            symbol: "yvLP".to_string(),
            deposit_limit: None,
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self { rate: 1, funding: 1_000_000_000 }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self { slippage_bps: DEFAULT_SLIPPAGE_BPS }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { seed_a: 10_000_000, seed_b: 10_000_000, seed_reward: 10_000_000 }
    }
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self { amount: 1_000_000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

impl DeploymentConfig {
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| VaultError::InvalidParameter(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VaultError::InvalidParameter(format!("config: {e}")))
    }

    /// Reject values no deployment can run with. All problems are reported
    /// at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.owner.trim().is_empty() {
            errors.push("owner label must not be empty".to_string());
        }
        if self.vault.deposit_limit == Some(0) {
            errors.push("vault.deposit_limit must be positive".to_string());
        }
        if self.vault.symbol.is_empty() {
            errors.push("vault.symbol must not be empty".to_string());
        }
        if self.strategy.slippage_bps > MAX_SLIPPAGE_BPS {
            errors.push(format!("strategy.slippage_bps must be at most {MAX_SLIPPAGE_BPS}"));
        }
        if self.pool.seed_a == 0 || self.pool.seed_b == 0 {
            errors.push("pool.seed_a and pool.seed_b must be positive".to_string());
        }
        if self.pool.seed_reward == 0 {
            errors.push("pool.seed_reward must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(VaultError::InvalidParameter(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(DeploymentConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = DeploymentConfig::from_toml(
            r#"
            [vault]
            deposit_limit = 5000

            [rewards]
            rate = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.vault.deposit_limit, Some(5_000));
        assert_eq!(config.vault.symbol, "yvLP");
        assert_eq!(config.rewards.rate, 25);
        assert_eq!(config.strategy.slippage_bps, DEFAULT_SLIPPAGE_BPS);
    }

    #[test]
    fn out_of_range_values_are_all_reported() {
        let mut config = DeploymentConfig::default();
        config.strategy.slippage_bps = 10_001;
        config.vault.deposit_limit = Some(0);
        match config.validate() {
            Err(VaultError::InvalidParameter(msg)) => {
                assert!(msg.contains("slippage_bps"));
                assert!(msg.contains("deposit_limit"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn round_trips_through_toml() {
        let config = DeploymentConfig::default();
        let raw = config.to_toml().unwrap();
        assert_eq!(DeploymentConfig::from_toml(&raw).unwrap(), config);
    }

    #[test]
    fn configured_deposit_limit_survives_toml() {
        let mut config = DeploymentConfig::default();
        assert!(!config.to_toml().unwrap().contains("deposit_limit"));
        config.vault.deposit_limit = Some(1_500);
        let raw = config.to_toml().unwrap();
        assert_eq!(DeploymentConfig::from_toml(&raw).unwrap().vault.deposit_limit, Some(1_500));
    }
}
