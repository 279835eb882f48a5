//! Engine configuration with profile support.
//!
//! Provides the fee and risk parameters of the manager with support for
//! named profiles (default, conservative) or a TOML file.

use anyhow::{bail, Context};
use leverage_chain::u256_math::MAX_BPS;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for the manager engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Protocol fee parameters
    #[serde(default)]
    pub fees: FeeConfig,

    /// Slippage and projection limits
    #[serde(default)]
    pub limits: LimitConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Protocol fee charged on every swap and repay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Fee as a share of the moved reference value (basis points)
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u16,

    /// Base units a separate fee payment may fall short by (rounding skew)
    #[serde(default = "default_fee_skew")]
    pub fee_skew: u64,
}

fn default_fee_bps() -> u16 {
    9
}
fn default_fee_skew() -> u64 {
    5
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_bps: default_fee_bps(),
            fee_skew: default_fee_skew(),
        }
    }
}

/// Request validation limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Largest slippage tolerance a request may ask for (basis points)
    #[serde(default = "default_max_slippage")]
    pub max_slippage_bps: u16,

    /// Accepted gap between projected and realized health factor (WAD)
    #[serde(default = "default_hf_tolerance")]
    pub health_factor_tolerance_wad: u64,
}

fn default_max_slippage() -> u16 {
    MAX_BPS
}
fn default_hf_tolerance() -> u64 {
    1_000_000_000_000_000
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_slippage_bps: default_max_slippage(),
            health_factor_tolerance_wad: default_hf_tolerance(),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            fees: FeeConfig::default(),
            limits: LimitConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading manager config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing manager config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Tight slippage ceiling for user-facing deployments.
    pub fn conservative() -> Self {
        Self {
            profile: "conservative".to_string(),
            fees: FeeConfig::default(),
            limits: LimitConfig {
                max_slippage_bps: 500,
                ..Default::default()
            },
        }
    }

    /// Get profile from environment variable LEVERAGE_PROFILE, or default.
    /// Supported values: default, conservative
    pub fn from_env() -> Self {
        let profile = std::env::var("LEVERAGE_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "conservative" | "safe" => Self::conservative(),
            _ => Self::default(),
        }
    }

    /// Reject basis-point values above 100%.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fees.fee_bps > MAX_BPS {
            bail!("fee_bps {} exceeds {}", self.fees.fee_bps, MAX_BPS);
        }
        if self.limits.max_slippage_bps > MAX_BPS {
            bail!(
                "max_slippage_bps {} exceeds {}",
                self.limits.max_slippage_bps,
                MAX_BPS
            );
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Manager configuration loaded");
        tracing::info!(
            fee_bps = self.fees.fee_bps,
            fee_skew = self.fees.fee_skew,
            "Fee parameters"
        );
        tracing::info!(
            max_slippage_bps = self.limits.max_slippage_bps,
            hf_tolerance_wad = self.limits.health_factor_tolerance_wad,
            "Limits"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.fees.fee_bps, 9);
        assert_eq!(config.fees.fee_skew, 5);
        assert_eq!(config.limits.max_slippage_bps, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_conservative_profile() {
        let config = ManagerConfig::conservative();
        assert_eq!(config.profile, "conservative");
        assert_eq!(config.limits.max_slippage_bps, 500);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ManagerConfig = toml::from_str("[fees]\nfee_bps = 30\n").unwrap();
        assert_eq!(config.profile, "default");
        assert_eq!(config.fees.fee_bps, 30);
        assert_eq!(config.fees.fee_skew, 5);
        assert_eq!(config.limits, LimitConfig::default());
    }

    #[test]
    fn test_serialization() {
        let config = ManagerConfig::conservative();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"conservative\""));

        let parsed: ManagerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = ManagerConfig::default();
        config.fees.fee_bps = 10_001;
        assert!(config.validate().is_err());
    }
}
