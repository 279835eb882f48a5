//! Deployment configuration for talking to a live Aave V2 market.

use alloy::primitives::Address;
use anyhow::Context;
use leverage_chain::AaveV2Config;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// RPC endpoint and protocol contract addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Deployment name (e.g., "aave-v2-mainnet")
    #[serde(default = "default_deployment_name")]
    pub name: String,
    /// HTTP JSON-RPC endpoint; `${VAR}` is expanded from the environment
    pub rpc_url: String,
    /// Contract addresses
    pub contracts: DeploymentContracts,
}

/// Protocol contracts of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentContracts {
    pub data_provider: Address,
    pub lending_pool: Address,
    pub price_oracle: Address,
    /// Wrapped native token (WETH on mainnet)
    pub native_token: Address,
}

fn default_deployment_name() -> String {
    "aave-v2".to_string()
}

/// Expand a whole-string `${VAR}` reference; anything else is returned as is.
fn expand_env(value: &str) -> String {
    match value.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).unwrap_or_else(|_| value.to_string()),
        None => value.to_string(),
    }
}

impl DeploymentConfig {
    /// Load deployment config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading deployment {}", path.display()))?;
        let mut config: DeploymentConfig = toml::from_str(&content)
            .with_context(|| format!("parsing deployment {}", path.display()))?;
        config.rpc_url = expand_env(&config.rpc_url);
        Ok(config)
    }

    /// Reader configuration for the Aave V2 adapter.
    pub fn aave_config(&self) -> AaveV2Config {
        AaveV2Config {
            rpc_url: self.rpc_url.clone(),
            data_provider: self.contracts.data_provider,
            lending_pool: self.contracts.lending_pool,
            price_oracle: self.contracts.price_oracle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAINNET: &str = r#"
name = "aave-v2-mainnet"
rpc_url = "${LEVERAGE_TEST_RPC}"

[contracts]
data_provider = "0x057835Ad21a177dbdd3090bB1CAE03EaCF78Fc6d"
lending_pool = "0x7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9"
price_oracle = "0xA50ba011c48153De246E5192C8f9258A2ba79Ca9"
native_token = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
"#;

    #[test]
    fn test_env_expansion() {
        std::env::set_var("LEVERAGE_TEST_EXPAND", "http://node:8545");
        assert_eq!(expand_env("${LEVERAGE_TEST_EXPAND}"), "http://node:8545");
        assert_eq!(expand_env("literal"), "literal");
        assert_eq!(expand_env("${LEVERAGE_TEST_MISSING}"), "${LEVERAGE_TEST_MISSING}");
        std::env::remove_var("LEVERAGE_TEST_EXPAND");
    }

    #[test]
    fn test_parse_mainnet_deployment() {
        let config: DeploymentConfig = toml::from_str(MAINNET).unwrap();
        assert_eq!(config.name, "aave-v2-mainnet");
        let aave = config.aave_config();
        assert_eq!(aave.lending_pool, config.contracts.lending_pool);
        assert_eq!(aave.rpc_url, "${LEVERAGE_TEST_RPC}");
    }
}
