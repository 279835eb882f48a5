//! AAVE V2 read adapter over JSON-RPC.
//!
//! Implements [`ReserveDataProvider`], [`PriceOracle`] and [`CreditDelegation`]
//! against a live deployment using typed alloy contract calls. State-mutating
//! pool calls are not available here; planning runs against this adapter while
//! execution needs a host that provides [`crate::LendingPool`] and
//! [`crate::AtomicHost`].

use super::{
    require_configured, CreditDelegation, ReserveConfiguration, ReserveDataProvider,
    TokenAddresses, UserAccountData, UserReserveData,
};
use crate::error::{ChainError, ChainResult};
use crate::oracle::PriceOracle;
use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use alloy::sol;
use async_trait::async_trait;
use tracing::debug;

sol! {
    #[derive(Debug)]
    struct TokenData {
        string symbol;
        address tokenAddress;
    }

    /// Aave V2 protocol data provider (subset)
    #[sol(rpc)]
    interface IProtocolDataProvider {
        function getAllReservesTokens() external view returns (TokenData[] memory);

        function getReserveConfigurationData(address asset)
            external
            view
            returns (
                uint256 decimals,
                uint256 ltv,
                uint256 liquidationThreshold,
                uint256 liquidationBonus,
                uint256 reserveFactor,
                bool usageAsCollateralEnabled,
                bool borrowingEnabled,
                bool stableBorrowRateEnabled,
                bool isActive,
                bool isFrozen
            );

        function getReserveTokensAddresses(address asset)
            external
            view
            returns (
                address aTokenAddress,
                address stableDebtTokenAddress,
                address variableDebtTokenAddress
            );

        function getUserReserveData(address asset, address user)
            external
            view
            returns (
                uint256 currentATokenBalance,
                uint256 currentStableDebt,
                uint256 currentVariableDebt,
                uint256 principalStableDebt,
                uint256 scaledVariableDebt,
                uint256 stableBorrowRate,
                uint256 liquidityRate,
                uint40 stableRateLastUpdated,
                bool usageAsCollateralEnabled
            );
    }

    /// Aave V2 lending pool (account aggregates and flash-loan premium)
    #[sol(rpc)]
    interface ILendingPool {
        function FLASHLOAN_PREMIUM_TOTAL() external view returns (uint256);

        function getUserAccountData(address user)
            external
            view
            returns (
                uint256 totalCollateralETH,
                uint256 totalDebtETH,
                uint256 availableBorrowsETH,
                uint256 currentLiquidationThreshold,
                uint256 ltv,
                uint256 healthFactor
            );
    }

    /// Aave V2 price oracle
    #[sol(rpc)]
    interface IPriceOracleGetter {
        function getAssetPrice(address asset) external view returns (uint256);
    }

    /// Stable/variable debt token credit delegation
    #[sol(rpc)]
    interface IDebtToken {
        function approveDelegation(address delegatee, uint256 amount) external;
        function borrowAllowance(address fromUser, address toUser) external view returns (uint256);
    }
}

/// Addresses of an Aave V2 deployment.
#[derive(Debug, Clone)]
pub struct AaveV2Config {
    /// HTTP JSON-RPC endpoint
    pub rpc_url: String,
    /// Protocol data provider contract
    pub data_provider: Address,
    /// Lending pool contract
    pub lending_pool: Address,
    /// Price oracle contract
    pub price_oracle: Address,
}

/// Read-only Aave V2 adapter.
#[derive(Debug, Clone)]
pub struct AaveV2Reader {
    config: AaveV2Config,
}

fn transport(e: impl std::fmt::Display) -> ChainError {
    ChainError::Transport(e.to_string())
}

fn bps(value: U256) -> u16 {
    value.saturating_to::<u16>()
}

impl AaveV2Reader {
    /// Create a reader; the RPC URL is validated here, connections are per call.
    pub fn new(config: AaveV2Config) -> ChainResult<Self> {
        config
            .rpc_url
            .parse::<alloy::transports::http::reqwest::Url>()
            .map_err(transport)?;
        Ok(Self { config })
    }

    /// Deployment addresses.
    pub fn config(&self) -> &AaveV2Config {
        &self.config
    }

    fn url(&self) -> ChainResult<alloy::transports::http::reqwest::Url> {
        self.config.rpc_url.parse().map_err(transport)
    }
}

#[async_trait]
impl ReserveDataProvider for AaveV2Reader {
    async fn reserve_configuration(&self, asset: Address) -> ChainResult<ReserveConfiguration> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let contract = IProtocolDataProvider::new(self.config.data_provider, &provider);
        let data = contract
            .getReserveConfigurationData(asset)
            .call()
            .await
            .map_err(transport)?;

        let config = ReserveConfiguration {
            decimals: data.decimals.saturating_to::<u8>(),
            ltv: bps(data.ltv),
            liquidation_threshold: bps(data.liquidationThreshold),
            liquidation_bonus: bps(data.liquidationBonus),
            reserve_factor: bps(data.reserveFactor),
            usage_as_collateral_enabled: data.usageAsCollateralEnabled,
            borrowing_enabled: data.borrowingEnabled,
            stable_borrow_rate_enabled: data.stableBorrowRateEnabled,
            is_active: data.isActive,
            is_frozen: data.isFrozen,
        };
        debug!(asset = %asset, ?config, "Reserve configuration fetched");
        require_configured(asset, config)
    }

    async fn reserve_tokens_addresses(&self, asset: Address) -> ChainResult<TokenAddresses> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let contract = IProtocolDataProvider::new(self.config.data_provider, &provider);
        let data = contract
            .getReserveTokensAddresses(asset)
            .call()
            .await
            .map_err(transport)?;

        if data.aTokenAddress == Address::ZERO {
            return Err(ChainError::UnknownReserve(asset));
        }
        Ok(TokenAddresses {
            a_token: data.aTokenAddress,
            stable_debt_token: data.stableDebtTokenAddress,
            variable_debt_token: data.variableDebtTokenAddress,
        })
    }

    async fn user_reserve_data(&self, asset: Address, user: Address) -> ChainResult<UserReserveData> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let contract = IProtocolDataProvider::new(self.config.data_provider, &provider);
        let data = contract
            .getUserReserveData(asset, user)
            .call()
            .await
            .map_err(transport)?;

        Ok(UserReserveData {
            current_a_token_balance: data.currentATokenBalance,
            current_stable_debt: data.currentStableDebt,
            current_variable_debt: data.currentVariableDebt,
        })
    }

    async fn user_account_data(&self, user: Address) -> ChainResult<UserAccountData> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let pool = ILendingPool::new(self.config.lending_pool, &provider);
        let data = pool.getUserAccountData(user).call().await.map_err(transport)?;

        Ok(UserAccountData {
            total_collateral: data.totalCollateralETH,
            total_debt: data.totalDebtETH,
            available_borrows: data.availableBorrowsETH,
            current_liquidation_threshold: bps(data.currentLiquidationThreshold),
            ltv: bps(data.ltv),
            health_factor: data.healthFactor,
        })
    }

    async fn all_reserves(&self) -> ChainResult<Vec<Address>> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let contract = IProtocolDataProvider::new(self.config.data_provider, &provider);
        let tokens = contract.getAllReservesTokens().call().await.map_err(transport)?;
        Ok(tokens._0.into_iter().map(|t| t.tokenAddress).collect())
    }

    async fn flash_loan_premium_bps(&self) -> ChainResult<u16> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let pool = ILendingPool::new(self.config.lending_pool, &provider);
        let premium = pool.FLASHLOAN_PREMIUM_TOTAL().call().await.map_err(transport)?;
        Ok(bps(premium._0))
    }
}

#[async_trait]
impl PriceOracle for AaveV2Reader {
    async fn asset_price(&self, asset: Address) -> ChainResult<U256> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let oracle = IPriceOracleGetter::new(self.config.price_oracle, &provider);
        let price = oracle
            .getAssetPrice(asset)
            .call()
            .await
            .map_err(|_| ChainError::PriceUnavailable(asset))?;
        if price._0.is_zero() {
            return Err(ChainError::PriceUnavailable(asset));
        }
        Ok(price._0)
    }
}

#[async_trait]
impl CreditDelegation for AaveV2Reader {
    async fn borrow_allowance(
        &self,
        debt_token: Address,
        delegator: Address,
        delegatee: Address,
    ) -> ChainResult<U256> {
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let token = IDebtToken::new(debt_token, &provider);
        let allowance = token
            .borrowAllowance(delegator, delegatee)
            .call()
            .await
            .map_err(transport)?;
        Ok(allowance._0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    fn config(rpc_url: &str) -> AaveV2Config {
        AaveV2Config {
            rpc_url: rpc_url.to_string(),
            data_provider: "0x057835Ad21a177dbdd3090bB1CAE03EaCF78Fc6d".parse().unwrap(),
            lending_pool: "0x7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9".parse().unwrap(),
            price_oracle: "0xA50ba011c48153De246E5192C8f9258A2ba79Ca9".parse().unwrap(),
        }
    }

    #[test]
    fn test_reader_rejects_bad_url() {
        assert!(matches!(
            AaveV2Reader::new(config("not a url")),
            Err(ChainError::Transport(_))
        ));
        assert!(AaveV2Reader::new(config("http://localhost:8545")).is_ok());
    }

    #[test]
    fn test_selectors_match_aave_v2() {
        // getReserveConfigurationData(address)
        assert_eq!(
            hex::encode(IProtocolDataProvider::getReserveConfigurationDataCall::SELECTOR),
            "3e150141"
        );
        // getUserAccountData(address)
        assert_eq!(hex::encode(ILendingPool::getUserAccountDataCall::SELECTOR), "bf92857c");
        // FLASHLOAN_PREMIUM_TOTAL()
        assert_eq!(hex::encode(ILendingPool::FLASHLOAN_PREMIUM_TOTALCall::SELECTOR), "074b2e43");
        // getAssetPrice(address)
        assert_eq!(hex::encode(IPriceOracleGetter::getAssetPriceCall::SELECTOR), "b3596f07");
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_mainnet_weth_reserve() {
        let url = std::env::var("ETH_RPC_URL").unwrap_or_else(|_| "https://eth.llamarpc.com".to_string());
        let reader = AaveV2Reader::new(config(&url)).unwrap();
        let weth: Address = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".parse().unwrap();

        let reserve = reader.reserve_configuration(weth).await.unwrap();
        assert_eq!(reserve.decimals, 18);
        let price = reader.asset_price(weth).await.unwrap();
        assert_eq!(price, crate::u256_math::WAD);
    }
}
