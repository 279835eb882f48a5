//! Reference-currency valuation over the price oracle.

use crate::error::{ManagerError, Result};
use crate::types::TokenInfo;
use alloy::primitives::{Address, U256};
use leverage_chain::u256_math;
use futures::future::try_join_all;
use leverage_chain::{ChainError, InterestRateMode, PriceOracle, ReserveDataProvider, UserAccountData};
use std::sync::Arc;
use tracing::warn;

/// Converts token amounts to and from the reference currency.
///
/// Both directions round down, so an amount derived from a value never
/// exceeds what that value can buy.
#[derive(Debug, Clone)]
pub struct Valuation {
    oracle: Arc<dyn PriceOracle>,
    provider: Arc<dyn ReserveDataProvider>,
}

impl Valuation {
    pub fn new(oracle: Arc<dyn PriceOracle>, provider: Arc<dyn ReserveDataProvider>) -> Self {
        Self { oracle, provider }
    }

    /// Oracle price of one whole `token`; zero, absurd or failed prices are
    /// all `OracleUnavailable`.
    pub async fn price_of(&self, token: Address) -> Result<U256> {
        let price = self.oracle.asset_price(token).await.map_err(|e| {
            warn!(token = %token, error = %e, "Price lookup failed");
            ManagerError::OracleUnavailable(token)
        })?;
        if !self.oracle.validate_price(price) {
            warn!(token = %token, price = %price, "Price failed sanity check");
            return Err(ManagerError::OracleUnavailable(token));
        }
        Ok(price)
    }

    /// `amount * price / 10^decimals`, rounded down. Amounts too large to
    /// price fail with `ValueOverflow` instead of wrapping.
    pub async fn to_reference_value(&self, token: &TokenInfo, amount: U256) -> Result<U256> {
        let price = self.price_of(token.address).await?;
        u256_math::checked_to_reference_value(amount, price, token.decimals)
            .ok_or(ManagerError::Protocol(ChainError::ValueOverflow { amount }))
    }

    /// `value * 10^decimals / price`, rounded down.
    pub async fn from_reference_value(&self, token: &TokenInfo, value: U256) -> Result<U256> {
        let price = self.price_of(token.address).await?;
        u256_math::checked_from_reference_value(value, price, token.decimals)
            .ok_or(ManagerError::Protocol(ChainError::ValueOverflow { amount: value }))
    }

    /// Pool premium on flash loans that are paid back (basis points).
    pub async fn flash_loan_premium_bps(&self) -> Result<u16> {
        Ok(self.provider.flash_loan_premium_bps().await?)
    }

    pub async fn user_account_data(&self, account: Address) -> Result<UserAccountData> {
        Ok(self.provider.user_account_data(account).await?)
    }

    /// Σ(value * liquidation threshold) over the account's collateral,
    /// summed per reserve. The pool's aggregate threshold is rounded down to
    /// whole basis points, which drifts on large positions.
    pub async fn weighted_collateral(&self, account: Address) -> Result<U256> {
        let reserves = self.provider.all_reserves().await?;
        let weights = try_join_all(reserves.into_iter().map(|asset| async move {
            let (config, data) = futures::try_join!(
                self.provider.reserve_configuration(asset),
                self.provider.user_reserve_data(asset, account),
            )?;
            if data.current_a_token_balance.is_zero()
                || !config.usage_as_collateral_enabled
                || config.liquidation_threshold == 0
            {
                return Ok::<_, ManagerError>(U256::ZERO);
            }
            let price = self.price_of(asset).await?;
            let value =
                u256_math::to_reference_value(data.current_a_token_balance, price, config.decimals);
            Ok(value.saturating_mul(U256::from(config.liquidation_threshold)))
        }))
        .await?;
        Ok(weights.into_iter().fold(U256::ZERO, |sum, w| sum.saturating_add(w)))
    }

    /// Current debt of `account` in `token` under `mode`.
    pub async fn debt_of(
        &self,
        token: Address,
        account: Address,
        mode: InterestRateMode,
    ) -> Result<U256> {
        let data = self.provider.user_reserve_data(token, account).await?;
        Ok(data.debt(mode))
    }
}
