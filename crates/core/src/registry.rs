//! Token registry backed by the protocol data provider.

use crate::error::Result;
use crate::types::TokenInfo;
use alloy::primitives::Address;
use leverage_chain::{ReserveDataProvider, TokenAddresses};
use std::sync::Arc;
use tracing::debug;

/// Resolves token addresses to reserve metadata. Nothing is cached: every
/// lookup reflects the protocol's current configuration.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    provider: Arc<dyn ReserveDataProvider>,
}

impl TokenRegistry {
    pub fn new(provider: Arc<dyn ReserveDataProvider>) -> Self {
        Self { provider }
    }

    /// Eligibility flags and risk parameters of `token`.
    pub async fn get_token_info(&self, token: Address) -> Result<TokenInfo> {
        let config = self.provider.reserve_configuration(token).await?;
        let info = TokenInfo::from_configuration(token, &config);
        debug!(
            token = %token,
            borrowable = info.borrowable,
            collateral = info.can_be_collateral,
            lt = info.liquidation_threshold,
            decimals = info.decimals,
            "Token info resolved"
        );
        Ok(info)
    }

    /// aToken and debt token addresses of `token`.
    pub async fn reserve_tokens(&self, token: Address) -> Result<TokenAddresses> {
        Ok(self.provider.reserve_tokens_addresses(token).await?)
    }

    /// Every listed reserve.
    pub async fn all_reserves(&self) -> Result<Vec<Address>> {
        Ok(self.provider.all_reserves().await?)
    }
}
