//! Price oracle abstraction.
//!
//! Prices are quoted per whole token in the protocol's reference currency
//! with 18 decimals (Aave V2 prices assets in ETH).

use crate::error::ChainResult;
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::fmt::Debug;

/// Core trait for oracle interactions.
#[async_trait]
pub trait PriceOracle: Send + Sync + Debug {
    /// Current price of one whole `asset` in the reference currency.
    ///
    /// Fails with `ChainError::PriceUnavailable` when the asset has no feed.
    async fn asset_price(&self, asset: Address) -> ChainResult<U256>;

    /// Validate price against sanity checks.
    fn validate_price(&self, price: U256) -> bool {
        // Positive and below 10^30 reference units per token
        !price.is_zero() && price < U256::from(10u128.pow(30))
    }
}
