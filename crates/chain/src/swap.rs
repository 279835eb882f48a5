//! Swap router abstraction.
//!
//! The router is an opaque exact-input capability: it pulls `amount_in` of
//! `token_in` from the caller (who must have approved [`SwapRouter::address`])
//! and pays at least `min_amount_out` of `token_out` back to the caller, or
//! fails with `ChainError::SlippageExceeded`.

use crate::error::ChainResult;
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Parameters for an exact-input swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapParams {
    /// Input token address
    pub token_in: Address,
    /// Output token address
    pub token_out: Address,
    /// Input amount (raw, with decimals)
    pub amount_in: U256,
    /// Minimum acceptable output (raw, with decimals)
    pub min_amount_out: U256,
}

impl SwapParams {
    /// Create new swap parameters with no output bound.
    pub fn new(token_in: Address, token_out: Address, amount_in: U256) -> Self {
        Self {
            token_in,
            token_out,
            amount_in,
            min_amount_out: U256::ZERO,
        }
    }

    /// Set the minimum acceptable output.
    pub fn with_min_amount_out(mut self, min_amount_out: U256) -> Self {
        self.min_amount_out = min_amount_out;
        self
    }
}

/// Trait for swap routing providers.
#[async_trait]
pub trait SwapRouter: Send + Sync + Debug {
    /// Get the router identifier (e.g., "sushiswap").
    fn router_id(&self) -> &str;

    /// Router address (the spender the caller must approve).
    fn address(&self) -> Address;

    /// Execute an exact-input swap for `caller`; returns the output amount.
    async fn swap_exact_input(&self, caller: Address, params: SwapParams) -> ChainResult<U256>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_params_builder() {
        let params = SwapParams::new(
            Address::ZERO,
            Address::repeat_byte(1),
            U256::from(1000),
        )
        .with_min_amount_out(U256::from(980));

        assert_eq!(params.amount_in, U256::from(1000));
        assert_eq!(params.min_amount_out, U256::from(980));
    }
}
