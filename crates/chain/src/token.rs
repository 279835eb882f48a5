//! ERC-20 style token ledger.

use crate::error::ChainResult;
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::fmt::Debug;

/// Balances and allowances of fungible tokens (underlyings, aTokens, native).
///
/// `transfer` moves funds out of `from`, which must be the party on whose
/// behalf the current call runs; `transfer_from` spends an allowance granted
/// to `spender`.
#[async_trait]
pub trait TokenLedger: Send + Sync + Debug {
    async fn balance_of(&self, token: Address, owner: Address) -> ChainResult<U256>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> ChainResult<U256>;

    async fn approve(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> ChainResult<()>;

    async fn transfer(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> ChainResult<()>;

    async fn transfer_from(
        &self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> ChainResult<()>;
}
