//! Oracle-priced exact-input router.

use super::{SimulatedMarket, ROUTER_ADDRESS};
use crate::error::{ChainError, ChainResult};
use crate::swap::{SwapParams, SwapRouter};
use crate::u256_math::{apply_basis_points, from_reference_value, to_reference_value};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
impl SwapRouter for SimulatedMarket {
    fn router_id(&self) -> &str {
        "simulated"
    }

    fn address(&self) -> Address {
        ROUTER_ADDRESS
    }

    /// Quotes at the oracle cross rate minus the configured haircut.
    async fn swap_exact_input(&self, caller: Address, params: SwapParams) -> ChainResult<U256> {
        self.apply(|ledger| {
            if params.amount_in.is_zero() {
                return Err(ChainError::rejected("swap input is 0"));
            }
            let decimals_in = ledger.reserve(params.token_in)?.config.decimals;
            let decimals_out = ledger.reserve(params.token_out)?.config.decimals;
            let value = to_reference_value(
                params.amount_in,
                ledger.price(params.token_in)?,
                decimals_in,
            );
            let quoted = from_reference_value(value, ledger.price(params.token_out)?, decimals_out);
            let amount_out = apply_basis_points(quoted, ledger.router_haircut_bps);

            if amount_out < params.min_amount_out || amount_out.is_zero() {
                return Err(ChainError::SlippageExceeded {
                    min_amount_out: params.min_amount_out,
                    actual: amount_out,
                });
            }

            ledger.spend_allowance(params.token_in, caller, ROUTER_ADDRESS, params.amount_in)?;
            ledger.move_funds(params.token_in, caller, ROUTER_ADDRESS, params.amount_in)?;
            ledger.move_funds(params.token_out, ROUTER_ADDRESS, caller, amount_out)?;
            debug!(
                token_in = %params.token_in,
                token_out = %params.token_out,
                amount_in = %params.amount_in,
                amount_out = %amount_out,
                "Simulated swap"
            );
            Ok(amount_out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{standard_reserve, MarketBuilder};
    use crate::token::TokenLedger;
    use crate::u256_math::WAD;

    fn usdc() -> Address {
        Address::repeat_byte(0xc0)
    }

    fn weth() -> Address {
        Address::repeat_byte(0xee)
    }

    fn market(haircut_bps: u16) -> SimulatedMarket {
        MarketBuilder::new()
            .with_reserve(usdc(), standard_reserve(6, 8000, 8500), U256::from(500_000_000_000_000u64))
            .with_reserve(weth(), standard_reserve(18, 8000, 8250), WAD)
            .with_router_haircut_bps(haircut_bps)
            .build()
    }

    #[tokio::test]
    async fn test_swap_at_oracle_rate() {
        let market = market(0);
        let trader = Address::repeat_byte(1);
        let amount_in = U256::from(2_000_000_000u64); // 2000 USDC = 1 ETH
        market.fund(usdc(), trader, amount_in);
        market.approve(usdc(), trader, ROUTER_ADDRESS, amount_in).await.unwrap();

        let params = SwapParams::new(usdc(), weth(), amount_in).with_min_amount_out(WAD);
        let out = market.swap_exact_input(trader, params).await.unwrap();

        assert_eq!(out, WAD);
        assert_eq!(market.balance(weth(), trader), WAD);
        assert_eq!(market.balance(usdc(), trader), U256::ZERO);
    }

    #[tokio::test]
    async fn test_haircut_below_minimum_fails() {
        let market = market(300);
        let trader = Address::repeat_byte(1);
        market.fund(weth(), trader, WAD);
        market.approve(weth(), trader, ROUTER_ADDRESS, WAD).await.unwrap();

        // 3% haircut against a 2% slippage bound
        let expected = U256::from(2_000_000_000u64);
        let params = SwapParams::new(weth(), usdc(), WAD)
            .with_min_amount_out(apply_basis_points(expected, 200));
        let err = market.swap_exact_input(trader, params).await.unwrap_err();

        assert_eq!(
            err,
            ChainError::SlippageExceeded {
                min_amount_out: U256::from(1_960_000_000u64),
                actual: U256::from(1_940_000_000u64),
            }
        );
        assert_eq!(market.balance(weth(), trader), WAD);
    }

    #[tokio::test]
    async fn test_swap_requires_approval() {
        let market = market(0);
        let trader = Address::repeat_byte(1);
        market.fund(weth(), trader, WAD);

        let err = market
            .swap_exact_input(trader, SwapParams::new(weth(), usdc(), WAD))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::InsufficientAllowance { .. }));
    }
}
