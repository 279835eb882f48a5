//! Fluent construction of a [`SimulatedMarket`].

use super::{Ledger, MarketState, SimulatedMarket, POOL_ADDRESS, ROUTER_ADDRESS};
use crate::protocol::ReserveConfiguration;
use alloy::primitives::{Address, U256};
use parking_lot::Mutex;
use tracing::debug;

/// Underlying liquidity seeded into the pool and the router per reserve
/// (10^30 base units).
pub const DEFAULT_LIQUIDITY: U256 = U256::from_limbs([0x4674_edea_4000_0000, 0x0c_9f2c_9cd0, 0, 0]);

/// Aave V2 `FLASHLOAN_PREMIUM_TOTAL` (0.09%).
pub const DEFAULT_FLASH_LOAN_PREMIUM_BPS: u16 = 9;

/// An active, unfrozen reserve usable as collateral and for borrowing at
/// both rate modes.
pub fn standard_reserve(decimals: u8, ltv: u16, liquidation_threshold: u16) -> ReserveConfiguration {
    ReserveConfiguration {
        decimals,
        ltv,
        liquidation_threshold,
        liquidation_bonus: 10_500,
        reserve_factor: 1_000,
        usage_as_collateral_enabled: liquidation_threshold > 0,
        borrowing_enabled: true,
        stable_borrow_rate_enabled: true,
        is_active: true,
        is_frozen: false,
    }
}

/// Builder for [`SimulatedMarket`].
#[derive(Debug, Clone)]
pub struct MarketBuilder {
    reserves: Vec<(Address, ReserveConfiguration, U256)>,
    liquidity: U256,
    router_haircut_bps: u16,
    flash_loan_premium_bps: u16,
}

impl Default for MarketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketBuilder {
    pub fn new() -> Self {
        Self {
            reserves: Vec::new(),
            liquidity: DEFAULT_LIQUIDITY,
            router_haircut_bps: 0,
            flash_loan_premium_bps: DEFAULT_FLASH_LOAN_PREMIUM_BPS,
        }
    }

    /// List a reserve with its configuration and oracle price.
    pub fn with_reserve(mut self, asset: Address, config: ReserveConfiguration, price: U256) -> Self {
        self.reserves.push((asset, config, price));
        self
    }

    /// Liquidity seeded into the pool and router for every reserve.
    pub fn with_liquidity(mut self, liquidity: U256) -> Self {
        self.liquidity = liquidity;
        self
    }

    /// Router output haircut versus the oracle price.
    pub fn with_router_haircut_bps(mut self, bps: u16) -> Self {
        self.router_haircut_bps = bps;
        self
    }

    /// Premium on flash loans that are paid back.
    pub fn with_flash_loan_premium_bps(mut self, bps: u16) -> Self {
        self.flash_loan_premium_bps = bps;
        self
    }

    pub fn build(self) -> SimulatedMarket {
        let mut ledger = Ledger {
            router_haircut_bps: self.router_haircut_bps,
            flash_loan_premium_bps: self.flash_loan_premium_bps,
            ..Ledger::default()
        };
        for (asset, config, price) in self.reserves {
            ledger.list_reserve(asset, config, price);
            ledger.mint(asset, POOL_ADDRESS, self.liquidity);
            ledger.mint(asset, ROUTER_ADDRESS, self.liquidity);
        }
        debug!(
            reserves = ledger.reserve_list.len(),
            haircut_bps = ledger.router_haircut_bps,
            flash_premium_bps = ledger.flash_loan_premium_bps,
            "Simulated market built"
        );

        SimulatedMarket {
            state: Mutex::new(MarketState {
                ledger,
                ..MarketState::default()
            }),
        }
    }
}
