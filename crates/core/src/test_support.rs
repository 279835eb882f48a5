//! Shared market fixture for unit tests.

use crate::config::{ManagerConfig, ManagerSettings};
use crate::context::ManagerContext;
use crate::manager::LeveragedSwapManager;
use crate::registry::TokenRegistry;
use crate::repay_planner::RepayPlanner;
use crate::swap_planner::SwapPlanner;
use crate::types::TokenInfo;
use crate::valuation::Valuation;
use alloy::primitives::{Address, U256};
use leverage_chain::sim::POOL_ADDRESS;
use leverage_chain::u256_math::WAD;
use leverage_chain::{
    standard_reserve, InterestRateMode, LendingPool, MarketBuilder, ReserveConfiguration,
    SimulatedMarket, TokenLedger,
};
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) fn dai() -> Address {
    Address::repeat_byte(0xda)
}

pub(crate) fn usdc() -> Address {
    Address::repeat_byte(0xc0)
}

/// Also the native token of the fixture.
pub(crate) fn weth() -> Address {
    Address::repeat_byte(0xee)
}

pub(crate) fn user() -> Address {
    Address::repeat_byte(0x01)
}

pub(crate) fn manager_address() -> Address {
    Address::repeat_byte(0x5a)
}

pub(crate) fn fee_recipient() -> Address {
    Address::repeat_byte(0xfe)
}

pub(crate) fn settings() -> ManagerSettings {
    ManagerSettings {
        manager: manager_address(),
        native_token: weth(),
        fee_recipient: fee_recipient(),
    }
}

/// DAI and USDC at 0.0005 ETH, WETH at 1 ETH.
pub(crate) struct Fixture {
    pub market: Arc<SimulatedMarket>,
    configs: HashMap<Address, ReserveConfiguration>,
}

impl Fixture {
    pub fn new() -> Self {
        let half_a_milli_eth = U256::from(500_000_000_000_000u64);
        let reserves = [
            (dai(), standard_reserve(18, 7500, 8000), half_a_milli_eth),
            (usdc(), standard_reserve(6, 8000, 8500), half_a_milli_eth),
            (weth(), standard_reserve(18, 8000, 8250), WAD),
        ];

        let mut builder = MarketBuilder::new();
        let mut configs = HashMap::new();
        for (asset, config, price) in reserves {
            builder = builder.with_reserve(asset, config, price);
            configs.insert(asset, config);
        }

        Self {
            market: Arc::new(builder.build()),
            configs,
        }
    }

    /// Token info as listed, ignoring later reserve updates.
    pub fn info(&self, asset: Address) -> TokenInfo {
        TokenInfo::from_configuration(asset, &self.configs[&asset])
    }

    /// Fund the user and deposit `amount` of `asset` for them.
    pub async fn supply(&self, asset: Address, amount: U256) {
        self.market.fund(asset, user(), amount);
        self.market
            .approve(asset, user(), POOL_ADDRESS, amount)
            .await
            .unwrap();
        self.market.deposit(user(), asset, amount, user()).await.unwrap();
    }

    /// The user borrows `amount` of `asset` at the variable rate.
    pub async fn borrow(&self, asset: Address, amount: U256) {
        self.market
            .borrow(user(), asset, amount, InterestRateMode::Variable, user())
            .await
            .unwrap();
    }

    fn registry(&self) -> TokenRegistry {
        TokenRegistry::new(self.market.clone())
    }

    pub fn valuation(&self) -> Valuation {
        Valuation::new(self.market.clone(), self.market.clone())
    }

    pub fn swap_planner(&self) -> SwapPlanner {
        SwapPlanner::new(self.registry(), self.valuation(), weth(), &ManagerConfig::default())
    }

    pub fn repay_planner(&self) -> RepayPlanner {
        RepayPlanner::new(self.registry(), self.valuation(), weth(), &ManagerConfig::default())
    }

    pub fn context(&self) -> ManagerContext {
        ManagerContext::simulated(self.market.clone(), settings(), ManagerConfig::default())
    }

    /// An initialized manager over this market.
    pub fn manager(&self) -> LeveragedSwapManager {
        let manager = LeveragedSwapManager::new();
        manager.initialize(self.context()).unwrap();
        manager
    }
}
