//! Collaborators the manager is initialized with.

use crate::config::{ManagerConfig, ManagerSettings};
use leverage_chain::{
    AtomicHost, CreditDelegation, LendingPool, PriceOracle, ReserveDataProvider, SimulatedMarket,
    SwapRouter, TokenLedger,
};
use std::sync::Arc;

/// Everything an initialized manager talks to.
#[derive(Debug, Clone)]
pub struct ManagerContext {
    pub reserves: Arc<dyn ReserveDataProvider>,
    pub pool: Arc<dyn LendingPool>,
    pub delegation: Arc<dyn CreditDelegation>,
    pub oracle: Arc<dyn PriceOracle>,
    pub router: Arc<dyn SwapRouter>,
    pub tokens: Arc<dyn TokenLedger>,
    pub host: Arc<dyn AtomicHost>,
    pub settings: ManagerSettings,
    pub config: ManagerConfig,
}

impl ManagerContext {
    /// Wire every collaborator to one simulated market.
    pub fn simulated(
        market: Arc<SimulatedMarket>,
        settings: ManagerSettings,
        config: ManagerConfig,
    ) -> Self {
        Self {
            reserves: market.clone(),
            pool: market.clone(),
            delegation: market.clone(),
            oracle: market.clone(),
            router: market.clone(),
            tokens: market.clone(),
            host: market,
            settings,
            config,
        }
    }
}
