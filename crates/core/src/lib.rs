//! Leveraged swap manager core logic.
//!
//! This crate provides the calculation-and-execution engine:
//! - Token registry over the protocol data provider
//! - Oracle valuation to and from the reference currency
//! - Swap planning and execution (flash-advanced loan, swap, redeposit, then
//!   debt on delegated credit)
//! - Repay planning and execution (flash-advanced repay, then withdraw
//!   collateral and swap back)
//! - The manager facade with its one-time initialization and scratch record
//!
//! Every execution runs inside a host checkpoint and leaves the manager
//! holding none of the tokens it touched.

pub mod config;
mod context;
mod error;
mod execution;
mod manager;
mod registry;
mod repay_executor;
mod repay_planner;
mod scratch;
mod swap_executor;
mod swap_planner;
mod types;
mod valuation;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{DeploymentConfig, DeploymentContracts, FeeConfig, LimitConfig, ManagerConfig, ManagerSettings};
pub use context::ManagerContext;
pub use error::{ManagerError, Result};
pub use manager::LeveragedSwapManager;
pub use registry::TokenRegistry;
pub use repay_executor::{RepayExecutor, RepayOutcome};
pub use repay_planner::{RepayLeg, RepayPlan, RepayPlanner, RepayRequest};
pub use scratch::{OperationPhase, OperationVars, ScratchRecord};
pub use swap_executor::{SwapExecutor, SwapOutcome};
pub use swap_planner::{SwapPlan, SwapPlanner, SwapRequest};
pub use types::{parse_rate_mode, AssetPosition, TokenInfo};
pub use valuation::Valuation;
