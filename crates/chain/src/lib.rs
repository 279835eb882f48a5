//! Lending market interaction layer for the leveraged swap manager.
//!
//! This crate provides:
//! - Collaborator traits for the lending pool (with flash loans), reserve data, credit delegation,
//!   price oracle, swap router, token ledger and host transaction boundary
//! - Shared protocol types (reserve configuration, account data, rate modes)
//! - U256 fixed-point math for reference-currency valuation and health factors
//! - An Aave V2 read adapter over JSON-RPC (alloy)
//! - An in-memory simulated market implementing every collaborator

pub mod error;
mod host;
pub mod oracle;
pub mod protocol;
pub mod sim;
mod swap;
mod token;
pub mod u256_math;

pub use error::{ChainError, ChainResult};
pub use host::{AtomicHost, Checkpoint};
pub use oracle::PriceOracle;
pub use protocol::{
    AaveV2Config, AaveV2Reader, CreditDelegation, FlashLoanMode, FlashLoanReceiver,
    InterestRateMode, LendingPool, ReserveConfiguration, ReserveDataProvider, TokenAddresses,
    UserAccountData, UserReserveData,
};
pub use sim::{standard_reserve, MarketBuilder, SimulatedMarket, DEFAULT_FLASH_LOAN_PREMIUM_BPS};
pub use swap::{SwapParams, SwapRouter};
pub use token::TokenLedger;
