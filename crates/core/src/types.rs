//! Token and position snapshots.

use crate::error::{ManagerError, Result};
use alloy::primitives::{Address, U256};
use leverage_chain::{InterestRateMode, ReserveConfiguration, UserReserveData};
use serde::{Deserialize, Serialize};

/// Eligibility and risk parameters of one reserve, fetched per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Underlying token address
    pub address: Address,
    /// Active, unfrozen and borrowing enabled
    pub borrowable: bool,
    /// Active, unfrozen, collateral enabled with a non-zero threshold
    pub can_be_collateral: bool,
    pub stable_borrow_rate_enabled: bool,
    /// Liquidation threshold (basis points)
    pub liquidation_threshold: u16,
    /// Loan-to-value (basis points)
    pub ltv: u16,
    pub decimals: u8,
}

impl TokenInfo {
    /// Derive eligibility flags from a raw reserve configuration.
    pub fn from_configuration(address: Address, config: &ReserveConfiguration) -> Self {
        let usable = config.is_active && !config.is_frozen;
        Self {
            address,
            borrowable: usable && config.borrowing_enabled,
            can_be_collateral: usable
                && config.usage_as_collateral_enabled
                && config.liquidation_threshold > 0,
            stable_borrow_rate_enabled: config.stable_borrow_rate_enabled,
            liquidation_threshold: config.liquidation_threshold,
            ltv: config.ltv,
            decimals: config.decimals,
        }
    }

    /// Whether borrowing in `mode` is allowed on this reserve.
    pub fn supports_rate_mode(&self, mode: InterestRateMode) -> bool {
        match mode {
            InterestRateMode::Stable => self.stable_borrow_rate_enabled,
            InterestRateMode::Variable => true,
        }
    }
}

/// Decode an Aave numeric rate mode (1 stable, 2 variable).
pub fn parse_rate_mode(mode: u8) -> Result<InterestRateMode> {
    InterestRateMode::try_from(mode).map_err(ManagerError::InvalidRateMode)
}

/// An account's supply and debt in one reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPosition {
    pub token: TokenInfo,
    pub a_token_balance: U256,
    pub stable_debt: U256,
    pub variable_debt: U256,
}

impl AssetPosition {
    pub fn new(token: TokenInfo, data: &UserReserveData) -> Self {
        Self {
            token,
            a_token_balance: data.current_a_token_balance,
            stable_debt: data.current_stable_debt,
            variable_debt: data.current_variable_debt,
        }
    }

    pub fn has_debt(&self) -> bool {
        !self.stable_debt.is_zero() || !self.variable_debt.is_zero()
    }
}
