//! Lending protocol abstraction layer.
//!
//! The engine talks to the lending market through three traits:
//!
//! - [`ReserveDataProvider`]: read-only reserve configuration and account data
//! - [`LendingPool`]: the state-mutating pool entry points, including flash
//!   loans settled through a [`FlashLoanReceiver`] callback
//! - [`CreditDelegation`]: debt-token borrow allowances granted by users
//!
//! # Example
//!
//! ```rust,ignore
//! use leverage_chain::protocol::{ReserveDataProvider, AaveV2Reader};
//!
//! let reader = AaveV2Reader::new(config)?;
//! let reserve = reader.reserve_configuration(dai).await?;
//! let account = reader.user_account_data(user).await?;
//! ```

mod aave_v2;

pub use aave_v2::{AaveV2Config, AaveV2Reader, IDebtToken, ILendingPool, IPriceOracleGetter, IProtocolDataProvider};

use crate::error::{ChainError, ChainResult};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// Interest rate mode used when borrowing or repaying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InterestRateMode {
    /// Stable borrow rate (Aave mode 1)
    Stable,
    /// Variable borrow rate (Aave mode 2)
    #[default]
    Variable,
}

impl InterestRateMode {
    /// Numeric mode as passed to the pool.
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Stable => 1,
            Self::Variable => 2,
        }
    }
}

impl TryFrom<u8> for InterestRateMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Stable),
            2 => Ok(Self::Variable),
            other => Err(other),
        }
    }
}

impl fmt::Display for InterestRateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => write!(f, "stable"),
            Self::Variable => write!(f, "variable"),
        }
    }
}

/// Raw reserve configuration (`getReserveConfigurationData`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveConfiguration {
    /// Token decimals
    pub decimals: u8,
    /// Loan-to-value (basis points)
    pub ltv: u16,
    /// Liquidation threshold (basis points, e.g., 8250 = 82.5%)
    pub liquidation_threshold: u16,
    /// Liquidation bonus (basis points, 10500 = 5% bonus)
    pub liquidation_bonus: u16,
    /// Reserve factor (basis points)
    pub reserve_factor: u16,
    pub usage_as_collateral_enabled: bool,
    pub borrowing_enabled: bool,
    pub stable_borrow_rate_enabled: bool,
    pub is_active: bool,
    pub is_frozen: bool,
}

impl ReserveConfiguration {
    /// A reserve the protocol has never initialized reports all zeroes.
    pub fn is_unconfigured(&self) -> bool {
        !self.is_active && self.decimals == 0 && self.liquidation_threshold == 0
    }
}

/// How the pool settles a flash loan once the receiver's callback returns
/// (Aave `modes[i]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashLoanMode {
    /// Mode 0: the receiver returns the advance plus the premium
    Repay,
    /// Mode 1 or 2: the advance stays with the receiver and becomes debt of
    /// `on_behalf_of`, with no premium
    OpenDebt(InterestRateMode),
}

impl FlashLoanMode {
    /// Numeric mode as passed to `flashLoan`.
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Repay => 0,
            Self::OpenDebt(mode) => mode.as_u8(),
        }
    }
}

/// Flash-loan callback (`IFlashLoanReceiver.executeOperation`).
#[async_trait]
pub trait FlashLoanReceiver: Send + Sync {
    /// Address the advance is paid to.
    fn address(&self) -> Address;

    /// Runs while the receiver holds the advance. Under
    /// [`FlashLoanMode::Repay`] the receiver must leave `amount + premium`
    /// approved to the pool before returning.
    async fn execute_operation(&self, asset: Address, amount: U256, premium: U256) -> ChainResult<()>;
}

/// Interest-bearing and debt token addresses of a reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAddresses {
    pub a_token: Address,
    pub stable_debt_token: Address,
    pub variable_debt_token: Address,
}

impl TokenAddresses {
    /// Debt token tracking the given rate mode.
    pub fn debt_token(&self, mode: InterestRateMode) -> Address {
        match mode {
            InterestRateMode::Stable => self.stable_debt_token,
            InterestRateMode::Variable => self.variable_debt_token,
        }
    }
}

/// A user's balances in one reserve (`getUserReserveData`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserReserveData {
    pub current_a_token_balance: U256,
    pub current_stable_debt: U256,
    pub current_variable_debt: U256,
}

impl UserReserveData {
    /// Debt outstanding in the given rate mode.
    pub fn debt(&self, mode: InterestRateMode) -> U256 {
        match mode {
            InterestRateMode::Stable => self.current_stable_debt,
            InterestRateMode::Variable => self.current_variable_debt,
        }
    }

    /// Whether the user holds anything in this reserve.
    pub fn is_empty(&self) -> bool {
        self.current_a_token_balance.is_zero()
            && self.current_stable_debt.is_zero()
            && self.current_variable_debt.is_zero()
    }
}

/// Account-level aggregates (`getUserAccountData`), in the reference currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserAccountData {
    pub total_collateral: U256,
    pub total_debt: U256,
    pub available_borrows: U256,
    /// Weighted average liquidation threshold (basis points)
    pub current_liquidation_threshold: u16,
    /// Weighted average loan-to-value (basis points)
    pub ltv: u16,
    /// Health factor in WAD (1e18 = 1.0); `U256::MAX` without debt
    pub health_factor: U256,
}

/// Read-only access to reserve configuration and account state.
#[async_trait]
pub trait ReserveDataProvider: Send + Sync + Debug {
    /// Reserve configuration; `ChainError::UnknownReserve` when not listed.
    async fn reserve_configuration(&self, asset: Address) -> ChainResult<ReserveConfiguration>;

    /// aToken and debt token addresses of a reserve.
    async fn reserve_tokens_addresses(&self, asset: Address) -> ChainResult<TokenAddresses>;

    /// A user's balances in one reserve.
    async fn user_reserve_data(&self, asset: Address, user: Address) -> ChainResult<UserReserveData>;

    /// Account-level aggregates.
    async fn user_account_data(&self, user: Address) -> ChainResult<UserAccountData>;

    /// Every listed reserve.
    async fn all_reserves(&self) -> ChainResult<Vec<Address>>;

    /// Premium charged on flash loans settled with [`FlashLoanMode::Repay`]
    /// (`FLASHLOAN_PREMIUM_TOTAL`, basis points).
    async fn flash_loan_premium_bps(&self) -> ChainResult<u16>;
}

/// State-mutating lending pool entry points.
///
/// `caller` is the address invoking the pool (the manager); funds move from or
/// to `caller`, positions are credited or debited on `on_behalf_of`.
#[async_trait]
pub trait LendingPool: Send + Sync + Debug {
    /// Pool address (the spender the caller must approve).
    fn address(&self) -> Address;

    /// Deposit `amount` from `caller`, minting aTokens to `on_behalf_of`.
    async fn deposit(
        &self,
        caller: Address,
        asset: Address,
        amount: U256,
        on_behalf_of: Address,
    ) -> ChainResult<()>;

    /// Borrow `amount` to `caller` against `on_behalf_of`'s collateral.
    async fn borrow(
        &self,
        caller: Address,
        asset: Address,
        amount: U256,
        mode: InterestRateMode,
        on_behalf_of: Address,
    ) -> ChainResult<()>;

    /// Repay up to `amount` of `on_behalf_of`'s debt from `caller`; returns the repaid amount.
    async fn repay(
        &self,
        caller: Address,
        asset: Address,
        amount: U256,
        mode: InterestRateMode,
        on_behalf_of: Address,
    ) -> ChainResult<U256>;

    /// Burn `caller`'s aTokens and send the underlying to `to`; returns the withdrawn amount.
    async fn withdraw(
        &self,
        caller: Address,
        asset: Address,
        amount: U256,
        to: Address,
    ) -> ChainResult<U256>;

    /// Advance `amount` of `asset` to `receiver`, run its callback and settle
    /// per `mode`; returns the premium paid.
    ///
    /// All-or-nothing: a failing callback or settlement undoes the advance.
    /// Under [`FlashLoanMode::OpenDebt`] the borrow checks (credit delegation
    /// when `on_behalf_of` is not the receiver, loan-to-value) run at
    /// settlement, after the callback has moved collateral.
    async fn flash_loan(
        &self,
        receiver: &dyn FlashLoanReceiver,
        asset: Address,
        amount: U256,
        mode: FlashLoanMode,
        on_behalf_of: Address,
    ) -> ChainResult<U256>;
}

/// Debt-token credit delegation (`IDebtToken.borrowAllowance`).
#[async_trait]
pub trait CreditDelegation: Send + Sync + Debug {
    /// Amount `delegatee` may still borrow on `delegator`'s credit.
    async fn borrow_allowance(
        &self,
        debt_token: Address,
        delegator: Address,
        delegatee: Address,
    ) -> ChainResult<U256>;
}

/// Map a reserve configuration fetch onto `UnknownReserve` when unlisted.
pub fn require_configured(
    asset: Address,
    config: ReserveConfiguration,
) -> ChainResult<ReserveConfiguration> {
    if config.is_unconfigured() {
        return Err(ChainError::UnknownReserve(asset));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dai_config() -> ReserveConfiguration {
        ReserveConfiguration {
            decimals: 18,
            ltv: 7500,
            liquidation_threshold: 8000,
            liquidation_bonus: 10500,
            reserve_factor: 1000,
            usage_as_collateral_enabled: true,
            borrowing_enabled: true,
            stable_borrow_rate_enabled: true,
            is_active: true,
            is_frozen: false,
        }
    }

    #[test]
    fn test_rate_mode_parsing() {
        assert_eq!(InterestRateMode::try_from(1), Ok(InterestRateMode::Stable));
        assert_eq!(InterestRateMode::try_from(2), Ok(InterestRateMode::Variable));
        assert_eq!(InterestRateMode::try_from(0), Err(0));
        assert_eq!(InterestRateMode::Variable.as_u8(), 2);
    }

    #[test]
    fn test_flash_loan_mode_numbers() {
        assert_eq!(FlashLoanMode::Repay.as_u8(), 0);
        assert_eq!(FlashLoanMode::OpenDebt(InterestRateMode::Stable).as_u8(), 1);
        assert_eq!(FlashLoanMode::OpenDebt(InterestRateMode::Variable).as_u8(), 2);
    }

    #[test]
    fn test_debt_token_by_mode() {
        let addrs = TokenAddresses {
            a_token: Address::repeat_byte(1),
            stable_debt_token: Address::repeat_byte(2),
            variable_debt_token: Address::repeat_byte(3),
        };
        assert_eq!(addrs.debt_token(InterestRateMode::Stable), Address::repeat_byte(2));
        assert_eq!(addrs.debt_token(InterestRateMode::Variable), Address::repeat_byte(3));
    }

    #[test]
    fn test_unconfigured_reserve_detection() {
        let asset = Address::repeat_byte(9);
        assert!(require_configured(asset, dai_config()).is_ok());

        let empty = ReserveConfiguration {
            decimals: 0,
            ltv: 0,
            liquidation_threshold: 0,
            liquidation_bonus: 0,
            reserve_factor: 0,
            usage_as_collateral_enabled: false,
            borrowing_enabled: false,
            stable_borrow_rate_enabled: false,
            is_active: false,
            is_frozen: false,
        };
        assert_eq!(
            require_configured(asset, empty),
            Err(ChainError::UnknownReserve(asset))
        );
    }

    #[test]
    fn test_user_reserve_debt() {
        let data = UserReserveData {
            current_a_token_balance: U256::from(5u64),
            current_stable_debt: U256::from(1u64),
            current_variable_debt: U256::from(2u64),
        };
        assert_eq!(data.debt(InterestRateMode::Stable), U256::from(1u64));
        assert_eq!(data.debt(InterestRateMode::Variable), U256::from(2u64));
        assert!(!data.is_empty());
        assert!(UserReserveData::default().is_empty());
    }
}
