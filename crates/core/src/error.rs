//! Engine failure codes.

use alloy::primitives::{Address, U256};
use leverage_chain::ChainError;
use thiserror::Error;

/// Every way a manager operation can fail.
///
/// Each variant has a stable short code (`E1`..`E19`) returned by
/// [`ManagerError::code`]; the fields carry context for logs only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("E1: manager is already initialized")]
    AlreadyInitialized,

    #[error("E2: credit delegation on {debt_token} insufficient: need {required}, have {available}")]
    DelegationInsufficient {
        debt_token: Address,
        required: U256,
        available: U256,
    },

    #[error("E3: {0} cannot be used as collateral")]
    NotCollateralEligible(Address),

    #[error("E4: {0} cannot be borrowed")]
    NotBorrowable(Address),

    #[error("E5: {assets} assets but {amounts} amounts")]
    LengthMismatch { assets: usize, amounts: usize },

    #[error("E6: no reserve configured for {0}")]
    UnknownReserve(Address),

    #[error("E7: oracle cannot price {0}")]
    OracleUnavailable(Address),

    #[error("E8: swap output {actual} below minimum {min_amount_out}")]
    SlippageExceeded { min_amount_out: U256, actual: U256 },

    #[error("E9: fee payment {provided} below required {required}")]
    FeeInsufficient { required: U256, provided: U256 },

    #[error("E10: manager still holds {amount} of {token}")]
    ResidualBalance { token: Address, amount: U256 },

    #[error("E11: manager is not initialized")]
    NotInitialized,

    #[error("E12: transfer of {a_token} not approved: need {required}, have {available}")]
    CollateralTransferNotApproved {
        a_token: Address,
        required: U256,
        available: U256,
    },

    #[error("E13: slippage of {0} bps out of range")]
    InvalidSlippage(u16),

    #[error("E14: amount must be non-zero")]
    ZeroAmount,

    #[error("E15: target and pair token are both {0}")]
    SameToken(Address),

    #[error("E16: unknown interest rate mode {0}")]
    InvalidRateMode(u8),

    #[error("E17: stable rate borrowing disabled on {0}")]
    StableRateDisabled(Address),

    #[error("E18: plan computed with fee bundled = {planned_bundled}, execution disagrees")]
    FeeModeMismatch { planned_bundled: bool },

    #[error("E19: {0}")]
    Protocol(ChainError),
}

impl ManagerError {
    /// Stable short code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyInitialized => "E1",
            Self::DelegationInsufficient { .. } => "E2",
            Self::NotCollateralEligible(_) => "E3",
            Self::NotBorrowable(_) => "E4",
            Self::LengthMismatch { .. } => "E5",
            Self::UnknownReserve(_) => "E6",
            Self::OracleUnavailable(_) => "E7",
            Self::SlippageExceeded { .. } => "E8",
            Self::FeeInsufficient { .. } => "E9",
            Self::ResidualBalance { .. } => "E10",
            Self::NotInitialized => "E11",
            Self::CollateralTransferNotApproved { .. } => "E12",
            Self::InvalidSlippage(_) => "E13",
            Self::ZeroAmount => "E14",
            Self::SameToken(_) => "E15",
            Self::InvalidRateMode(_) => "E16",
            Self::StableRateDisabled(_) => "E17",
            Self::FeeModeMismatch { .. } => "E18",
            Self::Protocol(_) => "E19",
        }
    }
}

impl From<ChainError> for ManagerError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::UnknownReserve(asset) => Self::UnknownReserve(asset),
            ChainError::PriceUnavailable(asset) => Self::OracleUnavailable(asset),
            ChainError::SlippageExceeded {
                min_amount_out,
                actual,
            } => Self::SlippageExceeded {
                min_amount_out,
                actual,
            },
            other => Self::Protocol(other),
        }
    }
}

/// Result alias for manager operations.
pub type Result<T> = std::result::Result<T, ManagerError>;
