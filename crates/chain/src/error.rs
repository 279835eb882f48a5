//! Errors raised by lending-protocol collaborators.

use alloy::primitives::{Address, U256};
use thiserror::Error;

/// Failure reported by a collaborator (pool, oracle, router, token ledger).
///
/// Variants that the engine surfaces with a dedicated code are kept distinct;
/// every other refusal is a [`ChainError::Rejected`] carrying the reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("no reserve configured for {0}")]
    UnknownReserve(Address),

    #[error("oracle cannot price {0}")]
    PriceUnavailable(Address),

    #[error("swap output {actual} below minimum {min_amount_out}")]
    SlippageExceeded { min_amount_out: U256, actual: U256 },

    #[error("insufficient balance of {token} held by {owner}: need {required}, have {available}")]
    InsufficientBalance {
        token: Address,
        owner: Address,
        required: U256,
        available: U256,
    },

    #[error("insufficient allowance of {token} from {owner} to {spender}: need {required}, have {available}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        required: U256,
        available: U256,
    },

    #[error("borrow allowance exceeded on {debt_token}: need {required}, have {available}")]
    BorrowAllowanceExceeded {
        debt_token: Address,
        required: U256,
        available: U256,
    },

    #[error("{amount} overflows reference-value arithmetic")]
    ValueOverflow { amount: U256 },

    #[error("checkpoint {0} is not open")]
    UnknownCheckpoint(u64),

    #[error("protocol rejected the call: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ChainError {
    /// Shorthand for a protocol-level refusal.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

/// Result alias for collaborator calls.
pub type ChainResult<T> = std::result::Result<T, ChainError>;
