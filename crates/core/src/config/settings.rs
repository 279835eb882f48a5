//! Addresses the manager is initialized with.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Identity and payout addresses fixed at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Address the manager acts as (delegatee, spender, temporary holder)
    pub manager: Address,
    /// Wrapped native token used for separate fee payments
    pub native_token: Address,
    /// Receiver of protocol fees
    pub fee_recipient: Address,
}
