//! Observable record of the in-flight operation.
//!
//! The executors publish what they are doing here so [`crate::LeveragedSwapManager::vars`]
//! can report it. A [`ScratchGuard`] owns the record for the duration of one
//! execution and zeroes it when dropped, on success, error or cancellation.

use crate::repay_planner::RepayPlan;
use crate::swap_planner::SwapPlan;
use alloy::primitives::U256;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperationPhase {
    #[default]
    Idle,
    /// Re-planning against fresh market state
    Planning,
    /// Plan accepted, preconditions being checked
    Validated,
    /// Collaborator calls in progress
    Executing,
}

impl fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Planning => write!(f, "planning"),
            Self::Validated => write!(f, "validated"),
            Self::Executing => write!(f, "executing"),
        }
    }
}

/// Snapshot returned by `vars()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationVars {
    pub phase: OperationPhase,
    /// Swap: amount borrowed. Repay: debt planned to be repaid.
    pub target_token_amount: U256,
    /// Swap: pair token expected from the router. Repay: target token expected
    /// from withdrawing and swapping the collateral legs.
    pub pair_token_amount: U256,
    pub fee_value: U256,
    pub expected_health_factor: U256,
}

impl OperationVars {
    /// Idle with every amount zero.
    pub fn is_clear(&self) -> bool {
        *self == Self::default()
    }
}

/// Process-wide scratch record.
#[derive(Debug, Default)]
pub struct ScratchRecord {
    vars: RwLock<OperationVars>,
}

impl ScratchRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> OperationVars {
        *self.vars.read()
    }

    /// Take the record for one execution; it is cleared when the guard drops.
    pub fn begin(&self) -> ScratchGuard<'_> {
        self.vars.write().phase = OperationPhase::Planning;
        ScratchGuard { record: self }
    }
}

/// Exclusive writer of the scratch record for one execution.
#[derive(Debug)]
pub struct ScratchGuard<'a> {
    record: &'a ScratchRecord,
}

impl ScratchGuard<'_> {
    pub fn set_phase(&mut self, phase: OperationPhase) {
        self.record.vars.write().phase = phase;
    }

    pub fn record_swap(&mut self, plan: &SwapPlan) {
        *self.record.vars.write() = OperationVars {
            phase: OperationPhase::Validated,
            target_token_amount: plan.request.loan_amount,
            pair_token_amount: plan.pair_token_amount,
            fee_value: plan.fee_value,
            expected_health_factor: plan.expected_health_factor,
        };
    }

    pub fn record_repay(&mut self, plan: &RepayPlan) {
        *self.record.vars.write() = OperationVars {
            phase: OperationPhase::Validated,
            target_token_amount: plan.repaid_amount,
            pair_token_amount: plan.expected_target_amount,
            fee_value: plan.fee_value,
            expected_health_factor: plan.expected_health_factor,
        };
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        *self.record.vars.write() = OperationVars::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_clears_on_drop() {
        let record = ScratchRecord::new();
        {
            let mut guard = record.begin();
            assert_eq!(record.snapshot().phase, OperationPhase::Planning);
            guard.set_phase(OperationPhase::Executing);
            assert_eq!(record.snapshot().phase, OperationPhase::Executing);
        }
        assert!(record.snapshot().is_clear());
    }

    #[test]
    fn test_guard_clears_on_early_return() {
        fn failing(record: &ScratchRecord) -> Result<(), &'static str> {
            let mut guard = record.begin();
            guard.set_phase(OperationPhase::Executing);
            Err("boom")
        }

        let record = ScratchRecord::new();
        assert!(failing(&record).is_err());
        assert!(record.snapshot().is_clear());
    }
}
