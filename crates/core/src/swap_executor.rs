//! Swap execution: a flash loan advances the target token, the callback pays
//! the bundled fee, swaps and deposits the pair token, and the pool turns the
//! advance into the account's debt once the new collateral is in place.

use crate::context::ManagerContext;
use crate::error::{ManagerError, Result};
use crate::execution::{assert_no_residuals, check_fee_payment, forward_native_fee, run_atomically};
use crate::registry::TokenRegistry;
use crate::scratch::{OperationPhase, ScratchRecord};
use crate::swap_planner::{SwapPlan, SwapPlanner};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use leverage_chain::u256_math::wad_to_f64;
use leverage_chain::{ChainResult, FlashLoanMode, FlashLoanReceiver, SwapParams};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Result of a completed swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOutcome {
    pub borrowed: U256,
    /// Pair token deposited on the account's behalf
    pub pair_received: U256,
    pub fee_paid_value: U256,
    /// Fee amount in `fee_token` units
    pub fee_paid_amount: U256,
    /// Target token when bundled, native token when paid separately
    pub fee_token: Address,
    pub health_factor_after: U256,
}

/// Executes swap plans atomically.
#[derive(Debug, Clone)]
pub struct SwapExecutor {
    context: Arc<ManagerContext>,
    planner: SwapPlanner,
    registry: TokenRegistry,
}

impl SwapExecutor {
    pub fn new(context: Arc<ManagerContext>, planner: SwapPlanner, registry: TokenRegistry) -> Self {
        Self {
            context,
            planner,
            registry,
        }
    }

    /// Execute `plan` for `account`.
    ///
    /// The fee is bundled iff `fee_payment` is `None`. The plan is recomputed
    /// against current state first; the router bound is the stricter of the
    /// planned and the fresh minimum. The pool's loan-to-value check runs when
    /// the advance becomes debt, after the pair token has been deposited.
    #[instrument(
        skip(self, plan, scratch),
        fields(
            account = %account,
            target_token = %plan.request.target_token.address,
            pair_token = %plan.request.pair_token.address,
        )
    )]
    pub async fn swap_preapproved_assets(
        &self,
        account: Address,
        plan: &SwapPlan,
        fee_payment: Option<U256>,
        scratch: &ScratchRecord,
    ) -> Result<SwapOutcome> {
        if plan.fee_bundled() != fee_payment.is_none() {
            return Err(ManagerError::FeeModeMismatch {
                planned_bundled: plan.fee_bundled(),
            });
        }

        let mut guard = scratch.begin();
        let fresh = self
            .planner
            .check_and_calculate_swap_vars(account, &plan.request)
            .await?;
        let min_pair_out = plan.min_pair_token_amount.max(fresh.min_pair_token_amount);
        guard.record_swap(&fresh);

        let ctx = &self.context;
        let manager = ctx.settings.manager;
        let request = &fresh.request;
        let debt_token = self
            .registry
            .reserve_tokens(request.target_token.address)
            .await?
            .debt_token(request.rate_mode);
        let delegated = ctx
            .delegation
            .borrow_allowance(debt_token, account, manager)
            .await?;
        if delegated < request.loan_amount {
            return Err(ManagerError::DelegationInsufficient {
                debt_token,
                required: request.loan_amount,
                available: delegated,
            });
        }
        if let Some(payment) = fee_payment {
            check_fee_payment(payment, ctx.config.fees.fee_skew, fresh.fee_native_amount)?;
        }

        guard.set_phase(OperationPhase::Executing);
        let outcome = run_atomically(
            ctx.host.as_ref(),
            "swap",
            self.execute(account, &fresh, min_pair_out, fee_payment),
        )
        .await?;

        info!(
            account = %account,
            borrowed = %outcome.borrowed,
            pair_received = %outcome.pair_received,
            fee_value = %outcome.fee_paid_value,
            hf_expected = wad_to_f64(fresh.expected_health_factor),
            hf_after = wad_to_f64(outcome.health_factor_after),
            "Leveraged swap executed"
        );
        Ok(outcome)
    }

    async fn execute(
        &self,
        account: Address,
        plan: &SwapPlan,
        min_pair_out: U256,
        fee_payment: Option<U256>,
    ) -> Result<SwapOutcome> {
        let ctx = self.context.as_ref();
        let manager = ctx.settings.manager;
        let request = &plan.request;
        let target = request.target_token.address;
        let pair = request.pair_token.address;

        let receiver = LeverageCallback {
            context: ctx,
            account,
            plan,
            min_pair_out,
            pair_received: Mutex::new(U256::ZERO),
        };
        ctx.pool
            .flash_loan(
                &receiver,
                target,
                request.loan_amount,
                FlashLoanMode::OpenDebt(request.rate_mode),
                account,
            )
            .await?;
        let pair_received = receiver.pair_received.into_inner();

        let (fee_paid_amount, fee_token) = match fee_payment {
            Some(payment) => {
                let native = ctx.settings.native_token;
                forward_native_fee(ctx.tokens.as_ref(), native, account, ctx.settings.fee_recipient, payment)
                    .await?;
                (payment, native)
            }
            None => (plan.fee_target_amount, target),
        };

        assert_no_residuals(ctx.tokens.as_ref(), manager, &[target, pair]).await?;
        let account_after = ctx.reserves.user_account_data(account).await?;

        Ok(SwapOutcome {
            borrowed: request.loan_amount,
            pair_received,
            fee_paid_value: plan.fee_value,
            fee_paid_amount,
            fee_token,
            health_factor_after: account_after.health_factor,
        })
    }
}

/// Runs while the manager holds the advanced loan.
struct LeverageCallback<'a> {
    context: &'a ManagerContext,
    account: Address,
    plan: &'a SwapPlan,
    min_pair_out: U256,
    pair_received: Mutex<U256>,
}

#[async_trait]
impl<'a> FlashLoanReceiver for LeverageCallback<'a> {
    fn address(&self) -> Address {
        self.context.settings.manager
    }

    async fn execute_operation(&self, asset: Address, amount: U256, _premium: U256) -> ChainResult<()> {
        let ctx = self.context;
        let manager = ctx.settings.manager;
        let plan = self.plan;
        let pair = plan.request.pair_token.address;

        if !plan.fee_target_amount.is_zero() {
            ctx.tokens
                .transfer(asset, manager, ctx.settings.fee_recipient, plan.fee_target_amount)
                .await?;
        }

        ctx.tokens
            .approve(asset, manager, ctx.router.address(), plan.swap_amount)
            .await?;
        let params =
            SwapParams::new(asset, pair, plan.swap_amount).with_min_amount_out(self.min_pair_out);
        let received = ctx.router.swap_exact_input(manager, params).await?;
        debug!(
            router = ctx.router.router_id(),
            advanced = %amount,
            swapped = %plan.swap_amount,
            received = %received,
            min = %self.min_pair_out,
            "Loan swapped"
        );

        ctx.tokens
            .approve(pair, manager, ctx.pool.address(), received)
            .await?;
        ctx.pool.deposit(manager, pair, received, self.account).await?;
        *self.pair_received.lock() = received;
        Ok(())
    }
}
