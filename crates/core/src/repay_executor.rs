//! Repay execution: a flash loan advances the debt token and the debt is
//! repaid first; the callback then pulls and withdraws the collateral legs,
//! swaps them back and returns the advance plus the pool premium. What is left
//! is refunded to the account.

use crate::context::ManagerContext;
use crate::error::{ManagerError, Result};
use crate::execution::{assert_no_residuals, check_fee_payment, forward_native_fee, run_atomically};
use crate::repay_planner::{RepayPlan, RepayPlanner};
use crate::scratch::{OperationPhase, ScratchRecord};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use leverage_chain::u256_math::wad_to_f64;
use leverage_chain::{ChainError, ChainResult, FlashLoanMode, FlashLoanReceiver, SwapParams};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Result of a completed repay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepayOutcome {
    pub withdrawn_value: U256,
    /// Target token obtained from all legs before the fee
    pub target_received: U256,
    pub repaid: U256,
    /// Pool premium on the flash-loan advance
    pub flash_premium: U256,
    /// Target token returned to the account
    pub refunded: U256,
    pub fee_paid_value: U256,
    pub fee_paid_amount: U256,
    pub fee_token: Address,
    pub health_factor_after: U256,
}

/// Executes repay plans atomically.
#[derive(Debug, Clone)]
pub struct RepayExecutor {
    context: Arc<ManagerContext>,
    planner: RepayPlanner,
}

impl RepayExecutor {
    pub fn new(context: Arc<ManagerContext>, planner: RepayPlanner) -> Self {
        Self { context, planner }
    }

    /// Every aToken the plan pulls must be approved to the manager for the
    /// total pulled across legs. Checked before anything moves.
    async fn check_collateral_allowances(&self, account: Address, plan: &RepayPlan) -> Result<()> {
        let mut pulls: SmallVec<[(Address, U256); 4]> = SmallVec::new();
        for leg in &plan.legs {
            match pulls.iter_mut().find(|(a_token, _)| *a_token == leg.a_token) {
                Some((_, total)) => *total += leg.amount,
                None => pulls.push((leg.a_token, leg.amount)),
            }
        }

        let manager = self.context.settings.manager;
        for (a_token, required) in pulls {
            let available = self
                .context
                .tokens
                .allowance(a_token, account, manager)
                .await?;
            if available < required {
                return Err(ManagerError::CollateralTransferNotApproved {
                    a_token,
                    required,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Execute `plan` for `account`.
    ///
    /// The fee is bundled iff `fee_payment` is `None`. Each leg's router bound
    /// is the stricter of the planned and the fresh minimum. The debt is
    /// repaid before any collateral leaves the account, so the aToken pulls
    /// see the improved health factor.
    #[instrument(
        skip(self, plan, scratch),
        fields(
            account = %account,
            target_token = %plan.request.target_token.address,
            legs = plan.legs.len(),
        )
    )]
    pub async fn repay_debt(
        &self,
        account: Address,
        plan: &RepayPlan,
        fee_payment: Option<U256>,
        scratch: &ScratchRecord,
    ) -> Result<RepayOutcome> {
        if plan.fee_bundled() != fee_payment.is_none() {
            return Err(ManagerError::FeeModeMismatch {
                planned_bundled: plan.fee_bundled(),
            });
        }

        let mut guard = scratch.begin();
        let fresh = self
            .planner
            .check_and_calculate_repay_vars(account, &plan.request)
            .await?;
        let bounds: SmallVec<[U256; 4]> = fresh
            .legs
            .iter()
            .zip(plan.legs.iter())
            .map(|(now, planned)| now.min_target_amount.max(planned.min_target_amount))
            .collect();
        guard.record_repay(&fresh);

        self.check_collateral_allowances(account, &fresh).await?;
        if let Some(payment) = fee_payment {
            check_fee_payment(payment, self.context.config.fees.fee_skew, fresh.fee_native_amount)?;
        }

        guard.set_phase(OperationPhase::Executing);
        let outcome = run_atomically(
            self.context.host.as_ref(),
            "repay",
            self.execute(account, &fresh, &bounds, fee_payment),
        )
        .await?;

        info!(
            account = %account,
            withdrawn_value = %outcome.withdrawn_value,
            repaid = %outcome.repaid,
            flash_premium = %outcome.flash_premium,
            refunded = %outcome.refunded,
            fee_value = %outcome.fee_paid_value,
            hf_expected = wad_to_f64(fresh.expected_health_factor),
            hf_after = wad_to_f64(outcome.health_factor_after),
            "Debt repaid"
        );
        Ok(outcome)
    }

    async fn execute(
        &self,
        account: Address,
        plan: &RepayPlan,
        bounds: &[U256],
        fee_payment: Option<U256>,
    ) -> Result<RepayOutcome> {
        let ctx = self.context.as_ref();
        let manager = ctx.settings.manager;
        let request = &plan.request;
        let target = request.target_token.address;

        let (target_received, repaid, flash_premium) = if plan.repaid_amount.is_zero() {
            // Nothing to repay: the legs' proceeds all go back to the account
            let received = collect_legs(ctx, account, plan, bounds).await?;
            (received, U256::ZERO, U256::ZERO)
        } else {
            let receiver = UnwindCallback {
                context: ctx,
                account,
                plan,
                bounds,
                settled: Mutex::new((U256::ZERO, U256::ZERO)),
            };
            let premium = ctx
                .pool
                .flash_loan(&receiver, target, plan.repaid_amount, FlashLoanMode::Repay, account)
                .await?;
            let (received, repaid) = receiver.settled.into_inner();
            (received, repaid, premium)
        };

        let refunded = ctx.tokens.balance_of(target, manager).await?;
        if !refunded.is_zero() {
            ctx.tokens.transfer(target, manager, account, refunded).await?;
        }

        let (fee_paid_amount, fee_token) = match fee_payment {
            Some(payment) => {
                let native = ctx.settings.native_token;
                forward_native_fee(ctx.tokens.as_ref(), native, account, ctx.settings.fee_recipient, payment)
                    .await?;
                (payment, native)
            }
            None => (plan.fee_target_amount, target),
        };

        let mut watched: SmallVec<[Address; 9]> = SmallVec::new();
        watched.push(target);
        for leg in &plan.legs {
            watched.push(leg.asset.address);
            watched.push(leg.a_token);
        }
        assert_no_residuals(ctx.tokens.as_ref(), manager, &watched).await?;
        let account_after = ctx.reserves.user_account_data(account).await?;

        Ok(RepayOutcome {
            withdrawn_value: plan.withdraw_value,
            target_received,
            repaid,
            flash_premium,
            refunded,
            fee_paid_value: plan.fee_value,
            fee_paid_amount,
            fee_token,
            health_factor_after: account_after.health_factor,
        })
    }
}

/// Pull and withdraw every leg, swap the non-target ones and pay the bundled
/// fee; returns the target token obtained before the fee.
async fn collect_legs(
    ctx: &ManagerContext,
    account: Address,
    plan: &RepayPlan,
    bounds: &[U256],
) -> ChainResult<U256> {
    let manager = ctx.settings.manager;
    let target = plan.request.target_token.address;

    for leg in &plan.legs {
        ctx.tokens
            .transfer_from(leg.a_token, manager, account, manager, leg.amount)
            .await?;
        ctx.pool
            .withdraw(manager, leg.asset.address, leg.amount, manager)
            .await?;
    }

    let mut target_received = U256::ZERO;
    for (leg, bound) in plan.legs.iter().zip(bounds) {
        if !leg.swap_required {
            target_received += leg.amount;
            continue;
        }
        ctx.tokens
            .approve(leg.asset.address, manager, ctx.router.address(), leg.amount)
            .await?;
        let params = SwapParams::new(leg.asset.address, target, leg.amount)
            .with_min_amount_out(*bound);
        let received = ctx.router.swap_exact_input(manager, params).await?;
        debug!(
            asset = %leg.asset.address,
            swapped = %leg.amount,
            received = %received,
            min = %bound,
            "Collateral leg swapped"
        );
        target_received += received;
    }

    if !plan.fee_target_amount.is_zero() {
        ctx.tokens
            .transfer(target, manager, ctx.settings.fee_recipient, plan.fee_target_amount)
            .await?;
    }
    Ok(target_received)
}

/// Runs while the manager holds the advanced debt token.
struct UnwindCallback<'a> {
    context: &'a ManagerContext,
    account: Address,
    plan: &'a RepayPlan,
    bounds: &'a [U256],
    /// (target received from the legs, debt repaid)
    settled: Mutex<(U256, U256)>,
}

#[async_trait]
impl<'a> FlashLoanReceiver for UnwindCallback<'a> {
    fn address(&self) -> Address {
        self.context.settings.manager
    }

    async fn execute_operation(&self, asset: Address, amount: U256, premium: U256) -> ChainResult<()> {
        let ctx = self.context;
        let manager = ctx.settings.manager;
        let pool = ctx.pool.address();
        let rate_mode = self.plan.request.rate_mode;

        ctx.tokens.approve(asset, manager, pool, amount).await?;
        let repaid = ctx
            .pool
            .repay(manager, asset, amount, rate_mode, self.account)
            .await?;
        if repaid < amount {
            ctx.tokens.approve(asset, manager, pool, U256::ZERO).await?;
        }
        debug!(advanced = %amount, repaid = %repaid, "Debt repaid with advance");

        let received = collect_legs(ctx, self.account, self.plan, self.bounds).await?;

        let owed = amount + premium;
        let balance = ctx.tokens.balance_of(asset, manager).await?;
        if balance < owed {
            return Err(ChainError::SlippageExceeded {
                min_amount_out: owed,
                actual: balance,
            });
        }
        ctx.tokens.approve(asset, manager, pool, owed).await?;
        *self.settled.lock() = (received, repaid);
        Ok(())
    }
}
