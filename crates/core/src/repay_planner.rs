//! Repay planning: flash-borrow the debt token, repay, then withdraw the
//! collateral legs and swap them back to cover the advance and its premium.

use crate::config::ManagerConfig;
use crate::error::{ManagerError, Result};
use crate::registry::TokenRegistry;
use crate::swap_planner::project_health_factor;
use crate::types::TokenInfo;
use crate::valuation::Valuation;
use alloy::primitives::{Address, U256};
use futures::future::try_join_all;
use leverage_chain::u256_math::{apply_basis_points, percent_mul, principal_covered, wad_to_f64};
use leverage_chain::InterestRateMode;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

/// Inputs of a deleveraging repay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepayRequest {
    /// Debt token being repaid
    pub target_token: TokenInfo,
    /// Debt to repay (raw, with decimals)
    pub repay_amount: U256,
    /// Collateral assets to withdraw, parallel to `amounts`
    pub assets: SmallVec<[TokenInfo; 4]>,
    pub amounts: SmallVec<[U256; 4]>,
    pub rate_mode: InterestRateMode,
    pub slippage_bps: u16,
    pub fee_bundled: bool,
}

impl RepayRequest {
    /// No collateral legs yet, variable rate, zero slippage, fee bundled.
    pub fn new(target_token: TokenInfo, repay_amount: U256) -> Self {
        Self {
            target_token,
            repay_amount,
            assets: SmallVec::new(),
            amounts: SmallVec::new(),
            rate_mode: InterestRateMode::Variable,
            slippage_bps: 0,
            fee_bundled: true,
        }
    }

    /// Add one collateral leg.
    pub fn with_collateral(mut self, asset: TokenInfo, amount: U256) -> Self {
        self.assets.push(asset);
        self.amounts.push(amount);
        self
    }

    /// Set the parallel asset and amount lists as given.
    pub fn with_legs(
        mut self,
        assets: impl IntoIterator<Item = TokenInfo>,
        amounts: impl IntoIterator<Item = U256>,
    ) -> Self {
        self.assets = assets.into_iter().collect();
        self.amounts = amounts.into_iter().collect();
        self
    }

    pub fn with_rate_mode(mut self, rate_mode: InterestRateMode) -> Self {
        self.rate_mode = rate_mode;
        self
    }

    pub fn with_slippage_bps(mut self, slippage_bps: u16) -> Self {
        self.slippage_bps = slippage_bps;
        self
    }

    pub fn with_separate_fee(mut self) -> Self {
        self.fee_bundled = false;
        self
    }
}

/// One collateral withdrawal and its conversion to the debt token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepayLeg {
    pub asset: TokenInfo,
    /// Interest-bearing token pulled from the account
    pub a_token: Address,
    pub amount: U256,
    pub value: U256,
    /// False when the leg already is the debt token
    pub swap_required: bool,
    pub expected_target_amount: U256,
    /// Router output bound (equals `amount` when no swap is needed)
    pub min_target_amount: U256,
}

/// Computed repay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepayPlan {
    /// Request with token infos refreshed from the registry
    pub request: RepayRequest,
    pub legs: SmallVec<[RepayLeg; 4]>,
    pub withdraw_value: U256,
    pub fee_value: U256,
    pub fee_native_amount: U256,
    pub fee_target_amount: U256,
    pub expected_target_amount: U256,
    pub min_target_amount: U256,
    /// Expected target token left after the bundled fee
    pub available_target_amount: U256,
    pub current_debt: U256,
    /// Debt repaid up front with the flash-loan advance
    pub repaid_amount: U256,
    /// Pool premium on the advance, paid out of the legs' proceeds
    pub flash_premium_amount: U256,
    /// Target token refunded to the account
    pub leftover_amount: U256,
    /// Requested repayment the legs cannot cover
    pub shortfall_amount: U256,
    pub health_factor_before: U256,
    pub expected_health_factor: U256,
}

impl RepayPlan {
    pub fn fee_bundled(&self) -> bool {
        self.request.fee_bundled
    }

    /// Whether the legs cover the whole requested repayment.
    pub fn is_full_repayment(&self) -> bool {
        self.shortfall_amount.is_zero()
    }
}

/// Validates repay requests and computes their plans.
#[derive(Debug, Clone)]
pub struct RepayPlanner {
    registry: TokenRegistry,
    valuation: Valuation,
    native_token: Address,
    fee_bps: u16,
    max_slippage_bps: u16,
}

impl RepayPlanner {
    pub fn new(
        registry: TokenRegistry,
        valuation: Valuation,
        native_token: Address,
        config: &ManagerConfig,
    ) -> Self {
        Self {
            registry,
            valuation,
            native_token,
            fee_bps: config.fees.fee_bps,
            max_slippage_bps: config.limits.max_slippage_bps,
        }
    }

    async fn plan_leg(
        &self,
        target: &TokenInfo,
        asset: Address,
        amount: U256,
        slippage_bps: u16,
    ) -> Result<RepayLeg> {
        let (info, tokens) = futures::try_join!(
            self.registry.get_token_info(asset),
            self.registry.reserve_tokens(asset),
        )?;
        if !info.can_be_collateral {
            return Err(ManagerError::NotCollateralEligible(asset));
        }

        let value = self.valuation.to_reference_value(&info, amount).await?;
        let swap_required = asset != target.address;
        let (expected_target_amount, min_target_amount) = if swap_required {
            let expected = self.valuation.from_reference_value(target, value).await?;
            (expected, apply_basis_points(expected, slippage_bps))
        } else {
            (amount, amount)
        };

        Ok(RepayLeg {
            asset: info,
            a_token: tokens.a_token,
            amount,
            value,
            swap_required,
            expected_target_amount,
            min_target_amount,
        })
    }

    /// Plan withdrawing the request's collateral legs for `account` and
    /// repaying up to `repay_amount` of its target-token debt.
    ///
    /// The repayment is advanced by a flash loan, so the legs must cover it
    /// plus the pool premium. Coverage below the requested amount is reported
    /// as a shortfall, not rejected.
    pub async fn check_and_calculate_repay_vars(
        &self,
        account: Address,
        request: &RepayRequest,
    ) -> Result<RepayPlan> {
        if request.assets.len() != request.amounts.len() {
            return Err(ManagerError::LengthMismatch {
                assets: request.assets.len(),
                amounts: request.amounts.len(),
            });
        }
        if request.assets.is_empty()
            || request.repay_amount.is_zero()
            || request.amounts.iter().any(|amount| amount.is_zero())
        {
            return Err(ManagerError::ZeroAmount);
        }
        if request.slippage_bps > self.max_slippage_bps {
            return Err(ManagerError::InvalidSlippage(request.slippage_bps));
        }

        let (target, native, account_data, weighted_before, premium_bps) = futures::try_join!(
            self.registry.get_token_info(request.target_token.address),
            self.registry.get_token_info(self.native_token),
            self.valuation.user_account_data(account),
            self.valuation.weighted_collateral(account),
            self.valuation.flash_loan_premium_bps(),
        )?;
        if !target.borrowable {
            return Err(ManagerError::NotBorrowable(target.address));
        }
        if !target.supports_rate_mode(request.rate_mode) {
            return Err(ManagerError::StableRateDisabled(target.address));
        }

        let legs: SmallVec<[RepayLeg; 4]> = try_join_all(
            request
                .assets
                .iter()
                .zip(request.amounts.iter())
                .map(|(asset, amount)| {
                    self.plan_leg(&target, asset.address, *amount, request.slippage_bps)
                }),
        )
        .await?
        .into_iter()
        .collect();

        let withdraw_value = legs.iter().fold(U256::ZERO, |acc, leg| acc + leg.value);
        let fee_value = percent_mul(withdraw_value, self.fee_bps);
        let fee_native_amount = self.valuation.from_reference_value(&native, fee_value).await?;
        let fee_target_amount = if request.fee_bundled {
            self.valuation.from_reference_value(&target, fee_value).await?
        } else {
            U256::ZERO
        };

        let expected_target_amount = legs
            .iter()
            .fold(U256::ZERO, |acc, leg| acc + leg.expected_target_amount);
        let min_target_amount = legs
            .iter()
            .fold(U256::ZERO, |acc, leg| acc + leg.min_target_amount);
        let available_target_amount = expected_target_amount.saturating_sub(fee_target_amount);

        let current_debt = self
            .valuation
            .debt_of(target.address, account, request.rate_mode)
            .await?;
        let payable = request.repay_amount.min(current_debt);
        let repaid_amount = payable.min(principal_covered(available_target_amount, premium_bps));
        let flash_premium_amount = percent_mul(repaid_amount, premium_bps);
        let leftover_amount = available_target_amount
            .saturating_sub(repaid_amount)
            .saturating_sub(flash_premium_amount);
        let shortfall_amount = payable - repaid_amount;

        let withdrawn_weighted = legs.iter().fold(U256::ZERO, |acc, leg| {
            acc + leg.value * U256::from(leg.asset.liquidation_threshold)
        });
        let repaid_value = self.valuation.to_reference_value(&target, repaid_amount).await?;
        let expected_health_factor = project_health_factor(
            account_data.total_collateral.saturating_sub(withdraw_value),
            weighted_before.saturating_sub(withdrawn_weighted),
            account_data.total_debt.saturating_sub(repaid_value),
        );

        let plan = RepayPlan {
            request: RepayRequest {
                target_token: target,
                assets: legs.iter().map(|leg| leg.asset).collect(),
                ..request.clone()
            },
            legs,
            withdraw_value,
            fee_value,
            fee_native_amount,
            fee_target_amount,
            expected_target_amount,
            min_target_amount,
            available_target_amount,
            current_debt,
            repaid_amount,
            flash_premium_amount,
            leftover_amount,
            shortfall_amount,
            health_factor_before: account_data.health_factor,
            expected_health_factor,
        };

        debug!(
            account = %account,
            target_token = %target.address,
            legs = plan.legs.len(),
            withdraw_value = %withdraw_value,
            fee_value = %fee_value,
            repaid = %repaid_amount,
            flash_premium = %flash_premium_amount,
            leftover = %leftover_amount,
            shortfall = %shortfall_amount,
            hf_before = wad_to_f64(account_data.health_factor),
            hf_expected = wad_to_f64(expected_health_factor),
            "Repay planned"
        );
        Ok(plan)
    }
}
