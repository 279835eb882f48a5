//! Swap planning: eligibility checks, fee and slippage arithmetic, and the
//! projected health factor of a leveraged swap.

use crate::config::ManagerConfig;
use crate::error::{ManagerError, Result};
use crate::registry::TokenRegistry;
use crate::types::TokenInfo;
use crate::valuation::Valuation;
use alloy::primitives::{Address, U256};
use leverage_chain::u256_math::{apply_basis_points, health_factor, percent_mul, weighted_threshold, wad_to_f64};
use leverage_chain::InterestRateMode;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Inputs of a leveraged swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    /// Token borrowed on the account's credit
    pub target_token: TokenInfo,
    /// Token bought with the loan and deposited as collateral
    pub pair_token: TokenInfo,
    /// Amount of target token borrowed (raw, with decimals)
    pub loan_amount: U256,
    pub rate_mode: InterestRateMode,
    /// Slippage tolerance on the router output (basis points)
    pub slippage_bps: u16,
    /// Fee taken out of the loan (true) or paid separately in native token
    pub fee_bundled: bool,
}

impl SwapRequest {
    /// Variable rate, zero slippage tolerance, fee bundled.
    pub fn new(target_token: TokenInfo, pair_token: TokenInfo, loan_amount: U256) -> Self {
        Self {
            target_token,
            pair_token,
            loan_amount,
            rate_mode: InterestRateMode::Variable,
            slippage_bps: 0,
            fee_bundled: true,
        }
    }

    pub fn with_rate_mode(mut self, rate_mode: InterestRateMode) -> Self {
        self.rate_mode = rate_mode;
        self
    }

    pub fn with_slippage_bps(mut self, slippage_bps: u16) -> Self {
        self.slippage_bps = slippage_bps;
        self
    }

    /// Pay the fee as a separate native-token payment at execution.
    pub fn with_separate_fee(mut self) -> Self {
        self.fee_bundled = false;
        self
    }
}

/// Computed swap; every amount rounds down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapPlan {
    /// Request with token infos refreshed from the registry
    pub request: SwapRequest,
    pub loan_value: U256,
    /// Protocol fee in the reference currency
    pub fee_value: U256,
    /// Fee expressed in native token units (what a separate payment covers)
    pub fee_native_amount: U256,
    /// Fee deducted from the loan when bundled, else zero
    pub fee_target_amount: U256,
    /// Target token handed to the router
    pub swap_amount: U256,
    /// Pair token expected at oracle prices
    pub pair_token_amount: U256,
    /// Router output bound
    pub min_pair_token_amount: U256,
    pub health_factor_before: U256,
    pub expected_health_factor: U256,
}

impl SwapPlan {
    pub fn fee_bundled(&self) -> bool {
        self.request.fee_bundled
    }
}

/// Health factor after moving collateral and debt by the given amounts.
///
/// `weighted_collateral` is Σ(value_i * threshold_i) over the collateral
/// remaining after the operation.
pub(crate) fn project_health_factor(
    collateral: U256,
    weighted_collateral: U256,
    debt: U256,
) -> U256 {
    let threshold = weighted_threshold(weighted_collateral, collateral);
    health_factor(collateral, debt, threshold)
}

/// Validates swap requests and computes their plans.
#[derive(Debug, Clone)]
pub struct SwapPlanner {
    registry: TokenRegistry,
    valuation: Valuation,
    native_token: Address,
    fee_bps: u16,
    max_slippage_bps: u16,
}

impl SwapPlanner {
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

    /// Plan a borrow of `loan_amount` target token for `account`, swapped to
    /// pair token and deposited back as collateral.
    ///
    /// Token infos in the request are refreshed; caller-supplied flags are
    /// never trusted. Credit delegation is checked at execution, not here.
    pub async fn check_and_calculate_swap_vars(
        &self,
        account: Address,
        request: &SwapRequest,
    ) -> Result<SwapPlan> {
        if request.slippage_bps > self.max_slippage_bps {
            return Err(ManagerError::InvalidSlippage(request.slippage_bps));
        }
        if request.loan_amount.is_zero() {
            return Err(ManagerError::ZeroAmount);
        }
        if request.target_token.address == request.pair_token.address {
            return Err(ManagerError::SameToken(request.target_token.address));
        }

        let (target, pair, native, account_data, weighted_before) = futures::try_join!(
            self.registry.get_token_info(request.target_token.address),
            self.registry.get_token_info(request.pair_token.address),
            self.registry.get_token_info(self.native_token),
            self.valuation.user_account_data(account),
            self.valuation.weighted_collateral(account),
        )?;

        if !target.borrowable {
            return Err(ManagerError::NotBorrowable(target.address));
        }
        if !pair.can_be_collateral {
            return Err(ManagerError::NotCollateralEligible(pair.address));
        }
        if !target.supports_rate_mode(request.rate_mode) {
            return Err(ManagerError::StableRateDisabled(target.address));
        }

        let loan_value = self.valuation.to_reference_value(&target, request.loan_amount).await?;
        let fee_value = percent_mul(loan_value, self.fee_bps);
        let fee_native_amount = self.valuation.from_reference_value(&native, fee_value).await?;
        let fee_target_amount = if request.fee_bundled {
            self.valuation.from_reference_value(&target, fee_value).await?
        } else {
            U256::ZERO
        };

        let swap_amount = request.loan_amount.saturating_sub(fee_target_amount);
        let swap_value = self.valuation.to_reference_value(&target, swap_amount).await?;
        let pair_token_amount = self.valuation.from_reference_value(&pair, swap_value).await?;
        let min_pair_token_amount = apply_basis_points(pair_token_amount, request.slippage_bps);

        let added_value = self.valuation.to_reference_value(&pair, pair_token_amount).await?;
        let collateral_after = account_data.total_collateral + added_value;
        let weighted_after = weighted_before + added_value * U256::from(pair.liquidation_threshold);
        let debt_after = account_data.total_debt + loan_value;
        let expected_health_factor =
            project_health_factor(collateral_after, weighted_after, debt_after);

        let plan = SwapPlan {
            request: SwapRequest {
                target_token: target,
                pair_token: pair,
                ..request.clone()
            },
            loan_value,
            fee_value,
            fee_native_amount,
            fee_target_amount,
            swap_amount,
            pair_token_amount,
            min_pair_token_amount,
            health_factor_before: account_data.health_factor,
            expected_health_factor,
        };

        debug!(
            account = %account,
            target_token = %target.address,
            pair_token = %pair.address,
            loan = %request.loan_amount,
            fee_value = %fee_value,
            pair_expected = %pair_token_amount,
            pair_min = %min_pair_token_amount,
            hf_before = wad_to_f64(account_data.health_factor),
            hf_expected = wad_to_f64(expected_health_factor),
            "Swap planned"
        );
        Ok(plan)
    }
}
