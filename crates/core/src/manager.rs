//! Caller-facing facade.
//!
//! [`LeveragedSwapManager`] is created uninitialized and wired to its
//! collaborators exactly once through [`LeveragedSwapManager::initialize`].
//! Planning calls are lock-free reads; the two executions are serialized by an
//! async lock so the shared [`ScratchRecord`] only ever describes one
//! operation.

use crate::context::ManagerContext;
use crate::error::{ManagerError, Result};
use crate::registry::TokenRegistry;
use crate::repay_executor::{RepayExecutor, RepayOutcome};
use crate::repay_planner::{RepayPlan, RepayPlanner, RepayRequest};
use crate::scratch::{OperationVars, ScratchRecord};
use crate::swap_executor::{SwapExecutor, SwapOutcome};
use crate::swap_planner::{SwapPlan, SwapPlanner, SwapRequest};
use crate::types::{AssetPosition, TokenInfo};
use crate::valuation::Valuation;
use alloy::primitives::{Address, U256};
use futures::future::try_join_all;
use leverage_chain::UserAccountData;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::info;

/// Components built at initialization.
#[derive(Debug)]
struct Engine {
    context: Arc<ManagerContext>,
    registry: TokenRegistry,
    valuation: Valuation,
    swap_planner: SwapPlanner,
    repay_planner: RepayPlanner,
    swap_executor: SwapExecutor,
    repay_executor: RepayExecutor,
}

impl Engine {
    fn new(context: ManagerContext) -> Self {
        let context = Arc::new(context);
        let registry = TokenRegistry::new(context.reserves.clone());
        let valuation = Valuation::new(context.oracle.clone(), context.reserves.clone());
        let native = context.settings.native_token;
        let swap_planner =
            SwapPlanner::new(registry.clone(), valuation.clone(), native, &context.config);
        let repay_planner =
            RepayPlanner::new(registry.clone(), valuation.clone(), native, &context.config);

        Self {
            swap_executor: SwapExecutor::new(
                context.clone(),
                swap_planner.clone(),
                registry.clone(),
            ),
            repay_executor: RepayExecutor::new(context.clone(), repay_planner.clone()),
            context,
            registry,
            valuation,
            swap_planner,
            repay_planner,
        }
    }
}

/// Leveraged swap and repay manager.
#[derive(Debug, Default)]
pub struct LeveragedSwapManager {
    engine: OnceLock<Engine>,
    execution_lock: Mutex<()>,
    scratch: ScratchRecord,
}

impl LeveragedSwapManager {
    /// An uninitialized manager; every operation but [`Self::vars`] fails with
    /// `NotInitialized` until [`Self::initialize`] succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire the manager to its collaborators. A second call fails with
    /// `AlreadyInitialized` and leaves the first wiring in place.
    pub fn initialize(&self, context: ManagerContext) -> Result<()> {
        let settings = context.settings;
        self.engine
            .set(Engine::new(context))
            .map_err(|_| ManagerError::AlreadyInitialized)?;
        info!(
            manager = %settings.manager,
            native_token = %settings.native_token,
            fee_recipient = %settings.fee_recipient,
            "Manager initialized"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.get().is_some()
    }

    fn engine(&self) -> Result<&Engine> {
        self.engine.get().ok_or(ManagerError::NotInitialized)
    }

    /// Address the manager acts as.
    pub fn address(&self) -> Result<Address> {
        Ok(self.engine()?.context.settings.manager)
    }

    pub async fn get_token_info(&self, token: Address) -> Result<TokenInfo> {
        self.engine()?.registry.get_token_info(token).await
    }

    pub async fn check_and_calculate_swap_vars(
        &self,
        account: Address,
        request: &SwapRequest,
    ) -> Result<SwapPlan> {
        self.engine()?
            .swap_planner
            .check_and_calculate_swap_vars(account, request)
            .await
    }

    /// Lever up per `plan`: swap an advanced loan, redeposit, then open the
    /// debt on delegated credit. Pass `None` for a bundled fee or
    /// the native-token payment for a separate one.
    pub async fn swap_preapproved_assets(
        &self,
        account: Address,
        plan: &SwapPlan,
        fee_payment: Option<U256>,
    ) -> Result<SwapOutcome> {
        let engine = self.engine()?;
        let _lock = self.execution_lock.lock().await;
        engine
            .swap_executor
            .swap_preapproved_assets(account, plan, fee_payment, &self.scratch)
            .await
    }

    pub async fn check_and_calculate_repay_vars(
        &self,
        account: Address,
        request: &RepayRequest,
    ) -> Result<RepayPlan> {
        self.engine()?
            .repay_planner
            .check_and_calculate_repay_vars(account, request)
            .await
    }

    /// Withdraw, swap back and repay per `plan`.
    pub async fn repay_debt(
        &self,
        account: Address,
        plan: &RepayPlan,
        fee_payment: Option<U256>,
    ) -> Result<RepayOutcome> {
        let engine = self.engine()?;
        let _lock = self.execution_lock.lock().await;
        engine
            .repay_executor
            .repay_debt(account, plan, fee_payment, &self.scratch)
            .await
    }

    /// The in-flight operation; all zero when idle.
    pub fn vars(&self) -> OperationVars {
        self.scratch.snapshot()
    }

    /// Every reserve in which `account` has a supply or a debt.
    pub async fn asset_positions(&self, account: Address) -> Result<Vec<AssetPosition>> {
        let engine = self.engine()?;
        let reserves = engine.registry.all_reserves().await?;
        let positions = try_join_all(reserves.into_iter().map(|asset| async move {
            let (info, data) = futures::try_join!(
                engine.registry.get_token_info(asset),
                async {
                    engine
                        .context
                        .reserves
                        .user_reserve_data(asset, account)
                        .await
                        .map_err(ManagerError::from)
                },
            )?;
            Ok::<_, ManagerError>((!data.is_empty()).then(|| AssetPosition::new(info, &data)))
        }))
        .await?;

        Ok(positions.into_iter().flatten().collect())
    }

    pub async fn account_data(&self, account: Address) -> Result<UserAccountData> {
        self.engine()?.valuation.user_account_data(account).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use leverage_chain::u256_math::WAD;
    use leverage_chain::{InterestRateMode, ReserveDataProvider};

    #[tokio::test]
    async fn test_initialize_once() {
        let fixture = Fixture::new();
        let manager = LeveragedSwapManager::new();
        assert!(!manager.is_initialized());
        manager.initialize(fixture.context()).unwrap();

        let other = Fixture::new();
        assert_eq!(
            manager.initialize(other.context()),
            Err(ManagerError::AlreadyInitialized)
        );
        assert_eq!(manager.address(), Ok(manager_address()));
    }

    #[tokio::test]
    async fn test_operations_require_initialization() {
        let manager = LeveragedSwapManager::new();
        assert_eq!(manager.get_token_info(dai()).await, Err(ManagerError::NotInitialized));
        assert_eq!(manager.asset_positions(user()).await, Err(ManagerError::NotInitialized));
        assert!(manager.vars().is_clear());
    }

    #[tokio::test]
    async fn test_vars_cleared_after_failed_swap() {
        let fixture = Fixture::new();
        fixture.supply(weth(), U256::from(10u64) * WAD).await;
        let manager = fixture.manager();

        let request = SwapRequest::new(fixture.info(dai()), fixture.info(usdc()), U256::from(1000u64) * WAD);
        let plan = manager.check_and_calculate_swap_vars(user(), &request).await.unwrap();

        // No delegation: fails before the borrow
        let err = manager.swap_preapproved_assets(user(), &plan, None).await.unwrap_err();
        assert_eq!(err.code(), "E2");
        assert!(manager.vars().is_clear());

        let debt = fixture.market.user_reserve_data(dai(), user()).await.unwrap();
        assert!(debt.current_variable_debt.is_zero());
        assert_eq!(fixture.market.open_checkpoints(), 0);
    }

    #[tokio::test]
    async fn test_vars_cleared_after_swap() {
        let fixture = Fixture::new();
        fixture.supply(weth(), U256::from(10u64) * WAD).await;
        let manager = fixture.manager();
        let loan = U256::from(1000u64) * WAD;
        fixture
            .market
            .approve_delegation(dai(), InterestRateMode::Variable, user(), manager_address(), loan)
            .unwrap();

        let request = SwapRequest::new(fixture.info(dai()), fixture.info(usdc()), loan);
        let plan = manager.check_and_calculate_swap_vars(user(), &request).await.unwrap();
        manager.swap_preapproved_assets(user(), &plan, None).await.unwrap();

        assert!(manager.vars().is_clear());
    }

    #[tokio::test]
    async fn test_fee_mode_must_match_plan() {
        let fixture = Fixture::new();
        fixture.supply(weth(), U256::from(10u64) * WAD).await;
        let manager = fixture.manager();

        let request = SwapRequest::new(fixture.info(dai()), fixture.info(usdc()), WAD);
        let plan = manager.check_and_calculate_swap_vars(user(), &request).await.unwrap();
        assert_eq!(
            manager.swap_preapproved_assets(user(), &plan, Some(WAD)).await,
            Err(ManagerError::FeeModeMismatch { planned_bundled: true })
        );
    }

    #[tokio::test]
    async fn test_asset_positions_lists_touched_reserves() {
        let fixture = Fixture::new();
        fixture.supply(weth(), U256::from(10u64) * WAD).await;
        fixture.borrow(dai(), U256::from(1000u64) * WAD).await;
        let manager = fixture.manager();

        let positions = manager.asset_positions(user()).await.unwrap();
        assert_eq!(positions.len(), 2);

        let weth_position = positions.iter().find(|p| p.token.address == weth()).unwrap();
        assert_eq!(weth_position.a_token_balance, U256::from(10u64) * WAD);
        assert!(!weth_position.has_debt());

        let dai_position = positions.iter().find(|p| p.token.address == dai()).unwrap();
        assert_eq!(dai_position.variable_debt, U256::from(1000u64) * WAD);
        assert!(dai_position.has_debt());
    }
}
