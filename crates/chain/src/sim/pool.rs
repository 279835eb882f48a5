//! Lending pool rules of the simulated market (Aave V2 validation logic).

use super::{Ledger, SimulatedMarket, POOL_ADDRESS};
use crate::error::{ChainError, ChainResult};
use crate::host::AtomicHost;
use crate::protocol::{
    FlashLoanMode, FlashLoanReceiver, InterestRateMode, LendingPool, ReserveConfiguration,
    ReserveDataProvider, TokenAddresses, UserAccountData, UserReserveData,
};
use crate::u256_math::{
    health_factor, is_liquidatable_wad, percent_mul, to_reference_value, weighted_threshold,
};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use tracing::debug;

impl Ledger {
    /// `getUserAccountData`: collateral counts only where the reserve is
    /// collateral-enabled with a non-zero liquidation threshold.
    pub(super) fn account_data(&self, user: Address) -> ChainResult<UserAccountData> {
        let mut total_collateral = U256::ZERO;
        let mut total_debt = U256::ZERO;
        let mut weighted_lt = U256::ZERO;
        let mut weighted_ltv = U256::ZERO;

        for asset in &self.reserve_list {
            let reserve = self.reserve(*asset)?;
            let supplied = self.balance(reserve.tokens.a_token, user);
            let owed = self.balance(reserve.tokens.stable_debt_token, user)
                + self.balance(reserve.tokens.variable_debt_token, user);
            if supplied.is_zero() && owed.is_zero() {
                continue;
            }

            let price = self.price(*asset)?;
            let config = &reserve.config;
            if !supplied.is_zero()
                && config.usage_as_collateral_enabled
                && config.liquidation_threshold > 0
            {
                let value = to_reference_value(supplied, price, config.decimals);
                total_collateral += value;
                weighted_lt += value * U256::from(config.liquidation_threshold);
                weighted_ltv += value * U256::from(config.ltv);
            }
            if !owed.is_zero() {
                total_debt += to_reference_value(owed, price, config.decimals);
            }
        }

        let current_liquidation_threshold = weighted_threshold(weighted_lt, total_collateral);
        let ltv = weighted_threshold(weighted_ltv, total_collateral);

        Ok(UserAccountData {
            total_collateral,
            total_debt,
            available_borrows: percent_mul(total_collateral, ltv).saturating_sub(total_debt),
            current_liquidation_threshold,
            ltv,
            health_factor: health_factor(total_collateral, total_debt, current_liquidation_threshold),
        })
    }

    /// Fail when `user` carries debt with a health factor below 1.
    pub(super) fn validate_health(&self, user: Address) -> ChainResult<()> {
        let data = self.account_data(user)?;
        if !data.total_debt.is_zero() && is_liquidatable_wad(data.health_factor) {
            return Err(ChainError::rejected(format!(
                "health factor of {user} would drop below 1"
            )));
        }
        Ok(())
    }

    /// aToken transfers may not leave the sender liquidatable.
    pub(super) fn validate_a_token_transfer(&self, token: Address, from: Address) -> ChainResult<()> {
        match self.underlying_of_a_token(token) {
            Some(_) => self.validate_health(from),
            None => Ok(()),
        }
    }

    fn active_reserve(&self, asset: Address) -> ChainResult<(ReserveConfiguration, TokenAddresses)> {
        let reserve = self.reserve(asset)?;
        if !reserve.config.is_active {
            return Err(ChainError::rejected(format!("reserve {asset} is not active")));
        }
        Ok((reserve.config, reserve.tokens))
    }

    /// `validateBorrow` plus the debt-token mint: `on_behalf_of` owes `amount`
    /// paid out to `caller`. Consumes credit delegation when the two differ.
    fn open_debt(
        &mut self,
        caller: Address,
        asset: Address,
        amount: U256,
        mode: InterestRateMode,
        on_behalf_of: Address,
    ) -> ChainResult<()> {
        let (config, tokens) = self.active_reserve(asset)?;
        if amount.is_zero() {
            return Err(ChainError::rejected("borrow amount is 0"));
        }
        if !config.borrowing_enabled || config.is_frozen {
            return Err(ChainError::rejected(format!("borrowing disabled on {asset}")));
        }
        if mode == InterestRateMode::Stable && !config.stable_borrow_rate_enabled {
            return Err(ChainError::rejected(format!("stable borrowing disabled on {asset}")));
        }

        let debt_token = tokens.debt_token(mode);
        if caller != on_behalf_of {
            let key = (debt_token, on_behalf_of, caller);
            let available = self.borrow_allowances.get(&key).copied().unwrap_or_default();
            if available < amount {
                return Err(ChainError::BorrowAllowanceExceeded {
                    debt_token,
                    required: amount,
                    available,
                });
            }
            self.borrow_allowances.insert(key, available - amount);
        }

        let account = self.account_data(on_behalf_of)?;
        if account.total_collateral.is_zero() {
            return Err(ChainError::rejected("collateral balance is 0"));
        }
        let value = to_reference_value(amount, self.price(asset)?, config.decimals);
        if value > account.available_borrows {
            return Err(ChainError::rejected(format!(
                "collateral cannot cover new borrow of {value}"
            )));
        }

        self.mint(debt_token, on_behalf_of, amount);
        Ok(())
    }
}

impl SimulatedMarket {
    /// Advance, callback, settlement. The caller wraps this in a checkpoint.
    async fn run_flash_loan(
        &self,
        receiver: &dyn FlashLoanReceiver,
        asset: Address,
        amount: U256,
        mode: FlashLoanMode,
        on_behalf_of: Address,
    ) -> ChainResult<U256> {
        let to = receiver.address();
        let premium = self.apply(|ledger| {
            ledger.active_reserve(asset)?;
            if amount.is_zero() {
                return Err(ChainError::rejected("flash loan amount is 0"));
            }
            ledger.move_funds(asset, POOL_ADDRESS, to, amount)?;
            Ok(match mode {
                FlashLoanMode::Repay => percent_mul(amount, ledger.flash_loan_premium_bps),
                FlashLoanMode::OpenDebt(_) => U256::ZERO,
            })
        })?;

        receiver.execute_operation(asset, amount, premium).await?;

        self.apply(|ledger| {
            match mode {
                FlashLoanMode::Repay => {
                    let owed = amount + premium;
                    ledger.spend_allowance(asset, to, POOL_ADDRESS, owed)?;
                    ledger.move_funds(asset, to, POOL_ADDRESS, owed)?;
                }
                FlashLoanMode::OpenDebt(rate_mode) => {
                    ledger.open_debt(to, asset, amount, rate_mode, on_behalf_of)?;
                }
            }
            debug!(
                asset = %asset,
                amount = %amount,
                premium = %premium,
                mode = mode.as_u8(),
                on_behalf_of = %on_behalf_of,
                "Flash loan settled"
            );
            Ok(premium)
        })
    }
}

#[async_trait]
impl ReserveDataProvider for SimulatedMarket {
    async fn reserve_configuration(&self, asset: Address) -> ChainResult<ReserveConfiguration> {
        self.read(|ledger| ledger.reserve(asset).map(|reserve| reserve.config))
    }

    async fn reserve_tokens_addresses(&self, asset: Address) -> ChainResult<TokenAddresses> {
        self.tokens_of(asset)
    }

    async fn user_reserve_data(&self, asset: Address, user: Address) -> ChainResult<UserReserveData> {
        self.read(|ledger| {
            let tokens = ledger.reserve(asset)?.tokens;
            Ok(UserReserveData {
                current_a_token_balance: ledger.balance(tokens.a_token, user),
                current_stable_debt: ledger.balance(tokens.stable_debt_token, user),
                current_variable_debt: ledger.balance(tokens.variable_debt_token, user),
            })
        })
    }

    async fn user_account_data(&self, user: Address) -> ChainResult<UserAccountData> {
        self.read(|ledger| ledger.account_data(user))
    }

    async fn all_reserves(&self) -> ChainResult<Vec<Address>> {
        Ok(self.read(|ledger| ledger.reserve_list.clone()))
    }

    async fn flash_loan_premium_bps(&self) -> ChainResult<u16> {
        Ok(self.read(|ledger| ledger.flash_loan_premium_bps))
    }
}

#[async_trait]
impl LendingPool for SimulatedMarket {
    fn address(&self) -> Address {
        POOL_ADDRESS
    }

    async fn deposit(
        &self,
        caller: Address,
        asset: Address,
        amount: U256,
        on_behalf_of: Address,
    ) -> ChainResult<()> {
        self.apply(|ledger| {
            let (config, tokens) = ledger.active_reserve(asset)?;
            if amount.is_zero() {
                return Err(ChainError::rejected("deposit amount is 0"));
            }
            if config.is_frozen {
                return Err(ChainError::rejected(format!("reserve {asset} is frozen")));
            }
            ledger.spend_allowance(asset, caller, POOL_ADDRESS, amount)?;
            ledger.move_funds(asset, caller, POOL_ADDRESS, amount)?;
            ledger.mint(tokens.a_token, on_behalf_of, amount);
            debug!(asset = %asset, amount = %amount, on_behalf_of = %on_behalf_of, "Pool deposit");
            Ok(())
        })
    }

    async fn borrow(
        &self,
        caller: Address,
        asset: Address,
        amount: U256,
        mode: InterestRateMode,
        on_behalf_of: Address,
    ) -> ChainResult<()> {
        self.apply(|ledger| {
            ledger.open_debt(caller, asset, amount, mode, on_behalf_of)?;
            ledger.move_funds(asset, POOL_ADDRESS, caller, amount)?;
            debug!(asset = %asset, amount = %amount, %mode, on_behalf_of = %on_behalf_of, "Pool borrow");
            Ok(())
        })
    }

    async fn repay(
        &self,
        caller: Address,
        asset: Address,
        amount: U256,
        mode: InterestRateMode,
        on_behalf_of: Address,
    ) -> ChainResult<U256> {
        self.apply(|ledger| {
            let (_, tokens) = ledger.active_reserve(asset)?;
            let debt_token = tokens.debt_token(mode);
            let debt = ledger.balance(debt_token, on_behalf_of);
            if debt.is_zero() {
                return Err(ChainError::rejected(format!("no {mode} debt on {asset}")));
            }
            if amount.is_zero() {
                return Err(ChainError::rejected("repay amount is 0"));
            }

            let paid = amount.min(debt);
            ledger.spend_allowance(asset, caller, POOL_ADDRESS, paid)?;
            ledger.move_funds(asset, caller, POOL_ADDRESS, paid)?;
            ledger.burn(debt_token, on_behalf_of, paid)?;
            debug!(asset = %asset, paid = %paid, %mode, on_behalf_of = %on_behalf_of, "Pool repay");
            Ok(paid)
        })
    }

    async fn withdraw(
        &self,
        caller: Address,
        asset: Address,
        amount: U256,
        to: Address,
    ) -> ChainResult<U256> {
        self.apply(|ledger| {
            let (_, tokens) = ledger.active_reserve(asset)?;
            let balance = ledger.balance(tokens.a_token, caller);
            // U256::MAX withdraws the whole balance
            let amount = if amount == U256::MAX { balance } else { amount };
            if amount.is_zero() {
                return Err(ChainError::rejected("withdraw amount is 0"));
            }

            ledger.burn(tokens.a_token, caller, amount)?;
            ledger.move_funds(asset, POOL_ADDRESS, to, amount)?;
            ledger.validate_health(caller)?;
            debug!(asset = %asset, amount = %amount, to = %to, "Pool withdraw");
            Ok(amount)
        })
    }

    async fn flash_loan(
        &self,
        receiver: &dyn FlashLoanReceiver,
        asset: Address,
        amount: U256,
        mode: FlashLoanMode,
        on_behalf_of: Address,
    ) -> ChainResult<U256> {
        let checkpoint = self.checkpoint().await?;
        match self
            .run_flash_loan(receiver, asset, amount, mode, on_behalf_of)
            .await
        {
            Ok(premium) => {
                self.commit(checkpoint).await?;
                Ok(premium)
            }
            Err(err) => {
                self.rollback(checkpoint).await?;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{standard_reserve, MarketBuilder, DEFAULT_FLASH_LOAN_PREMIUM_BPS};
    use crate::token::TokenLedger;
    use crate::protocol::CreditDelegation;
    use crate::u256_math::WAD;

    fn dai() -> Address {
        Address::repeat_byte(0xda)
    }

    fn weth() -> Address {
        Address::repeat_byte(0xee)
    }

    fn user() -> Address {
        Address::repeat_byte(0x01)
    }

    fn manager() -> Address {
        Address::repeat_byte(0x02)
    }

    /// DAI at 0.0005 ETH, WETH at 1 ETH.
    fn market() -> SimulatedMarket {
        MarketBuilder::new()
            .with_reserve(dai(), standard_reserve(18, 7500, 8000), U256::from(500_000_000_000_000u64))
            .with_reserve(weth(), standard_reserve(18, 8000, 8250), WAD)
            .build()
    }

    async fn supply(market: &SimulatedMarket, asset: Address, amount: U256) {
        market.fund(asset, user(), amount);
        market.approve(asset, user(), POOL_ADDRESS, amount).await.unwrap();
        market.deposit(user(), asset, amount, user()).await.unwrap();
    }

    #[tokio::test]
    async fn test_deposit_mints_a_tokens() {
        let market = market();
        supply(&market, weth(), U256::from(10u64) * WAD).await;

        let reserve = market.user_reserve_data(weth(), user()).await.unwrap();
        assert_eq!(reserve.current_a_token_balance, U256::from(10u64) * WAD);

        let account = market.user_account_data(user()).await.unwrap();
        assert_eq!(account.total_collateral, U256::from(10u64) * WAD);
        assert_eq!(account.current_liquidation_threshold, 8250);
        assert_eq!(account.available_borrows, U256::from(8u64) * WAD);
        assert_eq!(account.health_factor, U256::MAX);
    }

    #[tokio::test]
    async fn test_delegated_borrow_consumes_allowance() {
        let market = market();
        supply(&market, weth(), U256::from(10u64) * WAD).await;
        let amount = U256::from(1000u64) * WAD; // 0.5 ETH of DAI

        let err = market
            .borrow(manager(), dai(), amount, InterestRateMode::Variable, user())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::BorrowAllowanceExceeded { .. }));

        market
            .approve_delegation(dai(), InterestRateMode::Variable, user(), manager(), amount)
            .unwrap();
        market
            .borrow(manager(), dai(), amount, InterestRateMode::Variable, user())
            .await
            .unwrap();

        assert_eq!(market.balance(dai(), manager()), amount);
        let debt = market.user_reserve_data(dai(), user()).await.unwrap();
        assert_eq!(debt.current_variable_debt, amount);
        let debt_token = market.tokens_of(dai()).unwrap().variable_debt_token;
        assert_eq!(
            market.borrow_allowance(debt_token, user(), manager()).await.unwrap(),
            U256::ZERO
        );
    }

    #[tokio::test]
    async fn test_borrow_beyond_ltv_rejected() {
        let market = market();
        supply(&market, weth(), WAD).await;
        // 0.8 ETH borrowable; ask for 1 ETH worth of DAI
        let amount = U256::from(2000u64) * WAD;
        let err = market
            .borrow(user(), dai(), amount, InterestRateMode::Variable, user())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_repay_capped_at_debt() {
        let market = market();
        supply(&market, weth(), U256::from(10u64) * WAD).await;
        let borrowed = U256::from(100u64) * WAD;
        market
            .borrow(user(), dai(), borrowed, InterestRateMode::Variable, user())
            .await
            .unwrap();

        market.fund(dai(), user(), borrowed);
        market.approve(dai(), user(), POOL_ADDRESS, U256::MAX).await.unwrap();
        let paid = market
            .repay(user(), dai(), borrowed * U256::from(2u64), InterestRateMode::Variable, user())
            .await
            .unwrap();

        assert_eq!(paid, borrowed);
        assert_eq!(market.balance(dai(), user()), borrowed);
        let account = market.user_account_data(user()).await.unwrap();
        assert_eq!(account.total_debt, U256::ZERO);
    }

    #[tokio::test]
    async fn test_withdraw_keeps_health_factor() {
        let market = market();
        supply(&market, weth(), U256::from(10u64) * WAD).await;
        // 7 ETH of DAI debt against 8.25 ETH of adjusted collateral
        market
            .borrow(user(), dai(), U256::from(14_000u64) * WAD, InterestRateMode::Variable, user())
            .await
            .unwrap();

        let err = market
            .withdraw(user(), weth(), U256::from(5u64) * WAD, user())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Rejected(_)));

        let withdrawn = market.withdraw(user(), weth(), WAD, user()).await.unwrap();
        assert_eq!(withdrawn, WAD);
        assert_eq!(market.balance(weth(), user()), WAD);
    }

    #[tokio::test]
    async fn test_a_token_transfer_checks_health() {
        let market = market();
        supply(&market, weth(), U256::from(10u64) * WAD).await;
        market
            .borrow(user(), dai(), U256::from(14_000u64) * WAD, InterestRateMode::Variable, user())
            .await
            .unwrap();
        let a_weth = market.tokens_of(weth()).unwrap().a_token;

        let err = market
            .transfer(a_weth, user(), manager(), U256::from(5u64) * WAD)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Rejected(_)));
        assert_eq!(market.balance(a_weth, user()), U256::from(10u64) * WAD);
    }

    /// Deposits the advance as collateral of `user()`.
    struct DepositAdvance<'a> {
        market: &'a SimulatedMarket,
    }

    #[async_trait]
    impl<'a> FlashLoanReceiver for DepositAdvance<'a> {
        fn address(&self) -> Address {
            manager()
        }

        async fn execute_operation(&self, asset: Address, amount: U256, premium: U256) -> ChainResult<()> {
            assert!(premium.is_zero());
            self.market.approve(asset, manager(), POOL_ADDRESS, amount).await?;
            self.market.deposit(manager(), asset, amount, user()).await
        }
    }

    /// Approves the advance plus premium back to the pool.
    struct ReturnAdvance<'a> {
        market: &'a SimulatedMarket,
    }

    #[async_trait]
    impl<'a> FlashLoanReceiver for ReturnAdvance<'a> {
        fn address(&self) -> Address {
            manager()
        }

        async fn execute_operation(&self, asset: Address, amount: U256, premium: U256) -> ChainResult<()> {
            self.market
                .approve(asset, manager(), POOL_ADDRESS, amount + premium)
                .await
        }
    }

    #[tokio::test]
    async fn test_flash_loan_checks_ltv_after_callback() {
        let market = market();
        supply(&market, weth(), WAD).await;
        // 3 WETH of debt against 1 WETH supplied: only fundable once the
        // advance is deposited
        let amount = U256::from(3u64) * WAD;
        market
            .approve_delegation(weth(), InterestRateMode::Variable, user(), manager(), amount)
            .unwrap();

        let receiver = DepositAdvance { market: &market };
        let premium = market
            .flash_loan(
                &receiver,
                weth(),
                amount,
                FlashLoanMode::OpenDebt(InterestRateMode::Variable),
                user(),
            )
            .await
            .unwrap();

        assert_eq!(premium, U256::ZERO);
        let reserve = market.user_reserve_data(weth(), user()).await.unwrap();
        assert_eq!(reserve.current_a_token_balance, U256::from(4u64) * WAD);
        assert_eq!(reserve.current_variable_debt, amount);
        assert_eq!(market.balance(weth(), manager()), U256::ZERO);
        assert_eq!(market.open_checkpoints(), 0);
    }

    #[tokio::test]
    async fn test_flash_loan_without_delegation_rolls_back() {
        let market = market();
        supply(&market, weth(), WAD).await;
        let pool_before = market.balance(weth(), POOL_ADDRESS);

        let receiver = DepositAdvance { market: &market };
        let err = market
            .flash_loan(
                &receiver,
                weth(),
                WAD,
                FlashLoanMode::OpenDebt(InterestRateMode::Variable),
                user(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ChainError::BorrowAllowanceExceeded { .. }));
        let reserve = market.user_reserve_data(weth(), user()).await.unwrap();
        assert_eq!(reserve.current_a_token_balance, WAD);
        assert_eq!(market.balance(weth(), POOL_ADDRESS), pool_before);
        assert_eq!(market.open_checkpoints(), 0);
    }

    #[tokio::test]
    async fn test_flash_loan_repay_charges_premium() {
        let market = market();
        let amount = U256::from(10u64) * WAD;
        let premium = percent_mul(amount, DEFAULT_FLASH_LOAN_PREMIUM_BPS);
        let pool_before = market.balance(weth(), POOL_ADDRESS);
        let receiver = ReturnAdvance { market: &market };

        // Holds only the advance: the premium cannot be paid
        let err = market
            .flash_loan(&receiver, weth(), amount, FlashLoanMode::Repay, user())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::InsufficientBalance { .. }));
        assert_eq!(market.balance(weth(), POOL_ADDRESS), pool_before);

        market.fund(weth(), manager(), premium);
        let paid = market
            .flash_loan(&receiver, weth(), amount, FlashLoanMode::Repay, user())
            .await
            .unwrap();

        assert_eq!(paid, premium);
        assert_eq!(market.balance(weth(), POOL_ADDRESS), pool_before + premium);
        assert_eq!(market.balance(weth(), manager()), U256::ZERO);
        assert_eq!(market.flash_loan_premium_bps().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_unknown_reserve() {
        let market = market();
        let unknown = Address::repeat_byte(0x99);
        assert_eq!(
            market.reserve_configuration(unknown).await,
            Err(ChainError::UnknownReserve(unknown))
        );
        assert_eq!(market.all_reserves().await.unwrap(), vec![dai(), weth()]);
    }
}
