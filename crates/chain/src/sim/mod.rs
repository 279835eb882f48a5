//! In-memory lending market.
//!
//! [`SimulatedMarket`] implements every collaborator trait (reserve data,
//! lending pool, credit delegation, price oracle, swap router, token ledger and
//! atomic host) over a single ledger guarded by a mutex. Each call is atomic on
//! its own: it runs against a draft copy of the ledger that replaces the live
//! one only when the call succeeds. Checkpoints snapshot the whole ledger so an
//! executor can roll back a multi-call sequence. Flash loans take a nested
//! checkpoint of their own around the receiver's callback.
//!
//! # Example
//!
//! ```rust,ignore
//! let market = MarketBuilder::new()
//!     .with_reserve(dai, standard_reserve(18, 7500, 8000), dai_price)
//!     .with_reserve(weth, standard_reserve(18, 8000, 8250), WAD)
//!     .build();
//! market.fund(dai, user, U256::from(1000u64) * WAD);
//! ```

mod builder;
mod pool;
mod router;

pub use builder::{standard_reserve, MarketBuilder, DEFAULT_FLASH_LOAN_PREMIUM_BPS, DEFAULT_LIQUIDITY};

use crate::error::{ChainError, ChainResult};
use crate::host::{AtomicHost, Checkpoint};
use crate::oracle::PriceOracle;
use crate::protocol::{
    CreditDelegation, InterestRateMode, ReserveConfiguration, TokenAddresses,
};
use crate::token::TokenLedger;
use alloy::primitives::{address, keccak256, Address, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Address of the simulated lending pool (holds reserve liquidity).
pub const POOL_ADDRESS: Address = address!("00000000000000000000000000000000000a5e01");

/// Address of the simulated swap router (holds swap liquidity).
pub const ROUTER_ADDRESS: Address = address!("00000000000000000000000000000000000a5e02");

/// A listed reserve: configuration plus its derived token addresses.
#[derive(Debug, Clone)]
struct SimReserve {
    config: ReserveConfiguration,
    tokens: TokenAddresses,
}

/// Everything a checkpoint captures.
#[derive(Debug, Clone, Default)]
struct Ledger {
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    /// (debt token, delegator, delegatee) -> remaining credit
    borrow_allowances: HashMap<(Address, Address, Address), U256>,
    reserves: HashMap<Address, SimReserve>,
    reserve_list: Vec<Address>,
    prices: HashMap<Address, U256>,
    router_haircut_bps: u16,
    flash_loan_premium_bps: u16,
}

#[derive(Debug, Default)]
struct MarketState {
    ledger: Ledger,
    checkpoints: Vec<(u64, Ledger)>,
    next_checkpoint: u64,
}

/// In-memory Aave V2 style market with an oracle-priced router.
#[derive(Debug, Default)]
pub struct SimulatedMarket {
    state: Mutex<MarketState>,
}

/// Deterministic address for a reserve's derived token.
fn derive_token_address(kind: &str, asset: Address) -> Address {
    let mut preimage = kind.as_bytes().to_vec();
    preimage.extend_from_slice(asset.as_slice());
    Address::from_slice(&keccak256(preimage)[12..])
}

impl Ledger {
    fn balance(&self, token: Address, owner: Address) -> U256 {
        self.balances.get(&(token, owner)).copied().unwrap_or_default()
    }

    fn mint(&mut self, token: Address, owner: Address, amount: U256) {
        let entry = self.balances.entry((token, owner)).or_default();
        *entry = entry.saturating_add(amount);
    }

    fn burn(&mut self, token: Address, owner: Address, amount: U256) -> ChainResult<()> {
        let available = self.balance(token, owner);
        if available < amount {
            return Err(ChainError::InsufficientBalance {
                token,
                owner,
                required: amount,
                available,
            });
        }
        self.balances.insert((token, owner), available - amount);
        Ok(())
    }

    fn move_funds(&mut self, token: Address, from: Address, to: Address, amount: U256) -> ChainResult<()> {
        self.burn(token, from, amount)?;
        self.mint(token, to, amount);
        Ok(())
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    /// Consume an ERC-20 allowance; `U256::MAX` never decreases.
    fn spend_allowance(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> ChainResult<()> {
        let available = self.allowance(token, owner, spender);
        if available < amount {
            return Err(ChainError::InsufficientAllowance {
                token,
                owner,
                spender,
                required: amount,
                available,
            });
        }
        if available != U256::MAX {
            self.allowances.insert((token, owner, spender), available - amount);
        }
        Ok(())
    }

    fn reserve(&self, asset: Address) -> ChainResult<&SimReserve> {
        self.reserves
            .get(&asset)
            .ok_or(ChainError::UnknownReserve(asset))
    }

    fn price(&self, asset: Address) -> ChainResult<U256> {
        match self.prices.get(&asset) {
            Some(price) if !price.is_zero() => Ok(*price),
            _ => Err(ChainError::PriceUnavailable(asset)),
        }
    }

    /// Underlying asset of an aToken, if `token` is one.
    fn underlying_of_a_token(&self, token: Address) -> Option<Address> {
        self.reserves
            .iter()
            .find(|(_, reserve)| reserve.tokens.a_token == token)
            .map(|(asset, _)| *asset)
    }

    fn list_reserve(&mut self, asset: Address, config: ReserveConfiguration, price: U256) {
        let tokens = TokenAddresses {
            a_token: derive_token_address("aToken", asset),
            stable_debt_token: derive_token_address("stableDebt", asset),
            variable_debt_token: derive_token_address("variableDebt", asset),
        };
        if !self.reserves.contains_key(&asset) {
            self.reserve_list.push(asset);
        }
        self.reserves.insert(asset, SimReserve { config, tokens });
        self.prices.insert(asset, price);
    }
}

impl SimulatedMarket {
    /// Run a mutation against a draft ledger; the draft replaces the live
    /// ledger only if the mutation succeeds.
    fn apply<T>(&self, mutation: impl FnOnce(&mut Ledger) -> ChainResult<T>) -> ChainResult<T> {
        let mut state = self.state.lock();
        let mut draft = state.ledger.clone();
        let out = mutation(&mut draft)?;
        state.ledger = draft;
        Ok(out)
    }

    fn read<T>(&self, view: impl FnOnce(&Ledger) -> T) -> T {
        view(&self.state.lock().ledger)
    }

    /// Credit `amount` of `token` to `owner` out of thin air.
    pub fn fund(&self, token: Address, owner: Address, amount: U256) {
        self.state.lock().ledger.mint(token, owner, amount);
    }

    /// Current balance, synchronously (test and CLI convenience).
    pub fn balance(&self, token: Address, owner: Address) -> U256 {
        self.read(|ledger| ledger.balance(token, owner))
    }

    /// Move an oracle price.
    pub fn set_price(&self, asset: Address, price: U256) {
        debug!(asset = %asset, price = %price, "Simulated price update");
        self.state.lock().ledger.prices.insert(asset, price);
    }

    /// Router output haircut versus the oracle price, in basis points.
    pub fn set_router_haircut_bps(&self, bps: u16) {
        self.state.lock().ledger.router_haircut_bps = bps;
    }

    /// Reconfigure a listed reserve in place.
    pub fn update_reserve(
        &self,
        asset: Address,
        update: impl FnOnce(&mut ReserveConfiguration),
    ) -> ChainResult<()> {
        self.apply(|ledger| {
            let reserve = ledger
                .reserves
                .get_mut(&asset)
                .ok_or(ChainError::UnknownReserve(asset))?;
            update(&mut reserve.config);
            Ok(())
        })
    }

    /// Token addresses of a listed reserve.
    pub fn tokens_of(&self, asset: Address) -> ChainResult<TokenAddresses> {
        self.read(|ledger| ledger.reserve(asset).map(|reserve| reserve.tokens))
    }

    /// `IDebtToken.approveDelegation` issued by `delegator`.
    pub fn approve_delegation(
        &self,
        asset: Address,
        mode: InterestRateMode,
        delegator: Address,
        delegatee: Address,
        amount: U256,
    ) -> ChainResult<()> {
        self.apply(|ledger| {
            let debt_token = ledger.reserve(asset)?.tokens.debt_token(mode);
            ledger
                .borrow_allowances
                .insert((debt_token, delegator, delegatee), amount);
            Ok(())
        })
    }

    /// Number of open checkpoints.
    pub fn open_checkpoints(&self) -> usize {
        self.state.lock().checkpoints.len()
    }
}

#[async_trait]
impl TokenLedger for SimulatedMarket {
    async fn balance_of(&self, token: Address, owner: Address) -> ChainResult<U256> {
        Ok(self.balance(token, owner))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> ChainResult<U256> {
        Ok(self.read(|ledger| ledger.allowance(token, owner, spender)))
    }

    async fn approve(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> ChainResult<()> {
        trace!(token = %token, owner = %owner, spender = %spender, amount = %amount, "approve");
        self.apply(|ledger| {
            ledger.allowances.insert((token, owner, spender), amount);
            Ok(())
        })
    }

    async fn transfer(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> ChainResult<()> {
        trace!(token = %token, from = %from, to = %to, amount = %amount, "transfer");
        self.apply(|ledger| {
            ledger.move_funds(token, from, to, amount)?;
            ledger.validate_a_token_transfer(token, from)
        })
    }

    async fn transfer_from(
        &self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> ChainResult<()> {
        trace!(token = %token, spender = %spender, from = %from, to = %to, amount = %amount, "transferFrom");
        self.apply(|ledger| {
            ledger.spend_allowance(token, from, spender, amount)?;
            ledger.move_funds(token, from, to, amount)?;
            ledger.validate_a_token_transfer(token, from)
        })
    }
}

#[async_trait]
impl PriceOracle for SimulatedMarket {
    async fn asset_price(&self, asset: Address) -> ChainResult<U256> {
        self.read(|ledger| ledger.price(asset))
    }
}

#[async_trait]
impl CreditDelegation for SimulatedMarket {
    async fn borrow_allowance(
        &self,
        debt_token: Address,
        delegator: Address,
        delegatee: Address,
    ) -> ChainResult<U256> {
        Ok(self.read(|ledger| {
            ledger
                .borrow_allowances
                .get(&(debt_token, delegator, delegatee))
                .copied()
                .unwrap_or_default()
        }))
    }
}

#[async_trait]
impl AtomicHost for SimulatedMarket {
    async fn checkpoint(&self) -> ChainResult<Checkpoint> {
        let mut state = self.state.lock();
        let id = state.next_checkpoint;
        state.next_checkpoint += 1;
        let snapshot = state.ledger.clone();
        state.checkpoints.push((id, snapshot));
        debug!(checkpoint = id, "Checkpoint opened");
        Ok(Checkpoint(id))
    }

    async fn commit(&self, checkpoint: Checkpoint) -> ChainResult<()> {
        let mut state = self.state.lock();
        let index = state
            .checkpoints
            .iter()
            .position(|(id, _)| *id == checkpoint.0)
            .ok_or(ChainError::UnknownCheckpoint(checkpoint.0))?;
        // Committing an outer checkpoint also settles the ones nested in it
        state.checkpoints.truncate(index);
        debug!(checkpoint = checkpoint.0, "Checkpoint committed");
        Ok(())
    }

    async fn rollback(&self, checkpoint: Checkpoint) -> ChainResult<()> {
        let mut state = self.state.lock();
        let index = state
            .checkpoints
            .iter()
            .position(|(id, _)| *id == checkpoint.0)
            .ok_or(ChainError::UnknownCheckpoint(checkpoint.0))?;
        let mut discarded = state.checkpoints.split_off(index);
        let (_, snapshot) = discarded.remove(0);
        state.ledger = snapshot;
        debug!(checkpoint = checkpoint.0, "Checkpoint rolled back");
        Ok(())
    }
}
