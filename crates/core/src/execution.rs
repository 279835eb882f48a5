//! Pieces shared by the swap and repay executors.

use crate::error::{ManagerError, Result};
use alloy::primitives::{Address, U256};
use leverage_chain::{AtomicHost, TokenLedger};
use std::future::Future;
use tracing::{debug, error, warn};

/// Run `body` inside a host checkpoint: commit on `Ok`, roll back on `Err`.
pub(crate) async fn run_atomically<T, F>(
    host: &dyn AtomicHost,
    operation: &'static str,
    body: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let checkpoint = host.checkpoint().await?;
    match body.await {
        Ok(value) => {
            host.commit(checkpoint).await?;
            Ok(value)
        }
        Err(err) => {
            warn!(operation, code = err.code(), error = %err, "Operation failed, rolling back");
            if let Err(rollback_err) = host.rollback(checkpoint).await {
                error!(operation, error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

/// The manager must end every operation holding none of `tokens`.
pub(crate) async fn assert_no_residuals(
    ledger: &dyn TokenLedger,
    holder: Address,
    tokens: &[Address],
) -> Result<()> {
    for token in tokens {
        let amount = ledger.balance_of(*token, holder).await?;
        if !amount.is_zero() {
            return Err(ManagerError::ResidualBalance {
                token: *token,
                amount,
            });
        }
    }
    debug!(holder = %holder, checked = tokens.len(), "No residual balances");
    Ok(())
}

/// A separate fee payment may fall short of the planned fee by `skew` base
/// units to absorb rounding.
pub(crate) fn check_fee_payment(provided: U256, skew: u64, required: U256) -> Result<()> {
    if provided.saturating_add(U256::from(skew)) < required {
        return Err(ManagerError::FeeInsufficient { required, provided });
    }
    Ok(())
}

/// Forward a separately paid fee from `payer` to `recipient`.
///
/// The payment arrives with the call the way a payable value does: it is
/// debited from the payer's native-token balance without an allowance and
/// never sits with the manager.
pub(crate) async fn forward_native_fee(
    ledger: &dyn TokenLedger,
    native: Address,
    payer: Address,
    recipient: Address,
    payment: U256,
) -> Result<()> {
    if payment.is_zero() {
        return Ok(());
    }
    ledger.transfer(native, payer, recipient, payment).await?;
    debug!(payer = %payer, recipient = %recipient, amount = %payment, "Separate fee forwarded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use leverage_chain::{ChainError, MarketBuilder, SimulatedMarket};

    #[test]
    fn test_fee_skew_tolerance() {
        let required = U256::from(1_000u64);
        assert!(check_fee_payment(U256::from(995u64), 5, required).is_ok());
        assert!(check_fee_payment(U256::from(2_000u64), 5, required).is_ok());
        assert_eq!(
            check_fee_payment(U256::from(994u64), 5, required),
            Err(ManagerError::FeeInsufficient {
                required,
                provided: U256::from(994u64),
            })
        );
    }

    #[tokio::test]
    async fn test_failed_body_rolls_back() {
        let market = MarketBuilder::new().build();
        let token = Address::repeat_byte(1);
        let holder = Address::repeat_byte(2);

        let result: Result<()> = run_atomically(&market, "test", async {
            market.fund(token, holder, U256::from(7u64));
            Err(ManagerError::Protocol(ChainError::rejected("boom")))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(market.balance(token, holder), U256::ZERO);
        assert_eq!(market.open_checkpoints(), 0);
    }

    #[tokio::test]
    async fn test_separate_fee_moves_from_payer_without_allowance() {
        let market = MarketBuilder::new().build();
        let native = Address::repeat_byte(0xee);
        let payer = Address::repeat_byte(1);
        let recipient = Address::repeat_byte(0xfe);
        market.fund(native, payer, U256::from(100u64));

        forward_native_fee(&market, native, payer, recipient, U256::from(40u64))
            .await
            .unwrap();
        assert_eq!(market.balance(native, payer), U256::from(60u64));
        assert_eq!(market.balance(native, recipient), U256::from(40u64));

        forward_native_fee(&market, native, payer, recipient, U256::ZERO)
            .await
            .unwrap();
        assert_eq!(market.balance(native, payer), U256::from(60u64));

        let err = forward_native_fee(&market, native, payer, recipient, U256::from(61u64))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Protocol(ChainError::InsufficientBalance { .. })
        ));
    }

    #[tokio::test]
    async fn test_residual_detection() {
        let market: SimulatedMarket = MarketBuilder::new().build();
        let token = Address::repeat_byte(1);
        let holder = Address::repeat_byte(2);
        assert!(assert_no_residuals(&market, holder, &[token]).await.is_ok());

        market.fund(token, holder, U256::from(1u64));
        assert_eq!(
            assert_no_residuals(&market, holder, &[token]).await,
            Err(ManagerError::ResidualBalance {
                token,
                amount: U256::from(1u64),
            })
        );
    }
}
