//! U256 fixed-point arithmetic for reference-currency valuation and health factors.
//!
//! All conversions round down. Amounts the engine spends and amounts it expects
//! to receive are both truncated, so planned figures never exceed what the
//! ledger can actually settle.

use alloy::primitives::U256;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10000u64, 0, 0, 0]);

/// Maximum basis points value (100%)
pub const MAX_BPS: u16 = 10_000;

/// Pre-computed powers of 10 for fast decimal conversion
const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// Fast power of 10 lookup (up to 10^38)
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if exp < 39 {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// Apply basis points reduction (e.g., for slippage).
/// Returns: value * (10000 - basis_points) / 10000
///
/// Example: apply_basis_points(1000, 100) = 990 (1% reduction)
#[inline(always)]
pub fn apply_basis_points(value: U256, basis_points: u16) -> U256 {
    let factor = U256::from(MAX_BPS.saturating_sub(basis_points));
    (value * factor) / BPS_DENOMINATOR
}

/// Take a basis-point share of a value, rounding down.
/// Returns: value * basis_points / 10000
#[inline(always)]
pub fn percent_mul(value: U256, basis_points: u16) -> U256 {
    (value * U256::from(basis_points)) / BPS_DENOMINATOR
}

/// Reference-currency value of a token amount.
///
/// Formula: amount * price / 10^decimals
///
/// `price` is the oracle price of one whole token in the reference currency
/// (18 decimals), so the result carries 18 decimals as well.
/// Saturates at `U256::MAX`; use [`checked_to_reference_value`] on
/// caller-supplied amounts.
#[inline(always)]
pub fn to_reference_value(amount: U256, price: U256, decimals: u8) -> U256 {
    checked_to_reference_value(amount, price, decimals).unwrap_or(U256::MAX)
}

/// [`to_reference_value`], `None` when `amount * price` overflows.
#[inline(always)]
pub fn checked_to_reference_value(amount: U256, price: U256, decimals: u8) -> Option<U256> {
    if amount.is_zero() || price.is_zero() {
        return Some(U256::ZERO);
    }
    amount.checked_mul(price).map(|raw| raw / pow10(decimals))
}

/// Token amount worth a given reference-currency value.
///
/// Formula: value * 10^decimals / price
///
/// Returns zero when the price is zero; callers reject unpriced assets first.
#[inline(always)]
pub fn from_reference_value(value: U256, price: U256, decimals: u8) -> U256 {
    checked_from_reference_value(value, price, decimals).unwrap_or(U256::MAX)
}

/// [`from_reference_value`], `None` when `value * 10^decimals` overflows.
#[inline(always)]
pub fn checked_from_reference_value(value: U256, price: U256, decimals: u8) -> Option<U256> {
    if value.is_zero() || price.is_zero() {
        return Some(U256::ZERO);
    }
    value.checked_mul(pow10(decimals)).map(|raw| raw / price)
}

/// Largest flash-loan principal that `available` covers together with its
/// premium: floor(available * 10000 / (10000 + premium_bps)).
///
/// The premium on the result, `percent_mul(principal, premium_bps)`, never
/// pushes the total above `available`.
#[inline(always)]
pub fn principal_covered(available: U256, premium_bps: u16) -> U256 {
    let denominator = BPS_DENOMINATOR + U256::from(premium_bps);
    available.saturating_mul(BPS_DENOMINATOR) / denominator
}

/// Calculate health factor in WAD (18 decimals).
/// HF = (total_collateral_adjusted * 10^18) / total_debt
///
/// Returns U256::MAX if debt is zero.
#[inline(always)]
pub fn calculate_hf_wad(collateral_adjusted_wad: U256, debt_wad: U256) -> U256 {
    if debt_wad.is_zero() {
        return U256::MAX;
    }
    (collateral_adjusted_wad * WAD) / debt_wad
}

/// Health factor from account totals and a weighted liquidation threshold.
///
/// HF = (collateral * threshold_bps / 10000) * 10^18 / debt
#[inline(always)]
pub fn health_factor(collateral: U256, debt: U256, liquidation_threshold_bps: u16) -> U256 {
    calculate_hf_wad(percent_mul(collateral, liquidation_threshold_bps), debt)
}

/// Weighted average liquidation threshold from a threshold-weighted sum.
///
/// `weighted_sum` is Σ(value_i * threshold_i); returns Σ / total in bps.
#[inline(always)]
pub fn weighted_threshold(weighted_sum: U256, total_collateral: U256) -> u16 {
    if total_collateral.is_zero() {
        return 0;
    }
    let avg = weighted_sum / total_collateral;
    if avg > U256::from(MAX_BPS) {
        MAX_BPS
    } else {
        avg.to::<u16>()
    }
}

/// Check if health factor indicates liquidatable position (HF < 1.0).
#[inline(always)]
pub fn is_liquidatable_wad(hf_wad: U256) -> bool {
    hf_wad < WAD
}

/// Convert WAD (18 decimals) to f64.
/// Use only for display/logging, not for computation.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad == U256::MAX {
        return f64::INFINITY;
    }
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limbs = wad.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        let low = limbs[0] as f64;
        (high + low) / 1e18
    }
}

/// Absolute difference of two U256 values
#[inline(always)]
pub fn abs_diff(a: U256, b: U256) -> U256 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_basis_points() {
        // 1% reduction (100 bps)
        let value = U256::from(1000u64);
        let result = apply_basis_points(value, 100);
        assert_eq!(result, U256::from(990u64));

        // 2% reduction (200 bps)
        let result = apply_basis_points(value, 200);
        assert_eq!(result, U256::from(980u64));

        // 0% reduction
        let result = apply_basis_points(value, 0);
        assert_eq!(result, U256::from(1000u64));

        // Beyond 100% saturates at zero
        assert_eq!(apply_basis_points(value, 20_000), U256::ZERO);
    }

    #[test]
    fn test_percent_mul_rounds_down() {
        // 9 bps of 1001 = 0.9009 -> 0
        assert_eq!(percent_mul(U256::from(1001u64), 9), U256::ZERO);
        assert_eq!(percent_mul(U256::from(1_000_000u64), 9), U256::from(900u64));
    }

    #[test]
    fn test_reference_value_of_dai() {
        // 3000 DAI (18 decimals) at 0.0005 ETH each = 1.5 ETH
        let amount = U256::from(3000u64) * WAD;
        let price = U256::from(500_000_000_000_000u64);
        let value = to_reference_value(amount, price, 18);
        assert_eq!(value, U256::from(1_500_000_000_000_000_000u128));
    }

    #[test]
    fn test_reference_value_of_usdc() {
        // 1000 USDC (6 decimals) at 0.0005 ETH each = 0.5 ETH
        let amount = U256::from(1_000_000_000u64);
        let price = U256::from(500_000_000_000_000u64);
        let value = to_reference_value(amount, price, 6);
        assert_eq!(value, U256::from(500_000_000_000_000_000u128));
        assert_eq!(from_reference_value(value, price, 6), amount);
    }

    #[test]
    fn test_from_reference_value_rounds_down() {
        // 1 wei of value at a price of 3 wei per token with 0 decimals -> 0 tokens
        assert_eq!(from_reference_value(U256::from(1u64), U256::from(3u64), 0), U256::ZERO);
        assert_eq!(from_reference_value(U256::from(7u64), U256::from(3u64), 0), U256::from(2u64));
        // Unpriced asset converts to nothing
        assert_eq!(from_reference_value(WAD, U256::ZERO, 18), U256::ZERO);
    }

    #[test]
    fn test_reference_value_overflow() {
        let price = U256::from(500_000_000_000_000u64);
        assert_eq!(checked_to_reference_value(U256::MAX, price, 18), None);
        assert_eq!(to_reference_value(U256::MAX, price, 18), U256::MAX);
        assert_eq!(checked_from_reference_value(U256::MAX, price, 18), None);
        assert_eq!(
            checked_to_reference_value(U256::from(3000u64) * WAD, price, 18),
            Some(U256::from(1_500_000_000_000_000_000u128))
        );
    }

    #[test]
    fn test_principal_covered_leaves_room_for_premium() {
        // 9 bps: 10009 covers exactly 10000 + 9
        assert_eq!(principal_covered(U256::from(10_009u64), 9), U256::from(10_000u64));
        assert_eq!(principal_covered(U256::from(10_008u64), 9), U256::from(9_999u64));
        assert_eq!(principal_covered(U256::from(500u64), 0), U256::from(500u64));

        let available = U256::from(47u64) * WAD + U256::from(123_456u64);
        let principal = principal_covered(available, 9);
        assert!(principal + percent_mul(principal, 9) <= available);
    }

    #[test]
    fn test_calculate_hf_wad() {
        // Collateral: 1000 adjusted, Debt: 500
        // HF = 1000 / 500 = 2.0
        let collateral = U256::from(1000u64) * WAD;
        let debt = U256::from(500u64) * WAD;

        let hf = calculate_hf_wad(collateral, debt);
        let expected = U256::from(2u64) * WAD;
        assert_eq!(hf, expected);
        assert_eq!(calculate_hf_wad(collateral, U256::ZERO), U256::MAX);
    }

    #[test]
    fn test_health_factor_with_threshold() {
        // 100 ETH collateral at 80% threshold, 40 ETH debt -> HF = 2.0
        let hf = health_factor(U256::from(100u64) * WAD, U256::from(40u64) * WAD, 8000);
        assert_eq!(hf, U256::from(2u64) * WAD);
    }

    #[test]
    fn test_weighted_threshold() {
        // 50 @ 80% + 50 @ 70% -> 75%
        let sum = U256::from(50u64) * U256::from(8000u64) + U256::from(50u64) * U256::from(7000u64);
        assert_eq!(weighted_threshold(sum, U256::from(100u64)), 7500);
        assert_eq!(weighted_threshold(sum, U256::ZERO), 0);
    }

    #[test]
    fn test_is_liquidatable() {
        let hf_low = (WAD * U256::from(9u64)) / U256::from(10u64);
        assert!(is_liquidatable_wad(hf_low));
        assert!(!is_liquidatable_wad(WAD));
    }

    #[test]
    fn test_wad_to_f64() {
        let wad = U256::from(1000u64) * WAD;
        assert!((wad_to_f64(wad) - 1000.0).abs() < 0.001);
        assert!(wad_to_f64(U256::MAX).is_infinite());
    }

    #[test]
    fn test_pow10_lookup() {
        assert_eq!(pow10(0), U256::from(1u64));
        assert_eq!(pow10(6), U256::from(1_000_000u64));
        assert_eq!(pow10(18), WAD);
    }
}
