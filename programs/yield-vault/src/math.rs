//! Checked integer math shared by the ledger, the reward engine and the
//! in-memory AMM.
//!
//! Every helper widens to `u128` for the intermediate product and maps
//! overflow or an undefined division to [`VaultError::ArithmeticFault`].

use crate::constants::{BPS_DENOMINATOR, MAX_SLIPPAGE_BPS, Q64};
use crate::error::{Result, VaultError};

/// `floor(a * b / d)`.
pub fn mul_div_floor(a: u64, b: u64, d: u64) -> Result<u64> {
    if d == 0 {
        return Err(VaultError::ArithmeticFault);
    }
    let product = (a as u128)
        .checked_mul(b as u128)
        .ok_or(VaultError::ArithmeticFault)?;
    u64::try_from(product / d as u128).map_err(|_| VaultError::ArithmeticFault)
}

/// `ceil(a * b / d)`.
pub fn mul_div_ceil(a: u64, b: u64, d: u64) -> Result<u64> {
    if d == 0 {
        return Err(VaultError::ArithmeticFault);
    }
    let product = (a as u128)
        .checked_mul(b as u128)
        .ok_or(VaultError::ArithmeticFault)?;
    let d = d as u128;
    let q = product / d;
    let q = if product % d == 0 { q } else { q + 1 };
    u64::try_from(q).map_err(|_| VaultError::ArithmeticFault)
}

/// Lowest acceptable output for a quoted `amount` under `slippage_bps`.
///
/// `min = amount * (10_000 − bps) / 10_000`, rounded down.
pub fn min_with_slippage(amount: u64, slippage_bps: u16) -> Result<u64> {
    if slippage_bps > MAX_SLIPPAGE_BPS {
        return Err(VaultError::InvalidParameter(format!(
            "slippage {slippage_bps} bps exceeds {MAX_SLIPPAGE_BPS}"
        )));
    }
    let keep = BPS_DENOMINATOR - slippage_bps as u128;
    let min = (amount as u128)
        .checked_mul(keep)
        .ok_or(VaultError::ArithmeticFault)?
        / BPS_DENOMINATOR;
    Ok(min as u64)
}

// ─── Integer square root (Babylonian method) ──────────────────────────────
pub fn isqrt(n: u128) -> u128 {
    if n == 0 {
        return 0;
    }
    let mut x = n;
    let mut y = (x + 1) >> 1;
    while y < x {
        x = y;
        y = (y + n / y) >> 1;
    }
    x
}

// ─── Reward-per-token accumulator ──────────────────────────────────────────

/// Q64.64 growth of the reward-per-token accumulator when `emitted` reward
/// units are spread over `total_staked`.
///
/// Returns zero when nothing is staked; the emission for that window is not
/// attributed to anyone.
pub fn reward_per_token_delta(emitted: u64, total_staked: u64) -> Result<u128> {
    if total_staked == 0 || emitted == 0 {
        return Ok(0);
    }
    let emitted = emitted as u128;
    // Divide-first to avoid u128 overflow: q * Q64 + r * Q64 / total_staked
    let total = total_staked as u128;
    let q = emitted / total;
    let r = emitted % total;
    q.checked_mul(Q64)
        .ok_or(VaultError::ArithmeticFault)?
        .checked_add(r * Q64 / total)
        .ok_or(VaultError::ArithmeticFault)
}

/// `balance × delta >> 64` (Q64.64 → integer), floored.
pub fn accrued_for(balance: u64, accumulator_delta: u128) -> Result<u64> {
    let raw = (balance as u128)
        .checked_mul(accumulator_delta)
        .ok_or(VaultError::ArithmeticFault)?
        >> 64;
    u64::try_from(raw).map_err(|_| VaultError::ArithmeticFault)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_rounds_in_the_requested_direction() {
        assert_eq!(mul_div_floor(10, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_ceil(10, 1, 3).unwrap(), 4);
        assert_eq!(mul_div_ceil(9, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_floor(u64::MAX, u64::MAX, u64::MAX).unwrap(), u64::MAX);
    }

    #[test]
    fn mul_div_faults_on_zero_denominator_and_overflow() {
        assert_eq!(mul_div_floor(1, 1, 0), Err(VaultError::ArithmeticFault));
        assert_eq!(mul_div_ceil(1, 1, 0), Err(VaultError::ArithmeticFault));
        assert_eq!(mul_div_floor(u64::MAX, 2, 1), Err(VaultError::ArithmeticFault));
    }

    #[test]
    fn slippage_minimum_is_bounded() {
        assert_eq!(min_with_slippage(10_000, 50).unwrap(), 9_950);
        assert_eq!(min_with_slippage(10_000, 0).unwrap(), 10_000);
        assert_eq!(min_with_slippage(10_000, 10_000).unwrap(), 0);
        assert!(matches!(
            min_with_slippage(10_000, 10_001),
            Err(VaultError::InvalidParameter(_))
        ));
    }

    #[test]
    fn isqrt_matches_perfect_squares() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(1_000_000), 1_000);
        assert_eq!(isqrt(999_999), 999);
    }

    #[test]
    fn accumulator_round_trips_exact_emission() {
        // 3600 units over 100 staked → 36 per staked unit.
        let delta = reward_per_token_delta(3_600, 100).unwrap();
        assert_eq!(delta, 36 * Q64);
        assert_eq!(accrued_for(100, delta).unwrap(), 3_600);
    }

    #[test]
    fn accumulator_is_zero_without_stake() {
        assert_eq!(reward_per_token_delta(3_600, 0).unwrap(), 0);
    }
}
