use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::accounts::pubkey_str;
use crate::constants::BPS_DENOMINATOR;
use crate::error::{Result, VaultError};
use crate::math::mul_div_floor;

use super::asset::TokenLedger;

/// Pair state oriented to the `(token_a, token_b)` order the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairReserves {
    /// Pair handle; also the mint of the pair's LP token.
    #[serde(with = "pubkey_str")]
    pub pair: Pubkey,
    pub reserve_a: u64,
    pub reserve_b: u64,
    pub lp_supply: u64,
}

/// Amounts actually consumed by `add_liquidity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityAdded {
    pub used_a: u64,
    pub used_b: u64,
    pub lp: u64,
}

/// Amounts paid out by `remove_liquidity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityRemoved {
    pub amount_a: u64,
    pub amount_b: u64,
}

/// AMM capability. Token movements go through the ledger passed in; the AMM
/// pulls from `caller` with `transfer_from`, spending the allowance the
/// caller granted to [`Amm::id`].
pub trait Amm<L: TokenLedger> {
    /// Router identity that callers approve.
    fn id(&self) -> Pubkey;

    fn create_pair(&mut self, token_a: &Pubkey, token_b: &Pubkey) -> Result<Pubkey>;

    fn get_pair(&self, token_a: &Pubkey, token_b: &Pubkey) -> Option<Pubkey>;

    fn reserves(&self, token_a: &Pubkey, token_b: &Pubkey) -> Result<PairReserves>;

    #[allow(clippy::too_many_arguments)]
    fn add_liquidity(
        &mut self,
        ledger: &mut L,
        caller: &Pubkey,
        token_a: &Pubkey,
        token_b: &Pubkey,
        amount_a: u64,
        amount_b: u64,
        min_a: u64,
        min_b: u64,
    ) -> Result<LiquidityAdded>;

    #[allow(clippy::too_many_arguments)]
    fn remove_liquidity(
        &mut self,
        ledger: &mut L,
        caller: &Pubkey,
        token_a: &Pubkey,
        token_b: &Pubkey,
        lp: u64,
        min_a: u64,
        min_b: u64,
    ) -> Result<LiquidityRemoved>;

    /// Sell exactly `amount_in` of `token_in`; returns the amount received.
    #[allow(clippy::too_many_arguments)]
    fn swap_exact_tokens(
        &mut self,
        ledger: &mut L,
        caller: &Pubkey,
        token_in: &Pubkey,
        token_out: &Pubkey,
        amount_in: u64,
        min_amount_out: u64,
    ) -> Result<u64>;

    /// Output `swap_exact_tokens` would produce right now.
    fn quote_swap(&self, token_in: &Pubkey, token_out: &Pubkey, amount_in: u64) -> Result<u64>;
}

// ─── Spot-price helpers ────────────────────────────────────────────────────

/// Equivalent amount of the other asset at the current reserve ratio.
pub fn quote(amount: u64, reserve_in: u64, reserve_out: u64) -> Result<u64> {
    if reserve_in == 0 || reserve_out == 0 {
        return Err(VaultError::InsufficientLiquidity);
    }
    mul_div_floor(amount, reserve_out, reserve_in)
}

/// The `(a, b)` pair `add_liquidity` will consume for desired amounts.
///
/// An empty pair takes both amounts as given (first depositor sets the
/// price); otherwise the side in excess is trimmed to the reserve ratio.
pub fn optimal_amounts(
    amount_a: u64,
    amount_b: u64,
    reserve_a: u64,
    reserve_b: u64,
) -> Result<(u64, u64)> {
    if reserve_a == 0 && reserve_b == 0 {
        return Ok((amount_a, amount_b));
    }
    let b_optimal = quote(amount_a, reserve_a, reserve_b)?;
    if b_optimal <= amount_b {
        return Ok((amount_a, b_optimal));
    }
    let a_optimal = quote(amount_b, reserve_b, reserve_a)?;
    Ok((a_optimal.min(amount_a), amount_b))
}

/// Constant-product output after the LP fee: `dy = y * dx_net / (x + dx_net)`.
pub fn amount_out(amount_in: u64, reserve_in: u64, reserve_out: u64, fee_bps: u16) -> Result<u64> {
    if reserve_in == 0 || reserve_out == 0 {
        return Err(VaultError::InsufficientLiquidity);
    }
    let after_fee = (amount_in as u128)
        .checked_mul(BPS_DENOMINATOR - fee_bps as u128)
        .ok_or(VaultError::ArithmeticFault)?
        / BPS_DENOMINATOR;
    let out = (reserve_out as u128)
        .checked_mul(after_fee)
        .ok_or(VaultError::ArithmeticFault)?
        / (reserve_in as u128)
            .checked_add(after_fee)
            .ok_or(VaultError::ArithmeticFault)?;
    Ok(out as u64)
}
