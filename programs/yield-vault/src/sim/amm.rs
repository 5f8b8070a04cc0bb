use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::accounts::{pubkey_str, AccountMap};
use crate::capability::{
    amount_out, optimal_amounts, Amm, LiquidityAdded, LiquidityRemoved, Mintable, PairReserves,
    TokenLedger,
};
use crate::constants::AMM_FEE_BPS;
use crate::error::{Result, VaultError};
use crate::math::{isqrt, mul_div_floor};

/// PDA seed for pair handles
pub const PAIR_SEED: &[u8] = b"pair";

// ─── Pair ──────────────────────────────────────────────────────────────────
// Constant-product pair (x * y = k). The pair handle owns both reserves in
// the token ledger and is also the mint of the pair's LP token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Pair {
    #[serde(with = "pubkey_str")]
    token_0: Pubkey,
    #[serde(with = "pubkey_str")]
    token_1: Pubkey,
    reserve_0: u64,
    reserve_1: u64,
    /// Total LP outstanding (mirrors the LP mint's supply)
    lp_supply: u64,
}

impl Pair {
    /// Reserves in the caller's `(token_a, token_b)` order.
    fn oriented(&self, token_a: &Pubkey) -> (u64, u64) {
        if *token_a == self.token_0 {
            (self.reserve_0, self.reserve_1)
        } else {
            (self.reserve_1, self.reserve_0)
        }
    }

    fn set_oriented(&mut self, token_a: &Pubkey, reserve_a: u64, reserve_b: u64) {
        if *token_a == self.token_0 {
            self.reserve_0 = reserve_a;
            self.reserve_1 = reserve_b;
        } else {
            self.reserve_0 = reserve_b;
            self.reserve_1 = reserve_a;
        }
    }
}

/// Uniswap-V2-shaped router over in-memory pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantProductAmm {
    #[serde(with = "pubkey_str")]
    id: Pubkey,
    fee_bps: u16,
    pairs: AccountMap<Pair>,
}

impl ConstantProductAmm {
    pub fn new(id: Pubkey) -> Self {
        Self::with_fee(id, AMM_FEE_BPS)
    }

    pub fn with_fee(id: Pubkey, fee_bps: u16) -> Self {
        Self { id, fee_bps, pairs: AccountMap::default() }
    }

    pub fn fee_bps(&self) -> u16 {
        self.fee_bps
    }

    /// Deterministic pair handle for an unordered token pair.
    pub fn derive_pair(&self, token_a: &Pubkey, token_b: &Pubkey) -> Pubkey {
        let (t0, t1) = sort_tokens(token_a, token_b);
        Pubkey::find_program_address(&[PAIR_SEED, t0.as_ref(), t1.as_ref()], &self.id).0
    }

    fn pair(&self, token_a: &Pubkey, token_b: &Pubkey) -> Result<(Pubkey, &Pair)> {
        let handle = self.derive_pair(token_a, token_b);
        let pair = self.pairs.get(&handle).ok_or(VaultError::PairNotFound)?;
        Ok((handle, pair))
    }
}

fn sort_tokens<'a>(a: &'a Pubkey, b: &'a Pubkey) -> (&'a Pubkey, &'a Pubkey) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn require_min(actual: u64, minimum: u64) -> Result<()> {
    if actual < minimum {
        return Err(VaultError::SlippageExceeded { actual, minimum });
    }
    Ok(())
}

impl<L: TokenLedger + Mintable> Amm<L> for ConstantProductAmm {
    fn id(&self) -> Pubkey {
        self.id
    }

    fn create_pair(&mut self, token_a: &Pubkey, token_b: &Pubkey) -> Result<Pubkey> {
        if token_a == token_b {
            return Err(VaultError::InvalidParameter("identical pair tokens".into()));
        }
        let handle = self.derive_pair(token_a, token_b);
        if self.pairs.contains_key(&handle) {
            return Err(VaultError::InvalidParameter(format!("pair {handle} already exists")));
        }
        let (t0, t1) = sort_tokens(token_a, token_b);
        self.pairs.insert(
            handle,
            Pair { token_0: *t0, token_1: *t1, reserve_0: 0, reserve_1: 0, lp_supply: 0 },
        );
        tracing::debug!(pair = %handle, "pair created");
        Ok(handle)
    }

    fn get_pair(&self, token_a: &Pubkey, token_b: &Pubkey) -> Option<Pubkey> {
        self.pair(token_a, token_b).ok().map(|(handle, _)| handle)
    }

    fn reserves(&self, token_a: &Pubkey, token_b: &Pubkey) -> Result<PairReserves> {
        let (handle, pair) = self.pair(token_a, token_b)?;
        let (reserve_a, reserve_b) = pair.oriented(token_a);
        Ok(PairReserves { pair: handle, reserve_a, reserve_b, lp_supply: pair.lp_supply })
    }

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
    ) -> Result<LiquidityAdded> {
        if amount_a == 0 || amount_b == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let (handle, pair) = self.pair(token_a, token_b)?;
        let (reserve_a, reserve_b) = pair.oriented(token_a);
        let lp_supply = pair.lp_supply;

        let (used_a, used_b) = optimal_amounts(amount_a, amount_b, reserve_a, reserve_b)?;
        require_min(used_a, min_a)?;
        require_min(used_b, min_b)?;

        let lp = if lp_supply == 0 {
            // First deposit: LP = sqrt(a * b)
            isqrt(used_a as u128 * used_b as u128) as u64
        } else {
            // Proportional to smaller ratio to prevent dilution
            let lp_a = mul_div_floor(used_a, lp_supply, reserve_a)?;
            let lp_b = mul_div_floor(used_b, lp_supply, reserve_b)?;
            lp_a.min(lp_b)
        };
        if lp == 0 {
            return Err(VaultError::InsufficientLiquidity);
        }

        {
            let pair = self.pairs.get_mut(&handle).ok_or(VaultError::PairNotFound)?;
            let new_a = reserve_a.checked_add(used_a).ok_or(VaultError::ArithmeticFault)?;
            let new_b = reserve_b.checked_add(used_b).ok_or(VaultError::ArithmeticFault)?;
            pair.set_oriented(token_a, new_a, new_b);
            pair.lp_supply = lp_supply.checked_add(lp).ok_or(VaultError::ArithmeticFault)?;
        }

        ledger.transfer_from(token_a, &self.id, caller, &handle, used_a)?;
        ledger.transfer_from(token_b, &self.id, caller, &handle, used_b)?;
        ledger.mint_to(&handle, caller, lp)?;

        tracing::debug!(pair = %handle, used_a, used_b, lp, "liquidity added");
        Ok(LiquidityAdded { used_a, used_b, lp })
    }

    fn remove_liquidity(
        &mut self,
        ledger: &mut L,
        caller: &Pubkey,
        token_a: &Pubkey,
        token_b: &Pubkey,
        lp: u64,
        min_a: u64,
        min_b: u64,
    ) -> Result<LiquidityRemoved> {
        if lp == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let (handle, pair) = self.pair(token_a, token_b)?;
        let (reserve_a, reserve_b) = pair.oriented(token_a);
        let lp_supply = pair.lp_supply;
        if lp > lp_supply {
            return Err(VaultError::InsufficientLiquidity);
        }

        // Proportional amounts to return
        let amount_a = mul_div_floor(lp, reserve_a, lp_supply)?;
        let amount_b = mul_div_floor(lp, reserve_b, lp_supply)?;
        require_min(amount_a, min_a)?;
        require_min(amount_b, min_b)?;

        {
            let pair = self.pairs.get_mut(&handle).ok_or(VaultError::PairNotFound)?;
            pair.set_oriented(token_a, reserve_a - amount_a, reserve_b - amount_b);
            pair.lp_supply = lp_supply - lp;
        }

        ledger.transfer_from(&handle, &self.id, caller, &handle, lp)?;
        ledger.burn(&handle, &handle, lp)?;
        ledger.transfer(token_a, &handle, caller, amount_a)?;
        ledger.transfer(token_b, &handle, caller, amount_b)?;

        tracing::debug!(pair = %handle, lp, amount_a, amount_b, "liquidity removed");
        Ok(LiquidityRemoved { amount_a, amount_b })
    }

    fn swap_exact_tokens(
        &mut self,
        ledger: &mut L,
        caller: &Pubkey,
        token_in: &Pubkey,
        token_out: &Pubkey,
        amount_in: u64,
        min_amount_out: u64,
    ) -> Result<u64> {
        if amount_in == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let (handle, pair) = self.pair(token_in, token_out)?;
        let (reserve_in, reserve_out) = pair.oriented(token_in);
        let out = amount_out(amount_in, reserve_in, reserve_out, self.fee_bps)?;
        require_min(out, min_amount_out)?;
        if out == 0 {
            return Err(VaultError::ZeroAmount);
        }

        {
            let pair = self.pairs.get_mut(&handle).ok_or(VaultError::PairNotFound)?;
            let new_in = reserve_in.checked_add(amount_in).ok_or(VaultError::ArithmeticFault)?;
            pair.set_oriented(token_in, new_in, reserve_out - out);
        }

        ledger.transfer_from(token_in, &self.id, caller, &handle, amount_in)?;
        ledger.transfer(token_out, &handle, caller, out)?;

        tracing::debug!(pair = %handle, amount_in, out, "swap");
        Ok(out)
    }

    fn quote_swap(&self, token_in: &Pubkey, token_out: &Pubkey, amount_in: u64) -> Result<u64> {
        let (_, pair) = self.pair(token_in, token_out)?;
        let (reserve_in, reserve_out) = pair.oriented(token_in);
        amount_out(amount_in, reserve_in, reserve_out, self.fee_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::MemoryLedger;

    struct Fixture {
        ledger: MemoryLedger,
        amm: ConstantProductAmm,
        token_a: Pubkey,
        token_b: Pubkey,
        lp: Pubkey,
        agent: Pubkey,
    }

    fn fixture() -> Fixture {
        let (token_a, token_b, agent) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let mut ledger = MemoryLedger::new();
        let mut amm = ConstantProductAmm::new(Pubkey::new_unique());
        let lp = Amm::<MemoryLedger>::create_pair(&mut amm, &token_a, &token_b).unwrap();
        let router = Amm::<MemoryLedger>::id(&amm);
        for mint in [token_a, token_b] {
            ledger.mint_to(&mint, &agent, 1_000_000).unwrap();
        }
        for mint in [token_a, token_b, lp] {
            ledger.approve(&mint, &agent, &router, u64::MAX).unwrap();
        }
        Fixture { ledger, amm, token_a, token_b, lp, agent }
    }

    #[test]
    fn first_deposit_mints_geometric_mean() {
        let mut f = fixture();
        let added = f
            .amm
            .add_liquidity(&mut f.ledger, &f.agent, &f.token_a, &f.token_b, 10_000, 40_000, 0, 0)
            .unwrap();
        assert_eq!(added, LiquidityAdded { used_a: 10_000, used_b: 40_000, lp: 20_000 });
        assert_eq!(f.ledger.balance_of(&f.lp, &f.agent), 20_000);
        assert_eq!(f.ledger.balance_of(&f.token_a, &f.agent), 990_000);

        let reserves = Amm::<MemoryLedger>::reserves(&f.amm, &f.token_b, &f.token_a).unwrap();
        assert_eq!((reserves.reserve_a, reserves.reserve_b), (40_000, 10_000));
    }

    #[test]
    fn unbalanced_deposit_is_trimmed_and_min_enforced() {
        let mut f = fixture();
        f.amm
            .add_liquidity(&mut f.ledger, &f.agent, &f.token_a, &f.token_b, 10_000, 10_000, 0, 0)
            .unwrap();
        let added = f
            .amm
            .add_liquidity(&mut f.ledger, &f.agent, &f.token_a, &f.token_b, 1_000, 5_000, 0, 0)
            .unwrap();
        assert_eq!((added.used_a, added.used_b, added.lp), (1_000, 1_000, 1_000));

        let err = f
            .amm
            .add_liquidity(&mut f.ledger, &f.agent, &f.token_a, &f.token_b, 1_000, 5_000, 0, 2_000)
            .unwrap_err();
        assert_eq!(err, VaultError::SlippageExceeded { actual: 1_000, minimum: 2_000 });
    }

    #[test]
    fn remove_returns_pro_rata_reserves() {
        let mut f = fixture();
        let added = f
            .amm
            .add_liquidity(&mut f.ledger, &f.agent, &f.token_a, &f.token_b, 10_000, 40_000, 0, 0)
            .unwrap();
        let out = f
            .amm
            .remove_liquidity(&mut f.ledger, &f.agent, &f.token_a, &f.token_b, added.lp / 2, 0, 0)
            .unwrap();
        assert_eq!(out, LiquidityRemoved { amount_a: 5_000, amount_b: 20_000 });
        assert_eq!(f.ledger.total_supply(&f.lp), 10_000);
    }

    #[test]
    fn swap_respects_minimum_out() {
        let mut f = fixture();
        f.amm
            .add_liquidity(&mut f.ledger, &f.agent, &f.token_a, &f.token_b, 100_000, 100_000, 0, 0)
            .unwrap();
        let quoted = Amm::<MemoryLedger>::quote_swap(&f.amm, &f.token_a, &f.token_b, 1_000).unwrap();
        let err = f
            .amm
            .swap_exact_tokens(&mut f.ledger, &f.agent, &f.token_a, &f.token_b, 1_000, quoted + 1)
            .unwrap_err();
        assert!(matches!(err, VaultError::SlippageExceeded { .. }));

        let out = f
            .amm
            .swap_exact_tokens(&mut f.ledger, &f.agent, &f.token_a, &f.token_b, 1_000, quoted)
            .unwrap();
        assert_eq!(out, quoted);
    }

    #[test]
    fn unknown_pair_is_reported() {
        let f = fixture();
        let stranger = Pubkey::new_unique();
        assert_eq!(
            Amm::<MemoryLedger>::reserves(&f.amm, &f.token_a, &stranger),
            Err(VaultError::PairNotFound)
        );
    }
}
