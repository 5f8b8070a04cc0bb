use solana_sdk::pubkey::Pubkey;

use crate::capability::{Amm, Context, TokenLedger};
use crate::error::{Result, VaultError};
use crate::events::Event;
use crate::math::{min_with_slippage, mul_div_floor};

use super::{Strategy, StrategyAccounts};

impl Strategy {
    /// Burn exactly `shares` and return the caller's slice of the pool assets.
    ///
    /// Effective flow:
    ///   1. share ledger               : `shares` redeemed for `lp` (floored)
    ///   2. reward engine → strategy   : `lp` unstaked
    ///   3. strategy → pair            : `lp` burned for (amount_a, amount_b)
    ///   4. strategy → caller          : amount_a, amount_b
    pub fn withdraw<L: TokenLedger, A: Amm<L>>(
        &mut self,
        ctx: &mut Context<'_, L>,
        accounts: &mut StrategyAccounts<'_, A>,
        caller: &Pubkey,
        shares: u64,
    ) -> Result<(u64, u64)> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.check_accounts::<L, A>(accounts)?;
        if shares > accounts.vault.balance_of(caller) {
            return Err(VaultError::InsufficientBalance);
        }

        let lp = accounts.vault.redeem(ctx, &self.id, shares, caller, caller)?;
        accounts.rewards.withdraw(ctx, &self.id, lp)?;

        // ── Pro-rata quote → slippage minimums ───────────────────────────────
        let reserves = accounts.amm.reserves(&self.token_a, &self.token_b)?;
        let expected_a = mul_div_floor(lp, reserves.reserve_a, reserves.lp_supply)?;
        let expected_b = mul_div_floor(lp, reserves.reserve_b, reserves.lp_supply)?;
        let min_a = min_with_slippage(expected_a, self.slippage_tolerance_bps)?;
        let min_b = min_with_slippage(expected_b, self.slippage_tolerance_bps)?;

        let removed = accounts.amm.remove_liquidity(
            ctx.tokens,
            &self.id,
            &self.token_a,
            &self.token_b,
            lp,
            min_a,
            min_b,
        )?;

        ctx.tokens
            .transfer(&self.token_a, &self.id, caller, removed.amount_a)?;
        ctx.tokens
            .transfer(&self.token_b, &self.id, caller, removed.amount_b)?;

        tracing::info!(
            caller = %caller,
            shares,
            lp,
            amount_a = removed.amount_a,
            amount_b = removed.amount_b,
            "strategy withdraw"
        );
        ctx.emit(Event::StrategyWithdraw {
            account: *caller,
            shares,
            lp,
            amount_a: removed.amount_a,
            amount_b: removed.amount_b,
        });
        Ok((removed.amount_a, removed.amount_b))
    }
}
