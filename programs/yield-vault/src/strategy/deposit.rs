use solana_sdk::pubkey::Pubkey;

use crate::capability::{Amm, Context, TokenLedger};
use crate::error::{Result, VaultError};
use crate::events::Event;

use super::{Strategy, StrategyAccounts};

impl Strategy {
    /// Turn a pair of assets into vault shares.
    ///
    /// Effective flow:
    ///   1. caller → strategy          : amount_a, amount_b
    ///   2. strategy → pair            : the optimal (used_a, used_b), minted LP
    ///   3. strategy → caller          : unused A / B refunded
    ///   4. strategy → reward engine   : all minted LP staked
    ///   5. share ledger               : shares for `lp` credited to caller
    pub fn deposit<L: TokenLedger, A: Amm<L>>(
        &mut self,
        ctx: &mut Context<'_, L>,
        accounts: &mut StrategyAccounts<'_, A>,
        caller: &Pubkey,
        amount_a: u64,
        amount_b: u64,
    ) -> Result<u64> {
        if amount_a == 0 || amount_b == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.check_accounts::<L, A>(accounts)?;

        ctx.tokens
            .transfer_from(&self.token_a, &self.id, caller, &self.id, amount_a)?;
        ctx.tokens
            .transfer_from(&self.token_b, &self.id, caller, &self.id, amount_b)?;

        // ── Provide liquidity within tolerance ───────────────────────────────
        let (min_a, min_b) = self.liquidity_minimums::<L, A>(&*accounts.amm, amount_a, amount_b)?;
        let added = accounts.amm.add_liquidity(
            ctx.tokens,
            &self.id,
            &self.token_a,
            &self.token_b,
            amount_a,
            amount_b,
            min_a,
            min_b,
        )?;

        // ── Refund whatever the pair did not take ────────────────────────────
        let refund_a = amount_a
            .checked_sub(added.used_a)
            .ok_or(VaultError::ArithmeticFault)?;
        let refund_b = amount_b
            .checked_sub(added.used_b)
            .ok_or(VaultError::ArithmeticFault)?;
        if refund_a > 0 {
            ctx.tokens.transfer(&self.token_a, &self.id, caller, refund_a)?;
        }
        if refund_b > 0 {
            ctx.tokens.transfer(&self.token_b, &self.id, caller, refund_b)?;
        }

        accounts.rewards.stake(ctx, &self.id, added.lp)?;
        let shares = accounts.vault.deposit(ctx, &self.id, added.lp, caller)?;

        tracing::info!(
            caller = %caller,
            used_a = added.used_a,
            used_b = added.used_b,
            lp = added.lp,
            shares,
            "strategy deposit"
        );
        ctx.emit(Event::StrategyDeposit {
            account: *caller,
            amount_a: added.used_a,
            amount_b: added.used_b,
            lp: added.lp,
            shares,
        });
        Ok(shares)
    }
}
