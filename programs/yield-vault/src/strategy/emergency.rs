use solana_sdk::pubkey::Pubkey;

use crate::capability::{Amm, Context, TokenLedger};
use crate::error::Result;
use crate::events::Event;

use super::{Strategy, StrategyAccounts};

/// What an emergency exit swept to the owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmergencyExit {
    pub lp: u64,
    pub amount_a: u64,
    pub amount_b: u64,
    pub rewards: u64,
}

impl Strategy {
    /// Owner-only unwind: unstake everything, burn all LP with no minimums
    /// and sweep A, B and reward balances to the owner.
    ///
    /// Share balances are left as they are; holders' claims are settled
    /// off-ledger by the owner.
    pub fn emergency_withdraw<L: TokenLedger, A: Amm<L>>(
        &mut self,
        ctx: &mut Context<'_, L>,
        accounts: &mut StrategyAccounts<'_, A>,
        caller: &Pubkey,
    ) -> Result<EmergencyExit> {
        self.owner.require_owner(caller)?;
        self.check_accounts::<L, A>(accounts)?;
        tracing::warn!(owner = %caller, "strategy emergency withdraw");

        let (unstaked, _) = accounts.rewards.exit(ctx, &self.id)?;

        let lp = ctx.tokens.balance_of(&self.pair, &self.id);
        if lp > 0 {
            accounts
                .amm
                .remove_liquidity(ctx.tokens, &self.id, &self.token_a, &self.token_b, lp, 0, 0)?;
        }

        let mut swept = EmergencyExit { lp, ..EmergencyExit::default() };
        swept.amount_a = self.sweep(ctx, &self.token_a, caller)?;
        swept.amount_b = self.sweep(ctx, &self.token_b, caller)?;
        if self.reward_token != self.token_a && self.reward_token != self.token_b {
            swept.rewards = self.sweep(ctx, &self.reward_token, caller)?;
        }

        tracing::warn!(
            owner = %caller,
            unstaked,
            lp,
            amount_a = swept.amount_a,
            amount_b = swept.amount_b,
            rewards = swept.rewards,
            "strategy unwound"
        );
        ctx.emit(Event::StrategyEmergencyExit {
            owner: *caller,
            lp,
            amount_a: swept.amount_a,
            amount_b: swept.amount_b,
            rewards: swept.rewards,
        });
        Ok(swept)
    }

    fn sweep<L: TokenLedger>(&self, ctx: &mut Context<'_, L>, mint: &Pubkey, to: &Pubkey) -> Result<u64> {
        let amount = ctx.tokens.balance_of(mint, &self.id);
        ctx.tokens.transfer(mint, &self.id, to, amount)?;
        Ok(amount)
    }
}
