use crate::capability::{Amm, Context, TokenLedger};
use crate::error::{Result, VaultError};
use crate::events::Event;

use super::{Strategy, StrategyAccounts};

impl Strategy {
    /// Compound: harvest, swap the reward balance into the pool assets, add
    /// liquidity, stake it and credit the new LP to every share holder at
    /// once through [`ShareLedger::accrue`](crate::share_ledger::ShareLedger::accrue).
    ///
    /// Returns the LP added to the position; zero when there was nothing
    /// worth swapping. A reward balance too small to quote above zero on
    /// every leg stays with the strategy until it grows.
    pub fn reinvest_rewards<L: TokenLedger, A: Amm<L>>(
        &mut self,
        ctx: &mut Context<'_, L>,
        accounts: &mut StrategyAccounts<'_, A>,
    ) -> Result<u64> {
        self.check_accounts::<L, A>(accounts)?;
        self.harvest(ctx, accounts)?;

        let rewards = ctx.tokens.balance_of(&self.reward_token, &self.id);
        let half = rewards / 2;
        if half == 0 {
            return Ok(0);
        }

        // ── Rewards → pool assets ────────────────────────────────────────────
        let (token_a, token_b, reward) = (self.token_a, self.token_b, self.reward_token);
        let legs = if reward == token_a {
            vec![(token_a, token_b, half)]
        } else if reward == token_b {
            vec![(token_b, token_a, half)]
        } else {
            vec![(reward, token_a, half), (reward, token_b, rewards - half)]
        };
        for (token_in, token_out, amount_in) in &legs {
            if accounts.amm.quote_swap(token_in, token_out, *amount_in)? == 0 {
                tracing::debug!(rewards, amount_in, "reward dust quotes to zero, kept for later");
                return Ok(0);
            }
        }
        for (token_in, token_out, amount_in) in legs {
            self.swap_with_tolerance(ctx, &mut *accounts.amm, &token_in, &token_out, amount_in)?;
        }

        // ── Pool assets → staked LP ──────────────────────────────────────────
        let idle_a = ctx.tokens.balance_of(&token_a, &self.id);
        let idle_b = ctx.tokens.balance_of(&token_b, &self.id);
        let (min_a, min_b) = self.liquidity_minimums::<L, A>(&*accounts.amm, idle_a, idle_b)?;
        let added = accounts
            .amm
            .add_liquidity(ctx.tokens, &self.id, &token_a, &token_b, idle_a, idle_b, min_a, min_b)?;

        self.total_reinvested_lp = self
            .total_reinvested_lp
            .checked_add(added.lp)
            .ok_or(VaultError::ArithmeticFault)?;
        accounts.rewards.stake(ctx, &self.id, added.lp)?;
        let total_assets = accounts.vault.accrue(ctx, &self.id, added.lp)?;

        tracing::info!(rewards, lp = added.lp, total_assets, "rewards reinvested");
        ctx.emit(Event::Reinvested { rewards, lp: added.lp, total_assets });
        Ok(added.lp)
    }
}
