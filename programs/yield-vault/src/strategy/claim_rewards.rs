use solana_sdk::pubkey::Pubkey;

use crate::capability::{Amm, Context, TokenLedger};
use crate::error::{Result, VaultError};
use crate::events::Event;
use crate::math::mul_div_floor;

use super::{Strategy, StrategyAccounts};

impl Strategy {
    /// Harvest the pooled reward and forward the caller's pro-rata slice of
    /// what was just harvested: `harvested * caller_shares / total_shares`.
    /// The rest stays with the strategy for the next reinvest.
    pub fn claim_rewards<L: TokenLedger, A: Amm<L>>(
        &mut self,
        ctx: &mut Context<'_, L>,
        accounts: &mut StrategyAccounts<'_, A>,
        caller: &Pubkey,
    ) -> Result<u64> {
        self.check_accounts::<L, A>(accounts)?;
        let shares = accounts.vault.balance_of(caller);
        let total_shares = accounts.vault.total_supply();

        let harvested = self.harvest(ctx, accounts)?;
        if harvested == 0 || shares == 0 {
            return Ok(0);
        }

        let amount = mul_div_floor(harvested, shares, total_shares)?;
        if amount == 0 {
            return Ok(0);
        }
        ctx.tokens
            .transfer(&self.reward_token, &self.id, caller, amount)?;

        tracing::info!(caller = %caller, harvested, amount, "rewards forwarded");
        ctx.emit(Event::RewardsForwarded { account: *caller, harvested, amount });
        Ok(amount)
    }

    /// Pull everything the engine owes the strategy.
    pub(super) fn harvest<L: TokenLedger, A>(
        &mut self,
        ctx: &mut Context<'_, L>,
        accounts: &mut StrategyAccounts<'_, A>,
    ) -> Result<u64> {
        let harvested = accounts.rewards.get_reward(ctx, &self.id)?;
        self.total_harvested = self
            .total_harvested
            .checked_add(harvested)
            .ok_or(VaultError::ArithmeticFault)?;
        Ok(harvested)
    }
}

#[cfg(test)]
mod tests {
    use crate::capability::TokenLedger;
    use crate::strategy::fixture::{Env, REWARD_RATE};

    #[test]
    fn claim_forwards_pro_rata_of_harvest() {
        let mut env = Env::new();
        let (alice, bob) = (env.user(10_000), env.user(10_000));
        let reward = env.strategy.reward_token();
        let (strategy, mut ctx, mut accounts) = env.parts();
        strategy.deposit(&mut ctx, &mut accounts, &alice, 1_000, 1_000).unwrap();
        strategy.deposit(&mut ctx, &mut accounts, &bob, 3_000, 3_000).unwrap();

        env.warp(100);
        let (strategy, mut ctx, mut accounts) = env.parts();
        let paid = strategy.claim_rewards(&mut ctx, &mut accounts, &alice).unwrap();
        let harvested = 100 * REWARD_RATE;
        assert_eq!(paid, harvested / 4);
        let strategy_id = strategy.id();
        assert_eq!(env.tokens.balance_of(&reward, &alice), 250);
        assert_eq!(env.tokens.balance_of(&reward, &strategy_id), 750);
        assert_eq!(env.strategy.total_harvested(), harvested);
    }

    #[test]
    fn second_claim_in_same_instant_pays_nothing() {
        let mut env = Env::new();
        let alice = env.user(10_000);
        let (strategy, mut ctx, mut accounts) = env.parts();
        strategy.deposit(&mut ctx, &mut accounts, &alice, 1_000, 1_000).unwrap();

        env.warp(3_600);
        let (strategy, mut ctx, mut accounts) = env.parts();
        assert_eq!(strategy.claim_rewards(&mut ctx, &mut accounts, &alice).unwrap(), 3_600 * REWARD_RATE);
        let mark = ctx.events.len();
        assert_eq!(strategy.claim_rewards(&mut ctx, &mut accounts, &alice).unwrap(), 0);
        assert_eq!(ctx.events.len(), mark);
    }

    #[test]
    fn holder_without_shares_gets_nothing() {
        let mut env = Env::new();
        let (alice, stranger) = (env.user(10_000), env.user(0));
        let (strategy, mut ctx, mut accounts) = env.parts();
        strategy.deposit(&mut ctx, &mut accounts, &alice, 1_000, 1_000).unwrap();
        env.warp(100);
        let (strategy, mut ctx, mut accounts) = env.parts();
        assert_eq!(strategy.claim_rewards(&mut ctx, &mut accounts, &stranger).unwrap(), 0);
        // The harvest still happened; it waits for reinvest.
        assert_eq!(strategy.total_harvested(), 100 * REWARD_RATE);
    }
}
