//! Continuous reward emission split across stakers in O(1) per operation.
//!
//! A global reward-per-token accumulator (Q64.64) grows by
//! `elapsed * reward_rate / total_staked` at every checkpoint. Each account
//! remembers the accumulator value it was last settled at, so its pending
//! reward is `balance * (accumulator - paid) >> 64` plus whatever was
//! already settled into `rewards`. The checkpoint runs before every
//! balance or rate change.
//!
//! Emission is paid out of a funded reserve. A checkpoint never emits more
//! than the reserve still holds, so the engine cannot owe more reward than
//! it was given and a claim is always covered.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::accounts::{pubkey_str, AccountMap};
use crate::access::Ownable;
use crate::capability::{Context, TokenLedger};
use crate::error::{Result, VaultError};
use crate::events::Event;
use crate::math::{accrued_for, reward_per_token_delta};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEngine {
    /// Account holding staked principal and undistributed rewards
    #[serde(with = "pubkey_str")]
    id: Pubkey,
    #[serde(with = "pubkey_str")]
    staking_token: Pubkey,
    #[serde(with = "pubkey_str")]
    reward_token: Pubkey,
    owner: Ownable,
    /// Reward units emitted per second across all stakers
    reward_rate: u64,
    /// Funded reward not yet emitted
    reward_reserve: u64,
    last_update_time: u64,
    /// Q64.64, non-decreasing
    reward_per_token_stored: u128,
    total_staked: u64,
    balances: AccountMap<u64>,
    /// Accumulator value each account was last settled at (Q64.64)
    paid: AccountMap<u128>,
    /// Settled but unclaimed rewards
    rewards: AccountMap<u64>,
}

impl RewardEngine {
    pub fn new(
        id: Pubkey,
        staking_token: Pubkey,
        reward_token: Pubkey,
        owner: Pubkey,
        reward_rate: u64,
        now: u64,
    ) -> Self {
        Self {
            id,
            staking_token,
            reward_token,
            owner: Ownable::new(owner),
            reward_rate,
            reward_reserve: 0,
            last_update_time: now,
            reward_per_token_stored: 0,
            total_staked: 0,
            balances: AccountMap::default(),
            paid: AccountMap::default(),
            rewards: AccountMap::default(),
        }
    }

    pub fn id(&self) -> Pubkey {
        self.id
    }

    pub fn staking_token(&self) -> Pubkey {
        self.staking_token
    }

    pub fn reward_token(&self) -> Pubkey {
        self.reward_token
    }

    pub fn owner(&self) -> Pubkey {
        self.owner.owner()
    }

    pub fn reward_rate(&self) -> u64 {
        self.reward_rate
    }

    pub fn reward_reserve(&self) -> u64 {
        self.reward_reserve
    }

    pub fn last_update_time(&self) -> u64 {
        self.last_update_time
    }

    pub fn total_supply(&self) -> u64 {
        self.total_staked
    }

    pub fn balance_of(&self, account: &Pubkey) -> u64 {
        self.balances.value(account)
    }

    /// Emission since the last checkpoint, capped by the reserve. Nothing is
    /// emitted, and nothing leaves the reserve, while nobody is staked.
    fn pending_emission(&self, now: u64) -> u64 {
        if self.total_staked == 0 {
            return 0;
        }
        let elapsed = now.saturating_sub(self.last_update_time) as u128;
        let wanted = elapsed.saturating_mul(self.reward_rate as u128);
        // bounded by a u64 reserve
        wanted.min(self.reward_reserve as u128) as u64
    }

    /// Accumulator value as of `now` (Q64.64). Pure.
    pub fn reward_per_token(&self, now: u64) -> Result<u128> {
        let delta = reward_per_token_delta(self.pending_emission(now), self.total_staked)?;
        self.reward_per_token_stored
            .checked_add(delta)
            .ok_or(VaultError::ArithmeticFault)
    }

    /// Rewards `account` could claim at `now`. Pure.
    pub fn earned(&self, account: &Pubkey, now: u64) -> Result<u64> {
        self.earned_at(account, self.reward_per_token(now)?)
    }

    fn earned_at(&self, account: &Pubkey, reward_per_token: u128) -> Result<u64> {
        let delta = reward_per_token.saturating_sub(self.paid.value(account));
        accrued_for(self.balance_of(account), delta)?
            .checked_add(self.rewards.value(account))
            .ok_or(VaultError::ArithmeticFault)
    }

    // ─── Checkpoint ───────────────────────────────────────────────────────────

    /// Fold elapsed emission into the accumulator and, when given, settle
    /// `account` against it.
    fn update_reward(&mut self, now: u64, account: Option<&Pubkey>) -> Result<()> {
        let emitted = self.pending_emission(now);
        let stored = self.reward_per_token(now)?;
        self.reward_per_token_stored = stored;
        self.reward_reserve = self
            .reward_reserve
            .checked_sub(emitted)
            .ok_or(VaultError::ArithmeticFault)?;
        self.last_update_time = self.last_update_time.max(now);
        tracing::debug!(reward_per_token = stored, emitted, reserve = self.reward_reserve, now, "reward checkpoint");
        if emitted > 0 && self.reward_reserve == 0 {
            tracing::warn!(now, "reward reserve exhausted, emission stopped");
        }

        if let Some(account) = account {
            let earned = self.earned_at(account, stored)?;
            self.rewards.insert(*account, earned);
            self.paid.insert(*account, stored);
        }
        Ok(())
    }

    // ─── Staking ──────────────────────────────────────────────────────────────

    pub fn stake<L: TokenLedger>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        amount: u64,
    ) -> Result<()> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.update_reward(ctx.now, Some(caller))?;

        self.total_staked = self
            .total_staked
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticFault)?;
        let balance = self
            .balance_of(caller)
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticFault)?;
        self.balances.insert(*caller, balance);

        ctx.tokens
            .transfer_from(&self.staking_token, &self.id, caller, &self.id, amount)?;

        tracing::info!(account = %caller, amount, total_staked = self.total_staked, "staked");
        ctx.emit(Event::Staked { account: *caller, amount });
        Ok(())
    }

    pub fn withdraw<L: TokenLedger>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        amount: u64,
    ) -> Result<()> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.update_reward(ctx.now, Some(caller))?;

        let balance = self
            .balance_of(caller)
            .checked_sub(amount)
            .ok_or(VaultError::InsufficientStake)?;
        self.balances.insert(*caller, balance);
        self.total_staked = self
            .total_staked
            .checked_sub(amount)
            .ok_or(VaultError::ArithmeticFault)?;

        ctx.tokens
            .transfer(&self.staking_token, &self.id, caller, amount)?;

        tracing::info!(account = %caller, amount, total_staked = self.total_staked, "unstaked");
        ctx.emit(Event::Withdrawn { account: *caller, amount });
        Ok(())
    }

    /// Pay out everything `caller` has earned. Returns the amount paid; an
    /// empty entitlement is a no-op returning zero.
    pub fn get_reward<L: TokenLedger>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
    ) -> Result<u64> {
        self.update_reward(ctx.now, Some(caller))?;

        let reward = self.rewards.value(caller);
        if reward == 0 {
            return Ok(0);
        }
        self.rewards.insert(*caller, 0);
        ctx.tokens
            .transfer(&self.reward_token, &self.id, caller, reward)?;

        tracing::info!(account = %caller, amount = reward, "reward paid");
        ctx.emit(Event::RewardPaid { account: *caller, amount: reward });
        Ok(reward)
    }

    /// Unstake the whole balance and claim. Returns `(unstaked, reward)`.
    pub fn exit<L: TokenLedger>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
    ) -> Result<(u64, u64)> {
        let balance = self.balance_of(caller);
        if balance > 0 {
            self.withdraw(ctx, caller, balance)?;
        }
        let reward = self.get_reward(ctx, caller)?;
        Ok((balance, reward))
    }

    // ─── Funding ──────────────────────────────────────────────────────────────

    /// Move `amount` of the reward token from `funder` into the reserve.
    /// Returns the new reserve. Emission owed so far is settled first, so a
    /// top-up never pays for time that passed while the reserve was empty.
    pub fn fund<L: TokenLedger>(
        &mut self,
        ctx: &mut Context<'_, L>,
        funder: &Pubkey,
        amount: u64,
    ) -> Result<u64> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.update_reward(ctx.now, None)?;

        self.reward_reserve = self
            .reward_reserve
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticFault)?;
        ctx.tokens
            .transfer(&self.reward_token, funder, &self.id, amount)?;

        tracing::info!(funder = %funder, amount, reserve = self.reward_reserve, "reward reserve funded");
        ctx.emit(Event::RewardFunded { funder: *funder, amount });
        Ok(self.reward_reserve)
    }

    // ─── Admin ────────────────────────────────────────────────────────────────

    /// Change the emission rate. Emission up to now is settled at the old rate.
    pub fn set_reward_rate<L>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        rate: u64,
    ) -> Result<()> {
        self.owner.require_owner(caller)?;
        self.update_reward(ctx.now, None)?;

        let old_rate = self.reward_rate;
        self.reward_rate = rate;

        tracing::info!(old_rate, new_rate = rate, "reward rate updated");
        ctx.emit(Event::RewardRateUpdated { old_rate, new_rate: rate });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Mintable;
    use crate::events::EventLog;
    use crate::sim::MemoryLedger;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    struct Fixture {
        tokens: MemoryLedger,
        events: EventLog,
        engine: RewardEngine,
        stake_mint: Pubkey,
        reward_mint: Pubkey,
        owner: Pubkey,
    }

    impl Fixture {
        fn new(rate: u64) -> Self {
            Self::funded(rate, u64::MAX / 2)
        }

        /// Engine whose reserve holds `funding`, paid in by the owner.
        fn funded(rate: u64, funding: u64) -> Self {
            let (stake_mint, reward_mint, owner) =
                (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
            let mut engine = RewardEngine::new(Pubkey::new_unique(), stake_mint, reward_mint, owner, rate, 0);
            let mut tokens = MemoryLedger::new();
            let mut events = EventLog::default();
            if funding > 0 {
                tokens.mint_to(&reward_mint, &owner, funding).unwrap();
                engine
                    .fund(&mut Context::new(0, &mut tokens, &mut events), &owner, funding)
                    .unwrap();
            }
            Self { tokens, events, engine, stake_mint, reward_mint, owner }
        }

        fn staker(&mut self, amount: u64) -> Pubkey {
            let account = Pubkey::new_unique();
            self.tokens.mint_to(&self.stake_mint, &account, amount).unwrap();
            self.tokens
                .approve(&self.stake_mint, &account, &self.engine.id(), u64::MAX)
                .unwrap();
            account
        }

        fn at(&mut self, now: u64) -> (&mut RewardEngine, Context<'_, MemoryLedger>) {
            (&mut self.engine, Context::new(now, &mut self.tokens, &mut self.events))
        }
    }

    #[test]
    fn single_staker_earns_full_emission() {
        let mut f = Fixture::new(0);
        let alice = f.staker(100);
        let owner = f.owner;
        let (engine, mut ctx) = f.at(0);
        engine.stake(&mut ctx, &alice, 100).unwrap();
        engine.set_reward_rate(&mut ctx, &owner, 1).unwrap();

        // 1/s over 100 staked divides exactly: 36 per staked unit.
        assert_eq!(engine.earned(&alice, 3_600).unwrap(), 3_600);

        let (engine, mut ctx) = f.at(3_600);
        assert_eq!(engine.get_reward(&mut ctx, &alice).unwrap(), 3_600);
        assert_eq!(f.tokens.balance_of(&f.reward_mint, &alice), 3_600);
    }

    #[test]
    fn emission_stops_at_the_funded_reserve() {
        let mut f = Fixture::funded(1, 1_000);
        let alice = f.staker(100);
        let owner = f.owner;
        let (engine, mut ctx) = f.at(0);
        engine.stake(&mut ctx, &alice, 100).unwrap();

        // 5000s at 1/s wants 5000 but only 1000 was funded.
        assert_eq!(f.engine.earned(&alice, 5_000).unwrap(), 1_000);
        let (engine, mut ctx) = f.at(5_000);
        assert_eq!(engine.get_reward(&mut ctx, &alice).unwrap(), 1_000);
        assert_eq!(engine.reward_reserve(), 0);
        assert_eq!(f.tokens.balance_of(&f.reward_mint, &f.engine.id()), 0);

        // An empty reserve freezes nothing: claims return zero, stake moves.
        let (engine, mut ctx) = f.at(6_000);
        assert_eq!(engine.get_reward(&mut ctx, &alice).unwrap(), 0);
        engine.withdraw(&mut ctx, &alice, 50).unwrap();
        engine.stake(&mut ctx, &alice, 50).unwrap();

        // A top-up pays from the moment it lands, not for the dry spell.
        f.tokens.mint_to(&f.reward_mint, &owner, 500).unwrap();
        let (engine, mut ctx) = f.at(7_000);
        assert_eq!(engine.fund(&mut ctx, &owner, 500).unwrap(), 500);
        assert_eq!(ctx.events.last(), Some(&Event::RewardFunded { funder: owner, amount: 500 }));
        assert_eq!(f.engine.earned(&alice, 7_000).unwrap(), 0);
        assert_eq!(f.engine.earned(&alice, 7_100).unwrap(), 100);
        assert_eq!(f.engine.earned(&alice, 9_000).unwrap(), 500);
    }

    #[test]
    fn funding_requires_tokens_and_a_positive_amount() {
        let mut f = Fixture::funded(1, 0);
        let stranger = Pubkey::new_unique();
        let (engine, mut ctx) = f.at(0);
        assert_eq!(engine.fund(&mut ctx, &stranger, 0), Err(VaultError::ZeroAmount));
        assert_eq!(engine.fund(&mut ctx, &stranger, 10), Err(VaultError::InsufficientBalance));
    }

    #[test]
    fn late_joiner_only_earns_after_joining() {
        let mut f = Fixture::new(10);
        let (alice, bob) = (f.staker(100), f.staker(300));
        let (engine, mut ctx) = f.at(0);
        engine.stake(&mut ctx, &alice, 100).unwrap();
        let (engine, mut ctx) = f.at(100);
        engine.stake(&mut ctx, &bob, 300).unwrap();

        // 0..100: alice alone (1000); 100..200: split 1:3 (250 / 750)
        assert_eq!(f.engine.earned(&alice, 200).unwrap(), 1_250);
        assert_eq!(f.engine.earned(&bob, 200).unwrap(), 750);
    }

    #[test]
    fn rate_change_settles_old_rate_first() {
        let mut f = Fixture::new(5);
        let alice = f.staker(50);
        let owner = f.owner;
        let (engine, mut ctx) = f.at(0);
        engine.stake(&mut ctx, &alice, 50).unwrap();

        let (engine, mut ctx) = f.at(100);
        assert_eq!(engine.set_reward_rate(&mut ctx, &alice, 1), Err(VaultError::Unauthorized));
        engine.set_reward_rate(&mut ctx, &owner, 20).unwrap();

        // 100s @ 5 + 50s @ 20
        assert_eq!(f.engine.earned(&alice, 150).unwrap(), 1_500);
    }

    #[test]
    fn second_harvest_in_same_instant_pays_nothing() {
        let mut f = Fixture::new(3);
        let alice = f.staker(10);
        let (engine, mut ctx) = f.at(0);
        engine.stake(&mut ctx, &alice, 10).unwrap();

        let (engine, mut ctx) = f.at(1_000);
        assert_eq!(engine.get_reward(&mut ctx, &alice).unwrap(), 3_000);
        let mark = ctx.events.len();
        assert_eq!(engine.get_reward(&mut ctx, &alice).unwrap(), 0);
        assert_eq!(ctx.events.len(), mark);
    }

    #[test]
    fn withdraw_checks_and_exit_drains() {
        let mut f = Fixture::new(2);
        let alice = f.staker(40);
        let (engine, mut ctx) = f.at(0);
        assert_eq!(engine.stake(&mut ctx, &alice, 0), Err(VaultError::ZeroAmount));
        engine.stake(&mut ctx, &alice, 40).unwrap();
        assert_eq!(engine.withdraw(&mut ctx, &alice, 41), Err(VaultError::InsufficientStake));

        let (engine, mut ctx) = f.at(10);
        assert_eq!(engine.exit(&mut ctx, &alice).unwrap(), (40, 20));
        assert_eq!(engine.total_supply(), 0);
        assert_eq!(f.tokens.balance_of(&f.stake_mint, &alice), 40);
    }

    #[test]
    fn emission_with_nobody_staked_is_not_attributed() {
        let mut f = Fixture::new(7);
        let alice = f.staker(1);
        let (engine, mut ctx) = f.at(500);
        engine.stake(&mut ctx, &alice, 1).unwrap();
        assert_eq!(f.engine.earned(&alice, 510).unwrap(), 70);
    }

    #[test]
    fn randomized_accumulator_is_monotone_and_bounded() {
        let mut rng = StdRng::seed_from_u64(42);
        let rate = 1_000;
        let mut f = Fixture::new(rate);
        let stakers: Vec<Pubkey> = (0..5).map(|_| f.staker(1_000_000)).collect();
        let mut now = 0;
        let mut last_rpt = 0u128;
        let mut checkpoints = 0u64;
        let mut attributable = 0u64;

        for _ in 0..300 {
            let dt = rng.gen_range(0..50);
            if f.engine.total_supply() > 0 {
                attributable += rate * dt;
            }
            now += dt;
            let who = stakers[rng.gen_range(0..stakers.len())];
            let (engine, mut ctx) = f.at(now);
            let result = match rng.gen_range(0..3) {
                0 => engine.stake(&mut ctx, &who, rng.gen_range(1..10_000)),
                1 => {
                    let bal = engine.balance_of(&who);
                    if bal == 0 {
                        continue;
                    }
                    engine.withdraw(&mut ctx, &who, rng.gen_range(1..=bal))
                }
                _ => engine.get_reward(&mut ctx, &who).map(|_| ()),
            };
            result.unwrap();
            checkpoints += 1;

            let rpt = f.engine.reward_per_token(now).unwrap();
            assert!(rpt >= last_rpt);
            last_rpt = rpt;
        }

        // Paid plus owed never exceeds what was emitted while someone was
        // staked, and falls short by at most one unit per account per
        // checkpoint.
        let paid: u64 = stakers.iter().map(|s| f.tokens.balance_of(&f.reward_mint, s)).sum();
        let owed: u64 = stakers.iter().map(|s| f.engine.earned(s, now).unwrap()).sum();
        assert!(paid + owed <= attributable);
        assert!(paid + owed + (checkpoints + 1) * stakers.len() as u64 >= attributable);
    }
}
