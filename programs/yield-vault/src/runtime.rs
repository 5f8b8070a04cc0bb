//! One deployment and the serialized executor in front of it.
//!
//! [`Protocol`] bundles every component plus the token ledger, the AMM and
//! the event log. [`Runtime`] owns a `Protocol` behind a mutex and runs
//! each public operation against a staged copy, committing it only when
//! the operation returns `Ok`. A failed operation therefore leaves token
//! balances, component state and the event log exactly as they were.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::accounts::named_key;
use crate::capability::{Amm, Clock, Context, Mintable, TokenLedger};
use crate::config::DeploymentConfig;
use crate::error::Result;
use crate::events::EventLog;
use crate::reward_engine::RewardEngine;
use crate::share_ledger::{Custody, ShareLedger};
use crate::sim::{ConstantProductAmm, MemoryLedger};
use crate::strategy::{EmergencyExit, Strategy, StrategyAccounts, StrategyParams};

/// Identity that seeds the pools at deployment.
pub const MARKET_MAKER: &str = "market-maker";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol<L = MemoryLedger, A = ConstantProductAmm> {
    pub tokens: L,
    pub amm: A,
    pub vault: ShareLedger,
    pub rewards: RewardEngine,
    pub strategy: Strategy,
    pub events: EventLog,
}

impl Protocol {
    /// Deploy over the in-memory ledger and AMM.
    pub fn deploy(config: &DeploymentConfig, now: u64) -> Result<Self> {
        let amm = ConstantProductAmm::new(named_key("router"));
        Self::deploy_with(config, MemoryLedger::new(), amm, now)
    }
}

impl<L, A> Protocol<L, A>
where
    L: TokenLedger + Mintable,
    A: Amm<L>,
{
    /// Mint the assets, create and seed the pairs, wire ledger, engine and
    /// strategy together and fund the reward engine.
    pub fn deploy_with(config: &DeploymentConfig, mut tokens: L, mut amm: A, now: u64) -> Result<Self> {
        config.validate()?;
        let mut events = EventLog::default();

        let owner = named_key(&config.owner);
        let token_a = named_key("token-a");
        let token_b = named_key("token-b");
        let reward_token = named_key("reward-token");
        let strategy_id = named_key("strategy");
        let router = amm.id();

        // ── Pairs ────────────────────────────────────────────────────────────
        let maker = named_key(MARKET_MAKER);
        let pair = amm.create_pair(&token_a, &token_b)?;
        amm.create_pair(&reward_token, &token_a)?;
        amm.create_pair(&reward_token, &token_b)?;

        let seeds = [
            (token_a, config.pool.seed_a, token_b, config.pool.seed_b),
            (reward_token, config.pool.seed_reward, token_a, config.pool.seed_reward),
            (reward_token, config.pool.seed_reward, token_b, config.pool.seed_reward),
        ];
        for (x, amount_x, y, amount_y) in seeds {
            tokens.mint_to(&x, &maker, amount_x)?;
            tokens.mint_to(&y, &maker, amount_y)?;
            tokens.approve(&x, &maker, &router, u64::MAX)?;
            tokens.approve(&y, &maker, &router, u64::MAX)?;
            amm.add_liquidity(&mut tokens, &maker, &x, &y, amount_x, amount_y, 0, 0)?;
        }

        // ── Components ───────────────────────────────────────────────────────
        let mut vault = ShareLedger::new(
            named_key("vault"),
            pair,
            owner,
            config.vault.name.clone(),
            config.vault.symbol.clone(),
            Custody::Managed { manager: strategy_id },
        );
        if let Some(limit) = config.vault.deposit_limit {
            vault = vault.with_deposit_limit(limit);
        }
        let mut rewards = RewardEngine::new(
            named_key("reward-engine"),
            pair,
            reward_token,
            owner,
            config.rewards.rate,
            now,
        );
        tokens.mint_to(&reward_token, &owner, config.rewards.funding)?;

        let mut strategy = Strategy::new(StrategyParams {
            id: strategy_id,
            owner,
            vault: vault.id(),
            reward_engine: rewards.id(),
            router,
            pair,
            token_a,
            token_b,
            reward_token,
        });
        {
            let mut ctx = Context::new(now, &mut tokens, &mut events);
            strategy.grant_approvals(&mut ctx)?;
            if config.rewards.funding > 0 {
                rewards.fund(&mut ctx, &owner, config.rewards.funding)?;
            }
            if config.strategy.slippage_bps != strategy.slippage_tolerance_bps() {
                strategy.set_slippage_tolerance(&mut ctx, &owner, config.strategy.slippage_bps)?;
            }
        }

        tracing::info!(
            vault = %vault.id(),
            pair = %pair,
            strategy = %strategy_id,
            reward_rate = config.rewards.rate,
            "deployment created"
        );
        Ok(Self { tokens, amm, vault, rewards, strategy, events })
    }

    /// Mint `amount` of each pool asset to `user` and approve the strategy
    /// to pull them.
    pub fn faucet(&mut self, user: &Pubkey, amount: u64) -> Result<()> {
        let spender = self.strategy.id();
        for mint in [self.strategy.token_a(), self.strategy.token_b()] {
            self.tokens.mint_to(&mint, user, amount)?;
            self.tokens.approve(&mint, user, &spender, u64::MAX)?;
        }
        Ok(())
    }
}

impl<L: TokenLedger, A: Amm<L>> Protocol<L, A> {
    /// Split borrow for strategy workflows.
    fn strategy_parts(&mut self, now: u64) -> (&mut Strategy, Context<'_, L>, StrategyAccounts<'_, A>) {
        (
            &mut self.strategy,
            Context::new(now, &mut self.tokens, &mut self.events),
            StrategyAccounts { amm: &mut self.amm, vault: &mut self.vault, rewards: &mut self.rewards },
        )
    }

    pub fn deposit(&mut self, now: u64, caller: &Pubkey, amount_a: u64, amount_b: u64) -> Result<u64> {
        let (strategy, mut ctx, mut accounts) = self.strategy_parts(now);
        strategy.deposit(&mut ctx, &mut accounts, caller, amount_a, amount_b)
    }

    pub fn withdraw(&mut self, now: u64, caller: &Pubkey, shares: u64) -> Result<(u64, u64)> {
        let (strategy, mut ctx, mut accounts) = self.strategy_parts(now);
        strategy.withdraw(&mut ctx, &mut accounts, caller, shares)
    }

    pub fn claim_rewards(&mut self, now: u64, caller: &Pubkey) -> Result<u64> {
        let (strategy, mut ctx, mut accounts) = self.strategy_parts(now);
        strategy.claim_rewards(&mut ctx, &mut accounts, caller)
    }

    pub fn reinvest_rewards(&mut self, now: u64) -> Result<u64> {
        let (strategy, mut ctx, mut accounts) = self.strategy_parts(now);
        strategy.reinvest_rewards(&mut ctx, &mut accounts)
    }

    pub fn emergency_withdraw(&mut self, now: u64, caller: &Pubkey) -> Result<EmergencyExit> {
        let (strategy, mut ctx, mut accounts) = self.strategy_parts(now);
        strategy.emergency_withdraw(&mut ctx, &mut accounts, caller)
    }

    pub fn set_slippage_tolerance(&mut self, now: u64, caller: &Pubkey, bps: u16) -> Result<()> {
        let mut ctx = Context::new(now, &mut self.tokens, &mut self.events);
        self.strategy.set_slippage_tolerance(&mut ctx, caller, bps)
    }

    pub fn set_reward_rate(&mut self, now: u64, caller: &Pubkey, rate: u64) -> Result<()> {
        let mut ctx = Context::new(now, &mut self.tokens, &mut self.events);
        self.rewards.set_reward_rate(&mut ctx, caller, rate)
    }

    /// Top up the reward reserve from `funder`'s reward-token balance.
    pub fn fund_rewards(&mut self, now: u64, funder: &Pubkey, amount: u64) -> Result<u64> {
        let mut ctx = Context::new(now, &mut self.tokens, &mut self.events);
        self.rewards.fund(&mut ctx, funder, amount)
    }

    pub fn pause(&mut self, now: u64, caller: &Pubkey) -> Result<()> {
        let mut ctx = Context::new(now, &mut self.tokens, &mut self.events);
        self.vault.pause(&mut ctx, caller)
    }

    pub fn unpause(&mut self, now: u64, caller: &Pubkey) -> Result<()> {
        let mut ctx = Context::new(now, &mut self.tokens, &mut self.events);
        self.vault.unpause(&mut ctx, caller)
    }

    pub fn set_deposit_limit(&mut self, now: u64, caller: &Pubkey, limit: u64) -> Result<()> {
        let mut ctx = Context::new(now, &mut self.tokens, &mut self.events);
        self.vault.set_deposit_limit(&mut ctx, caller, limit)
    }

    /// Shares transfer between holders.
    pub fn transfer_shares(&mut self, now: u64, caller: &Pubkey, to: &Pubkey, shares: u64) -> Result<()> {
        let mut ctx = Context::new(now, &mut self.tokens, &mut self.events);
        self.vault.transfer(&mut ctx, caller, to, shares)
    }

    /// LP value of `holder`'s shares.
    pub fn position_value(&self, holder: &Pubkey) -> Result<u64> {
        self.vault.convert_to_assets(self.vault.balance_of(holder))
    }
}

/// Serialized, all-or-nothing executor over one [`Protocol`].
pub struct Runtime<C, L = MemoryLedger, A = ConstantProductAmm> {
    state: Mutex<Protocol<L, A>>,
    clock: C,
}

impl<C, L, A> Runtime<C, L, A>
where
    C: Clock,
    L: TokenLedger + Clone,
    A: Amm<L> + Clone,
{
    pub fn new(protocol: Protocol<L, A>, clock: C) -> Self {
        Self { state: Mutex::new(protocol), clock }
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run `op` against a staged copy of the deployment and commit it only on
    /// success. Concurrent callers are serialized by the lock.
    pub fn execute<T>(
        &self,
        label: &str,
        op: impl FnOnce(&mut Protocol<L, A>, u64) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.lock();
        let now = self.clock.now();
        let mut staged = state.clone();
        match op(&mut staged, now) {
            Ok(value) => {
                *state = staged;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(op = label, error = %err, "operation rolled back");
                Err(err)
            }
        }
    }

    /// Read-only access under the lock.
    pub fn read<T>(&self, f: impl FnOnce(&Protocol<L, A>) -> T) -> T {
        f(&self.state.lock())
    }

    pub fn snapshot(&self) -> Protocol<L, A> {
        self.state.lock().clone()
    }

    pub fn into_inner(self) -> Protocol<L, A> {
        self.state.into_inner()
    }

    pub fn deposit(&self, caller: &Pubkey, amount_a: u64, amount_b: u64) -> Result<u64> {
        self.execute("deposit", |p, now| p.deposit(now, caller, amount_a, amount_b))
    }

    pub fn withdraw(&self, caller: &Pubkey, shares: u64) -> Result<(u64, u64)> {
        self.execute("withdraw", |p, now| p.withdraw(now, caller, shares))
    }

    pub fn claim_rewards(&self, caller: &Pubkey) -> Result<u64> {
        self.execute("claim_rewards", |p, now| p.claim_rewards(now, caller))
    }

    pub fn reinvest_rewards(&self) -> Result<u64> {
        self.execute("reinvest_rewards", |p, now| p.reinvest_rewards(now))
    }

    pub fn emergency_withdraw(&self, caller: &Pubkey) -> Result<EmergencyExit> {
        self.execute("emergency_withdraw", |p, now| p.emergency_withdraw(now, caller))
    }

    pub fn set_slippage_tolerance(&self, caller: &Pubkey, bps: u16) -> Result<()> {
        self.execute("set_slippage_tolerance", |p, now| p.set_slippage_tolerance(now, caller, bps))
    }

    pub fn set_reward_rate(&self, caller: &Pubkey, rate: u64) -> Result<()> {
        self.execute("set_reward_rate", |p, now| p.set_reward_rate(now, caller, rate))
    }

    pub fn fund_rewards(&self, funder: &Pubkey, amount: u64) -> Result<u64> {
        self.execute("fund_rewards", |p, now| p.fund_rewards(now, funder, amount))
    }

    pub fn pause(&self, caller: &Pubkey) -> Result<()> {
        self.execute("pause", |p, now| p.pause(now, caller))
    }

    pub fn unpause(&self, caller: &Pubkey) -> Result<()> {
        self.execute("unpause", |p, now| p.unpause(now, caller))
    }
}
