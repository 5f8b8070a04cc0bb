//! Strategy orchestrator: turns a user's pair of assets into staked LP and
//! keeps that position compounding.
//!
//! The strategy is the sole custodian of the LP it creates and the single
//! staking principal in the reward engine. The share ledger it manages runs
//! in [`Custody::Managed`](crate::share_ledger::Custody) mode, so user
//! positions are pure accounting and every token movement happens here.

pub mod claim_rewards;
pub mod deposit;
pub mod emergency;
pub mod reinvest;
pub mod withdraw;

pub use emergency::EmergencyExit;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::accounts::pubkey_str;
use crate::access::Ownable;
use crate::capability::{optimal_amounts, Amm, Context, TokenLedger};
use crate::constants::{DEFAULT_SLIPPAGE_BPS, MAX_SLIPPAGE_BPS};
use crate::error::{Result, VaultError};
use crate::events::Event;
use crate::math::min_with_slippage;
use crate::reward_engine::RewardEngine;
use crate::share_ledger::ShareLedger;

/// Collaborators a strategy operation runs against. Checked against the
/// identities the strategy was deployed with before anything moves.
pub struct StrategyAccounts<'a, A> {
    pub amm: &'a mut A,
    pub vault: &'a mut ShareLedger,
    pub rewards: &'a mut RewardEngine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    /// Custodian and staking principal
    #[serde(with = "pubkey_str")]
    id: Pubkey,
    owner: Ownable,
    #[serde(with = "pubkey_str")]
    vault: Pubkey,
    #[serde(with = "pubkey_str")]
    reward_engine: Pubkey,
    #[serde(with = "pubkey_str")]
    router: Pubkey,
    /// Pair handle, also the LP mint
    #[serde(with = "pubkey_str")]
    pair: Pubkey,
    #[serde(with = "pubkey_str")]
    token_a: Pubkey,
    #[serde(with = "pubkey_str")]
    token_b: Pubkey,
    #[serde(with = "pubkey_str")]
    reward_token: Pubkey,
    slippage_tolerance_bps: u16,
    total_harvested: u64,
    total_reinvested_lp: u64,
}

/// Identities a strategy is wired to at deployment.
#[derive(Debug, Clone, Copy)]
pub struct StrategyParams {
    pub id: Pubkey,
    pub owner: Pubkey,
    pub vault: Pubkey,
    pub reward_engine: Pubkey,
    pub router: Pubkey,
    pub pair: Pubkey,
    pub token_a: Pubkey,
    pub token_b: Pubkey,
    pub reward_token: Pubkey,
}

impl Strategy {
    pub fn new(params: StrategyParams) -> Self {
        Self {
            id: params.id,
            owner: Ownable::new(params.owner),
            vault: params.vault,
            reward_engine: params.reward_engine,
            router: params.router,
            pair: params.pair,
            token_a: params.token_a,
            token_b: params.token_b,
            reward_token: params.reward_token,
            slippage_tolerance_bps: DEFAULT_SLIPPAGE_BPS,
            total_harvested: 0,
            total_reinvested_lp: 0,
        }
    }

    pub fn id(&self) -> Pubkey {
        self.id
    }

    pub fn owner(&self) -> Pubkey {
        self.owner.owner()
    }

    pub fn vault(&self) -> Pubkey {
        self.vault
    }

    pub fn reward_engine(&self) -> Pubkey {
        self.reward_engine
    }

    pub fn router(&self) -> Pubkey {
        self.router
    }

    pub fn pair(&self) -> Pubkey {
        self.pair
    }

    pub fn token_a(&self) -> Pubkey {
        self.token_a
    }

    pub fn token_b(&self) -> Pubkey {
        self.token_b
    }

    pub fn reward_token(&self) -> Pubkey {
        self.reward_token
    }

    pub fn slippage_tolerance_bps(&self) -> u16 {
        self.slippage_tolerance_bps
    }

    /// Rewards harvested from the engine over the strategy's lifetime.
    pub fn total_harvested(&self) -> u64 {
        self.total_harvested
    }

    /// LP added back to the position by reinvesting.
    pub fn total_reinvested_lp(&self) -> u64 {
        self.total_reinvested_lp
    }

    /// Standing approvals the workflows rely on: the router may pull every
    /// token the strategy trades or provides, the engine may pull LP.
    pub fn grant_approvals<L: TokenLedger>(&self, ctx: &mut Context<'_, L>) -> Result<()> {
        for mint in [self.token_a, self.token_b, self.reward_token, self.pair] {
            ctx.tokens.approve(&mint, &self.id, &self.router, u64::MAX)?;
        }
        ctx.tokens
            .approve(&self.pair, &self.id, &self.reward_engine, u64::MAX)
    }

    pub fn set_slippage_tolerance<L>(
        &mut self,
        ctx: &mut Context<'_, L>,
        caller: &Pubkey,
        bps: u16,
    ) -> Result<()> {
        self.owner.require_owner(caller)?;
        if bps > MAX_SLIPPAGE_BPS {
            return Err(VaultError::InvalidParameter(format!(
                "slippage {bps} bps exceeds {MAX_SLIPPAGE_BPS}"
            )));
        }
        let old_bps = self.slippage_tolerance_bps;
        self.slippage_tolerance_bps = bps;
        tracing::info!(old_bps, new_bps = bps, "slippage tolerance updated");
        ctx.emit(Event::SlippageToleranceUpdated { old_bps, new_bps: bps });
        Ok(())
    }

    // ─── Shared helpers ───────────────────────────────────────────────────────

    fn check_accounts<L: TokenLedger, A: Amm<L>>(&self, accounts: &StrategyAccounts<'_, A>) -> Result<()> {
        if accounts.vault.id() != self.vault {
            return Err(VaultError::InvalidParameter("vault does not match strategy".into()));
        }
        if accounts.rewards.id() != self.reward_engine {
            return Err(VaultError::InvalidParameter("reward engine does not match strategy".into()));
        }
        if accounts.amm.id() != self.router {
            return Err(VaultError::InvalidParameter("router does not match strategy".into()));
        }
        Ok(())
    }

    /// Slippage-bounded minimums for adding `amount_a`/`amount_b` at the
    /// pair's current price.
    fn liquidity_minimums<L: TokenLedger, A: Amm<L>>(
        &self,
        amm: &A,
        amount_a: u64,
        amount_b: u64,
    ) -> Result<(u64, u64)> {
        let reserves = amm.reserves(&self.token_a, &self.token_b)?;
        if reserves.pair != self.pair {
            return Err(VaultError::PairNotFound);
        }
        let (quoted_a, quoted_b) =
            optimal_amounts(amount_a, amount_b, reserves.reserve_a, reserves.reserve_b)?;
        tracing::debug!(quoted_a, quoted_b, bps = self.slippage_tolerance_bps, "liquidity quote");
        Ok((
            min_with_slippage(quoted_a, self.slippage_tolerance_bps)?,
            min_with_slippage(quoted_b, self.slippage_tolerance_bps)?,
        ))
    }

    /// Swap `amount_in` with a minimum derived from the current quote.
    fn swap_with_tolerance<L: TokenLedger, A: Amm<L>>(
        &self,
        ctx: &mut Context<'_, L>,
        amm: &mut A,
        token_in: &Pubkey,
        token_out: &Pubkey,
        amount_in: u64,
    ) -> Result<u64> {
        let quoted = amm.quote_swap(token_in, token_out, amount_in)?;
        let min_out = min_with_slippage(quoted, self.slippage_tolerance_bps)?;
        tracing::debug!(token_in = %token_in, amount_in, quoted, min_out, "swap quote");
        amm.swap_exact_tokens(ctx.tokens, &self.id, token_in, token_out, amount_in, min_out)
    }
}


#[cfg(test)]
mod tests {
    use super::fixture::Env;
    use super::*;

    #[test]
    fn slippage_tolerance_is_owner_gated_and_bounded() {
        let mut env = Env::new();
        let owner = env.owner;
        let stranger = Pubkey::new_unique();
        let (strategy, mut ctx, _) = env.parts();

        assert_eq!(strategy.set_slippage_tolerance(&mut ctx, &stranger, 100), Err(VaultError::Unauthorized));
        assert!(matches!(
            strategy.set_slippage_tolerance(&mut ctx, &owner, 10_001),
            Err(VaultError::InvalidParameter(_))
        ));
        strategy.set_slippage_tolerance(&mut ctx, &owner, 100).unwrap();
        assert_eq!(strategy.slippage_tolerance_bps(), 100);
        assert_eq!(
            ctx.events.last(),
            Some(&Event::SlippageToleranceUpdated { old_bps: DEFAULT_SLIPPAGE_BPS, new_bps: 100 })
        );
    }

    #[test]
    fn mismatched_collaborators_are_rejected() {
        let mut env = Env::new();
        let user = env.user(1_000);
        let mut other = Env::new();
        let (strategy, mut ctx, _) = env.parts();
        let mut accounts =
            StrategyAccounts { amm: &mut other.amm, vault: &mut other.vault, rewards: &mut other.rewards };
        assert!(matches!(
            strategy.deposit(&mut ctx, &mut accounts, &user, 100, 100),
            Err(VaultError::InvalidParameter(_))
        ));
    }
}
