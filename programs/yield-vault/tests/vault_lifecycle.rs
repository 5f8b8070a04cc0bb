//! End-to-end flows through the serialized runtime over the in-memory
//! ledger and AMM.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use solana_sdk::pubkey::Pubkey;
use yield_vault::capability::{LiquidityAdded, LiquidityRemoved, PairReserves};
use yield_vault::sim::{ConstantProductAmm, MemoryLedger};
use yield_vault::{
    named_key, Amm, DeploymentConfig, Event, ManualClock, Mintable, Protocol, Runtime, TokenLedger,
    VaultError,
};

fn deploy() -> (Runtime<ManualClock>, ManualClock) {
    let clock = ManualClock::new(0);
    let protocol = Protocol::deploy(&DeploymentConfig::default(), 0).unwrap();
    (Runtime::new(protocol, clock.clone()), clock)
}

fn funded(rt: &Runtime<ManualClock>, label: &str, amount: u64) -> Pubkey {
    let user = named_key(label);
    rt.execute("faucet", |p, _| p.faucet(&user, amount)).unwrap();
    user
}

#[test]
fn deposit_compound_and_exit_returns_more_than_deposited() {
    let (rt, clock) = deploy();
    let alice = funded(&rt, "alice", 100_000);
    let bob = funded(&rt, "bob", 100_000);

    let alice_shares = rt.deposit(&alice, 3_600, 3_600).unwrap();
    assert_eq!(alice_shares, 3_600);

    clock.advance(3_600);
    let lp = rt.reinvest_rewards().unwrap();
    assert!(lp > 0);
    rt.read(|p| {
        assert_eq!(p.vault.total_assets(), 3_600 + lp);
        assert_eq!(p.rewards.balance_of(&p.strategy.id()), 3_600 + lp);
        assert!(matches!(p.events.last(), Some(Event::Reinvested { .. })));
    });

    // Share price is now above one, so the same LP buys fewer shares.
    let bob_shares = rt.deposit(&bob, 3_600, 3_600).unwrap();
    assert!(bob_shares < 3_600);

    let (a, b) = rt.withdraw(&alice, alice_shares).unwrap();
    assert!(a > 3_600 && b > 3_600, "got {a}/{b}");
    rt.read(|p| {
        assert_eq!(p.vault.balance_of(&alice), 0);
        assert_eq!(p.vault.total_supply(), bob_shares);
    });
}

#[test]
fn transferred_shares_are_redeemable_by_the_receiver() {
    let (rt, _) = deploy();
    let alice = funded(&rt, "alice", 10_000);
    let carol = named_key("carol");
    rt.deposit(&alice, 2_000, 2_000).unwrap();

    rt.execute("transfer", |p, now| p.transfer_shares(now, &alice, &carol, 500))
        .unwrap();
    let (a, b) = rt.withdraw(&carol, 500).unwrap();
    assert_eq!((a, b), (500, 500));
    assert_eq!(rt.read(|p| p.vault.balance_of(&alice)), 1_500);
}

#[test]
fn pause_blocks_deposits_but_not_withdrawals() {
    let (rt, _) = deploy();
    let owner = named_key("owner");
    let alice = funded(&rt, "alice", 10_000);
    let shares = rt.deposit(&alice, 1_000, 1_000).unwrap();

    rt.pause(&owner).unwrap();
    let before = rt.snapshot();
    assert_eq!(rt.deposit(&alice, 1_000, 1_000), Err(VaultError::Paused));
    assert_eq!(rt.snapshot(), before);

    rt.withdraw(&alice, shares / 2).unwrap();
    rt.unpause(&owner).unwrap();
    assert!(rt.deposit(&alice, 1_000, 1_000).is_ok());
}

#[test]
fn deposit_above_limit_is_rejected() {
    let (rt, _) = deploy();
    let owner = named_key("owner");
    let alice = funded(&rt, "alice", 10_000);
    rt.execute("limit", |p, now| p.set_deposit_limit(now, &owner, 1_500))
        .unwrap();

    assert_eq!(
        rt.deposit(&alice, 2_000, 2_000),
        Err(VaultError::LimitExceeded { amount: 2_000, limit: 1_500 })
    );
    assert_eq!(rt.read(|p| p.tokens.balance_of(&p.strategy.token_a(), &alice)), 10_000);
}

#[test]
fn emergency_withdraw_unwinds_everything_to_owner() {
    let (rt, clock) = deploy();
    let owner = named_key("owner");
    let alice = funded(&rt, "alice", 10_000);
    let shares = rt.deposit(&alice, 1_000, 1_000).unwrap();

    clock.advance(500);
    let exit = rt.emergency_withdraw(&owner).unwrap();
    assert_eq!(exit.lp, 1_000);
    assert_eq!(exit.rewards, 500);
    assert!(exit.amount_a >= 999 && exit.amount_b >= 999);

    rt.read(|p| {
        let strategy = p.strategy.id();
        assert_eq!(p.rewards.total_supply(), 0);
        assert_eq!(p.tokens.balance_of(&p.strategy.pair(), &strategy), 0);
        assert_eq!(p.tokens.balance_of(&p.strategy.token_a(), &owner), exit.amount_a);
        assert_eq!(p.tokens.balance_of(&p.strategy.reward_token(), &owner), 500);
        // Share balances are not touched by the unwind.
        assert_eq!(p.vault.balance_of(&alice), shares);
    });

    // Nothing left to redeem against.
    let before = rt.snapshot();
    assert!(rt.withdraw(&alice, shares).is_err());
    assert_eq!(rt.snapshot(), before);
}

// ─── Hostile AMM ──────────────────────────────────────────────────────────────

/// AMM that lets an attacker swap right before every `add_liquidity` once
/// armed, moving the price after the strategy quoted it. It can also report
/// more of each token used than it actually took.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HostileAmm {
    inner: ConstantProductAmm,
    attacker: Pubkey,
    swap_in: u64,
    armed: bool,
    overstate_used: u64,
}

impl Amm<MemoryLedger> for HostileAmm {
    fn id(&self) -> Pubkey {
        Amm::<MemoryLedger>::id(&self.inner)
    }

    fn create_pair(&mut self, token_a: &Pubkey, token_b: &Pubkey) -> yield_vault::Result<Pubkey> {
        Amm::<MemoryLedger>::create_pair(&mut self.inner, token_a, token_b)
    }

    fn get_pair(&self, token_a: &Pubkey, token_b: &Pubkey) -> Option<Pubkey> {
        Amm::<MemoryLedger>::get_pair(&self.inner, token_a, token_b)
    }

    fn reserves(&self, token_a: &Pubkey, token_b: &Pubkey) -> yield_vault::Result<PairReserves> {
        Amm::<MemoryLedger>::reserves(&self.inner, token_a, token_b)
    }

    #[allow(clippy::too_many_arguments)]
    fn add_liquidity(
        &mut self,
        ledger: &mut MemoryLedger,
        caller: &Pubkey,
        token_a: &Pubkey,
        token_b: &Pubkey,
        amount_a: u64,
        amount_b: u64,
        min_a: u64,
        min_b: u64,
    ) -> yield_vault::Result<LiquidityAdded> {
        if self.armed {
            self.inner
                .swap_exact_tokens(ledger, &self.attacker, token_a, token_b, self.swap_in, 0)?;
        }
        let mut added = self
            .inner
            .add_liquidity(ledger, caller, token_a, token_b, amount_a, amount_b, min_a, min_b)?;
        added.used_a += self.overstate_used;
        added.used_b += self.overstate_used;
        Ok(added)
    }

    #[allow(clippy::too_many_arguments)]
    fn remove_liquidity(
        &mut self,
        ledger: &mut MemoryLedger,
        caller: &Pubkey,
        token_a: &Pubkey,
        token_b: &Pubkey,
        lp: u64,
        min_a: u64,
        min_b: u64,
    ) -> yield_vault::Result<LiquidityRemoved> {
        self.inner
            .remove_liquidity(ledger, caller, token_a, token_b, lp, min_a, min_b)
    }

    #[allow(clippy::too_many_arguments)]
    fn swap_exact_tokens(
        &mut self,
        ledger: &mut MemoryLedger,
        caller: &Pubkey,
        token_in: &Pubkey,
        token_out: &Pubkey,
        amount_in: u64,
        min_amount_out: u64,
    ) -> yield_vault::Result<u64> {
        self.inner
            .swap_exact_tokens(ledger, caller, token_in, token_out, amount_in, min_amount_out)
    }

    fn quote_swap(&self, token_in: &Pubkey, token_out: &Pubkey, amount_in: u64) -> yield_vault::Result<u64> {
        Amm::<MemoryLedger>::quote_swap(&self.inner, token_in, token_out, amount_in)
    }
}

fn front_run_deployment(swap_in: u64) -> (Runtime<ManualClock, MemoryLedger, HostileAmm>, Pubkey) {
    let attacker = named_key("attacker");
    let amm = HostileAmm {
        inner: ConstantProductAmm::new(named_key("router")),
        attacker,
        swap_in,
        armed: false,
        overstate_used: 0,
    };
    let mut protocol =
        Protocol::deploy_with(&DeploymentConfig::default(), MemoryLedger::new(), amm, 0).unwrap();

    let (token_a, router) = (protocol.strategy.token_a(), protocol.strategy.router());
    protocol.tokens.mint_to(&token_a, &attacker, 5_000_000).unwrap();
    protocol.tokens.approve(&token_a, &attacker, &router, u64::MAX).unwrap();
    protocol.amm.armed = true;

    let alice = named_key("alice");
    protocol.faucet(&alice, 10_000).unwrap();
    (Runtime::new(protocol, ManualClock::new(0)), alice)
}

#[test]
fn front_run_beyond_tolerance_rolls_the_whole_deposit_back() {
    // 1M into a 10M/10M pair moves the price roughly 20 %.
    let (rt, alice) = front_run_deployment(1_000_000);
    let before = rt.snapshot();

    match rt.deposit(&alice, 1_000, 1_000) {
        Err(VaultError::SlippageExceeded { .. }) => {}
        other => panic!("expected slippage failure, got {other:?}"),
    }
    assert_eq!(rt.snapshot(), before);
    rt.read(|p| {
        assert_eq!(p.tokens.balance_of(&p.strategy.token_a(), &alice), 10_000);
        assert_eq!(p.tokens.balance_of(&p.strategy.token_b(), &alice), 10_000);
        assert_eq!(p.vault.total_supply(), 0);
    });
}

#[test]
fn front_run_within_tolerance_still_deposits() {
    let (rt, alice) = front_run_deployment(1_000_000);
    let owner = named_key("owner");
    rt.execute("slippage", |p, now| p.set_slippage_tolerance(now, &owner, 3_000))
        .unwrap();

    let shares = rt.deposit(&alice, 1_000, 1_000).unwrap();
    assert!(shares > 0);
    rt.read(|p| {
        // The pair took less B than offered; the rest came back.
        let refunded_b = p.tokens.balance_of(&p.strategy.token_b(), &alice);
        assert!(refunded_b > 9_000);
        assert_eq!(p.vault.total_assets(), p.rewards.balance_of(&p.strategy.id()));
    });
}

#[test]
fn pair_overstating_what_it_took_fails_the_refund_cleanly() {
    let (rt, alice) = front_run_deployment(0);
    rt.execute("rig", |p, _| {
        p.amm.armed = false;
        p.amm.overstate_used = 1;
        Ok(())
    })
    .unwrap();
    let before = rt.snapshot();

    // A balanced pair takes all 1000/1000, so the refund would underflow.
    assert_eq!(rt.deposit(&alice, 1_000, 1_000), Err(VaultError::ArithmeticFault));
    assert_eq!(rt.snapshot(), before);
}

// ─── Reward funding ───────────────────────────────────────────────────────────

fn deploy_with_funding(funding: u64) -> (Runtime<ManualClock>, ManualClock) {
    let mut config = DeploymentConfig::default();
    config.rewards.rate = 1;
    config.rewards.funding = funding;
    let clock = ManualClock::new(0);
    let protocol = Protocol::deploy(&config, 0).unwrap();
    (Runtime::new(protocol, clock.clone()), clock)
}

#[test]
fn emergency_withdraw_succeeds_once_reward_funding_runs_out() {
    let (rt, clock) = deploy_with_funding(1_000);
    let owner = named_key("owner");
    let alice = funded(&rt, "alice", 10_000);
    rt.deposit(&alice, 1_000, 1_000).unwrap();

    // 5000s at 1/s wants 5000; the reserve only ever held 1000.
    clock.advance(5_000);
    let exit = rt.emergency_withdraw(&owner).unwrap();
    assert_eq!(exit.lp, 1_000);
    assert_eq!(exit.rewards, 1_000);
    rt.read(|p| {
        assert_eq!(p.rewards.total_supply(), 0);
        assert_eq!(p.rewards.reward_reserve(), 0);
        assert_eq!(p.tokens.balance_of(&p.strategy.reward_token(), &owner), 1_000);
        assert_eq!(p.tokens.balance_of(&p.strategy.reward_token(), &p.rewards.id()), 0);
    });
}

#[test]
fn exhausted_funding_freezes_no_reward_path() {
    let (rt, clock) = deploy_with_funding(1_000);
    let owner = named_key("owner");
    let alice = funded(&rt, "alice", 10_000);
    rt.deposit(&alice, 1_000, 1_000).unwrap();

    clock.advance(5_000);
    assert_eq!(rt.claim_rewards(&alice).unwrap(), 1_000);
    clock.advance(1_000);
    assert_eq!(rt.claim_rewards(&alice).unwrap(), 0);
    assert_eq!(rt.reinvest_rewards().unwrap(), 0);

    // A top-up restarts emission from the moment it lands, capped again.
    rt.execute("top-up", |p, now| {
        let reward = p.rewards.reward_token();
        p.tokens.mint_to(&reward, &owner, 500)?;
        p.fund_rewards(now, &owner, 500)
    })
    .unwrap();
    clock.advance(1_000);
    assert_eq!(rt.claim_rewards(&alice).unwrap(), 500);

    assert_eq!(rt.withdraw(&alice, 1_000).unwrap(), (1_000, 1_000));
}

#[test]
fn reward_dust_is_kept_rather_than_failing_the_reinvest() {
    let (rt, clock) = deploy();
    let alice = funded(&rt, "alice", 10_000);
    rt.deposit(&alice, 1_024, 1_024).unwrap();

    // 3 units: each swap leg of 1 quotes to zero against 10M/10M pools.
    clock.advance(3);
    let mark = rt.read(|p| p.events.len());
    assert_eq!(rt.reinvest_rewards().unwrap(), 0);
    rt.read(|p| {
        assert_eq!(p.tokens.balance_of(&p.strategy.reward_token(), &p.strategy.id()), 3);
        assert_eq!(p.vault.total_assets(), 1_024);
        assert!(p.events.iter().skip(mark).all(|e| !matches!(e, Event::Reinvested { .. })));
    });
}

// ─── Randomized ───────────────────────────────────────────────────────────────

#[test]
fn random_operation_sequences_keep_accounts_consistent() {
    let (rt, clock) = deploy();
    let users: Vec<Pubkey> = (0..4)
        .map(|i| funded(&rt, &format!("user-{i}"), 10_000_000))
        .collect();
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..300 {
        let user = users[rng.gen_range(0..users.len())];
        let before = rt.snapshot();
        let result = match rng.gen_range(0..5) {
            0 | 1 => {
                let a = rng.gen_range(1..50_000);
                let b = rng.gen_range(1..50_000);
                rt.deposit(&user, a, b).map(|_| ())
            }
            2 => {
                let held = rt.read(|p| p.vault.balance_of(&user));
                let shares = if held == 0 { 1 } else { rng.gen_range(1..=held) };
                rt.withdraw(&user, shares).map(|_| ())
            }
            3 => rt.claim_rewards(&user).map(|_| ()),
            _ => {
                clock.advance(rng.gen_range(1..2_000));
                rt.reinvest_rewards().map(|_| ())
            }
        };
        if result.is_err() {
            assert_eq!(rt.snapshot(), before, "failed op must not change state");
        }

        rt.read(|p| {
            let strategy = p.strategy.id();
            let held: u64 = users.iter().map(|u| p.vault.balance_of(u)).sum();
            assert_eq!(held, p.vault.total_supply());
            // Every holder's floor-rounded claim together covers the pool
            // to within one unit per holder.
            if p.vault.total_supply() > 0 {
                let claims: u64 = users
                    .iter()
                    .map(|u| p.vault.convert_to_assets(p.vault.balance_of(u)).unwrap())
                    .sum();
                assert!(claims <= p.vault.total_assets());
                assert!(p.vault.total_assets() - claims <= users.len() as u64);
            }
            assert_eq!(p.rewards.balance_of(&strategy), p.vault.total_assets());
            assert_eq!(p.tokens.balance_of(&p.strategy.pair(), &strategy), 0);
        });
    }
}
