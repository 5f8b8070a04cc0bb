//! Audit trail.
//!
//! Every state change emits exactly one event carrying the post-rounding
//! amounts. Events raised inside an operation that later fails are dropped
//! together with the rest of the staged state.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::accounts::pubkey_str;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    // ── ShareLedger ──────────────────────────────────────────────────────────
    Deposit {
        #[serde(with = "pubkey_str")]
        caller: Pubkey,
        #[serde(with = "pubkey_str")]
        receiver: Pubkey,
        assets: u64,
        shares: u64,
    },
    Withdraw {
        #[serde(with = "pubkey_str")]
        caller: Pubkey,
        #[serde(with = "pubkey_str")]
        receiver: Pubkey,
        #[serde(with = "pubkey_str")]
        owner: Pubkey,
        assets: u64,
        shares: u64,
    },
    Transfer {
        #[serde(with = "pubkey_str")]
        from: Pubkey,
        #[serde(with = "pubkey_str")]
        to: Pubkey,
        shares: u64,
    },
    Approval {
        #[serde(with = "pubkey_str")]
        owner: Pubkey,
        #[serde(with = "pubkey_str")]
        spender: Pubkey,
        shares: u64,
    },
    YieldAccrued {
        assets: u64,
        total_assets: u64,
    },
    DepositLimitUpdated {
        limit: u64,
    },
    Paused {
        #[serde(with = "pubkey_str")]
        account: Pubkey,
    },
    Unpaused {
        #[serde(with = "pubkey_str")]
        account: Pubkey,
    },
    EmergencyWithdraw {
        #[serde(with = "pubkey_str")]
        owner: Pubkey,
        amount: u64,
    },

    // ── RewardEngine ─────────────────────────────────────────────────────────
    Staked {
        #[serde(with = "pubkey_str")]
        account: Pubkey,
        amount: u64,
    },
    Withdrawn {
        #[serde(with = "pubkey_str")]
        account: Pubkey,
        amount: u64,
    },
    RewardPaid {
        #[serde(with = "pubkey_str")]
        account: Pubkey,
        amount: u64,
    },
    RewardRateUpdated {
        old_rate: u64,
        new_rate: u64,
    },
    RewardFunded {
        #[serde(with = "pubkey_str")]
        funder: Pubkey,
        amount: u64,
    },

    // ── Strategy ─────────────────────────────────────────────────────────────
    StrategyDeposit {
        #[serde(with = "pubkey_str")]
        account: Pubkey,
        amount_a: u64,
        amount_b: u64,
        lp: u64,
        shares: u64,
    },
    StrategyWithdraw {
        #[serde(with = "pubkey_str")]
        account: Pubkey,
        shares: u64,
        lp: u64,
        amount_a: u64,
        amount_b: u64,
    },
    RewardsForwarded {
        #[serde(with = "pubkey_str")]
        account: Pubkey,
        harvested: u64,
        amount: u64,
    },
    Reinvested {
        rewards: u64,
        lp: u64,
        total_assets: u64,
    },
    SlippageToleranceUpdated {
        old_bps: u16,
        new_bps: u16,
    },
    StrategyEmergencyExit {
        #[serde(with = "pubkey_str")]
        owner: Pubkey,
        lp: u64,
        amount_a: u64,
        amount_b: u64,
        rewards: u64,
    },
}

/// Append-only event log shared by all components of one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog(Vec<Event>);

impl EventLog {
    pub fn emit(&mut self, event: Event) {
        tracing::trace!(?event, "event");
        self.0.push(event);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&Event> {
        self.0.last()
    }
}
