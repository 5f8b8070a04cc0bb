//! Yield Vault
//!
//! Auto-compounding LP vault: users deposit a pair of assets, the strategy
//! provides them as liquidity to a constant-product AMM, stakes the LP for a
//! continuous reward stream and periodically swaps those rewards back into
//! the position. Each holder's claim is a fungible, transferable share.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use yield_vault::{named_key, DeploymentConfig, ManualClock, Protocol, Runtime};
//!
//! fn main() -> Result<(), yield_vault::VaultError> {
//!     let clock = ManualClock::new(0);
//!     let protocol = Protocol::deploy(&DeploymentConfig::default(), 0)?;
//!     let runtime = Runtime::new(protocol, clock.clone());
//!
//!     let alice = named_key("alice");
//!     runtime.execute("faucet", |p, _| p.faucet(&alice, 10_000))?;
//!
//!     // 1. Pair of assets in, vault shares out
//!     let shares = runtime.deposit(&alice, 5_000, 5_000)?;
//!
//!     // 2. An hour of emissions, compounded back into the position
//!     clock.advance(3_600);
//!     runtime.reinvest_rewards()?;
//!
//!     // 3. Shares out, assets back (now worth more LP than deposited)
//!     let (a, b) = runtime.withdraw(&alice, shares)?;
//!     println!("withdrew {a} A + {b} B");
//!     Ok(())
//! }
//! ```
//!
//! # Components
//!
//! | Type | Role |
//! |------|------|
//! | [`ShareLedger`] | ERC4626-style share/asset accounting |
//! | [`RewardEngine`] | reward-per-token accumulator over stakers |
//! | [`Strategy`] | deposit / withdraw / claim / reinvest / emergency workflows |
//! | [`Runtime`] | serialized, all-or-nothing execution over a [`Protocol`] |
//! | [`sim`] | in-memory token ledger and constant-product AMM |

pub mod access;
pub mod accounts;
pub mod capability;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod math;
pub mod reward_engine;
pub mod runtime;
pub mod share_ledger;
pub mod sim;
pub mod strategy;

pub use accounts::{named_key, AccountMap};
pub use capability::{Amm, Clock, Context, ManualClock, Mintable, SystemClock, TokenLedger};
pub use config::DeploymentConfig;
pub use error::{Result, VaultError};
pub use events::{Event, EventLog};
pub use reward_engine::RewardEngine;
pub use runtime::{Protocol, Runtime};
pub use share_ledger::{Custody, ShareLedger};
pub use strategy::{EmergencyExit, Strategy, StrategyAccounts, StrategyParams};
