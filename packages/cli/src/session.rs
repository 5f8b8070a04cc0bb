//! Local deployment persisted between CLI invocations.
//!
//! The whole [`Protocol`] plus the simulated clock lives in one JSON file.
//! Every mutating command loads it, runs through a [`Runtime`] and writes it
//! back only when the command succeeded.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use solana_sdk::pubkey::Pubkey;
use yield_vault::math::mul_div_floor;
use yield_vault::sim::{ConstantProductAmm, MemoryLedger};
use yield_vault::{named_key, Amm, DeploymentConfig, ManualClock, Mintable, Protocol, Runtime, TokenLedger};

const STATE_VERSION: u32 = 2;

// ─── State file ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    /// Simulated unix time; only `warp` moves it.
    pub now: u64,
    pub config: DeploymentConfig,
    /// Named users seen so far, with the key derived for them.
    pub users: BTreeMap<String, String>,
    /// Users that already received the faucet allowance.
    pub funded: BTreeSet<String>,
    pub protocol: Protocol,
}

pub struct Session {
    path: PathBuf,
    state: StateFile,
}

impl Session {
    /// Deploy a fresh protocol and bind it to `path`. Nothing is written yet.
    pub fn create(path: &Path, config: DeploymentConfig, now: u64) -> Result<Self> {
        let protocol = Protocol::deploy(&config, now).context("deployment failed")?;
        let state = StateFile {
            version: STATE_VERSION,
            now,
            config,
            users: BTreeMap::new(),
            funded: BTreeSet::new(),
            protocol,
        };
        Ok(Self { path: path.to_path_buf(), state })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| {
            format!(
                "No deployment at {}. Run `yield-vault init` first.",
                path.display()
            )
        })?;
        let state: StateFile = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a valid state file", path.display()))?;
        if state.version != STATE_VERSION {
            bail!(
                "state file version {} is not supported (expected {STATE_VERSION})",
                state.version
            );
        }
        tracing::debug!(path = %path.display(), now = state.now, "state loaded");
        Ok(Self { path: path.to_path_buf(), state })
    }

    /// Write through a temporary file so a crash never leaves half a state.
    pub fn save(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "state saved");
        Ok(())
    }

    pub fn state(&self) -> &StateFile {
        &self.state
    }

    /// Key for a named user, remembering the name for later display.
    fn user(&mut self, name: &str) -> Pubkey {
        let key = named_key(name);
        self.state.users.entry(name.to_string()).or_insert_with(|| key.to_string());
        key
    }

    fn caller(&mut self, label: Option<&str>) -> Pubkey {
        let name = label.map_or_else(|| self.state.config.owner.clone(), str::to_string);
        self.user(&name)
    }

    // ─── Actions ─────────────────────────────────────────────────────────────

    /// Run one action. On error the in-memory deployment is unchanged.
    pub fn apply(&mut self, action: &Action) -> Result<Report> {
        let runtime = Runtime::new(self.state.protocol.clone(), ManualClock::new(self.state.now));
        let report = self.dispatch(&runtime, action);
        // Failed operations were rolled back inside the runtime.
        self.state.protocol = runtime.into_inner();
        report
    }

    fn dispatch(&mut self, rt: &Runtime<ManualClock>, action: &Action) -> Result<Report> {
        match action {
            Action::Warp { seconds } => {
                self.state.now = self
                    .state
                    .now
                    .checked_add(*seconds)
                    .ok_or_else(|| anyhow!("clock overflow"))?;
                tracing::info!(seconds, now = self.state.now, "clock advanced");
                Ok(Report::new("warp", "Clock")
                    .row("advanced_by", *seconds)
                    .row("now", self.state.now))
            }

            Action::Fund { user, amount } => {
                let key = self.user(user);
                let amount = amount.unwrap_or(self.state.config.faucet.amount);
                rt.execute("faucet", |p, _| p.faucet(&key, amount))?;
                self.state.funded.insert(user.clone());
                Ok(Report::new("fund", "Fund")
                    .row("user", user.as_str())
                    .row("address", key.to_string())
                    .row("amount_each", amount))
            }

            Action::Deposit { user, amount_a, amount_b } => {
                let key = self.user(user);
                if !self.state.funded.contains(user) {
                    let amount = self.state.config.faucet.amount;
                    rt.execute("faucet", |p, _| p.faucet(&key, amount))?;
                    self.state.funded.insert(user.clone());
                    tracing::info!(user = %user, amount, "new user funded");
                }
                let shares = rt.deposit(&key, *amount_a, *amount_b).context("deposit failed")?;
                let (total_shares, total_assets) =
                    rt.read(|p| (p.vault.total_supply(), p.vault.total_assets()));
                Ok(Report::new("deposit", "Deposit")
                    .row("user", user.as_str())
                    .row("amount_a", *amount_a)
                    .row("amount_b", *amount_b)
                    .row("shares_minted", shares)
                    .gap()
                    .row("vault_total_shares", total_shares)
                    .row("vault_total_assets", total_assets))
            }

            Action::Withdraw { user, shares } => {
                let key = self.user(user);
                let shares = match shares {
                    Some(shares) => *shares,
                    None => rt.read(|p| p.vault.balance_of(&key)),
                };
                let (amount_a, amount_b) = rt.withdraw(&key, shares).context("withdraw failed")?;
                Ok(Report::new("withdraw", "Withdraw")
                    .row("user", user.as_str())
                    .row("shares_burned", shares)
                    .row("amount_a", amount_a)
                    .row("amount_b", amount_b))
            }

            Action::Claim { user } => {
                let key = self.user(user);
                let paid = rt.claim_rewards(&key).context("claim failed")?;
                let balance = rt.read(|p| p.tokens.balance_of(&p.strategy.reward_token(), &key));
                Ok(Report::new("claim", "Claim Rewards")
                    .row("user", user.as_str())
                    .row("rewards_paid", paid)
                    .row("reward_balance", balance))
            }

            Action::Reinvest => {
                let lp = rt.reinvest_rewards().context("reinvest failed")?;
                let (total_assets, total_reinvested) =
                    rt.read(|p| (p.vault.total_assets(), p.strategy.total_reinvested_lp()));
                Ok(Report::new("reinvest", "Reinvest")
                    .row("lp_added", lp)
                    .row("total_reinvested_lp", total_reinvested)
                    .row("vault_total_assets", total_assets))
            }

            Action::Transfer { from, to, shares } => {
                let (source, target) = (self.user(from), self.user(to));
                rt.execute("transfer_shares", |p, now| p.transfer_shares(now, &source, &target, *shares))
                    .context("share transfer failed")?;
                Ok(Report::new("transfer", "Share Transfer")
                    .row("from", from.as_str())
                    .row("to", to.as_str())
                    .row("shares", *shares))
            }

            Action::SetSlippage { bps, caller } => {
                let key = self.caller(caller.as_deref());
                rt.set_slippage_tolerance(&key, *bps).context("set-slippage failed")?;
                Ok(Report::new("set-slippage", "Slippage Tolerance")
                    .row("slippage_bps", *bps)
                    .row("slippage_pct", f64::from(*bps) / 100.0))
            }

            Action::SetRewardRate { rate, caller } => {
                let key = self.caller(caller.as_deref());
                rt.set_reward_rate(&key, *rate).context("set-reward-rate failed")?;
                Ok(Report::new("set-reward-rate", "Reward Rate").row("reward_rate", *rate))
            }

            Action::FundRewards { amount, caller } => {
                let key = self.caller(caller.as_deref());
                // The simulated treasury mints to the funder first.
                let reserve = rt
                    .execute("fund_rewards", |p, now| {
                        let reward = p.rewards.reward_token();
                        p.tokens.mint_to(&reward, &key, *amount)?;
                        p.fund_rewards(now, &key, *amount)
                    })
                    .context("fund-rewards failed")?;
                Ok(Report::new("fund-rewards", "Reward Reserve")
                    .row("funded", *amount)
                    .row("reward_reserve", reserve))
            }

            Action::SetDepositLimit { limit, caller } => {
                let key = self.caller(caller.as_deref());
                rt.execute("set_deposit_limit", |p, now| p.set_deposit_limit(now, &key, *limit))
                    .context("set-deposit-limit failed")?;
                Ok(Report::new("set-deposit-limit", "Deposit Limit").row("deposit_limit", *limit))
            }

            Action::Pause { caller } => {
                let key = self.caller(caller.as_deref());
                rt.pause(&key).context("pause failed")?;
                Ok(Report::new("pause", "Vault").row("paused", true))
            }

            Action::Unpause { caller } => {
                let key = self.caller(caller.as_deref());
                rt.unpause(&key).context("unpause failed")?;
                Ok(Report::new("unpause", "Vault").row("paused", false))
            }

            Action::EmergencyWithdraw { caller } => {
                let key = self.caller(caller.as_deref());
                let exit = rt.emergency_withdraw(&key).context("emergency-withdraw failed")?;
                Ok(Report::new("emergency-withdraw", "Emergency Withdraw")
                    .row("lp_unwound", exit.lp)
                    .row("amount_a", exit.amount_a)
                    .row("amount_b", exit.amount_b)
                    .row("rewards", exit.rewards)
                    .row("recipient", key.to_string()))
            }
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    pub fn status(&self, user: Option<&str>) -> Result<Report> {
        let p = &self.state.protocol;
        let now = self.state.now;
        let (token_a, token_b) = (p.strategy.token_a(), p.strategy.token_b());
        let pool = <ConstantProductAmm as Amm<MemoryLedger>>::reserves(&p.amm, &token_a, &token_b)?;

        let share_price = if p.vault.total_supply() > 0 {
            p.vault.total_assets() as f64 / p.vault.total_supply() as f64
        } else {
            1.0
        };
        let pending = p.rewards.earned(&p.strategy.id(), now)?;

        let mut report = Report::new("status", &format!("Status at t={now}"))
            .row("vault", p.vault.id().to_string())
            .row("share_symbol", p.vault.symbol())
            .row("total_shares", p.vault.total_supply())
            .row("total_assets", p.vault.total_assets())
            .row("share_price", share_price)
            .row("deposit_limit", p.vault.deposit_limit())
            .row("paused", p.vault.is_paused())
            .gap()
            .row("reward_rate", p.rewards.reward_rate())
            .row("reward_reserve", p.rewards.reward_reserve())
            .row("total_staked", p.rewards.total_supply())
            .row("pending_rewards", pending)
            .row("total_harvested", p.strategy.total_harvested())
            .row("total_reinvested_lp", p.strategy.total_reinvested_lp())
            .row("slippage_bps", p.strategy.slippage_tolerance_bps())
            .gap()
            .row("pair", pool.pair.to_string())
            .row("reserve_a", pool.reserve_a)
            .row("reserve_b", pool.reserve_b)
            .row("lp_supply", pool.lp_supply);

        if let Some(name) = user {
            let key = named_key(name);
            let shares = p.vault.balance_of(&key);
            let pending_share = if shares > 0 {
                mul_div_floor(pending, shares, p.vault.total_supply())?
            } else {
                0
            };
            report = report
                .gap()
                .row("user", name)
                .row("user_shares", shares)
                .row("user_position_lp", p.position_value(&key)?)
                .row("user_pending_rewards", pending_share)
                .row("user_balance_a", p.tokens.balance_of(&token_a, &key))
                .row("user_balance_b", p.tokens.balance_of(&token_b, &key))
                .row("user_balance_reward", p.tokens.balance_of(&p.strategy.reward_token(), &key));
        }
        Ok(report)
    }
}

// ─── Actions ──────────────────────────────────────────────────────────────────

/// One state-changing step. Subcommands and `run --script` steps both map to
/// this; a script is TOML with one `[[step]]` table per action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", deny_unknown_fields)]
pub enum Action {
    Fund {
        user: String,
        #[serde(default)]
        amount: Option<u64>,
    },
    Deposit {
        user: String,
        amount_a: u64,
        amount_b: u64,
    },
    /// `shares` omitted redeems the whole balance.
    Withdraw {
        user: String,
        #[serde(default)]
        shares: Option<u64>,
    },
    Claim {
        user: String,
    },
    Reinvest,
    Warp {
        seconds: u64,
    },
    Transfer {
        from: String,
        to: String,
        shares: u64,
    },
    SetSlippage {
        bps: u16,
        #[serde(default, rename = "as")]
        caller: Option<String>,
    },
    SetRewardRate {
        rate: u64,
        #[serde(default, rename = "as")]
        caller: Option<String>,
    },
    FundRewards {
        amount: u64,
        #[serde(default, rename = "as")]
        caller: Option<String>,
    },
    SetDepositLimit {
        limit: u64,
        #[serde(default, rename = "as")]
        caller: Option<String>,
    },
    Pause {
        #[serde(default, rename = "as")]
        caller: Option<String>,
    },
    Unpause {
        #[serde(default, rename = "as")]
        caller: Option<String>,
    },
    EmergencyWithdraw {
        #[serde(default, rename = "as")]
        caller: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Keep going after a failed step instead of aborting the run.
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(rename = "step", default)]
    pub steps: Vec<Action>,
}

impl Script {
    pub fn parse(raw: &str) -> Result<Self> {
        let script: Self = toml::from_str(raw).context("invalid script")?;
        if script.steps.is_empty() {
            bail!("script has no [[step]] entries");
        }
        Ok(script)
    }
}

// ─── Output ───────────────────────────────────────────────────────────────────

/// Result of one command, renderable as aligned text or as JSON.
#[derive(Debug, Clone)]
pub struct Report {
    pub command: String,
    pub title: String,
    rows: Vec<Option<(&'static str, Value)>>,
}

impl Report {
    pub fn new(command: &str, title: &str) -> Self {
        Self { command: command.to_string(), title: title.to_string(), rows: Vec::new() }
    }

    pub fn row(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        self.rows.push(Some((key, value.into())));
        self
    }

    /// Blank line in text output; ignored in JSON.
    pub fn gap(mut self) -> Self {
        self.rows.push(None);
        self
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("status".into(), json!("ok"));
        map.insert("command".into(), json!(self.command));
        for (key, value) in self.rows.iter().flatten() {
            map.insert((*key).to_string(), value.clone());
        }
        Value::Object(map)
    }

    pub fn print(&self, json_output: bool) {
        if json_output {
            println!("{}", self.to_json());
            return;
        }
        let rule = "─".repeat(60usize.saturating_sub(self.title.len()));
        println!("─── {} {rule}", self.title);
        for row in &self.rows {
            match row {
                Some((key, value)) => println!("  {:<22}{}", label(key), render(value)),
                None => println!(),
            }
        }
    }
}

fn label(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_f64() => format!("{:.6}", n.as_f64().unwrap_or_default()),
        other => other.to_string(),
    }
}
