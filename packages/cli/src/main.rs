use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use yield_vault::{DeploymentConfig, Event};

mod session;

use session::{Action, Report, Script, Session};

fn print_banner() {
    let ver = env!("CARGO_PKG_VERSION");
    println!();
    println!("  Yield Vault  v{ver}  ·  auto-compounding LP vault");
    println!("  {}", "─".repeat(62));
    println!("  Pool      constant-product A/B pair, 0.30% swap fee");
    println!("  Rewards   continuous per-second emission on staked LP");
    println!("  State     local JSON file (see --state)");
    println!();
}

// ─── CLI definition ───────────────────────────────────────────────────────────

/// Yield Vault: deposit a token pair, earn compounding LP rewards.
///
/// Every command supports --json for machine-readable output.
/// Global options can also be set via environment variables:
///   YIELD_VAULT_STATE  path of the deployment state file
///   RUST_LOG           log filter (overrides the configured level)
#[derive(Parser)]
#[command(
    name    = "yield-vault",
    version,
    about   = "Yield Vault — deposit a token pair, earn compounding LP rewards",
    after_help = "\
QUICK START:
  yield-vault init
  yield-vault deposit  --user alice --amount-a 5000 --amount-b 5000
  yield-vault warp     --seconds 3600
  yield-vault reinvest
  yield-vault status   --user alice
  yield-vault withdraw --user alice

TIME:
  The deployment runs on a simulated clock that only `warp` advances."
)]
struct Cli {
    /// Path of the deployment state file
    #[arg(
        long,
        global     = true,
        value_name = "PATH",
        default_value = "yield-vault.json",
        env = "YIELD_VAULT_STATE"
    )]
    state: PathBuf,

    /// Output machine-readable JSON instead of human-readable text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a fresh vault, reward engine, strategy and pools
    #[command(after_help = "\
EXAMPLES:
  yield-vault init
  yield-vault init --config vault.toml --force
  yield-vault init --print-config > vault.toml")]
    Init {
        /// TOML deployment config; missing fields take defaults
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Simulated unix time the deployment starts at
        #[arg(long, default_value_t = 0)]
        start_time: u64,

        /// Overwrite an existing state file
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Print the effective config as TOML and exit
        #[arg(long, default_value_t = false)]
        print_config: bool,
    },

    /// Mint faucet balances of both pool assets to a user
    Fund {
        #[arg(long)]
        user: String,

        /// Amount of each asset (defaults to the configured faucet amount)
        #[arg(long)]
        amount: Option<u64>,
    },

    /// Deposit both assets and receive vault shares
    ///
    /// A user seen for the first time is funded from the faucet before
    /// depositing. Unused amounts stay with the user.
    #[command(after_help = "\
EXAMPLES:
  yield-vault deposit --user alice --amount-a 1000 --amount-b 1000")]
    Deposit {
        #[arg(long)]
        user: String,

        #[arg(long)]
        amount_a: u64,

        #[arg(long)]
        amount_b: u64,
    },

    /// Redeem shares for the underlying pair of assets
    #[command(after_help = "\
EXAMPLES:
  yield-vault withdraw --user alice --shares 500
  yield-vault withdraw --user alice            # whole balance")]
    Withdraw {
        #[arg(long)]
        user: String,

        /// Shares to redeem (omit for the full balance)
        #[arg(long)]
        shares: Option<u64>,
    },

    /// Harvest pending rewards and pay the caller's pro-rata slice
    Claim {
        #[arg(long)]
        user: String,
    },

    /// Swap harvested rewards into LP and add it to every holder's position
    Reinvest,

    /// Move shares between users
    Transfer {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        #[arg(long)]
        shares: u64,
    },

    /// Advance the simulated clock
    Warp {
        #[arg(long)]
        seconds: u64,
    },

    /// Show vault, rewards and pool state, optionally for one user
    Status {
        #[arg(long)]
        user: Option<String>,
    },

    /// Print the event log
    Events {
        /// Only the last N events
        #[arg(long, value_name = "N")]
        tail: Option<usize>,
    },

    /// Set the strategy's slippage tolerance (owner only)
    SetSlippage {
        /// Tolerance in basis points (0..=10000)
        #[arg(long)]
        bps: u16,

        /// Acting identity (defaults to the configured owner)
        #[arg(long = "as", value_name = "USER")]
        caller: Option<String>,
    },

    /// Set the reward emission rate per second (owner only)
    SetRewardRate {
        #[arg(long)]
        rate: u64,

        #[arg(long = "as", value_name = "USER")]
        caller: Option<String>,
    },

    /// Top up the reward reserve; emission stops once it runs dry
    FundRewards {
        #[arg(long)]
        amount: u64,

        /// Funding identity (defaults to the configured owner)
        #[arg(long = "as", value_name = "USER")]
        caller: Option<String>,
    },

    /// Set the per-deposit LP ceiling (owner only)
    SetDepositLimit {
        #[arg(long)]
        limit: u64,

        #[arg(long = "as", value_name = "USER")]
        caller: Option<String>,
    },

    /// Stop new deposits; withdrawals stay open (owner only)
    Pause {
        #[arg(long = "as", value_name = "USER")]
        caller: Option<String>,
    },

    /// Resume deposits (owner only)
    Unpause {
        #[arg(long = "as", value_name = "USER")]
        caller: Option<String>,
    },

    /// Unstake and unwind the whole position to the owner (owner only)
    EmergencyWithdraw {
        #[arg(long = "as", value_name = "USER")]
        caller: Option<String>,
    },

    /// Execute a TOML script of steps against the deployment
    #[command(after_help = "\
SCRIPT FORMAT:
  continue_on_error = false

  [[step]]
  action   = \"deposit\"
  user     = \"alice\"
  amount_a = 1000
  amount_b = 1000

  [[step]]
  action  = \"warp\"
  seconds = 3600

  [[step]]
  action = \"reinvest\"")]
    Run {
        #[arg(long, value_name = "PATH")]
        script: PathBuf,
    },
}

impl Commands {
    /// The state-changing commands, as the action they run.
    fn action(&self) -> Option<Action> {
        Some(match self {
            Commands::Fund { user, amount } => Action::Fund { user: user.clone(), amount: *amount },
            Commands::Deposit { user, amount_a, amount_b } => Action::Deposit {
                user: user.clone(),
                amount_a: *amount_a,
                amount_b: *amount_b,
            },
            Commands::Withdraw { user, shares } => Action::Withdraw { user: user.clone(), shares: *shares },
            Commands::Claim { user } => Action::Claim { user: user.clone() },
            Commands::Reinvest => Action::Reinvest,
            Commands::Transfer { from, to, shares } => Action::Transfer {
                from: from.clone(),
                to: to.clone(),
                shares: *shares,
            },
            Commands::Warp { seconds } => Action::Warp { seconds: *seconds },
            Commands::SetSlippage { bps, caller } => Action::SetSlippage { bps: *bps, caller: caller.clone() },
            Commands::SetRewardRate { rate, caller } => {
                Action::SetRewardRate { rate: *rate, caller: caller.clone() }
            }
            Commands::FundRewards { amount, caller } => {
                Action::FundRewards { amount: *amount, caller: caller.clone() }
            }
            Commands::SetDepositLimit { limit, caller } => {
                Action::SetDepositLimit { limit: *limit, caller: caller.clone() }
            }
            Commands::Pause { caller } => Action::Pause { caller: caller.clone() },
            Commands::Unpause { caller } => Action::Unpause { caller: caller.clone() },
            Commands::EmergencyWithdraw { caller } => Action::EmergencyWithdraw { caller: caller.clone() },
            Commands::Init { .. } | Commands::Status { .. } | Commands::Events { .. } | Commands::Run { .. } => {
                return None
            }
        })
    }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    // When invoked with no arguments, show banner + full help and exit cleanly.
    if std::env::args().len() == 1 {
        print_banner();
        Cli::command().print_long_help().ok();
        println!();
        return Ok(());
    }

    let cli = Cli::parse();
    init_logging(&cli);

    match &cli.command {
        Commands::Init { config, start_time, force, print_config } => {
            cmd_init(&cli.state, config.as_deref(), *start_time, *force, *print_config, cli.json)?;
        }
        Commands::Status { user } => {
            Session::load(&cli.state)?.status(user.as_deref())?.print(cli.json);
        }
        Commands::Events { tail } => {
            cmd_events(&cli.state, *tail, cli.json)?;
        }
        Commands::Run { script } => {
            cmd_run(&cli.state, script, cli.json)?;
        }
        other => {
            if let Some(action) = other.action() {
                cmd_apply(&cli.state, &action, cli.json)?;
            }
        }
    }
    Ok(())
}

/// Logs go to stderr so `--json` output on stdout stays parseable. `RUST_LOG`
/// wins over the level in the deployment config.
fn init_logging(cli: &Cli) {
    let configured = Session::load(&cli.state)
        .ok()
        .map(|s| s.state().config.logging.clone())
        .unwrap_or_default();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,yield_vault={}", configured.level)));

    let json_logs = match cli.log_format {
        Some(LogFormat::Json) => true,
        Some(LogFormat::Pretty) => false,
        None => configured.json,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json_logs {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

fn cmd_init(
    state: &Path,
    config_path: Option<&Path>,
    start_time: u64,
    force: bool,
    print_config: bool,
    json_output: bool,
) -> Result<()> {
    let config = match config_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            DeploymentConfig::from_toml(&raw)?
        }
        None => DeploymentConfig::default(),
    };

    if print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }
    if state.exists() && !force {
        bail!(
            "{} already exists. Pass --force to replace the deployment.",
            state.display()
        );
    }

    let session = Session::create(state, config, start_time)?;
    session.save()?;

    let p = &session.state().protocol;
    Report::new("init", "Deployment")
        .row("state_file", state.display().to_string())
        .row("start_time", start_time)
        .gap()
        .row("vault", p.vault.id().to_string())
        .row("share_symbol", p.vault.symbol())
        .row("strategy", p.strategy.id().to_string())
        .row("reward_engine", p.rewards.id().to_string())
        .row("pair", p.strategy.pair().to_string())
        .row("token_a", p.strategy.token_a().to_string())
        .row("token_b", p.strategy.token_b().to_string())
        .row("reward_token", p.strategy.reward_token().to_string())
        .gap()
        .row("owner", p.strategy.owner().to_string())
        .row("reward_rate", p.rewards.reward_rate())
        .row("slippage_bps", p.strategy.slippage_tolerance_bps())
        .print(json_output);
    Ok(())
}

/// Load, run one action, save. A failed action leaves the file untouched.
fn cmd_apply(state: &Path, action: &Action, json_output: bool) -> Result<()> {
    let mut session = Session::load(state)?;
    let report = session.apply(action)?;
    session.save()?;
    report.print(json_output);
    Ok(())
}

fn cmd_events(state: &Path, tail: Option<usize>, json_output: bool) -> Result<()> {
    let session = Session::load(state)?;
    let events: Vec<&Event> = session.state().protocol.events.iter().collect();
    let skip = tail.map_or(0, |n| events.len().saturating_sub(n));
    let shown = &events[skip..];

    if json_output {
        println!("{}", json!({
            "status":  "ok",
            "command": "events",
            "total":   events.len(),
            "events":  shown,
        }));
    } else {
        println!("─── Events ({} of {}) ──────────────────────────────────────────", shown.len(), events.len());
        for (offset, event) in shown.iter().enumerate() {
            println!("  #{:<5} {}", skip + offset, serde_json::to_string(event)?);
        }
    }
    Ok(())
}

fn cmd_run(state: &Path, script_path: &Path, json_output: bool) -> Result<()> {
    let raw = fs::read_to_string(script_path)
        .with_context(|| format!("reading script {}", script_path.display()))?;
    let script = Script::parse(&raw)?;
    let mut session = Session::load(state)?;

    let mut results = Vec::with_capacity(script.steps.len());
    let mut failures = 0usize;
    for (index, step) in script.steps.iter().enumerate() {
        match session.apply(step) {
            Ok(report) => {
                if !json_output {
                    println!("[step {index}]");
                    report.print(false);
                }
                results.push(report.to_json());
            }
            Err(err) => {
                failures += 1;
                tracing::warn!(step = index, error = %format!("{err:#}"), "script step failed");
                if !json_output {
                    println!("[step {index}] failed: {err:#}");
                }
                results.push(json!({ "status": "error", "step": index, "error": format!("{err:#}") }));
                if !script.continue_on_error {
                    break;
                }
            }
        }
    }

    // An aborted run leaves the state file as it was.
    let aborted = failures > 0 && !script.continue_on_error;
    if !aborted {
        session.save()?;
    }

    if json_output {
        println!("{}", json!({
            "status":   if aborted { "error" } else { "ok" },
            "command":  "run",
            "steps":    results,
            "failures": failures,
            "saved":    !aborted,
        }));
    }
    if aborted {
        bail!("script aborted after {failures} failed step(s); state file left unchanged");
    }
    Ok(())
}
