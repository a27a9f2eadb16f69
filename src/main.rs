use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use delegation_ledger::{Address, Amount, Epoch};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod ledger;

use config::StakeConfig;
use ledger::{LedgerMutation, LedgerSnapshot, StakeLedger};

//==================== CLI ====================//

#[derive(Parser)]
#[command(name = "stake-cli", version, about = "Delegation ledger with time-locked undelegation")]
struct Cli {
    /// TOML config file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ledger snapshot (JSON) read and rewritten by every command.
    #[arg(long, global = true, default_value = "stake-ledger.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an empty ledger using the configured lock period.
    Init {
        #[arg(long)]
        force: bool,
    },
    #[command(flatten)]
    Ledger(LedgerCommand),
}

/// Commands that operate on an existing state file.
#[derive(Subcommand)]
enum LedgerCommand {
    /// Credit spendable balance to an account.
    Credit {
        #[arg(long)]
        to: Address,
        #[arg(long, allow_hyphen_values = true)]
        amount: Amount,
    },
    /// Stake spendable balance to a validator.
    Delegate {
        #[arg(long)]
        validator: Address,
        #[arg(long)]
        delegator: Address,
        #[arg(long, allow_hyphen_values = true)]
        amount: Amount,
    },
    /// Queue active stake for withdrawal at an epoch.
    Undelegate {
        #[arg(long)]
        validator: Address,
        #[arg(long)]
        delegator: Address,
        #[arg(long)]
        epoch: Epoch,
        #[arg(long, allow_hyphen_values = true)]
        amount: Amount,
    },
    /// Finalize an epoch: release matured undelegations to spendable balance.
    Release {
        #[arg(long)]
        epoch: Epoch,
    },
    /// Print the amount still locked in undelegation.
    Total {
        #[arg(long)]
        validator: Address,
        #[arg(long)]
        delegator: Address,
    },
    /// Drop one pending undelegation entry (administrative correction).
    DeleteEntry {
        #[arg(long)]
        validator: Address,
        #[arg(long)]
        delegator: Address,
        #[arg(long)]
        epoch: Epoch,
    },
    /// Print the ledger snapshot.
    Show,
}

//==================== state file ====================//

fn load_ledger(path: &Path) -> Result<StakeLedger> {
    let bytes = fs::read(path).with_context(|| format!("read state {}", path.display()))?;
    let snapshot: LedgerSnapshot = serde_json::from_slice(&bytes)
        .with_context(|| format!("decode state {}", path.display()))?;
    StakeLedger::from_snapshot(snapshot).with_context(|| format!("verify state {}", path.display()))
}

fn save_ledger(path: &Path, ledger: &StakeLedger) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(&ledger.snapshot())?;
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    f.write_all(&bytes)?;
    f.sync_all()?;
    fs::rename(&tmp, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn apply_and_save(
    path: &Path,
    ledger: &mut StakeLedger,
    mutation: LedgerMutation,
    epoch: Epoch,
) -> Result<()> {
    ledger.apply_mutations(&[mutation], epoch)?;
    save_ledger(path, ledger)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//==================== commands ====================//

fn run(cli: Cli, config: &StakeConfig) -> Result<()> {
    let state = cli.state.as_path();
    match cli.command {
        Command::Init { force } => init_ledger(state, force, config),
        Command::Ledger(command) => {
            let mut ledger = load_ledger(state)?;
            if ledger.policy() != &config.lock_policy() {
                warn!(
                    stored = ledger.policy().lock_period,
                    configured = config.lock_period_epochs,
                    "state file lock period differs from config; using the stored one"
                );
            }
            execute(command, state, &mut ledger)
        }
    }
}

fn init_ledger(state: &Path, force: bool, config: &StakeConfig) -> Result<()> {
    if state.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", state.display());
    }
    let ledger = StakeLedger::new(config.lock_policy());
    save_ledger(state, &ledger)?;
    info!(
        path = %state.display(),
        lock_period = config.lock_period_epochs,
        "initialized ledger"
    );
    Ok(())
}

fn execute(command: LedgerCommand, state: &Path, ledger: &mut StakeLedger) -> Result<()> {
    // Mutations without an explicit epoch are stamped with the last finalized one.
    let current_epoch = ledger.meta.finalized_epoch.unwrap_or_default();

    match command {
        LedgerCommand::Credit { to, amount } => {
            apply_and_save(state, ledger, LedgerMutation::Credit { to, amount }, current_epoch)?;
            print_json(&json!({ "account": to, "available": ledger.balance(&to).to_string() }))
        }
        LedgerCommand::Delegate {
            validator,
            delegator,
            amount,
        } => {
            apply_and_save(
                state,
                ledger,
                LedgerMutation::Delegate {
                    validator,
                    delegator,
                    amount,
                },
                current_epoch,
            )?;
            print_delegation(ledger, &validator, &delegator)
        }
        LedgerCommand::Undelegate {
            validator,
            delegator,
            epoch,
            amount,
        } => {
            apply_and_save(
                state,
                ledger,
                LedgerMutation::Undelegate {
                    validator,
                    delegator,
                    amount,
                },
                epoch,
            )?;
            print_delegation(ledger, &validator, &delegator)
        }
        LedgerCommand::Release { epoch } => {
            let released = ledger.finalize_epoch(epoch)?;
            save_ledger(state, ledger)?;
            print_json(&json!({ "epoch": epoch, "released": released.to_string() }))
        }
        LedgerCommand::Total {
            validator,
            delegator,
        } => {
            let total = ledger.total_in_undelegation(&validator, &delegator);
            print_json(&json!({ "total_in_undelegation": total.to_string() }))
        }
        LedgerCommand::DeleteEntry {
            validator,
            delegator,
            epoch,
        } => {
            apply_and_save(
                state,
                ledger,
                LedgerMutation::DeleteEntry {
                    validator,
                    delegator,
                    epoch,
                },
                current_epoch,
            )?;
            print_delegation(ledger, &validator, &delegator)
        }
        LedgerCommand::Show => print_json(&serde_json::to_value(ledger.snapshot())?),
    }
}

fn print_delegation(ledger: &StakeLedger, validator: &Address, delegator: &Address) -> Result<()> {
    let Some(delegation) = ledger.delegation(validator, delegator) else {
        bail!("no delegation from {delegator} to validator {validator}");
    };
    print_json(&json!({
        "validator": validator,
        "delegation": delegation,
        "total_in_undelegation": delegation.total_in_undelegation().to_string(),
        "next_unlock_epoch": delegation.next_unlock_epoch(ledger.policy()),
    }))
}

fn init_tracing(config: &StakeConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("invalid log filter {:?}", config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = StakeConfig::load(cli.config.as_deref())?;
    init_tracing(&config)?;
    info!(network = %config.network, state = %cli.state.display(), "stake-cli starting");
    run(cli, &config)
}
