//! Warden CLI: deploy and drive guardian-protected accounts
//!
//! Addresses and signing keys live in a flat `.env` store; network and
//! submission settings in `warden.toml` (optional, env vars override).
//!
//! # Usage
//!
//! ```bash
//! warden deploy-account                      # owner account
//! warden deploy-account --guardian 1         # guardian accounts
//! warden deploy-account --guardian 2
//! warden guardians add --guardian 1
//! warden guardians add --guardian 2
//! warden vault run --amount 0.001            # create, approve x2, execute
//! warden recovery run --initiator 1 --supporter 2
//! ```

mod commands;
mod config;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "warden", version, about = "Guardian recovery and vault withdrawals for smart accounts")]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "warden.toml", env = "WARDEN_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate configuration and the key/value store, then exit
    Validate,

    /// Show balances of the funder, the account and its guardians
    Balance {
        /// Show only this address
        #[arg(long)]
        address: Option<Address>,
    },

    /// Deploy a new account through the factory and fund it
    DeployAccount {
        /// Store as guardian N instead of the owner account
        #[arg(long)]
        guardian: Option<u8>,

        /// Skip the funding transfer
        #[arg(long)]
        no_fund: bool,
    },

    /// Send ETH from the funding key
    Fund {
        #[arg(long)]
        to: Address,

        /// Amount in ETH (defaults to deploy.fund_amount)
        #[arg(long)]
        amount: Option<String>,
    },

    /// Manage the account's guardian set
    #[command(subcommand)]
    Guardians(GuardianCommand),

    /// Guardian-driven replacement of the signing key
    #[command(subcommand)]
    Recovery(RecoveryCommand),

    /// Threshold-approved withdrawals
    #[command(subcommand)]
    Vault(VaultCommand),
}

#[derive(Debug, Subcommand)]
pub enum GuardianCommand {
    List,
    Add(GuardianTarget),
    Remove {
        /// Position in the current guardian list
        index: usize,
    },
}

#[derive(Debug, Args)]
pub struct GuardianTarget {
    /// Guardian address
    #[arg(conflicts_with = "guardian", required_unless_present = "guardian")]
    pub address: Option<Address>,

    /// Use GUARDIAN_ADDRESS_<N> from the store
    #[arg(long)]
    pub guardian: Option<u8>,
}

#[derive(Debug, Subcommand)]
pub enum RecoveryCommand {
    /// Show the open recovery process and the current signing address
    Show,

    Initiate {
        /// Initiating guardian index
        #[arg(long)]
        guardian: u8,

        /// Proposed signing address (a fresh key is generated and stored if omitted)
        #[arg(long)]
        new_signer: Option<Address>,
    },

    Support {
        #[arg(long)]
        guardian: u8,
    },

    Execute {
        #[arg(long)]
        guardian: u8,
    },

    /// initiate → support → execute with a freshly generated signing key
    Run {
        #[arg(long, default_value_t = 1)]
        initiator: u8,

        #[arg(long, default_value_t = 2)]
        supporter: u8,
    },
}

#[derive(Debug, Subcommand)]
pub enum VaultCommand {
    Create {
        /// Amount in ETH
        #[arg(long)]
        amount: String,

        /// Recipient (defaults to the funding key's address)
        #[arg(long)]
        to: Option<Address>,
    },

    Approve {
        #[arg(long)]
        id: u64,

        #[arg(long)]
        guardian: u8,
    },

    Execute {
        #[arg(long)]
        id: u64,
    },

    Cancel {
        #[arg(long)]
        id: u64,
    },

    Show {
        #[arg(long)]
        id: u64,
    },

    /// create → approve by each guardian → execute
    Run {
        /// Amount in ETH
        #[arg(long, default_value = "0.001")]
        amount: String,

        /// Recipient (defaults to the funding key's address)
        #[arg(long)]
        to: Option<Address>,

        /// Approving guardian indices (defaults to every stored guardian)
        #[arg(long, value_delimiter = ',')]
        guardians: Vec<u8>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config
    let mut warden_config = config::WardenConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    // Apply env overrides
    warden_config.apply_env_overrides();

    // Validate
    warden_config
        .validate()
        .context("Configuration validation failed")?;

    // Init logger
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&warden_config.logging.level),
    )
    .init();

    if let Command::Validate = cli.command {
        return commands::validate(&warden_config);
    }

    // Build tokio runtime
    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    if let Err(e) = rt.block_on(commands::run(cli.command, warden_config)) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
