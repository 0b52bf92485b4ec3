//! Subcommand handlers.

use crate::config::{parse_eth, WardenConfig};
use crate::{Command, GuardianCommand, GuardianTarget, RecoveryCommand, VaultCommand};
use alloy_primitives::utils::format_ether;
use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use std::str::FromStr;
use std::sync::Arc;
use warden_core::actors::FUNDER;
use warden_core::store::keys;
use warden_core::{ActorRegistry, Credential, EnvStore, Role};
use warden_flow::{Orchestrator, WithdrawRequest};
use warden_rpc::{JsonRpcProvider, NetworkProvider};

/// Everything a command needs: config, the key/value store and an
/// orchestrator over the actors found in it.
struct App {
    config: WardenConfig,
    store: EnvStore,
    orchestrator: Orchestrator,
}

impl App {
    fn open(config: WardenConfig) -> Result<Self> {
        let store = EnvStore::open(&config.store.path)
            .with_context(|| format!("Failed to open store {}", config.store.path.display()))?;
        let registry = ActorRegistry::from_store(&store).context("Invalid key/value store")?;
        let provider: Arc<dyn NetworkProvider> = Arc::new(
            JsonRpcProvider::new(&config.network.rpc_url)
                .with_context(|| format!("Invalid RPC URL {}", config.network.rpc_url))?,
        );
        let orchestrator = Orchestrator::new(provider, registry, config.pipeline());

        Ok(Self {
            config,
            store,
            orchestrator,
        })
    }

    fn registry(&self) -> &ActorRegistry {
        self.orchestrator.registry()
    }

    fn funder() -> Role {
        Role::ThirdParty(FUNDER.to_string())
    }

    fn funder_address(&self) -> Result<Address> {
        Ok(self
            .registry()
            .get(&Self::funder())
            .context("PRIVATE_KEY missing from store")?
            .address)
    }

    fn stored_guardian(&self, index: u8) -> Result<Address> {
        let key = keys::guardian_address(index);
        let raw = self.store.require(&key)?;
        Address::from_str(raw).with_context(|| format!("Invalid {}: {}", key, raw))
    }

    /// Refuse to start a scenario on thin balances.
    async fn check_scenario_balances(&self) -> Result<()> {
        let funder = self.funder_address()?;
        self.orchestrator
            .require_balance(funder, self.config.min_funder_balance()?)
            .await
            .context("Funding key balance too low")?;

        let account = self.orchestrator.account()?;
        self.orchestrator
            .require_balance(account, self.config.min_account_balance()?)
            .await
            .context("Account balance too low")?;
        Ok(())
    }
}

/// `validate`: config was already checked by the caller; check the store too.
pub fn validate(config: &WardenConfig) -> Result<()> {
    let store = EnvStore::open(&config.store.path)
        .with_context(|| format!("Failed to open store {}", config.store.path.display()))?;
    let registry = ActorRegistry::from_store(&store).context("Invalid key/value store")?;

    println!("✅ Configuration is valid.");
    println!("  RPC:           {}", config.network.rpc_url);
    println!(
        "  Confirmations: {} (timeout {} secs)",
        config.submission.confirmations, config.submission.confirmation_timeout_secs
    );
    println!(
        "  Factory:       {}",
        config.deploy.factory_address.as_deref().unwrap_or("(not set)")
    );
    println!("  Store:         {}", config.store.path.display());
    for role in registry.roles() {
        if let Ok(actor) = registry.get(&role) {
            println!("  {:<14} {}", format!("{}:", role), actor.address);
        }
    }
    Ok(())
}

pub async fn run(command: Command, config: WardenConfig) -> Result<()> {
    let mut app = App::open(config)?;

    match command {
        Command::Validate => Ok(()),
        Command::Balance { address } => balance(&app, address).await,
        Command::DeployAccount { guardian, no_fund } => {
            deploy_account(&mut app, guardian, no_fund).await
        }
        Command::Fund { to, amount } => {
            let amount = match amount {
                Some(eth) => parse_eth(&eth, "--amount")?,
                None => app.config.fund_amount()?,
            };
            let receipt = app.orchestrator.fund(&App::funder(), to, amount).await?;
            println!(
                "Sent {} ETH to {} ({})",
                format_ether(amount),
                to,
                receipt.transaction_hash
            );
            Ok(())
        }
        Command::Guardians(cmd) => guardians(&app, cmd).await,
        Command::Recovery(cmd) => recovery(&mut app, cmd).await,
        Command::Vault(cmd) => vault(&app, cmd).await,
    }
}

async fn balance(app: &App, address: Option<Address>) -> Result<()> {
    let provider = app.orchestrator.provider();
    let targets: Vec<(String, Address)> = match address {
        Some(address) => vec![(address.to_string(), address)],
        None => app
            .registry()
            .roles()
            .into_iter()
            .filter_map(|role| {
                app.registry()
                    .get(&role)
                    .ok()
                    .map(|actor| (role.to_string(), actor.address))
            })
            .collect(),
    };
    anyhow::ensure!(!targets.is_empty(), "Nothing to show: the store is empty");

    for (label, address) in targets {
        let wei = provider
            .balance(address)
            .await
            .with_context(|| format!("Failed to read balance of {}", address))?;
        println!("{:<12} {} {} ETH", label, address, format_ether(wei));
    }
    Ok(())
}

async fn deploy_account(app: &mut App, guardian: Option<u8>, no_fund: bool) -> Result<()> {
    let factory = app.config.factory_address()?;
    let salt = app.config.salt()?;
    let funder = App::funder();

    let deployed = app
        .orchestrator
        .deploy_account(&funder, factory, salt)
        .await?;

    let signing_key = deployed.credential.to_hex();
    let (address_key, signing_key_key) = match guardian {
        Some(index) => (keys::guardian_address(index), keys::guardian_key(index)),
        None => (
            keys::WALLET_ADDRESS.to_string(),
            keys::WALLET_SIGNING_KEY.to_string(),
        ),
    };
    app.store.append(&[
        (address_key.as_str(), deployed.address.to_string()),
        (signing_key_key.as_str(), signing_key.to_string()),
    ])?;
    println!(
        "Deployed {} at {} (stored as {})",
        guardian.map_or("account".to_string(), |n| format!("guardian {}", n)),
        deployed.address,
        address_key
    );

    if !no_fund {
        let amount = app.config.fund_amount()?;
        app.orchestrator
            .fund(&funder, deployed.address, amount)
            .await?;
        println!("Funded {} with {} ETH", deployed.address, format_ether(amount));
    }
    Ok(())
}

async fn guardians(app: &App, cmd: GuardianCommand) -> Result<()> {
    match cmd {
        GuardianCommand::List => {
            let guardians = app.orchestrator.guardians().await?;
            println!("{} guardian(s):", guardians.len());
            for (index, guardian) in guardians.iter().enumerate() {
                println!("  [{}] {}", index, guardian);
            }
        }
        GuardianCommand::Add(GuardianTarget { address, guardian }) => {
            let address = match (address, guardian) {
                (Some(address), _) => address,
                (None, Some(index)) => app.stored_guardian(index)?,
                (None, None) => anyhow::bail!("Give a guardian address or --guardian <N>"),
            };
            app.orchestrator.add_guardian(address).await?;
            println!("Added guardian {}", address);
        }
        GuardianCommand::Remove { index } => {
            let removed = app.orchestrator.remove_guardian(index).await?;
            println!("Removed guardian {}", removed);
        }
    }
    Ok(())
}

async fn recovery(app: &mut App, cmd: RecoveryCommand) -> Result<()> {
    match cmd {
        RecoveryCommand::Show => {
            let state = app.orchestrator.recovery_state().await?;
            let signer = app.orchestrator.signing_address().await?;
            println!("Recovery:        {:?}", state);
            println!("Signing address: {}", signer);
        }
        RecoveryCommand::Initiate {
            guardian,
            new_signer,
        } => {
            let proposed = match new_signer {
                Some(address) => address,
                None => {
                    let credential = Credential::generate();
                    app.store.append(&[(
                        keys::RECOVERY_SIGNING_KEY,
                        credential.to_hex().to_string(),
                    )])?;
                    credential.address()
                }
            };
            let state = app
                .orchestrator
                .initiate_recovery(&Role::Guardian(guardian), proposed)
                .await?;
            println!("Recovery initiated: {:?}", state);
        }
        RecoveryCommand::Support { guardian } => {
            let state = app
                .orchestrator
                .support_recovery(&Role::Guardian(guardian))
                .await?;
            println!("Recovery supported: {:?}", state);
        }
        RecoveryCommand::Execute { guardian } => {
            let state = app
                .orchestrator
                .execute_recovery(&Role::Guardian(guardian))
                .await?;
            println!("Recovery executed: {:?}", state);
            promote_recovery_key(app, state.proposed())?;
        }
        RecoveryCommand::Run {
            initiator,
            supporter,
        } => {
            let credential = Credential::generate();
            app.store.append(&[(
                keys::RECOVERY_SIGNING_KEY,
                credential.to_hex().to_string(),
            )])?;

            let state = app
                .orchestrator
                .run_recovery(
                    &Role::Guardian(initiator),
                    &Role::Guardian(supporter),
                    credential.address(),
                )
                .await?;
            println!("Recovery executed: {:?}", state);
            promote_recovery_key(app, state.proposed())?;
        }
    }
    Ok(())
}

/// Make the stored recovery key the account's signing key once the account
/// confirms it.
fn promote_recovery_key(app: &mut App, proposed: Option<Address>) -> Result<()> {
    let Some(raw) = app.store.get(keys::RECOVERY_SIGNING_KEY) else {
        return Ok(());
    };
    let credential =
        Credential::from_hex(raw).context("Invalid RECOVERY_SIGNING_KEY in store")?;
    if Some(credential.address()) != proposed {
        log::warn!("Stored recovery key does not match the executed recovery; leaving store as is");
        return Ok(());
    }
    app.store.append(&[(
        keys::WALLET_SIGNING_KEY,
        credential.to_hex().to_string(),
    )])?;
    println!("Stored new signing key as {}", keys::WALLET_SIGNING_KEY);
    Ok(())
}

fn print_request(request: &WithdrawRequest) {
    println!("Withdraw request {}", request.id);
    println!("  Amount:    {} ETH", format_ether(request.amount));
    println!("  Recipient: {}", request.recipient);
    println!("  Approvals: {}/{}", request.approvals, request.threshold);
    println!("  State:     {}", request.state);
}

async fn vault(app: &App, cmd: VaultCommand) -> Result<()> {
    match cmd {
        VaultCommand::Create { amount, to } => {
            let amount = parse_eth(&amount, "--amount")?;
            let recipient = match to {
                Some(to) => to,
                None => app.funder_address()?,
            };
            let request = app
                .orchestrator
                .create_withdraw_request(amount, recipient)
                .await?;
            print_request(&request);
        }
        VaultCommand::Approve { id, guardian } => {
            let request = app
                .orchestrator
                .approve_withdraw_request(U256::from(id), &Role::Guardian(guardian))
                .await?;
            print_request(&request);
        }
        VaultCommand::Execute { id } => {
            let request = app
                .orchestrator
                .execute_withdraw_request(U256::from(id))
                .await?;
            print_request(&request);
        }
        VaultCommand::Cancel { id } => {
            let request = app
                .orchestrator
                .cancel_withdraw_request(U256::from(id))
                .await?;
            print_request(&request);
        }
        VaultCommand::Show { id } => {
            let request = app.orchestrator.withdraw_request(U256::from(id)).await?;
            print_request(&request);
        }
        VaultCommand::Run {
            amount,
            to,
            guardians,
        } => {
            app.check_scenario_balances().await?;

            let amount = parse_eth(&amount, "--amount")?;
            let recipient = match to {
                Some(to) => to,
                None => app.funder_address()?,
            };
            let guardians: Vec<Role> = if guardians.is_empty() {
                app.registry()
                    .guardians()
                    .iter()
                    .map(|actor| actor.role.clone())
                    .collect()
            } else {
                guardians.into_iter().map(Role::Guardian).collect()
            };
            anyhow::ensure!(!guardians.is_empty(), "No guardians in the store");

            let request = app
                .orchestrator
                .run_withdrawal(amount, recipient, &guardians)
                .await?;
            print_request(&request);
        }
    }
    Ok(())
}
