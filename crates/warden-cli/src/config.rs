//! CLI configuration, parsed from a TOML file with environment variable overrides.
//!
//! Priority: environment variables > config file > defaults.

use alloy_primitives::utils::parse_ether;
use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use warden_flow::PipelineConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    #[serde(default)]
    pub network: NetworkSection,

    /// Confirmation depth and polling
    #[serde(default)]
    pub submission: SubmissionSection,

    /// Account factory settings
    #[serde(default)]
    pub deploy: DeploySection,

    /// Minimum balances checked before scenario commands
    #[serde(default)]
    pub preconditions: PreconditionSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
    /// JSON-RPC endpoint of the node
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionSection {
    /// Blocks required, counting the inclusion block (default: 6)
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    /// Give up waiting after this many seconds (default: 300)
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for SubmissionSection {
    fn default() -> Self {
        Self {
            confirmations: default_confirmations(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySection {
    /// Address of the deployed account factory
    pub factory_address: Option<String>,

    /// 32-byte deployment salt (hex)
    #[serde(default = "default_salt")]
    pub salt: String,

    /// ETH sent to each freshly deployed account
    #[serde(default = "default_fund_amount")]
    pub fund_amount: String,
}

impl Default for DeploySection {
    fn default() -> Self {
        Self {
            factory_address: None,
            salt: default_salt(),
            fund_amount: default_fund_amount(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreconditionSection {
    /// Minimum ETH on the funding key
    #[serde(default = "default_min_funder_balance")]
    pub min_funder_balance: String,

    /// Minimum ETH on the managed account
    #[serde(default = "default_min_account_balance")]
    pub min_account_balance: String,
}

impl Default for PreconditionSection {
    fn default() -> Self {
        Self {
            min_funder_balance: default_min_funder_balance(),
            min_account_balance: default_min_account_balance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// Key/value file holding addresses and signing keys
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_rpc_url() -> String {
    "http://localhost:3050".to_string()
}

fn default_confirmations() -> u64 {
    6
}

fn default_confirmation_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_salt() -> String {
    format!("0x{}", "00".repeat(32))
}

fn default_fund_amount() -> String {
    "0.001".to_string()
}

fn default_min_funder_balance() -> String {
    "0.01".to_string()
}

fn default_min_account_balance() -> String {
    "0.0015".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".env")
}

fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl WardenConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: WardenConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `WARDEN_RPC_URL`
    /// - `WARDEN_CONFIRMATIONS`
    /// - `WARDEN_CONFIRMATION_TIMEOUT`
    /// - `WARDEN_POLL_INTERVAL_MS`
    /// - `WARDEN_FACTORY_ADDRESS`
    /// - `WARDEN_SALT`
    /// - `WARDEN_STORE_PATH`
    /// - `WARDEN_LOG_LEVEL`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WARDEN_RPC_URL") {
            self.network.rpc_url = v;
        }
        if let Ok(v) = std::env::var("WARDEN_CONFIRMATIONS") {
            if let Ok(n) = v.parse::<u64>() {
                self.submission.confirmations = n;
            }
        }
        if let Ok(v) = std::env::var("WARDEN_CONFIRMATION_TIMEOUT") {
            if let Ok(secs) = v.parse::<u64>() {
                self.submission.confirmation_timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("WARDEN_POLL_INTERVAL_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                self.submission.poll_interval_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("WARDEN_FACTORY_ADDRESS") {
            self.deploy.factory_address = Some(v);
        }
        if let Ok(v) = std::env::var("WARDEN_SALT") {
            self.deploy.salt = v;
        }
        if let Ok(v) = std::env::var("WARDEN_FUND_AMOUNT") {
            self.deploy.fund_amount = v;
        }
        if let Ok(v) = std::env::var("WARDEN_MIN_FUNDER_BALANCE") {
            self.preconditions.min_funder_balance = v;
        }
        if let Ok(v) = std::env::var("WARDEN_MIN_ACCOUNT_BALANCE") {
            self.preconditions.min_account_balance = v;
        }
        if let Ok(v) = std::env::var("WARDEN_STORE_PATH") {
            self.store.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("WARDEN_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            confirmations: self.submission.confirmations,
            poll_interval: Duration::from_millis(self.submission.poll_interval_ms),
            timeout: Duration::from_secs(self.submission.confirmation_timeout_secs),
        }
    }

    pub fn factory_address(&self) -> Result<Address> {
        let raw = self
            .deploy
            .factory_address
            .as_deref()
            .context("deploy.factory_address is not set")?;
        Address::from_str(raw).with_context(|| format!("Invalid deploy.factory_address: {}", raw))
    }

    pub fn salt(&self) -> Result<B256> {
        B256::from_str(&self.deploy.salt)
            .with_context(|| format!("Invalid deploy.salt: {}", self.deploy.salt))
    }

    pub fn fund_amount(&self) -> Result<U256> {
        parse_eth(&self.deploy.fund_amount, "deploy.fund_amount")
    }

    pub fn min_funder_balance(&self) -> Result<U256> {
        parse_eth(
            &self.preconditions.min_funder_balance,
            "preconditions.min_funder_balance",
        )
    }

    pub fn min_account_balance(&self) -> Result<U256> {
        parse_eth(
            &self.preconditions.min_account_balance,
            "preconditions.min_account_balance",
        )
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.network.rpc_url.starts_with("http://")
                || self.network.rpc_url.starts_with("https://"),
            "network.rpc_url must be an http(s) URL"
        );

        anyhow::ensure!(
            self.submission.confirmations >= 1,
            "submission.confirmations must be >= 1"
        );
        anyhow::ensure!(
            self.submission.confirmation_timeout_secs > 0,
            "submission.confirmation_timeout_secs must be > 0"
        );
        anyhow::ensure!(
            self.submission.poll_interval_ms > 0,
            "submission.poll_interval_ms must be > 0"
        );
        anyhow::ensure!(
            self.submission.poll_interval_ms
                <= self.submission.confirmation_timeout_secs.saturating_mul(1000),
            "submission.poll_interval_ms must not exceed the confirmation timeout"
        );

        if self.deploy.factory_address.is_some() {
            self.factory_address()?;
        }
        self.salt()?;
        self.fund_amount()?;
        self.min_funder_balance()?;
        self.min_account_balance()?;

        anyhow::ensure!(
            !self.store.path.as_os_str().is_empty(),
            "store.path must not be empty"
        );

        Ok(())
    }
}

/// Parse a decimal ether string ("0.001") into wei.
pub fn parse_eth(value: &str, what: &str) -> Result<U256> {
    parse_ether(value.trim()).with_context(|| format!("Invalid ETH amount for {}: {}", what, value))
}

// ============================================================================
// Tests
// ============================================================================
