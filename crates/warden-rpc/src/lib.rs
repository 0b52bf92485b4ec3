//! Warden network access
//!
//! Everything the orchestration layer needs from the chain, behind one trait:
//! - Chain id, nonces, balances, block height
//! - Gas estimation and gas price
//! - Read-only calls against the account contract
//! - Raw envelope broadcast and receipt lookup
//!
//! [`JsonRpcProvider`] talks to a node over HTTP JSON-RPC through alloy. Tests substitute
//! their own [`NetworkProvider`] implementations.
//!
//! # Example
//!
//! ```ignore
//! use warden_rpc::{JsonRpcProvider, NetworkProvider};
//!
//! let provider = JsonRpcProvider::new("http://localhost:3050")?;
//! let chain_id = provider.chain_id().await?;
//! println!("Connected to chain {}", chain_id);
//! ```

pub mod jsonrpc;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

pub use jsonrpc::JsonRpcProvider;

/// Errors from network operations
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object.
    #[error("Node error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A read-only call or a gas estimation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl CallRequest {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from: None,
            to,
            data: data.into(),
            value: U256::ZERO,
        }
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Inclusion record of a broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    /// `false` when execution reverted.
    pub status: bool,
}

#[async_trait]
pub trait NetworkProvider: Send + Sync {
    async fn chain_id(&self) -> Result<u64, RpcError>;

    /// Next nonce of `address` (transaction count at the latest block).
    async fn transaction_count(&self, address: Address) -> Result<u64, RpcError>;

    async fn estimate_gas(&self, request: &CallRequest) -> Result<U256, RpcError>;

    async fn gas_price(&self) -> Result<U256, RpcError>;

    async fn call(&self, request: &CallRequest) -> Result<Bytes, RpcError>;

    async fn balance(&self, address: Address) -> Result<U256, RpcError>;

    /// Broadcast an encoded envelope. Returns the transaction hash.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError>;

    /// `None` while the transaction is not yet included.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError>;

    async fn block_number(&self) -> Result<u64, RpcError>;
}
