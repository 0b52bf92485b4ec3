//! HTTP JSON-RPC provider backed by an alloy [`RootProvider`].

use crate::{CallRequest, NetworkProvider, Receipt, RpcError};
use alloy::network::{AnyNetwork, ReceiptResponse};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::TransactionRequest;
use alloy::serde::WithOtherFields;
use alloy::transports::http::{Client, Http};
use alloy::transports::{RpcError as TransportRpcError, TransportError};
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC client for an EVM-compatible node.
///
/// Uses [`AnyNetwork`] so receipts of type 0x71 deserialize.
pub struct JsonRpcProvider {
    url: String,
    inner: RootProvider<Http<Client>, AnyNetwork>,
}

impl JsonRpcProvider {
    /// Create a provider for `url` (e.g. "http://localhost:3050").
    pub fn new(url: &str) -> Result<Self, RpcError> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self, RpcError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RpcError::Transport(format!(
                "unsupported RPC URL (expected http:// or https://): {}",
                url
            )));
        }
        let parsed = url
            .parse::<reqwest::Url>()
            .map_err(|e| RpcError::Transport(format!("invalid RPC URL {}: {}", url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let transport = Http::with_client(client, parsed);
        let is_local = transport.guess_local();
        let inner = ProviderBuilder::new()
            .network::<AnyNetwork>()
            .on_client(RpcClient::new(transport, is_local));

        Ok(Self {
            url: url.to_string(),
            inner,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Map an alloy transport error, keeping the node's error code.
fn map_error(method: &str, err: TransportError) -> RpcError {
    match err {
        TransportRpcError::ErrorResp(payload) => {
            let mut message = payload.message.to_string();
            if let Some(data) = payload.data.as_ref() {
                message = format!("{} ({})", message, data.get().trim_matches('"'));
            }
            RpcError::Node {
                code: payload.code,
                message,
            }
        }
        TransportRpcError::NullResp => {
            RpcError::InvalidResponse(format!("{}: null response", method))
        }
        TransportRpcError::DeserError { err, text } => {
            RpcError::InvalidResponse(format!("{}: {} ({})", method, err, text))
        }
        other => RpcError::Transport(format!("{} failed: {}", method, other)),
    }
}

fn transaction_request(request: &CallRequest) -> WithOtherFields<TransactionRequest> {
    let mut tx = TransactionRequest::default()
        .to(request.to)
        .input(request.data.clone().into());
    if let Some(from) = request.from {
        tx = tx.from(from);
    }
    if !request.value.is_zero() {
        tx = tx.value(request.value);
    }
    WithOtherFields::new(tx)
}

/// Receipts without a block number are not included yet.
fn included<R: ReceiptResponse>(receipt: &R) -> Option<Receipt> {
    Some(Receipt {
        transaction_hash: receipt.transaction_hash(),
        block_number: receipt.block_number()?,
        status: receipt.status(),
    })
}

#[async_trait]
impl NetworkProvider for JsonRpcProvider {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        self.inner
            .get_chain_id()
            .await
            .map_err(|e| map_error("eth_chainId", e))
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, RpcError> {
        self.inner
            .get_transaction_count(address)
            .await
            .map_err(|e| map_error("eth_getTransactionCount", e))
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<U256, RpcError> {
        let tx = transaction_request(request);
        let gas = self
            .inner
            .estimate_gas(&tx)
            .await
            .map_err(|e| map_error("eth_estimateGas", e))?;
        Ok(U256::from(gas))
    }

    async fn gas_price(&self) -> Result<U256, RpcError> {
        let price = self
            .inner
            .get_gas_price()
            .await
            .map_err(|e| map_error("eth_gasPrice", e))?;
        Ok(U256::from(price))
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, RpcError> {
        let tx = transaction_request(request);
        self.inner
            .call(&tx)
            .await
            .map_err(|e| map_error("eth_call", e))
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        self.inner
            .get_balance(address)
            .await
            .map_err(|e| map_error("eth_getBalance", e))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError> {
        let pending = self
            .inner
            .send_raw_transaction(raw)
            .await
            .map_err(|e| map_error("eth_sendRawTransaction", e))?;
        let hash = *pending.tx_hash();
        log::debug!("Broadcast transaction {}", hash);
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        let receipt = self
            .inner
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| map_error("eth_getTransactionReceipt", e))?;
        Ok(receipt.as_ref().and_then(included))
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        self.inner
            .get_block_number()
            .await
            .map_err(|e| map_error("eth_blockNumber", e))
    }
}
