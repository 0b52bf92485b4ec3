//! Shared test fixtures: deterministic keys and a scripted provider.

use crate::pipeline::PipelineConfig;
use alloy_primitives::{hex, Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use warden_core::{sign, Credential, EnvelopeDraft, SignedEnvelope};
use warden_rpc::{CallRequest, NetworkProvider, Receipt, RpcError};

pub const TEST_CHAIN_ID: u64 = 270;

/// Deterministic credential from a seed byte.
pub fn test_credential(seed: u8) -> Credential {
    let mut bytes = [0u8; 32];
    bytes[0] = 0x01;
    bytes[31] = seed;
    Credential::from_slice(&bytes).unwrap()
}

/// A signed plain transfer from the credential's own address.
pub fn signed_transfer(credential: &Credential, nonce: u64) -> SignedEnvelope {
    let draft = EnvelopeDraft::new(credential.address(), Address::repeat_byte(0xee), Bytes::new())
        .value(U256::from(1u8))
        .unwrap()
        .chain_id(TEST_CHAIN_ID)
        .unwrap()
        .nonce(nonce)
        .unwrap()
        .fees(U256::from(21_000u64), U256::from(1_000u64))
        .unwrap();
    sign(draft, credential).unwrap()
}

/// Pipeline settings that confirm in milliseconds.
pub fn fast_pipeline(confirmations: u64) -> PipelineConfig {
    PipelineConfig {
        confirmations,
        poll_interval: Duration::from_millis(1),
        timeout: Duration::from_millis(200),
    }
}

struct MockState {
    head: u64,
    stalled: bool,
    nonces: HashMap<Address, u64>,
    balances: HashMap<Address, U256>,
    gas_estimate: Option<U256>,
    gas_price: Option<U256>,
    calls: HashMap<[u8; 4], Bytes>,
    reject: Option<String>,
    revert: bool,
    receipts: HashMap<B256, Receipt>,
    sent: Vec<SignedEnvelope>,
}

/// Scripted provider: every broadcast is mined into the next block, and each
/// `block_number` poll advances the head by one unless stalled.
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                head: 100,
                stalled: false,
                nonces: HashMap::new(),
                balances: HashMap::new(),
                gas_estimate: Some(U256::from(1_000_000u64)),
                gas_price: Some(U256::from(250_000_000u64)),
                calls: HashMap::new(),
                reject: None,
                revert: false,
                receipts: HashMap::new(),
                sent: Vec::new(),
            }),
        }
    }

    pub fn set_gas_estimate(&self, estimate: Option<U256>) {
        self.state.lock().unwrap().gas_estimate = estimate;
    }

    pub fn set_gas_price(&self, price: Option<U256>) {
        self.state.lock().unwrap().gas_price = price;
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().unwrap().balances.insert(address, balance);
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.lock().unwrap().nonces.insert(address, nonce);
    }

    /// Fixed return data for every call with this selector.
    pub fn set_call_response(&self, selector: [u8; 4], data: impl Into<Bytes>) {
        self.state
            .lock()
            .unwrap()
            .calls
            .insert(selector, data.into());
    }

    pub fn reject_broadcasts(&self, reason: &str) {
        self.state.lock().unwrap().reject = Some(reason.to_string());
    }

    pub fn revert_transactions(&self) {
        self.state.lock().unwrap().revert = true;
    }

    pub fn stall_blocks(&self) {
        self.state.lock().unwrap().stalled = true;
    }

    pub fn head(&self) -> u64 {
        self.state.lock().unwrap().head
    }

    pub fn sent(&self) -> Vec<SignedEnvelope> {
        self.state.lock().unwrap().sent.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkProvider for MockProvider {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        Ok(TEST_CHAIN_ID)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, RpcError> {
        Ok(*self.state.lock().unwrap().nonces.get(&address).unwrap_or(&0))
    }

    async fn estimate_gas(&self, _request: &CallRequest) -> Result<U256, RpcError> {
        self.state
            .lock()
            .unwrap()
            .gas_estimate
            .ok_or_else(|| RpcError::Node {
                code: 3,
                message: "execution reverted".into(),
            })
    }

    async fn gas_price(&self) -> Result<U256, RpcError> {
        self.state
            .lock()
            .unwrap()
            .gas_price
            .ok_or_else(|| RpcError::Transport("connection refused".into()))
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, RpcError> {
        let state = self.state.lock().unwrap();
        let selector: [u8; 4] = request.data[..4].try_into().unwrap();
        state
            .calls
            .get(&selector)
            .cloned()
            .ok_or_else(|| RpcError::Node {
                code: 3,
                message: format!("no scripted response for 0x{}", hex::encode(selector)),
            })
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        Ok(*self
            .state
            .lock()
            .unwrap()
            .balances
            .get(&address)
            .unwrap_or(&U256::ZERO))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.reject {
            return Err(RpcError::Node {
                code: -32000,
                message: reason.clone(),
            });
        }
        let signed = SignedEnvelope::decode(raw).map_err(|e| RpcError::Node {
            code: -32602,
            message: e.to_string(),
        })?;

        let from = signed.envelope().from_address();
        let expected = *state.nonces.get(&from).unwrap_or(&0);
        if signed.envelope().nonce() != expected {
            return Err(RpcError::Node {
                code: -32000,
                message: format!(
                    "nonce mismatch: expected {}, got {}",
                    expected,
                    signed.envelope().nonce()
                ),
            });
        }
        state.nonces.insert(from, expected + 1);

        state.head += 1;
        let hash = signed.hash();
        let receipt = Receipt {
            transaction_hash: hash,
            block_number: state.head,
            status: !state.revert,
        };
        state.receipts.insert(hash, receipt);
        state.sent.push(signed);
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        Ok(self.state.lock().unwrap().receipts.get(&hash).copied())
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        let mut state = self.state.lock().unwrap();
        if !state.stalled {
            state.head += 1;
        }
        Ok(state.head)
    }
}

mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_call_names_selector() {
        let provider = MockProvider::new();
        provider.set_call_response([0x01, 0x02, 0x03, 0x04], vec![0xaa]);
        let request = CallRequest::new(Address::repeat_byte(0x11), vec![0xde, 0xad, 0xbe, 0xef, 0x00]);

        match provider.call(&request).await {
            Err(RpcError::Node { code, message }) => {
                assert_eq!(code, 3);
                assert_eq!(message, "no scripted response for 0xdeadbeef");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let scripted = CallRequest::new(Address::repeat_byte(0x11), vec![0x01, 0x02, 0x03, 0x04]);
        assert_eq!(provider.call(&scripted).await.unwrap(), Bytes::from(vec![0xaau8]));
    }
}
