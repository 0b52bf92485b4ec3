//! Custom transaction envelope (EIP-712, type `0x71`)
//!
//! Three stages, each a distinct type:
//!
//! ```text
//! EnvelopeDraft --finalize--> Envelope --sign--> SignedEnvelope
//!  (set-once fields)          (complete, digest)   (immutable, wire form)
//! ```
//!
//! The digest is the EIP-712 signing hash over the account-abstraction
//! `Transaction` struct under the `zkSync` v2 domain. The struct's field order
//! is a compatibility contract with the account: reordering or adding a field
//! invalidates every signature produced before the change.
//!
//! Nothing on [`SignedEnvelope`] is mutable. Anything that needs a different
//! field has to start over from a new draft and sign again.

use crate::actors::{public_key_address, Credential};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable, Header};
use alloy_sol_types::{Eip712Domain, SolStruct};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// EIP-712 transaction type byte.
pub const EIP712_TX_TYPE: u8 = 0x71;

/// Gas per published data byte. Protocol constant, not user-configurable.
pub const DEFAULT_GAS_PER_PUBDATA_LIMIT: u64 = 50_000;

/// `r || s || v`
pub const SIGNATURE_LEN: usize = 65;

const DOMAIN_NAME: &str = "zkSync";
const DOMAIN_VERSION: &str = "2";

mod eip712 {
    alloy_sol_types::sol! {
        struct Transaction {
            uint256 txType;
            uint256 from;
            uint256 to;
            uint256 gasLimit;
            uint256 gasPerPubdataByteLimit;
            uint256 maxFeePerGas;
            uint256 maxPriorityFeePerGas;
            uint256 paymaster;
            uint256 nonce;
            uint256 value;
            bytes data;
            bytes32[] factoryDeps;
            bytes paymasterInput;
        }
    }
}

/// Draft fields that are filled in by later pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeField {
    Value,
    ChainId,
    Nonce,
    Fees,
}

impl fmt::Display for EnvelopeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvelopeField::Value => "value",
            EnvelopeField::ChainId => "chain id",
            EnvelopeField::Nonce => "nonce",
            EnvelopeField::Fees => "fees",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Envelope field already set: {0}")]
    AlreadySet(EnvelopeField),

    #[error("Unsupported transaction type: 0x{0:02x}")]
    UnsupportedType(u8),

    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("RLP error: {0}")]
    Rlp(#[from] alloy_rlp::Error),
}

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    #[error("Envelope incomplete: missing {0}")]
    Incomplete(EnvelopeField),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
}

/// Gas limit and per-gas price. The price is used both as max fee and as
/// priority fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fees {
    pub gas_limit: U256,
    pub gas_price: U256,
}

/// Append-only envelope builder.
///
/// Each stage can be set exactly once; a second write fails with
/// [`EnvelopeError::AlreadySet`] instead of silently overwriting.
#[derive(Debug, Clone)]
pub struct EnvelopeDraft {
    from: Address,
    to: Address,
    data: Bytes,
    value: Option<U256>,
    chain_id: Option<u64>,
    nonce: Option<u64>,
    fees: Option<Fees>,
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: EnvelopeField) -> Result<(), EnvelopeError> {
    if slot.is_some() {
        return Err(EnvelopeError::AlreadySet(field));
    }
    *slot = Some(value);
    Ok(())
}

impl EnvelopeDraft {
    /// Start an envelope from `from` (origin account) calling `to` with `data`.
    pub fn new(from: Address, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from,
            to,
            data: data.into(),
            value: None,
            chain_id: None,
            nonce: None,
            fees: None,
        }
    }

    /// Monetary value. Defaults to zero if never set.
    pub fn value(mut self, value: U256) -> Result<Self, EnvelopeError> {
        set_once(&mut self.value, value, EnvelopeField::Value)?;
        Ok(self)
    }

    pub fn chain_id(mut self, chain_id: u64) -> Result<Self, EnvelopeError> {
        set_once(&mut self.chain_id, chain_id, EnvelopeField::ChainId)?;
        Ok(self)
    }

    pub fn nonce(mut self, nonce: u64) -> Result<Self, EnvelopeError> {
        set_once(&mut self.nonce, nonce, EnvelopeField::Nonce)?;
        Ok(self)
    }

    pub fn fees(mut self, gas_limit: U256, gas_price: U256) -> Result<Self, EnvelopeError> {
        set_once(
            &mut self.fees,
            Fees {
                gas_limit,
                gas_price,
            },
            EnvelopeField::Fees,
        )?;
        Ok(self)
    }

    pub fn from_address(&self) -> Address {
        self.from
    }

    pub fn to_address(&self) -> Address {
        self.to
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn value_or_zero(&self) -> U256 {
        self.value.unwrap_or(U256::ZERO)
    }

    /// Validate that every digest field is present.
    pub fn finalize(self) -> Result<Envelope, SigningError> {
        let chain_id = self
            .chain_id
            .ok_or(SigningError::Incomplete(EnvelopeField::ChainId))?;
        let nonce = self
            .nonce
            .ok_or(SigningError::Incomplete(EnvelopeField::Nonce))?;
        let fees = self
            .fees
            .ok_or(SigningError::Incomplete(EnvelopeField::Fees))?;

        Ok(Envelope {
            from: self.from,
            to: self.to,
            data: self.data,
            value: self.value.unwrap_or(U256::ZERO),
            chain_id,
            nonce,
            fees,
        })
    }
}

/// A complete, unsigned envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    from: Address,
    to: Address,
    data: Bytes,
    value: U256,
    chain_id: u64,
    nonce: u64,
    fees: Fees,
}

impl Envelope {
    pub fn from_address(&self) -> Address {
        self.from
    }

    pub fn to_address(&self) -> Address {
        self.to
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn fees(&self) -> Fees {
        self.fees
    }

    /// EIP-712 signing hash over the envelope fields.
    pub fn digest(&self) -> B256 {
        let tx = eip712::Transaction {
            txType: U256::from(EIP712_TX_TYPE),
            from: address_word(self.from),
            to: address_word(self.to),
            gasLimit: self.fees.gas_limit,
            gasPerPubdataByteLimit: U256::from(DEFAULT_GAS_PER_PUBDATA_LIMIT),
            maxFeePerGas: self.fees.gas_price,
            maxPriorityFeePerGas: self.fees.gas_price,
            paymaster: U256::ZERO,
            nonce: U256::from(self.nonce),
            value: self.value,
            data: self.data.clone(),
            factoryDeps: Vec::new(),
            paymasterInput: Bytes::new(),
        };
        tx.eip712_signing_hash(&domain(self.chain_id))
    }

    /// Sign the digest and seal the envelope.
    pub fn sign(self, credential: &Credential) -> SignedEnvelope {
        let signature = credential.sign_digest(&self.digest());
        SignedEnvelope {
            envelope: self,
            signature,
        }
    }
}

fn domain(chain_id: u64) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed(DOMAIN_NAME)),
        Some(Cow::Borrowed(DOMAIN_VERSION)),
        Some(U256::from(chain_id)),
        None,
        None,
    )
}

fn address_word(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

/// Finalize a draft and sign it in one step.
pub fn sign(draft: EnvelopeDraft, credential: &Credential) -> Result<SignedEnvelope, SigningError> {
    Ok(draft.finalize()?.sign(credential))
}

/// Recover the address that produced `signature` over `digest`.
pub fn recover_signer(digest: &B256, signature: &[u8]) -> Result<Address, SigningError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(SigningError::InvalidSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LEN,
            signature.len()
        )));
    }

    let v = signature[64];
    let recovery = match v {
        27 | 28 => v - 27,
        0 | 1 => v,
        other => {
            return Err(SigningError::InvalidSignature(format!(
                "invalid recovery byte {}",
                other
            )))
        }
    };
    let recovery_id = RecoveryId::from_i32(recovery as i32)
        .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;
    let sig = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;

    let secp = Secp256k1::verification_only();
    let pubkey = secp
        .recover_ecdsa(&Message::from_digest(digest.0), &sig)
        .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;
    Ok(public_key_address(&pubkey))
}

/// A signed, immutable envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    envelope: Envelope,
    signature: [u8; SIGNATURE_LEN],
}

impl SignedEnvelope {
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn signature(&self) -> &[u8; SIGNATURE_LEN] {
        &self.signature
    }

    pub fn digest(&self) -> B256 {
        self.envelope.digest()
    }

    /// Address that signed this envelope.
    pub fn recover_signer(&self) -> Result<Address, SigningError> {
        recover_signer(&self.digest(), &self.signature)
    }

    /// True if the embedded signature was produced by `expected` over the
    /// current field values.
    pub fn verify(&self, expected: Address) -> bool {
        matches!(self.recover_signer(), Ok(addr) if addr == expected)
    }

    /// Wire form: `0x71 || rlp([...])`.
    pub fn encode(&self) -> Bytes {
        let e = &self.envelope;
        let gas_per_pubdata = U256::from(DEFAULT_GAS_PER_PUBDATA_LIMIT);
        let empty = Bytes::new();
        let no_items: Vec<Bytes> = Vec::new();
        let signature = Bytes::copy_from_slice(&self.signature);

        let fields: [&dyn Encodable; 16] = [
            &e.nonce,
            &e.fees.gas_price, // max priority fee
            &e.fees.gas_price, // max fee
            &e.fees.gas_limit,
            &e.to,
            &e.value,
            &e.data,
            &e.chain_id,
            &empty,
            &empty,
            &e.chain_id,
            &e.from,
            &gas_per_pubdata,
            &no_items, // factory deps
            &signature,
            &no_items, // paymaster params
        ];

        let mut out = Vec::with_capacity(256 + e.data.len());
        out.push(EIP712_TX_TYPE);
        alloy_rlp::encode_list::<_, dyn Encodable>(&fields, &mut out);
        Bytes::from(out)
    }

    /// Parse the wire form produced by [`SignedEnvelope::encode`].
    pub fn decode(raw: &[u8]) -> Result<Self, EnvelopeError> {
        let (&tx_type, mut buf) = raw
            .split_first()
            .ok_or_else(|| EnvelopeError::Malformed("empty input".into()))?;
        if tx_type != EIP712_TX_TYPE {
            return Err(EnvelopeError::UnsupportedType(tx_type));
        }

        let header = Header::decode(&mut buf)?;
        if !header.list {
            return Err(EnvelopeError::Malformed("expected RLP list".into()));
        }
        if buf.len() != header.payload_length {
            return Err(EnvelopeError::Malformed(format!(
                "payload length {} does not match remaining {} bytes",
                header.payload_length,
                buf.len()
            )));
        }

        let nonce = u64::decode(&mut buf)?;
        let max_priority_fee = U256::decode(&mut buf)?;
        let max_fee = U256::decode(&mut buf)?;
        let gas_limit = U256::decode(&mut buf)?;
        let to = Address::decode(&mut buf)?;
        let value = U256::decode(&mut buf)?;
        let data = Bytes::decode(&mut buf)?;
        let chain_id = u64::decode(&mut buf)?;
        let _r = Bytes::decode(&mut buf)?;
        let _s = Bytes::decode(&mut buf)?;
        let chain_id_again = u64::decode(&mut buf)?;
        let from = Address::decode(&mut buf)?;
        let gas_per_pubdata = U256::decode(&mut buf)?;
        let factory_deps = Vec::<Bytes>::decode(&mut buf)?;
        let custom_signature = Bytes::decode(&mut buf)?;
        let paymaster_params = Vec::<Bytes>::decode(&mut buf)?;

        if !buf.is_empty() {
            return Err(EnvelopeError::Malformed("trailing bytes".into()));
        }
        if chain_id != chain_id_again {
            return Err(EnvelopeError::Malformed("chain id mismatch".into()));
        }
        if max_priority_fee != max_fee {
            return Err(EnvelopeError::Malformed(
                "priority fee must equal max fee".into(),
            ));
        }
        if gas_per_pubdata != U256::from(DEFAULT_GAS_PER_PUBDATA_LIMIT) {
            return Err(EnvelopeError::Malformed(format!(
                "unexpected gas per pubdata {}",
                gas_per_pubdata
            )));
        }
        if !factory_deps.is_empty() || !paymaster_params.is_empty() {
            return Err(EnvelopeError::Malformed(
                "factory deps and paymaster are not supported".into(),
            ));
        }
        let signature = <[u8; SIGNATURE_LEN]>::try_from(&custom_signature[..])
            .map_err(|_| EnvelopeError::Malformed("signature must be 65 bytes".into()))?;

        Ok(Self {
            envelope: Envelope {
                from,
                to,
                data,
                value,
                chain_id,
                nonce,
                fees: Fees {
                    gas_limit,
                    gas_price: max_fee,
                },
            },
            signature,
        })
    }

    /// Local identifier: keccak256 of the wire form.
    pub fn hash(&self) -> B256 {
        keccak256(self.encode())
    }
}
