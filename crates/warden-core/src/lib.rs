//! Warden Core
//!
//! Shared types for driving a guardian-protected smart account:
//!
//! - Actor registry (owner, guardians, third parties) and their signing credentials
//! - The custom EIP-712 transaction envelope: builder, digest, signer, wire codec
//! - Account and factory call surface (`sol!` interfaces)
//! - Pre-deployment address derivation
//! - The flat key/value store that carries addresses and keys between runs
//!
//! Nothing in this crate performs network I/O.

pub mod abi;
pub mod actors;
pub mod address;
pub mod envelope;
pub mod store;

pub use actors::{Actor, ActorRegistry, Credential, RegistryError, Role};
pub use address::{create2_address, owner_constructor_input};
pub use envelope::{
    recover_signer, sign, Envelope, EnvelopeDraft, EnvelopeError, EnvelopeField, Fees,
    SignedEnvelope, SigningError, DEFAULT_GAS_PER_PUBDATA_LIMIT, EIP712_TX_TYPE,
};
pub use store::{EnvStore, StoreError};

pub use alloy_primitives::{Address, Bytes, B256, U256};
