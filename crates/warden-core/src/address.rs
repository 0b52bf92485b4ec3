//! Pre-deployment address derivation.
//!
//! Accounts deployed by the factory land at a CREATE2-style address that can
//! be computed before the deploy transaction confirms (e.g. to pre-fund it):
//!
//! ```text
//! keccak256( keccak256("zksyncCreate2")
//!          || pad32(factory)
//!          || salt
//!          || bytecode_hash
//!          || keccak256(constructor_input) )[12..]
//! ```

use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::SolValue;

const CREATE2_PREFIX: &[u8] = b"zksyncCreate2";

/// Derive the address of an account deployed by `factory`.
pub fn create2_address(
    factory: Address,
    bytecode_hash: B256,
    salt: B256,
    constructor_input: &[u8],
) -> Address {
    let mut preimage = Vec::with_capacity(32 * 5);
    preimage.extend_from_slice(keccak256(CREATE2_PREFIX).as_slice());
    preimage.extend_from_slice(factory.into_word().as_slice());
    preimage.extend_from_slice(salt.as_slice());
    preimage.extend_from_slice(bytecode_hash.as_slice());
    preimage.extend_from_slice(keccak256(constructor_input).as_slice());

    Address::from_slice(&keccak256(&preimage)[12..])
}

/// Constructor input of an account: the ABI-encoded signing address.
pub fn owner_constructor_input(signing_address: Address) -> Bytes {
    Bytes::from(signing_address.abi_encode())
}
