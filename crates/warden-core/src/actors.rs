//! Actor registry
//!
//! Maps logical roles (owner, guardian N, named third party) to the account
//! that originates their transactions and the key that signs for it. Pure
//! lookup: how the credentials were sourced is the caller's business
//! (see [`ActorRegistry::from_store`] for the `.env` layout).

use crate::envelope::SigningError;
use crate::store::{keys, EnvStore, StoreError};
use alloy_primitives::{Address, B256};
use secp256k1::ecdsa::RecoverableSignature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

/// Role name used for the funding key (`PRIVATE_KEY`).
pub const FUNDER: &str = "funder";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("No actor registered for role {0}")]
    UnknownRole(Role),

    #[error("Invalid address for {key}: {reason}")]
    InvalidAddress { key: String, reason: String },

    #[error("Invalid credential for {key}: {source}")]
    InvalidCredential {
        key: String,
        #[source]
        source: SigningError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Logical signing role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Owner,
    /// Guardian by 1-based index, matching `GUARDIAN_ADDRESS_<n>`.
    Guardian(u8),
    ThirdParty(String),
}

impl Role {
    pub fn is_guardian(&self) -> bool {
        matches!(self, Role::Guardian(_))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Guardian(n) => write!(f, "guardian-{}", n),
            Role::ThirdParty(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty role".into());
        }
        if s.eq_ignore_ascii_case("owner") {
            return Ok(Role::Owner);
        }
        if let Some(n) = s.strip_prefix("guardian-") {
            let index: u8 = n
                .parse()
                .map_err(|_| format!("invalid guardian index: {}", n))?;
            if index == 0 {
                return Err("guardian indices start at 1".into());
            }
            return Ok(Role::Guardian(index));
        }
        Ok(Role::ThirdParty(s.to_string()))
    }
}

/// A secp256k1 signing key.
///
/// The secret is erased on drop and never printed by `Debug`.
pub struct Credential {
    secret: SecretKey,
}

impl Credential {
    /// Generate a fresh random credential.
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::new(&mut rand::thread_rng()),
        }
    }

    /// Parse a 32-byte hex key, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self, SigningError> {
        let trimmed = s.trim();
        let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = Zeroizing::new(
            hex::decode(hex_str).map_err(|e| SigningError::MalformedCredential(e.to_string()))?,
        );
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SigningError> {
        if bytes.len() != 32 {
            return Err(SigningError::MalformedCredential(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| SigningError::MalformedCredential(e.to_string()))?;
        Ok(Self { secret })
    }

    /// `0x`-prefixed hex form for the key/value store.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(self.secret.secret_bytes())))
    }

    /// Address controlled by this key.
    pub fn address(&self) -> Address {
        let secp = Secp256k1::signing_only();
        public_key_address(&PublicKey::from_secret_key(&secp, &self.secret))
    }

    /// Sign a raw 32-byte digest (no message prefix).
    ///
    /// Returns `r || s || v` with `v` in {27, 28}.
    pub fn sign_digest(&self, digest: &B256) -> [u8; 65] {
        let secp = Secp256k1::signing_only();
        let msg = Message::from_digest(digest.0);
        let sig: RecoverableSignature = secp.sign_ecdsa_recoverable(&msg, &self.secret);
        let (recovery_id, compact) = sig.serialize_compact();

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&compact);
        out[64] = 27 + recovery_id.to_i32() as u8;
        out
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self {
            secret: self.secret,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Ethereum-style address of a secp256k1 public key.
pub(crate) fn public_key_address(pubkey: &PublicKey) -> Address {
    let uncompressed = pubkey.serialize_uncompressed();
    Address::from_raw_public_key(&uncompressed[1..])
}

/// A logical signer bound to the account it transacts from.
#[derive(Debug, Clone)]
pub struct Actor {
    pub role: Role,
    /// Account that originates this actor's envelopes (the `from` field).
    pub address: Address,
    pub credential: Credential,
}

impl Actor {
    pub fn new(role: Role, address: Address, credential: Credential) -> Self {
        Self {
            role,
            address,
            credential,
        }
    }

    /// A plain key-controlled account: the origin is the key's own address.
    pub fn key_account(role: Role, credential: Credential) -> Self {
        let address = credential.address();
        Self::new(role, address, credential)
    }

    /// Address that the origin account expects signatures from.
    pub fn signer_address(&self) -> Address {
        self.credential.address()
    }
}

/// Role → actor lookup.
#[derive(Debug, Clone, Default)]
pub struct ActorRegistry {
    actors: BTreeMap<Role, Actor>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actor, replacing any previous actor with the same role.
    pub fn insert(&mut self, actor: Actor) -> Option<Actor> {
        self.actors.insert(actor.role.clone(), actor)
    }

    pub fn get(&self, role: &Role) -> Result<&Actor, RegistryError> {
        self.actors
            .get(role)
            .ok_or_else(|| RegistryError::UnknownRole(role.clone()))
    }

    pub fn owner(&self) -> Result<&Actor, RegistryError> {
        self.get(&Role::Owner)
    }

    /// Registered guardians, ordered by index.
    pub fn guardians(&self) -> Vec<&Actor> {
        self.actors
            .values()
            .filter(|a| a.role.is_guardian())
            .collect()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.actors.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Build the registry from the persisted key/value store.
    ///
    /// - `WALLET_ADDRESS` + `WALLET_SIGNING_KEY` → owner
    /// - `GUARDIAN_ADDRESS_<n>` + `GUARDIAN_SK_<n>` → guardian n
    /// - `PRIVATE_KEY` → third party "funder" (key-controlled account)
    ///
    /// Guardian indices need not be contiguous. Missing pairs are skipped; a
    /// half-present pair is an error.
    pub fn from_store(store: &EnvStore) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        if let Some(actor) =
            pair_from_store(store, Role::Owner, keys::WALLET_ADDRESS, keys::WALLET_SIGNING_KEY)?
        {
            registry.insert(actor);
        }

        let indices: BTreeSet<u8> = store.keys().filter_map(keys::guardian_index).collect();
        for index in indices {
            if index == 0 {
                log::warn!("Ignoring guardian index 0 in {}", store.path().display());
                continue;
            }
            let address_key = keys::guardian_address(index);
            let key_key = keys::guardian_key(index);
            if let Some(actor) =
                pair_from_store(store, Role::Guardian(index), &address_key, &key_key)?
            {
                registry.insert(actor);
            }
        }

        if let Some(hex_key) = store.get(keys::PRIVATE_KEY) {
            let credential = parse_credential(keys::PRIVATE_KEY, hex_key)?;
            registry.insert(Actor::key_account(
                Role::ThirdParty(FUNDER.to_string()),
                credential,
            ));
        }

        log::debug!("Loaded {} actors from {}", registry.len(), store.path().display());
        Ok(registry)
    }
}

fn pair_from_store(
    store: &EnvStore,
    role: Role,
    address_key: &str,
    credential_key: &str,
) -> Result<Option<Actor>, RegistryError> {
    match (store.get(address_key), store.get(credential_key)) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(StoreError::MissingKey(credential_key.to_string()).into()),
        (None, Some(_)) => Err(StoreError::MissingKey(address_key.to_string()).into()),
        (Some(address), Some(hex_key)) => {
            let address =
                Address::from_str(address.trim()).map_err(|e| RegistryError::InvalidAddress {
                    key: address_key.to_string(),
                    reason: e.to_string(),
                })?;
            let credential = parse_credential(credential_key, hex_key)?;
            Ok(Some(Actor::new(role, address, credential)))
        }
    }
}

fn parse_credential(key: &str, value: &str) -> Result<Credential, RegistryError> {
    Credential::from_hex(value).map_err(|source| RegistryError::InvalidCredential {
        key: key.to_string(),
        source,
    })
}
