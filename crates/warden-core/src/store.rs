//! Flat key/value store (`.env` layout)
//!
//! Deployment writes the account address, its signing key and the guardian
//! identities here so later runs can rebuild the actor registry. The file is
//! append-only: each write adds `KEY="value"` lines and a later line for the
//! same key shadows earlier ones.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Well-known keys.
pub mod keys {
    pub const WALLET_ADDRESS: &str = "WALLET_ADDRESS";
    pub const WALLET_SIGNING_KEY: &str = "WALLET_SIGNING_KEY";
    /// Key of the externally-owned funding account.
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    /// Proposed signing key of an open recovery, promoted to
    /// `WALLET_SIGNING_KEY` once the recovery executes.
    pub const RECOVERY_SIGNING_KEY: &str = "RECOVERY_SIGNING_KEY";

    pub fn guardian_address(index: u8) -> String {
        format!("GUARDIAN_ADDRESS_{}", index)
    }

    pub fn guardian_key(index: u8) -> String {
        format!("GUARDIAN_SK_{}", index)
    }

    /// Guardian index named by a `GUARDIAN_ADDRESS_<n>` or `GUARDIAN_SK_<n>`
    /// key. `None` for any other key, including a non-numeric suffix.
    pub fn guardian_index(key: &str) -> Option<u8> {
        let suffix = key
            .strip_prefix("GUARDIAN_ADDRESS_")
            .or_else(|| key.strip_prefix("GUARDIAN_SK_"))?;
        suffix.parse().ok()
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing key in store: {0}")]
    MissingKey(String),

    #[error("Invalid store entry: {0}")]
    InvalidEntry(String),
}

/// In-memory view of the store plus the file it is backed by.
#[derive(Debug, Clone)]
pub struct EnvStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl EnvStore {
    /// Load the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            parse(&fs::read_to_string(&path)?)
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, StoreError> {
        self.get(key)
            .ok_or_else(|| StoreError::MissingKey(key.to_string()))
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append entries to the file and update the in-memory view.
    ///
    /// All entries are validated before anything is written.
    pub fn append(&mut self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            validate_key(key)?;
            if value.contains(['\n', '\r', '"']) {
                return Err(StoreError::InvalidEntry(format!(
                    "value for {} contains a quote or line break",
                    key
                )));
            }
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = open_append(&self.path)?;
        let mut buf = String::new();
        for (key, value) in entries {
            buf.push_str(&format!("{}=\"{}\"\n", key, value));
        }
        file.write_all(buf.as_bytes())?;
        file.flush()?;

        for (key, value) in entries {
            self.entries.insert(key.to_string(), value.clone());
        }
        log::debug!(
            "Appended {} entries to {}",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidEntry(format!("invalid key: {:?}", key)))
    }
}

#[cfg(unix)]
fn open_append(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    // Holds signing keys.
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_append(path: &Path) -> std::io::Result<fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Parse `KEY=value` / `KEY="value"` lines. Comments, blank lines and lines
/// without `=` are skipped; later keys win.
fn parse(contents: &str) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        entries.insert(key.trim().to_string(), value.to_string());
    }
    entries
}
