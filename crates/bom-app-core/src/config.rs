// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config documents for `bom-cfp` (shard endpoints and friends), stored as
//! JSON blobs behind the [`ConfigStore`] port.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Where config blobs live. Keys are flat names such as `shards`.
pub trait ConfigStore {
    /// Bytes stored under `key`, or [`ConfigError::NotFound`].
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Replaces whatever is stored under `key`.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Failure loading or saving a config document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Nothing stored under the key.
    #[error("[CONFIG_NOT_FOUND] not found")]
    NotFound,
    /// Key is empty or would escape the store (path separators, `..`).
    #[error("[CONFIG_KEY] invalid config key {0:?}")]
    InvalidKey(String),
    /// Backing storage failed.
    #[error("[CONFIG_IO] io error: {0}")]
    Io(#[from] std::io::Error),
    /// Stored bytes are not the expected JSON document.
    #[error("[CONFIG_SERDE] serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Store-specific failure.
    #[error("[CONFIG_OTHER] {0}")]
    Other(String),
}

/// Rejects keys that cannot be used as a flat file stem.
pub fn validate_key(key: &str) -> Result<(), ConfigError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\'])
        || key.chars().any(char::is_control);
    if bad {
        return Err(ConfigError::InvalidKey(key.to_owned()));
    }
    Ok(())
}

/// Typed access to config documents: JSON in, JSON out, storage delegated
/// to `S`.
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Wraps `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Borrow the inner store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Unwraps the store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Document under `key`; `Ok(None)` when absent or empty.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        validate_key(key)?;
        match self.store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Like [`load`](Self::load), falling back to `T::default()` when missing.
    pub fn load_or_default<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        Ok(self.load(key)?.unwrap_or_default())
    }

    /// Writes `value` as pretty JSON under `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        validate_key(key)?;
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn keys_must_be_flat_names() {
        assert!(validate_key("shards").is_ok());
        assert!(validate_key("shards.prod").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "x\ny"] {
            assert!(
                matches!(validate_key(bad), Err(ConfigError::InvalidKey(_))),
                "{bad:?}"
            );
        }
    }
}
