use std::fmt;

use sha2::{Digest, Sha256};

use super::error::StorageError;

/// SHA-256 of a blob's content, also used as its address in the store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string. Upper-case input is accepted.
    pub fn from_hex(s: &str) -> Result<Self, StorageError> {
        if s.len() != 64 {
            return Err(StorageError::InvalidHash(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }

        let bytes =
            hex::decode(s).map_err(|e| StorageError::InvalidHash(format!("invalid hex: {e}")))?;

        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StorageError::InvalidHash("decoded to wrong length".into()))?;

        Ok(Self(arr))
    }

    /// Lowercase hex, the form persisted in the `sha256` columns.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Opaque storage reference persisted in `storage_path` columns: `{2 hex}/{62 hex}`.
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.shard_prefix(), self.shard_suffix())
    }

    pub(crate) fn shard_prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    pub(crate) fn shard_suffix(&self) -> String {
        hex::encode(&self.0[1..])
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
