//! Content hashing primitive
//!
//! SHA-256 digests identify content throughout the engine: in the store,
//! in operation records, and in obliteration proofs. The digest of the
//! empty byte sequence is the distinguished `null_hash`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A SHA-256 content digest (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

/// Hash a byte sequence. Total and deterministic.
#[must_use]
pub fn hash_bytes(content: &[u8]) -> ContentHash {
    ContentHash(Sha256::digest(content).into())
}

/// Check that `content` hashes to `digest`.
#[must_use]
pub fn verify(content: &[u8], digest: &ContentHash) -> bool {
    hash_bytes(content) == *digest
}

/// The digest of the empty byte sequence.
#[must_use]
pub fn null_hash() -> ContentHash {
    hash_bytes(&[])
}

impl ContentHash {
    /// Build a digest from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First two hex characters, used for store directory sharding.
    #[must_use]
    pub fn shard(&self) -> String {
        format!("{:02x}", self.0[0])
    }

    /// Hex characters after the shard prefix.
    #[must_use]
    pub fn rest(&self) -> String {
        to_hex(&self.0[1..])
    }
}

/// Lowercase hex encoding of a byte slice.
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex(&self.0))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

/// Error parsing a digest from hex
#[derive(Debug, Clone, Error)]
pub enum ParseHashError {
    #[error("expected 64 hex characters, got {0}")]
    Length(usize),
    #[error("invalid hex character")]
    Hex,
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(ParseHashError::Length(s.len()));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| ParseHashError::Hex)?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| ParseHashError::Hex)?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
