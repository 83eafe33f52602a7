//! Content digests.

use crate::error::{ProtocolError, ProtocolResult};
use md5::{Digest, Md5};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Digest of a note body or resource body, as reported by the remote store.
///
/// The remote store reports MD5 digests of the raw bytes. On the wire and in
/// the persisted metadata file the digest is a lowercase hex string.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct ContentHash(Vec<u8>);

impl ContentHash {
    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parses a hex-encoded digest.
    pub fn from_hex(hex_str: &str) -> ProtocolResult<Self> {
        Ok(Self(hex::decode(hex_str.trim())?))
    }

    /// Computes the digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        Self(Md5::digest(data).to_vec())
    }

    /// Returns true if `data` hashes to this digest.
    pub fn matches(&self, data: &[u8]) -> bool {
        *self == Self::compute(data)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Returns true if no digest was supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
