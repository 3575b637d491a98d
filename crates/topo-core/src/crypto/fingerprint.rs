//! Public key fingerprints
//!
//! A fingerprint is the hex-encoded multihash of the public key bytes hashed
//! under [`HashPurpose::PublicKeyFingerprint`]. It doubles as the namespace
//! identifier of a root delegation and as the namespace part of party ids.

use super::hash::{hash_with_purpose, Digest, HashPurpose, MULTIHASH_LEN};
use super::keys::SigningPublicKey;
use crate::errors::{Result, TopologyError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a fingerprint in hex characters
pub const FINGERPRINT_HEX_LEN: usize = MULTIHASH_LEN * 2;

/// Stable identifier derived from a canonical-encoded public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(Digest);

impl Fingerprint {
    /// Fingerprint of public key bytes already in their canonical export encoding
    pub fn from_public_key_bytes(canonical_public_key: &[u8]) -> Self {
        Self(hash_with_purpose(
            HashPurpose::PublicKeyFingerprint,
            canonical_public_key,
        ))
    }

    /// Fingerprint of a signing public key
    pub fn of_key(key: &SigningPublicKey) -> Self {
        Self::from_public_key_bytes(key.key_bytes())
    }

    /// Parse a fingerprint string
    pub fn parse(value: &str) -> Result<Self> {
        if value.len() != FINGERPRINT_HEX_LEN {
            return Err(TopologyError::encoding(format!(
                "fingerprint must be {FINGERPRINT_HEX_LEN} hex characters, got {}",
                value.len()
            )));
        }
        if value.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(TopologyError::encoding("fingerprint must be lowercase hex"));
        }
        Digest::from_hex(value)
            .map(Self)
            .ok_or_else(|| TopologyError::encoding(format!("not a SHA-256 multihash: {value}")))
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// The underlying digest
    pub fn digest(&self) -> Digest {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({}..)", &self.0.to_hex()[..12])
    }
}

impl FromStr for Fingerprint {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = TopologyError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_hex()
    }
}
