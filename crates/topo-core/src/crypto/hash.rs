//! Purpose-bound hashing for content addressing
//!
//! Every digest in the topology layer binds a small integer purpose tag in
//! front of the payload before hashing: `SHA-256(u32_be(purpose) || payload)`.
//! Byte-identical payloads hashed for different purposes therefore never
//! collide. Digests are rendered as SHA-256 multihashes (`0x12 0x20 || digest`),
//! the form the topology store uses for transaction hashes and fingerprints.
//!
//! The algorithm is selected once through the [`ALGORITHM`] constant; all call
//! sites go through [`hash`], [`hasher`] or [`hash_with_purpose`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// Multihash function code for SHA-256
pub const SHA256_MULTIHASH_CODE: u8 = 0x12;

/// Length of a raw SHA-256 digest
pub const DIGEST_LEN: usize = 32;

/// Length of a multihash-encoded SHA-256 digest
pub const MULTIHASH_LEN: usize = DIGEST_LEN + 2;

/// Domain-separation tags reserved by the topology layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashPurpose {
    /// Hash of a single serialized topology transaction
    TopologyTransaction,
    /// Fingerprint of a public key
    PublicKeyFingerprint,
    /// Combined hash over several topology transaction hashes
    MultiTopologyTransaction,
}

impl HashPurpose {
    /// Integer tag bound into the hash input
    pub const fn tag(self) -> u32 {
        match self {
            HashPurpose::TopologyTransaction => 11,
            HashPurpose::PublicKeyFingerprint => 12,
            HashPurpose::MultiTopologyTransaction => 55,
        }
    }
}

/// Synchronous trait for the underlying hash function
pub trait HashAlgorithm: Send + Sync + fmt::Debug {
    /// Hash arbitrary bytes to a 32-byte digest
    fn hash(&self, data: &[u8]) -> [u8; DIGEST_LEN];

    /// Create an incremental hasher for multi-part input
    fn hasher(&self) -> Box<dyn Hasher>;
}

/// Incremental hashing of multi-part data
pub trait Hasher: Send {
    /// Feed more data
    fn update(&mut self, data: &[u8]);

    /// Consume the hasher and return the digest
    fn finalize(self: Box<Self>) -> [u8; DIGEST_LEN];
}

/// SHA-256 (NIST FIPS 180-4)
#[derive(Debug, Clone, Copy)]
pub struct Sha256Algorithm;

impl HashAlgorithm for Sha256Algorithm {
    fn hash(&self, data: &[u8]) -> [u8; DIGEST_LEN] {
        Sha256::digest(data).into()
    }

    fn hasher(&self) -> Box<dyn Hasher> {
        Box::new(Sha256Hasher(Sha256::new()))
    }
}

struct Sha256Hasher(Sha256);

impl Hasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> [u8; DIGEST_LEN] {
        self.0.finalize().into()
    }
}

/// The hash algorithm used throughout the topology layer.
///
/// Must stay SHA-256: the multihash prefix in [`Digest::to_multihash`] and
/// every digest the store recomputes depend on it.
pub const ALGORITHM: Sha256Algorithm = Sha256Algorithm;

/// Hash bytes with the global algorithm, without a purpose tag
#[inline]
pub fn hash(data: &[u8]) -> [u8; DIGEST_LEN] {
    ALGORITHM.hash(data)
}

/// Incremental hasher using the global algorithm
#[inline]
pub fn hasher() -> Box<dyn Hasher> {
    ALGORITHM.hasher()
}

/// Hash a payload under an integer purpose tag
pub fn hash_with_tag(tag: u32, payload: &[u8]) -> Digest {
    let mut h = hasher();
    h.update(&tag.to_be_bytes());
    h.update(payload);
    Digest(h.finalize())
}

/// Hash a payload under one of the reserved purposes
pub fn hash_with_purpose(purpose: HashPurpose, payload: &[u8]) -> Digest {
    hash_with_tag(purpose.tag(), payload)
}

/// Combine several transaction hashes into one order-independent digest.
///
/// Hashes are sorted by their multihash bytes, then encoded as
/// `u32_be(count) || (u32_be(len) || multihash)*` and hashed under
/// [`HashPurpose::MultiTopologyTransaction`].
pub fn combine_hashes(hashes: &[Digest]) -> Digest {
    let mut sorted: Vec<[u8; MULTIHASH_LEN]> = hashes.iter().map(Digest::to_multihash).collect();
    sorted.sort_unstable();

    let mut input = Vec::with_capacity(4 + sorted.len() * (4 + MULTIHASH_LEN));
    input.extend_from_slice(&(sorted.len() as u32).to_be_bytes());
    for multihash in &sorted {
        input.extend_from_slice(&(multihash.len() as u32).to_be_bytes());
        input.extend_from_slice(multihash);
    }
    hash_with_purpose(HashPurpose::MultiTopologyTransaction, &input)
}

/// A SHA-256 digest produced by [`hash_with_tag`]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Wrap raw digest bytes
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Multihash encoding: function code, length, digest
    pub fn to_multihash(&self) -> [u8; MULTIHASH_LEN] {
        let mut out = [0u8; MULTIHASH_LEN];
        out[0] = SHA256_MULTIHASH_CODE;
        out[1] = DIGEST_LEN as u8;
        out[2..].copy_from_slice(&self.0);
        out
    }

    /// Parse a multihash-encoded SHA-256 digest
    pub fn from_multihash(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != MULTIHASH_LEN
            || bytes[0] != SHA256_MULTIHASH_CODE
            || bytes[1] != DIGEST_LEN as u8
        {
            return None;
        }
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&bytes[2..]);
        Some(Self(digest))
    }

    /// Lowercase hex of the multihash encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_multihash())
    }

    /// Parse the hex produced by [`Digest::to_hex`]
    pub fn from_hex(value: &str) -> Option<Self> {
        hex::decode(value)
            .ok()
            .and_then(|bytes| Self::from_multihash(&bytes))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(&self.0[..8]))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Digest::from_hex(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid multihash digest: {value}")))
    }
}
