//! Signing public keys as they appear in topology mappings
//!
//! Key bytes arrive from the key-material collaborator already in their
//! canonical export encoding; this module trusts them and only records the
//! metadata the store needs. The legacy key-spec is derived from the scheme
//! and re-checked whenever a key is decoded, so the two can never diverge.

use super::fingerprint::Fingerprint;
use crate::errors::{Result, TopologyError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Encoding of the public key bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoKeyFormat {
    /// Raw curve point (Ed25519)
    Raw,
    /// DER-encoded SubjectPublicKeyInfo
    Der,
}

/// Signing key scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningKeyScheme {
    /// Ed25519 over Curve25519
    Ed25519,
    /// ECDSA over NIST P-256
    EcDsaP256,
    /// ECDSA over NIST P-384
    EcDsaP384,
}

impl SigningKeyScheme {
    /// Legacy key-spec denoting the same algorithm
    pub const fn key_spec(self) -> SigningKeySpec {
        match self {
            SigningKeyScheme::Ed25519 => SigningKeySpec::EcCurve25519,
            SigningKeyScheme::EcDsaP256 => SigningKeySpec::EcP256,
            SigningKeyScheme::EcDsaP384 => SigningKeySpec::EcP384,
        }
    }

    /// Signature algorithm produced by keys of this scheme
    pub const fn signing_algorithm(self) -> SigningAlgorithmSpec {
        match self {
            SigningKeyScheme::Ed25519 => SigningAlgorithmSpec::Ed25519,
            SigningKeyScheme::EcDsaP256 => SigningAlgorithmSpec::EcDsaSha256,
            SigningKeyScheme::EcDsaP384 => SigningAlgorithmSpec::EcDsaSha384,
        }
    }
}

/// Legacy key specification retained for backward compatibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningKeySpec {
    /// Curve25519
    EcCurve25519,
    /// NIST P-256
    EcP256,
    /// NIST P-384
    EcP384,
}

/// Signature algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningAlgorithmSpec {
    /// Pure Ed25519
    Ed25519,
    /// ECDSA with SHA-256
    EcDsaSha256,
    /// ECDSA with SHA-384
    EcDsaSha384,
}

/// What a key may authorize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningKeyUsage {
    /// Namespace delegations (root authority)
    Namespace,
    /// Sequencer client authentication
    SequencerAuthentication,
    /// Protocol messages (party signing authority)
    Protocol,
    /// Proof of key ownership
    ProofOfOwnership,
}

impl fmt::Display for SigningKeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SigningKeyUsage::Namespace => "namespace",
            SigningKeyUsage::SequencerAuthentication => "sequencer-authentication",
            SigningKeyUsage::Protocol => "protocol",
            SigningKeyUsage::ProofOfOwnership => "proof-of-ownership",
        };
        f.write_str(name)
    }
}

/// Public half of a signing key
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "SigningPublicKeyWire", try_from = "SigningPublicKeyWire")]
pub struct SigningPublicKey {
    format: CryptoKeyFormat,
    scheme: SigningKeyScheme,
    key: Vec<u8>,
    usage: BTreeSet<SigningKeyUsage>,
}

impl SigningPublicKey {
    /// Create a key from canonical-encoded bytes
    pub fn new(
        format: CryptoKeyFormat,
        scheme: SigningKeyScheme,
        key: Vec<u8>,
        usage: impl IntoIterator<Item = SigningKeyUsage>,
    ) -> Result<Self> {
        if key.is_empty() {
            return Err(TopologyError::encoding("public key bytes are empty"));
        }
        Ok(Self {
            format,
            scheme,
            key,
            usage: usage.into_iter().collect(),
        })
    }

    /// Raw Ed25519 public key
    pub fn ed25519(key: [u8; 32], usage: impl IntoIterator<Item = SigningKeyUsage>) -> Self {
        Self {
            format: CryptoKeyFormat::Raw,
            scheme: SigningKeyScheme::Ed25519,
            key: key.to_vec(),
            usage: usage.into_iter().collect(),
        }
    }

    /// Key encoding
    pub fn format(&self) -> CryptoKeyFormat {
        self.format
    }

    /// Key scheme
    pub fn scheme(&self) -> SigningKeyScheme {
        self.scheme
    }

    /// Legacy key-spec, always derived from the scheme
    pub fn key_spec(&self) -> SigningKeySpec {
        self.scheme.key_spec()
    }

    /// Canonical-encoded key bytes
    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Usage tags in canonical order
    pub fn usage(&self) -> &BTreeSet<SigningKeyUsage> {
        &self.usage
    }

    /// Whether the key carries a usage tag
    pub fn has_usage(&self, usage: SigningKeyUsage) -> bool {
        self.usage.contains(&usage)
    }

    /// Fingerprint of this key
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_key(self)
    }
}

impl fmt::Debug for SigningPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningPublicKey")
            .field("scheme", &self.scheme)
            .field("fingerprint", &self.fingerprint())
            .field("usage", &self.usage)
            .finish()
    }
}

/// Wire shape, including the redundant key-spec
#[derive(Clone, Serialize, Deserialize)]
struct SigningPublicKeyWire {
    format: CryptoKeyFormat,
    #[serde(with = "serde_bytes")]
    public_key: Vec<u8>,
    scheme: SigningKeyScheme,
    usage: BTreeSet<SigningKeyUsage>,
    key_spec: SigningKeySpec,
}

impl From<SigningPublicKey> for SigningPublicKeyWire {
    fn from(key: SigningPublicKey) -> Self {
        Self {
            key_spec: key.key_spec(),
            format: key.format,
            public_key: key.key,
            scheme: key.scheme,
            usage: key.usage,
        }
    }
}

impl TryFrom<SigningPublicKeyWire> for SigningPublicKey {
    type Error = TopologyError;

    fn try_from(wire: SigningPublicKeyWire) -> Result<Self> {
        if wire.scheme.key_spec() != wire.key_spec {
            return Err(TopologyError::encoding(format!(
                "key spec {:?} does not match scheme {:?}",
                wire.key_spec, wire.scheme
            )));
        }
        Self::new(wire.format, wire.scheme, wire.public_key, wire.usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_spec_derived_from_scheme() {
        let key = SigningPublicKey::ed25519([1u8; 32], [SigningKeyUsage::Protocol]);
        assert_eq!(key.key_spec(), SigningKeySpec::EcCurve25519);
        assert_eq!(
            SigningKeyScheme::EcDsaP256.key_spec(),
            SigningKeySpec::EcP256
        );
    }

    #[test]
    fn test_usage_is_a_set() {
        let key = SigningPublicKey::ed25519(
            [1u8; 32],
            [
                SigningKeyUsage::Protocol,
                SigningKeyUsage::Namespace,
                SigningKeyUsage::Protocol,
            ],
        );
        assert_eq!(key.usage().len(), 2);
        assert!(key.has_usage(SigningKeyUsage::Namespace));
        assert!(!key.has_usage(SigningKeyUsage::ProofOfOwnership));
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = SigningPublicKey::new(
            CryptoKeyFormat::Der,
            SigningKeyScheme::EcDsaP256,
            Vec::new(),
            [SigningKeyUsage::Protocol],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_diverging_key_spec_rejected_on_decode() {
        let wire = SigningPublicKeyWire {
            format: CryptoKeyFormat::Raw,
            public_key: vec![1u8; 32],
            scheme: SigningKeyScheme::Ed25519,
            usage: BTreeSet::new(),
            key_spec: SigningKeySpec::EcP384,
        };
        assert!(SigningPublicKey::try_from(wire).is_err());
    }

    #[test]
    fn test_fingerprint_covers_key_bytes_only() {
        let a = SigningPublicKey::ed25519([5u8; 32], [SigningKeyUsage::Protocol]);
        let b = SigningPublicKey::ed25519([5u8; 32], [SigningKeyUsage::Namespace]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
