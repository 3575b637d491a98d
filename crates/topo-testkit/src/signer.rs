//! Deterministic Ed25519 signer
//!
//! Keys are generated from a seeded ChaCha20 RNG so every test run produces
//! the same keys, fingerprints and party ids.

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use rand_chacha::{rand_core::SeedableRng, ChaCha20Rng};
use topo_core::crypto::{Digest, SigningAlgorithmSpec, SigningKeyUsage, SigningPublicKey};
use topo_core::{
    Fingerprint, Result, Signature, SignatureFormat, TopologySignerEffects, ONBOARDING_USAGE,
};

/// Signs transaction hashes with one or more Ed25519 keys
#[derive(Clone)]
pub struct Ed25519Signer {
    keys: Vec<SigningKey>,
}

impl Ed25519Signer {
    /// Signer with a single key derived from `seed`
    pub fn from_seed(seed: u64) -> Self {
        Self::with_keys(Self::key_from_seed(seed), Vec::new())
    }

    /// Signer over `primary` plus any `additional` keys
    pub fn with_keys(primary: SigningKey, additional: Vec<SigningKey>) -> Self {
        let mut keys = Vec::with_capacity(additional.len() + 1);
        keys.push(primary);
        keys.extend(additional);
        Self { keys }
    }

    /// Signing key derived from `seed`, for building multi-key signers
    pub fn key_from_seed(seed: u64) -> SigningKey {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        SigningKey::generate(&mut rng)
    }

    /// Public key of the primary signing key, tagged with `usage`
    pub fn public_key(&self, usage: impl IntoIterator<Item = SigningKeyUsage>) -> SigningPublicKey {
        public_key_of(self.primary(), usage)
    }

    fn primary(&self) -> &SigningKey {
        // Constructors always push at least one key.
        &self.keys[0]
    }

    /// Public key of the primary signing key with namespace and protocol usage
    pub fn onboarding_key(&self) -> SigningPublicKey {
        self.public_key(ONBOARDING_USAGE)
    }

    /// Fingerprints of all signing keys
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        self.keys
            .iter()
            .map(|k| Fingerprint::from_public_key_bytes(k.verifying_key().as_bytes()))
            .collect()
    }

    /// Sign the multihash bytes of `hash` with every key
    pub fn sign_hash(&self, hash: &Digest) -> Vec<Signature> {
        let message = hash.to_multihash();
        self.keys
            .iter()
            .map(|key| Signature {
                format: SignatureFormat::Raw,
                signature: key.sign(&message).to_bytes().to_vec(),
                signed_by: Fingerprint::from_public_key_bytes(key.verifying_key().as_bytes()),
                algorithm: SigningAlgorithmSpec::Ed25519,
            })
            .collect()
    }
}

/// Topology public key of an Ed25519 signing key
pub fn public_key_of(
    key: &SigningKey,
    usage: impl IntoIterator<Item = SigningKeyUsage>,
) -> SigningPublicKey {
    SigningPublicKey::ed25519(key.verifying_key().to_bytes(), usage)
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("fingerprints", &self.fingerprints())
            .finish()
    }
}

#[async_trait]
impl TopologySignerEffects for Ed25519Signer {
    async fn sign(&self, _payload: &[u8], hash: &Digest) -> Result<Vec<Signature>> {
        Ok(self.sign_hash(hash))
    }
}
