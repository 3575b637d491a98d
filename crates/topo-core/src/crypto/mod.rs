//! Content hashing, fingerprints and key metadata

pub mod fingerprint;
pub mod hash;
pub mod keys;

pub use fingerprint::{Fingerprint, FINGERPRINT_HEX_LEN};
pub use hash::{
    combine_hashes, hash_with_purpose, hash_with_tag, Digest, HashAlgorithm, HashPurpose,
    Sha256Algorithm, ALGORITHM,
};
pub use keys::{
    CryptoKeyFormat, SigningAlgorithmSpec, SigningKeyScheme, SigningKeySpec, SigningKeyUsage,
    SigningPublicKey,
};
