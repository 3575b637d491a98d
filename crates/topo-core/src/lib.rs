//! Topo Core - identity topology transactions
//!
//! Construction, canonical encoding, content addressing and the
//! optimistic-concurrency update protocol for the topology transactions that
//! onboard a key as the authoritative signer of a ledger party.
//!
//! # Data Flow
//!
//! ```text
//! intent -> MappingBuilder (SerialResolver for mutable mappings)
//!        -> TopologyTransaction -> canonical bytes -> hash
//!        -> signer -> TransactionBatch -> BatchSubmitter -> topology store
//! ```
//!
//! # Effect Interfaces
//! - `TopologyReadEffects`: `list_mappings`
//! - `TopologyWriteEffects`: `add_transactions`
//! - `TopologySignerEffects`: `sign`
//!
//! # Contracts
//! - Canonical determinism: equal mappings encode to equal bytes
//! - Domain separation: every hash binds a purpose tag
//! - Serial fencing: a write under a unique key carries current max + 1;
//!   conflicts are re-resolved, never reordered

#![forbid(unsafe_code)]

/// Unified error handling
pub mod errors;

/// Purpose-bound hashing, fingerprints and key metadata
pub mod crypto;

/// Identifiers and serials
pub mod types;

/// Topology mappings, unique keys and builders
pub mod mapping;

/// DAG-CBOR serialization (canonical format)
pub mod serialization;

/// Transactions, signatures and batches
pub mod transaction;

/// Pure effect interfaces (no implementations)
pub mod effects;

/// Next-serial resolution
pub mod resolver;

/// Batch submission
pub mod submit;

/// Conflict retry
pub mod retry;

/// Party onboarding and key rotation
pub mod workflow;

/// Onboarding configuration
pub mod config;

pub use config::{ConfigValidation, OnboardingConfig, RetryConfig};
pub use crypto::{Digest, Fingerprint, HashPurpose, SigningKeyUsage, SigningPublicKey};
pub use effects::{
    BatchRejection, RejectionReason, StoredMapping, TopologyEffects, TopologyReadEffects,
    TopologySignerEffects, TopologyWriteEffects, WriteFailure,
};
pub use errors::{ErrorContext, Result, TopologyError};
pub use mapping::{
    HostingParticipant, MappingKind, ParticipantPermission, TopologyMapping, UniqueKey,
};
pub use resolver::{SerialResolution, SerialResolver};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use submit::{BatchSubmitter, SubmissionReceipt};
pub use transaction::{
    MultiTransactionSignature, PreparedTransaction, Signature, SignatureFormat,
    SignedTopologyTransaction, TopologyChangeOp, TopologyTransaction, TransactionBatch,
};
pub use types::{ParticipantId, PartyId, Serial, StoreId, UniqueIdentifier};
pub use workflow::{
    prepare_new_party, OnboardingOutcome, OnboardingRequest, PreparedParty, SigningMode,
    TopologyWorkflow, ONBOARDING_USAGE,
};
