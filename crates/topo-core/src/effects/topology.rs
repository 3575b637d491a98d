//! Topology store effect interface
//!
//! Three seams separate the pure core from the outside world: reading the
//! stored versions of a mapping, writing a signed batch, and signing a
//! prepared transaction. Production handlers talk to the topology store and
//! to key custody; the testkit provides in-memory handlers.

use crate::crypto::Digest;
use crate::errors::Result;
use crate::mapping::{TopologyMapping, UniqueKey};
use crate::transaction::{Signature, TopologyChangeOp, TransactionBatch};
use crate::types::{Serial, StoreId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One stored version of a mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMapping {
    /// Serial of this version
    pub serial: Serial,
    /// Whether this version added or removed the mapping
    pub operation: TopologyChangeOp,
    /// The mapping as stored
    pub mapping: TopologyMapping,
}

/// Why the store refused a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// The serial is not exactly one above the stored maximum
    StaleSerial {
        /// Serial the store would have accepted
        expected: Serial,
        /// Serial carried by the transaction
        attempted: Serial,
    },
    /// A signature did not verify over the transaction hash
    BadSignature,
    /// No signer holds authority over the mapping's namespace
    AuthorizationDenied(String),
    /// The transaction could not be decoded
    Malformed(String),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::StaleSerial {
                expected,
                attempted,
            } => write!(f, "stale serial {attempted}, store expects {expected}"),
            RejectionReason::BadSignature => f.write_str("signature verification failed"),
            RejectionReason::AuthorizationDenied(reason) => write!(f, "not authorized: {reason}"),
            RejectionReason::Malformed(reason) => write!(f, "malformed transaction: {reason}"),
        }
    }
}

/// The store's rejection of a batch, naming the first failing transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRejection {
    /// Position of the failing transaction in the batch
    pub index: usize,
    /// Hash of the failing transaction
    pub transaction_hash: Digest,
    /// What went wrong
    pub reason: RejectionReason,
}

/// Failure of a batch write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteFailure {
    /// The store received and refused the batch; nothing was applied
    Rejected(BatchRejection),
    /// The call failed in transit
    Transport {
        /// Transport error description
        message: String,
        /// The store may have applied the batch
        indeterminate: bool,
    },
}

/// Read access to stored topology mappings
#[async_trait]
pub trait TopologyReadEffects: Send + Sync {
    /// Every stored version under `unique_key`, in no particular order
    async fn list_mappings(
        &self,
        store: &StoreId,
        unique_key: &UniqueKey,
    ) -> Result<Vec<StoredMapping>>;
}

/// Write access to a topology store
#[async_trait]
pub trait TopologyWriteEffects: Send + Sync {
    /// Submit a batch. The store applies all of it or none of it.
    async fn add_transactions(
        &self,
        batch: &TransactionBatch,
    ) -> std::result::Result<(), WriteFailure>;
}

/// Signing of prepared transactions by the party's key custody
#[async_trait]
pub trait TopologySignerEffects: Send + Sync {
    /// Sign `hash` with every key the handler controls.
    ///
    /// `hash` is either one transaction hash, with `payload` the serialized
    /// transaction, or the combined hash of a batch, with `payload` the
    /// concatenated multihashes of the covered transactions. The payload is
    /// passed along for signers that display or audit it.
    async fn sign(&self, payload: &[u8], hash: &Digest) -> Result<Vec<Signature>>;
}
