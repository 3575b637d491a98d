//! In-memory topology store
//!
//! Applies batches atomically against a snapshot that is updated transaction
//! by transaction, checking for each transaction in order:
//!
//! 1. the bytes decode canonically and hash to the claimed hash
//! 2. every signature comes from a known key and verifies over the
//!    transaction hash, or over the combined hash it covers the transaction by
//! 3. the serial is exactly one above the stored maximum for its unique key
//! 4. some signer holds a delegation over the mapping's namespace
//!
//! The first failure rejects the whole batch and nothing is applied.
//!
//! # Blocking Lock Usage
//!
//! Uses `std::sync::Mutex`: the lock is never held across an await point and
//! this is test infrastructure where contention does not matter.

#![allow(clippy::disallowed_types)]

use async_trait::async_trait;
use ed25519_dalek::{Signature as Ed25519Signature, Verifier, VerifyingKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use topo_core::crypto::{SigningKeyScheme, SigningPublicKey};
use topo_core::effects::{
    BatchRejection, RejectionReason, StoredMapping, TopologyReadEffects, TopologyWriteEffects,
    WriteFailure,
};
use topo_core::mapping::{MappingKind, TopologyMapping, UniqueKey};
use topo_core::{
    Fingerprint, Result, Serial, SignedTopologyTransaction, StoreId, TopologyChangeOp,
    TransactionBatch,
};
use tracing::debug;

/// One-shot failure injected into the next write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteFault {
    /// Fail in transit without applying anything
    Transport {
        /// Whether to report the outcome as unknown
        indeterminate: bool,
    },
    /// Apply the batch, then report an indeterminate transport failure
    ApplyThenTimeout,
    /// Reject the first transaction as stale without applying anything
    StaleSerial,
}

type Records = HashMap<UniqueKey, Vec<StoredMapping>>;

#[derive(Debug, Default)]
struct StoreState {
    stores: HashMap<StoreId, Records>,
    fault: Option<WriteFault>,
    accepted_batches: usize,
}

/// Fenced, atomic, signature-verifying topology store
#[derive(Debug, Clone, Default)]
pub struct InMemoryTopologyStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryTopologyStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A poisoned lock only means another test thread panicked.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Insert a record directly, bypassing every check
    pub fn seed(&self, store: &StoreId, record: StoredMapping) {
        self.lock()
            .stores
            .entry(store.clone())
            .or_default()
            .entry(record.mapping.unique_key())
            .or_default()
            .push(record);
    }

    /// Fail the next write with `fault`
    pub fn inject_fault(&self, fault: WriteFault) {
        self.lock().fault = Some(fault);
    }

    /// Number of batches applied so far
    pub fn accepted_batches(&self) -> usize {
        self.lock().accepted_batches
    }

    /// Highest stored serial under `unique_key`
    pub fn max_serial(&self, store: &StoreId, unique_key: &UniqueKey) -> Option<Serial> {
        self.lock()
            .stores
            .get(store)
            .and_then(|records| records.get(unique_key))
            .and_then(|versions| versions.iter().map(|r| r.serial).max())
    }

    /// Every stored version under `unique_key`, in insertion order
    pub fn records(&self, store: &StoreId, unique_key: &UniqueKey) -> Vec<StoredMapping> {
        self.lock()
            .stores
            .get(store)
            .and_then(|records| records.get(unique_key))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TopologyReadEffects for InMemoryTopologyStore {
    async fn list_mappings(
        &self,
        store: &StoreId,
        unique_key: &UniqueKey,
    ) -> Result<Vec<StoredMapping>> {
        // Newest first, so callers cannot rely on ascending order.
        let mut records = self.records(store, unique_key);
        records.reverse();
        Ok(records)
    }
}

#[async_trait]
impl TopologyWriteEffects for InMemoryTopologyStore {
    async fn add_transactions(
        &self,
        batch: &TransactionBatch,
    ) -> std::result::Result<(), WriteFailure> {
        let mut state = self.lock();

        let fault = state.fault.take();
        match fault {
            Some(WriteFault::Transport { indeterminate }) => {
                return Err(WriteFailure::Transport {
                    message: "injected transport failure".into(),
                    indeterminate,
                });
            }
            Some(WriteFault::StaleSerial) => {
                let Some(first) = batch.transactions().first() else {
                    return Ok(());
                };
                let attempted = first.transaction().serial();
                let expected = attempted.next().unwrap_or(attempted);
                return Err(WriteFailure::Rejected(BatchRejection {
                    index: 0,
                    transaction_hash: first.hash(),
                    reason: RejectionReason::StaleSerial {
                        expected,
                        attempted,
                    },
                }));
            }
            Some(WriteFault::ApplyThenTimeout) | None => {}
        }

        let mut snapshot = state.stores.get(batch.store()).cloned().unwrap_or_default();
        for (index, signed) in batch.transactions().iter().enumerate() {
            if let Err(reason) = apply(&mut snapshot, signed) {
                debug!(index, hash = %signed.hash(), %reason, "Rejecting topology batch");
                return Err(WriteFailure::Rejected(BatchRejection {
                    index,
                    transaction_hash: signed.hash(),
                    reason,
                }));
            }
        }

        state.stores.insert(batch.store().clone(), snapshot);
        state.accepted_batches += 1;
        debug!(store = %batch.store(), transactions = batch.len(), "Applied topology batch");

        if fault == Some(WriteFault::ApplyThenTimeout) {
            return Err(WriteFailure::Transport {
                message: "injected timeout after apply".into(),
                indeterminate: true,
            });
        }
        Ok(())
    }
}

fn apply(
    snapshot: &mut Records,
    signed: &SignedTopologyTransaction,
) -> std::result::Result<(), RejectionReason> {
    let decoded = SignedTopologyTransaction::from_serialized(
        signed.serialized().to_vec(),
        signed.signatures().to_vec(),
        signed.multi_signatures().to_vec(),
        signed.is_proposal(),
    )
    .map_err(|e| RejectionReason::Malformed(e.to_string()))?;
    if decoded.hash() != signed.hash() {
        return Err(RejectionReason::Malformed("hash does not match bytes".into()));
    }

    let tx = decoded.transaction();
    let mapping = tx.mapping();

    let single = decoded
        .signatures()
        .iter()
        .map(|signature| (signature, decoded.hash()));
    // Coverage of this transaction was checked when `decoded` was rebuilt.
    let multi = decoded
        .multi_signatures()
        .iter()
        .map(|m| (m.signature(), m.combined_hash()));
    for (signature, signed_hash) in single.chain(multi) {
        let key = known_key(snapshot, mapping, &signature.signed_by).ok_or_else(|| {
            RejectionReason::AuthorizationDenied(format!("unknown signer {}", signature.signed_by))
        })?;
        verify(&key, &signed_hash.to_multihash(), &signature.signature)?;
    }

    let unique_key = tx.unique_key();
    let current = snapshot
        .get(&unique_key)
        .and_then(|versions| versions.iter().map(|r| r.serial).max());
    let expected = Serial::after(current).map_err(|e| RejectionReason::Malformed(e.to_string()))?;
    if tx.serial() != expected {
        return Err(RejectionReason::StaleSerial {
            expected,
            attempted: tx.serial(),
        });
    }

    let authorized = authorized_signers(snapshot, mapping);
    if !decoded.signers().any(|s| authorized.contains(&s)) {
        return Err(RejectionReason::AuthorizationDenied(format!(
            "no signer holds authority over namespace {} for {}",
            mapping.namespace(),
            mapping.kind()
        )));
    }

    snapshot.entry(unique_key).or_default().push(StoredMapping {
        serial: tx.serial(),
        operation: tx.operation(),
        mapping: mapping.clone(),
    });
    Ok(())
}

/// Latest added version of every namespace delegation
fn effective_delegations(snapshot: &Records) -> impl Iterator<Item = &TopologyMapping> {
    snapshot.iter().filter_map(|(key, versions)| {
        if key.kind() != MappingKind::NamespaceDelegation {
            return None;
        }
        versions
            .iter()
            .max_by_key(|r| r.serial)
            .filter(|r| r.operation == TopologyChangeOp::AddReplace)
            .map(|r| &r.mapping)
    })
}

/// Key for `fingerprint` among delegated keys and the transaction's own target
fn known_key(
    snapshot: &Records,
    mapping: &TopologyMapping,
    fingerprint: &Fingerprint,
) -> Option<SigningPublicKey> {
    let own = mapping
        .as_namespace_delegation()
        .map(|d| &d.target_key)
        .filter(|k| &k.fingerprint() == fingerprint);
    if let Some(key) = own {
        return Some(key.clone());
    }
    effective_delegations(snapshot)
        .filter_map(TopologyMapping::as_namespace_delegation)
        .map(|d| &d.target_key)
        .find(|k| &k.fingerprint() == fingerprint)
        .cloned()
}

/// Fingerprints allowed to sign `mapping`
fn authorized_signers(snapshot: &Records, mapping: &TopologyMapping) -> Vec<Fingerprint> {
    let namespace = mapping.namespace();
    let kind = mapping.kind();
    let mut signers: Vec<Fingerprint> = effective_delegations(snapshot)
        .filter_map(TopologyMapping::as_namespace_delegation)
        .filter(|d| d.namespace == namespace && d.permits(kind))
        .map(|d| d.target_key.fingerprint())
        .collect();

    // A root delegation authorizes itself.
    if let Some(d) = mapping.as_namespace_delegation() {
        if d.is_root_delegation && d.target_key.fingerprint() == d.namespace {
            signers.push(d.namespace);
        }
    }
    signers
}

fn verify(
    key: &SigningPublicKey,
    message: &[u8],
    signature: &[u8],
) -> std::result::Result<(), RejectionReason> {
    if key.scheme() != SigningKeyScheme::Ed25519 {
        return Err(RejectionReason::Malformed(format!(
            "unsupported key scheme {:?}",
            key.scheme()
        )));
    }
    let key_bytes: [u8; 32] = key
        .key_bytes()
        .try_into()
        .map_err(|_| RejectionReason::Malformed("Ed25519 key must be 32 bytes".into()))?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| RejectionReason::BadSignature)?;
    let signature =
        Ed25519Signature::from_slice(signature).map_err(|_| RejectionReason::BadSignature)?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| RejectionReason::BadSignature)
}
