//! Topology transactions, their signed form and submission batches
//!
//! A [`TopologyTransaction`] is prepared once into canonical bytes and a
//! content hash ([`PreparedTransaction`]). Signers sign either that hash or,
//! with a [`MultiTransactionSignature`], the combined hash of every
//! transaction in a batch. After signatures are attached the result is a
//! [`SignedTopologyTransaction`], which exposes getters only. Transactions
//! bound for one store travel together in a [`TransactionBatch`] whose order
//! the store applies as given.

use crate::crypto::{
    combine_hashes, hash_with_purpose, Digest, Fingerprint, HashPurpose, SigningAlgorithmSpec,
};
use crate::errors::{ErrorContext, Result, TopologyError};
use crate::mapping::{MappingKind, TopologyMapping, UniqueKey};
use crate::serialization;
use crate::types::{Serial, StoreId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Whether a transaction adds or removes its mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyChangeOp {
    /// Add the mapping, replacing any previous version under the same key
    AddReplace,
    /// Remove the mapping
    Remove,
}

impl fmt::Display for TopologyChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyChangeOp::AddReplace => f.write_str("add_replace"),
            TopologyChangeOp::Remove => f.write_str("remove"),
        }
    }
}

/// A mapping change at a given serial
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopologyTransaction {
    operation: TopologyChangeOp,
    serial: Serial,
    mapping: TopologyMapping,
}

impl TopologyTransaction {
    /// Create a transaction
    pub fn new(operation: TopologyChangeOp, serial: Serial, mapping: TopologyMapping) -> Self {
        Self {
            operation,
            serial,
            mapping,
        }
    }

    /// Add or replace `mapping` at `serial`
    pub fn add_replace(serial: Serial, mapping: TopologyMapping) -> Self {
        Self::new(TopologyChangeOp::AddReplace, serial, mapping)
    }

    /// Change operation
    pub fn operation(&self) -> TopologyChangeOp {
        self.operation
    }

    /// Serial of the change
    pub fn serial(&self) -> Serial {
        self.serial
    }

    /// The mapping
    pub fn mapping(&self) -> &TopologyMapping {
        &self.mapping
    }

    /// Unique key of the mapping
    pub fn unique_key(&self) -> UniqueKey {
        self.mapping.unique_key()
    }

    /// Serialize canonically and compute the transaction hash
    pub fn prepare(self) -> Result<PreparedTransaction> {
        let serialized = serialization::encode_transaction(&self)?;
        let hash = hash_with_purpose(HashPurpose::TopologyTransaction, &serialized);
        Ok(PreparedTransaction {
            transaction: self,
            serialized,
            hash,
        })
    }
}

/// A transaction with its canonical bytes and hash, ready for signing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransaction {
    transaction: TopologyTransaction,
    serialized: Vec<u8>,
    hash: Digest,
}

impl PreparedTransaction {
    /// The transaction
    pub fn transaction(&self) -> &TopologyTransaction {
        &self.transaction
    }

    /// Canonical bytes
    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }

    /// Hash over the canonical bytes
    pub fn hash(&self) -> Digest {
        self.hash
    }

    /// Attach signatures over this transaction's hash. At least one is
    /// required.
    pub fn into_signed(
        self,
        signatures: Vec<Signature>,
        proposal: bool,
    ) -> Result<SignedTopologyTransaction> {
        self.attach(signatures, Vec::new(), proposal)
    }

    /// Attach signatures over a combined hash. Each must cover this
    /// transaction.
    pub fn into_multi_signed(
        self,
        multi_signatures: Vec<MultiTransactionSignature>,
        proposal: bool,
    ) -> Result<SignedTopologyTransaction> {
        self.attach(Vec::new(), multi_signatures, proposal)
    }

    fn attach(
        self,
        signatures: Vec<Signature>,
        multi_signatures: Vec<MultiTransactionSignature>,
        proposal: bool,
    ) -> Result<SignedTopologyTransaction> {
        let context = || {
            ErrorContext::for_key(&self.transaction.unique_key())
                .with_serial(self.transaction.serial)
        };
        if signatures.is_empty() && multi_signatures.is_empty() {
            return Err(TopologyError::authorization_rejected(
                "signed transaction needs at least one signature",
            )
            .with_context(context()));
        }
        if let Some(multi) = multi_signatures.iter().find(|m| !m.covers(&self.hash)) {
            return Err(TopologyError::authorization_rejected(format!(
                "signature by {} over {} does not cover transaction {}",
                multi.signature.signed_by,
                multi.combined_hash(),
                self.hash
            ))
            .with_context(context()));
        }
        Ok(SignedTopologyTransaction {
            transaction: self.transaction,
            serialized: self.serialized,
            hash: self.hash,
            signatures,
            multi_signatures,
            proposal,
        })
    }
}

/// Encoding of signature bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureFormat {
    /// Raw signature bytes (Ed25519)
    Raw,
    /// DER-encoded ECDSA signature
    Der,
    /// Concatenated `r || s`
    Concat,
}

/// A signature over a transaction hash
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// Encoding of the signature bytes
    pub format: SignatureFormat,
    /// Signature bytes
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
    /// Fingerprint of the signing key
    pub signed_by: Fingerprint,
    /// Algorithm used
    pub algorithm: SigningAlgorithmSpec,
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("signed_by", &self.signed_by)
            .field("algorithm", &self.algorithm)
            .field("len", &self.signature.len())
            .finish()
    }
}

/// One signature over the combined hash of several transactions.
///
/// The same value is attached to every transaction it covers, so a batch can
/// be authorized with a single signing request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MultiTransactionSignature {
    transaction_hashes: Vec<Digest>,
    signature: Signature,
}

impl MultiTransactionSignature {
    /// Signature over [`combine_hashes`] of `transaction_hashes`
    pub fn new(
        transaction_hashes: impl IntoIterator<Item = Digest>,
        signature: Signature,
    ) -> Self {
        let mut transaction_hashes: Vec<Digest> = transaction_hashes.into_iter().collect();
        transaction_hashes.sort_unstable();
        transaction_hashes.dedup();
        Self {
            transaction_hashes,
            signature,
        }
    }

    /// Covered transaction hashes, sorted
    pub fn transaction_hashes(&self) -> &[Digest] {
        &self.transaction_hashes
    }

    /// The signature
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The hash that was signed
    pub fn combined_hash(&self) -> Digest {
        combine_hashes(&self.transaction_hashes)
    }

    /// Whether `hash` is among the covered transactions
    pub fn covers(&self, hash: &Digest) -> bool {
        self.transaction_hashes.binary_search(hash).is_ok()
    }
}

/// A signed transaction. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTopologyTransaction {
    transaction: TopologyTransaction,
    serialized: Vec<u8>,
    hash: Digest,
    signatures: Vec<Signature>,
    multi_signatures: Vec<MultiTransactionSignature>,
    proposal: bool,
}

impl SignedTopologyTransaction {
    /// Rebuild from wire bytes, recomputing the hash and re-checking that
    /// every multi-transaction signature covers it
    pub fn from_serialized(
        serialized: Vec<u8>,
        signatures: Vec<Signature>,
        multi_signatures: Vec<MultiTransactionSignature>,
        proposal: bool,
    ) -> Result<Self> {
        let transaction = serialization::decode_transaction(&serialized)?;
        let hash = hash_with_purpose(HashPurpose::TopologyTransaction, &serialized);
        PreparedTransaction {
            transaction,
            serialized,
            hash,
        }
        .attach(signatures, multi_signatures, proposal)
    }

    /// The transaction
    pub fn transaction(&self) -> &TopologyTransaction {
        &self.transaction
    }

    /// Canonical bytes
    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }

    /// Transaction hash
    pub fn hash(&self) -> Digest {
        self.hash
    }

    /// Signatures over this transaction's hash, in the order they were
    /// attached
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Signatures over combined hashes covering this transaction
    pub fn multi_signatures(&self) -> &[MultiTransactionSignature] {
        &self.multi_signatures
    }

    /// Whether the transaction is submitted as a proposal
    pub fn is_proposal(&self) -> bool {
        self.proposal
    }

    /// Kind of the carried mapping
    pub fn kind(&self) -> MappingKind {
        self.transaction.mapping.kind()
    }

    /// Fingerprints of all signers
    pub fn signers(&self) -> impl Iterator<Item = Fingerprint> + '_ {
        self.signatures
            .iter()
            .chain(self.multi_signatures.iter().map(|m| &m.signature))
            .map(|s| s.signed_by)
    }
}

/// An ordered set of signed transactions for one store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionBatch {
    store: StoreId,
    transactions: Vec<SignedTopologyTransaction>,
}

impl TransactionBatch {
    /// Build a batch, checking that its order can be applied.
    ///
    /// - the batch is not empty
    /// - serials under one unique key ascend by exactly one
    /// - a namespace delegation precedes every mapping it authorizes, and a
    ///   root delegation precedes other delegations of its namespace
    pub fn new(store: StoreId, transactions: Vec<SignedTopologyTransaction>) -> Result<Self> {
        if transactions.is_empty() {
            return Err(TopologyError::invalid_mapping("batch contains no transactions"));
        }

        let mut last_serial: HashMap<UniqueKey, Serial> = HashMap::new();
        for (index, signed) in transactions.iter().enumerate() {
            let tx = signed.transaction();
            let key = tx.unique_key();
            if let Some(previous) = last_serial.get(&key) {
                if previous.next()? != tx.serial() {
                    return Err(TopologyError::invalid_mapping(format!(
                        "serial {} does not follow {previous} within the batch",
                        tx.serial()
                    ))
                    .with_context(
                        ErrorContext::for_key(&key)
                            .with_serial(tx.serial())
                            .with_transaction(index, signed.hash()),
                    ));
                }
            }
            last_serial.insert(key, tx.serial());
        }

        check_delegation_order(&transactions)?;

        Ok(Self {
            store,
            transactions,
        })
    }

    /// Target store
    pub fn store(&self) -> &StoreId {
        &self.store
    }

    /// Transactions in application order
    pub fn transactions(&self) -> &[SignedTopologyTransaction] {
        &self.transactions
    }

    /// Number of transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Always false; batches are never empty
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Transaction hashes in batch order
    pub fn hashes(&self) -> Vec<Digest> {
        self.transactions.iter().map(|t| t.hash()).collect()
    }

    /// Order-independent hash over all transactions
    pub fn combined_hash(&self) -> Digest {
        combine_hashes(&self.hashes())
    }
}

fn check_delegation_order(transactions: &[SignedTopologyTransaction]) -> Result<()> {
    let mut first_root: HashMap<Fingerprint, usize> = HashMap::new();
    let mut first_delegation: HashMap<Fingerprint, usize> = HashMap::new();
    for (index, signed) in transactions.iter().enumerate() {
        if let Some(delegation) = signed.transaction().mapping().as_namespace_delegation() {
            first_delegation.entry(delegation.namespace).or_insert(index);
            if delegation.is_root_delegation {
                first_root.entry(delegation.namespace).or_insert(index);
            }
        }
    }

    for (index, signed) in transactions.iter().enumerate() {
        let mapping = signed.transaction().mapping();
        let namespace = mapping.namespace();
        let required = match mapping {
            TopologyMapping::NamespaceDelegation(d) if d.is_root_delegation => None,
            TopologyMapping::NamespaceDelegation(_) => first_root.get(&namespace),
            TopologyMapping::PartyToKey(_) | TopologyMapping::PartyToParticipant(_) => {
                first_delegation.get(&namespace)
            }
        };
        if let Some(&position) = required {
            if position > index {
                return Err(TopologyError::invalid_mapping(format!(
                    "{} at position {index} precedes the delegation of namespace {namespace} at position {position}",
                    mapping.kind()
                ))
                .with_context(
                    ErrorContext::for_key(&mapping.unique_key())
                        .with_serial(signed.transaction().serial())
                        .with_transaction(index, signed.hash()),
                ));
            }
        }
    }
    Ok(())
}
