//! Combined test effect handler

use crate::signer::Ed25519Signer;
use crate::store::InMemoryTopologyStore;
use async_trait::async_trait;
use topo_core::crypto::Digest;
use topo_core::effects::{
    StoredMapping, TopologyReadEffects, TopologySignerEffects, TopologyWriteEffects, WriteFailure,
};
use topo_core::mapping::UniqueKey;
use topo_core::{Result, Signature, StoreId, TransactionBatch};

/// In-memory store plus deterministic signer.
///
/// Clones share the store, so several handlers with different signers can
/// race against the same state.
#[derive(Debug, Clone)]
pub struct TopologyTestEffects {
    /// Shared store
    pub store: InMemoryTopologyStore,
    /// Signer for this handler
    pub signer: Ed25519Signer,
}

impl TopologyTestEffects {
    /// Fresh store with a signer derived from `seed`
    pub fn from_seed(seed: u64) -> Self {
        Self::new(InMemoryTopologyStore::new(), Ed25519Signer::from_seed(seed))
    }

    /// Handler over an existing store
    pub fn new(store: InMemoryTopologyStore, signer: Ed25519Signer) -> Self {
        Self { store, signer }
    }

    /// Same store, different signer
    pub fn with_signer(&self, signer: Ed25519Signer) -> Self {
        Self::new(self.store.clone(), signer)
    }
}

#[async_trait]
impl TopologyReadEffects for TopologyTestEffects {
    async fn list_mappings(
        &self,
        store: &StoreId,
        unique_key: &UniqueKey,
    ) -> Result<Vec<StoredMapping>> {
        self.store.list_mappings(store, unique_key).await
    }
}

#[async_trait]
impl TopologyWriteEffects for TopologyTestEffects {
    async fn add_transactions(
        &self,
        batch: &TransactionBatch,
    ) -> std::result::Result<(), WriteFailure> {
        self.store.add_transactions(batch).await
    }
}

#[async_trait]
impl TopologySignerEffects for TopologyTestEffects {
    async fn sign(&self, payload: &[u8], hash: &Digest) -> Result<Vec<Signature>> {
        self.signer.sign(payload, hash).await
    }
}
