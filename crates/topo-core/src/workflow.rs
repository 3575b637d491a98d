//! External party onboarding
//!
//! Onboarding a party writes up to three mappings in prerequisite order:
//!
//! 1. the root namespace delegation of the party's key
//! 2. the party-to-participant hosting mapping
//! 3. the party-to-key mapping naming the key as the party's signer
//!
//! Every serial, the delegation's included, is resolved from the store on
//! each attempt, so a retry after a conflict builds on whatever the other
//! writer left behind. A key that already roots its namespace keeps its
//! delegation and the batch carries only the party mappings.

use crate::crypto::{combine_hashes, Digest, Fingerprint, SigningKeyUsage, SigningPublicKey};
use crate::effects::TopologyEffects;
use crate::errors::{ErrorContext, Result, TopologyError};
use crate::mapping::{
    build_namespace_delegation, build_party_to_key_update, build_party_to_participant,
    HostingParticipant, UniqueKey,
};
use crate::resolver::{SerialResolution, SerialResolver};
use crate::retry::RetryPolicy;
use crate::submit::{BatchSubmitter, SubmissionReceipt};
use crate::transaction::{
    MultiTransactionSignature, PreparedTransaction, SignedTopologyTransaction, TopologyTransaction,
    TransactionBatch,
};
use crate::types::{PartyId, Serial, StoreId};
use tracing::{debug, info};

/// Usage tags an onboarding key must carry: it roots the party's namespace
/// and signs for the party
pub const ONBOARDING_USAGE: [SigningKeyUsage; 2] =
    [SigningKeyUsage::Namespace, SigningKeyUsage::Protocol];

/// What to onboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingRequest {
    /// Key that roots the party's namespace and signs for the party.
    /// Must carry both namespace and protocol usage.
    pub public_key: SigningPublicKey,
    /// Identifier part of the party id; defaults to a fingerprint prefix
    pub party_hint: Option<String>,
    /// Participants that will host the party
    pub hosting: Vec<HostingParticipant>,
    /// Confirming participants required
    pub confirming_threshold: u32,
    /// Signatures required from the party's keys
    pub key_threshold: u32,
}

impl OnboardingRequest {
    /// Namespace the party will live in
    pub fn namespace(&self) -> Fingerprint {
        self.public_key.fingerprint()
    }

    /// Unique key of the root delegation of the party's namespace
    pub fn root_delegation_key(&self) -> UniqueKey {
        let namespace = self.namespace();
        UniqueKey::NamespaceDelegation {
            namespace,
            target: namespace,
        }
    }

    /// Party id derived from the key and hint
    pub fn party_id(&self) -> Result<PartyId> {
        PartyId::from_fingerprint(&self.namespace(), self.party_hint.as_deref())
    }
}

/// Prepared, unsigned onboarding transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedParty {
    /// The party being onboarded
    pub party_id: PartyId,
    /// Namespace rooted by the party's key
    pub namespace: Fingerprint,
    /// Transactions in submission order
    pub transactions: Vec<PreparedTransaction>,
    /// Combined hash over all transactions
    pub combined_hash: Digest,
}

impl PreparedParty {
    /// Transaction hashes in submission order
    pub fn transaction_hashes(&self) -> Vec<Digest> {
        self.transactions.iter().map(PreparedTransaction::hash).collect()
    }
}

/// Prepare onboarding for a key and party that do not exist yet.
///
/// Every mapping is written at [`Serial::FIRST`] without consulting any
/// store. If the key already roots its namespace, or the party already has
/// hosting or key mappings, the store rejects the batch with a stale serial.
pub fn prepare_new_party(request: &OnboardingRequest) -> Result<PreparedParty> {
    assemble(request, Some(Serial::FIRST), Serial::FIRST, &[], None)
}

/// `delegation_serial` is `None` when the root delegation is already in
/// effect and must not be written again
fn assemble(
    request: &OnboardingRequest,
    delegation_serial: Option<Serial>,
    hosting_serial: Serial,
    current_keys: &[SigningPublicKey],
    current_key_serial: Option<Serial>,
) -> Result<PreparedParty> {
    let namespace = request.namespace();
    let party_id = request.party_id()?;

    let delegation = build_namespace_delegation(namespace, request.public_key.clone(), true)?;
    let hosting = build_party_to_participant(
        party_id.clone(),
        request.hosting.clone(),
        request.confirming_threshold,
    )
    .map_err(|e| e.with_context(ErrorContext::new().with_serial(hosting_serial)))?;
    let keys = build_party_to_key_update(
        party_id.clone(),
        request.public_key.clone(),
        current_keys,
        current_key_serial,
        request.key_threshold,
    )?;

    let mut transactions = Vec::with_capacity(3);
    if let Some(serial) = delegation_serial {
        transactions.push(TopologyTransaction::add_replace(serial, delegation).prepare()?);
    }
    transactions.push(TopologyTransaction::add_replace(hosting_serial, hosting).prepare()?);
    transactions.push(TopologyTransaction::add_replace(keys.next_serial, keys.mapping).prepare()?);
    let hashes: Vec<Digest> = transactions.iter().map(PreparedTransaction::hash).collect();

    Ok(PreparedParty {
        party_id,
        namespace,
        combined_hash: combine_hashes(&hashes),
        transactions,
    })
}

/// Serial for writing the root delegation of `request`, or `None` when the
/// identical delegation is already in effect.
///
/// A different delegation under the same key is never replaced: that fails
/// with [`TopologyError::InconsistentState`], which no retry will change.
fn root_delegation_serial(
    request: &OnboardingRequest,
    resolution: &SerialResolution,
) -> Result<Option<Serial>> {
    let wanted = build_namespace_delegation(request.namespace(), request.public_key.clone(), true)?;
    match resolution.effective_mapping() {
        None => Ok(Some(resolution.next_serial)),
        Some(current) if *current == wanted => Ok(None),
        Some(_) => Err(TopologyError::inconsistent_state(format!(
            "namespace {} already holds a different delegation to its root key",
            request.namespace()
        ))
        .with_context(
            ErrorContext::for_key(&resolution.unique_key).with_serial(resolution.next_serial),
        )),
    }
}

/// How a workflow asks its signer to authorize a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningMode {
    /// One signing request per transaction, over that transaction's hash
    #[default]
    PerTransaction,
    /// A single signing request over the combined hash of the whole batch
    Combined,
}

/// Result of a successful onboarding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingOutcome {
    /// The onboarded party
    pub party_id: PartyId,
    /// The store's acceptance
    pub receipt: SubmissionReceipt,
}

/// Drives onboarding and key rotation against one store
pub struct TopologyWorkflow<E> {
    effects: E,
    store: StoreId,
    retry: RetryPolicy,
    signing: SigningMode,
}

impl<E: TopologyEffects> TopologyWorkflow<E> {
    /// Create a workflow with the default retry policy
    pub fn new(effects: E, store: StoreId) -> Self {
        Self {
            effects,
            store,
            retry: RetryPolicy::default(),
            signing: SigningMode::default(),
        }
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the signing mode
    pub fn with_signing_mode(mut self, signing: SigningMode) -> Self {
        self.signing = signing;
        self
    }

    /// The effect handlers
    pub fn effects(&self) -> &E {
        &self.effects
    }

    /// Target store
    pub fn store(&self) -> &StoreId {
        &self.store
    }

    /// Resolve the next serial for a unique key
    pub async fn resolve(&self, unique_key: &UniqueKey) -> Result<SerialResolution> {
        SerialResolver::new(&self.effects, self.store.clone())
            .resolve_next_serial(unique_key)
            .await
    }

    /// Resolve serials and prepare the onboarding transactions.
    ///
    /// The root delegation is left out when the store already holds it.
    pub async fn prepare_party(&self, request: &OnboardingRequest) -> Result<PreparedParty> {
        let party = request.party_id()?;
        let delegation = self.resolve(&request.root_delegation_key()).await?;
        let delegation_serial = root_delegation_serial(request, &delegation)?;
        if delegation_serial.is_none() {
            debug!(
                namespace = %request.namespace(),
                "Root delegation already in effect, onboarding into existing namespace"
            );
        }
        let hosting = self
            .resolve(&UniqueKey::PartyToParticipant {
                party: party.clone(),
            })
            .await?;
        let keys = self.resolve(&UniqueKey::PartyToKey { party }).await?;

        assemble(
            request,
            delegation_serial,
            hosting.next_serial,
            keys.current_signing_keys(),
            keys.current_serial(),
        )
    }

    /// Prepare, sign and submit the onboarding batch, re-resolving on conflicts
    pub async fn onboard_party(&self, request: &OnboardingRequest) -> Result<OnboardingOutcome> {
        let receipt = self
            .retry
            .execute_reresolving(|_| self.onboard_round(request))
            .await?;
        let party_id = request.party_id()?;
        info!(
            party = %party_id,
            store = %self.store,
            combined_hash = %receipt.combined_hash,
            "Party onboarded"
        );
        Ok(OnboardingOutcome { party_id, receipt })
    }

    async fn onboard_round(&self, request: &OnboardingRequest) -> Result<SubmissionReceipt> {
        let prepared = self.prepare_party(request).await?;
        let batch = self.sign_batch(prepared.transactions).await?;
        BatchSubmitter::new(&self.effects).submit(&batch).await
    }

    /// Append a signing key to a party, re-resolving on conflicts
    pub async fn add_signing_key(
        &self,
        party: &PartyId,
        key: SigningPublicKey,
        threshold: u32,
    ) -> Result<SubmissionReceipt> {
        let new_key = &key;
        let receipt = self
            .retry
            .execute_reresolving(move |_| self.add_key_round(party, new_key, threshold))
            .await?;
        info!(
            party = %party,
            key = %key.fingerprint(),
            threshold,
            "Signing key added"
        );
        Ok(receipt)
    }

    async fn add_key_round(
        &self,
        party: &PartyId,
        key: &SigningPublicKey,
        threshold: u32,
    ) -> Result<SubmissionReceipt> {
        let resolution = self
            .resolve(&UniqueKey::PartyToKey {
                party: party.clone(),
            })
            .await?;
        let update = build_party_to_key_update(
            party.clone(),
            key.clone(),
            resolution.current_signing_keys(),
            resolution.current_serial(),
            threshold,
        )?;
        let prepared =
            TopologyTransaction::add_replace(update.next_serial, update.mapping).prepare()?;
        let batch = self.sign_batch(vec![prepared]).await?;
        BatchSubmitter::new(&self.effects).submit(&batch).await
    }

    async fn sign_batch(&self, prepared: Vec<PreparedTransaction>) -> Result<TransactionBatch> {
        let signed = match self.signing {
            SigningMode::PerTransaction => self.sign_each(prepared).await?,
            SigningMode::Combined => self.sign_combined(prepared).await?,
        };
        TransactionBatch::new(self.store.clone(), signed)
    }

    async fn sign_each(
        &self,
        prepared: Vec<PreparedTransaction>,
    ) -> Result<Vec<SignedTopologyTransaction>> {
        let mut signed = Vec::with_capacity(prepared.len());
        for tx in prepared {
            let signatures = self.effects.sign(tx.serialized(), &tx.hash()).await?;
            if signatures.is_empty() {
                return Err(TopologyError::authorization_rejected("signer produced no signatures")
                    .with_context(
                        ErrorContext::for_key(&tx.transaction().unique_key())
                            .with_serial(tx.transaction().serial()),
                    ));
            }
            signed.push(tx.into_signed(signatures, true)?);
        }
        Ok(signed)
    }

    /// One signing request over the combined hash; every transaction carries
    /// the resulting signatures
    async fn sign_combined(
        &self,
        prepared: Vec<PreparedTransaction>,
    ) -> Result<Vec<SignedTopologyTransaction>> {
        let hashes: Vec<Digest> = prepared.iter().map(PreparedTransaction::hash).collect();
        let combined = combine_hashes(&hashes);
        let payload: Vec<u8> = hashes.iter().flat_map(Digest::to_multihash).collect();

        let signatures = self.effects.sign(&payload, &combined).await?;
        if signatures.is_empty() {
            return Err(TopologyError::authorization_rejected(format!(
                "signer produced no signatures over combined hash {combined}"
            )));
        }
        let multi: Vec<MultiTransactionSignature> = signatures
            .into_iter()
            .map(|signature| MultiTransactionSignature::new(hashes.iter().copied(), signature))
            .collect();

        prepared
            .into_iter()
            .map(|tx| tx.into_multi_signed(multi.clone(), true))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::StoredMapping;
    use crate::mapping::{MappingKind, ParticipantPermission, TopologyMapping};
    use crate::transaction::TopologyChangeOp;
    use crate::types::{ParticipantId, UniqueIdentifier};
    use assert_matches::assert_matches;

    fn request() -> OnboardingRequest {
        let participant_ns = Fingerprint::from_public_key_bytes(b"participant");
        OnboardingRequest {
            public_key: SigningPublicKey::ed25519([21u8; 32], ONBOARDING_USAGE),
            party_hint: Some("alice".into()),
            hosting: vec![HostingParticipant {
                participant: ParticipantId::new(
                    UniqueIdentifier::new("participant1", participant_ns).unwrap(),
                ),
                permission: ParticipantPermission::Confirmation,
            }],
            confirming_threshold: 1,
            key_threshold: 1,
        }
    }

    #[test]
    fn test_new_party_order_and_serials() {
        let prepared = prepare_new_party(&request()).unwrap();
        let kinds: Vec<_> = prepared
            .transactions
            .iter()
            .map(|t| t.transaction().mapping().kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                MappingKind::NamespaceDelegation,
                MappingKind::PartyToParticipant,
                MappingKind::PartyToKey
            ]
        );
        assert!(prepared
            .transactions
            .iter()
            .all(|t| t.transaction().serial() == Serial::FIRST));
        assert_eq!(prepared.party_id.hint(), "alice");
        assert_eq!(prepared.combined_hash, combine_hashes(&prepared.transaction_hashes()));
    }

    #[test]
    fn test_prepare_is_deterministic() {
        assert_eq!(
            prepare_new_party(&request()).unwrap(),
            prepare_new_party(&request()).unwrap()
        );
    }

    fn delegation_resolution(
        operation: TopologyChangeOp,
        mapping: TopologyMapping,
    ) -> SerialResolution {
        SerialResolution {
            unique_key: request().root_delegation_key(),
            next_serial: Serial::new(2).unwrap(),
            current: Some(StoredMapping {
                serial: Serial::FIRST,
                operation,
                mapping,
            }),
        }
    }

    #[test]
    fn test_root_delegation_serial_follows_store() {
        let req = request();
        let root =
            build_namespace_delegation(req.namespace(), req.public_key.clone(), true).unwrap();

        let empty = SerialResolution {
            unique_key: req.root_delegation_key(),
            next_serial: Serial::FIRST,
            current: None,
        };
        assert_eq!(root_delegation_serial(&req, &empty).unwrap(), Some(Serial::FIRST));

        let existing = delegation_resolution(TopologyChangeOp::AddReplace, root.clone());
        assert_eq!(root_delegation_serial(&req, &existing).unwrap(), None);

        let removed = delegation_resolution(TopologyChangeOp::Remove, root);
        assert_eq!(root_delegation_serial(&req, &removed).unwrap(), Serial::new(2));

        let narrower =
            build_namespace_delegation(req.namespace(), req.public_key.clone(), false).unwrap();
        let conflicting = delegation_resolution(TopologyChangeOp::AddReplace, narrower);
        let err = root_delegation_serial(&req, &conflicting).unwrap_err();
        assert_matches!(err, TopologyError::InconsistentState { ref context, .. }
            if context.unique_key == Some(req.root_delegation_key()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_existing_delegation_is_left_out() {
        let prepared = assemble(&request(), None, Serial::FIRST, &[], None).unwrap();
        let kinds: Vec<_> = prepared
            .transactions
            .iter()
            .map(|t| t.transaction().mapping().kind())
            .collect();
        assert_eq!(kinds, vec![MappingKind::PartyToParticipant, MappingKind::PartyToKey]);
        assert_eq!(prepared.combined_hash, combine_hashes(&prepared.transaction_hashes()));
    }

    #[test]
    fn test_key_without_namespace_usage_rejected() {
        let mut req = request();
        req.public_key = SigningPublicKey::ed25519([21u8; 32], [SigningKeyUsage::Protocol]);
        assert!(matches!(
            prepare_new_party(&req),
            Err(TopologyError::InvalidMapping { .. })
        ));
    }
}
