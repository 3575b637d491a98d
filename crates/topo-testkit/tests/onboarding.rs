//! End-to-end onboarding against the in-memory store

use assert_matches::assert_matches;
use topo_core::crypto::{combine_hashes, SigningKeyUsage};
use topo_core::effects::StoredMapping;
use topo_core::mapping::{build_namespace_delegation, ParticipantPermission, UniqueKey};
use topo_core::{
    prepare_new_party, BatchSubmitter, MappingKind, MultiTransactionSignature, RetryPolicy,
    Serial, SigningMode, TopologyChangeOp, TopologyError, TopologyWorkflow, TransactionBatch,
};
use topo_testkit::{fixtures, Ed25519Signer, TopologyTestEffects};

fn workflow(seed: u64) -> TopologyWorkflow<TopologyTestEffects> {
    TopologyWorkflow::new(TopologyTestEffects::from_seed(seed), fixtures::test_store())
        .with_retry(RetryPolicy::none())
}

#[tokio::test]
async fn onboarding_writes_three_mappings() {
    let workflow = workflow(1);
    let request = fixtures::onboarding_request(&workflow.effects().signer, "alice");

    let outcome = workflow.onboard_party(&request).await.unwrap();
    assert_eq!(outcome.party_id.hint(), "alice");
    assert_eq!(outcome.party_id.namespace(), request.namespace());
    assert_eq!(outcome.receipt.transaction_hashes.len(), 3);
    assert_eq!(
        outcome.receipt.combined_hash,
        combine_hashes(&outcome.receipt.transaction_hashes)
    );

    let keys = workflow
        .resolve(&UniqueKey::PartyToKey {
            party: outcome.party_id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(keys.next_serial, Serial::new(2).unwrap());
    assert_eq!(keys.current_signing_keys(), &[request.public_key.clone()]);

    let hosting = workflow
        .resolve(&UniqueKey::PartyToParticipant {
            party: outcome.party_id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(hosting.next_serial, Serial::new(2).unwrap());
    assert_eq!(hosting.current_hosting(), request.hosting.as_slice());

    let delegation = workflow
        .resolve(&UniqueKey::NamespaceDelegation {
            namespace: request.namespace(),
            target: request.public_key.fingerprint(),
        })
        .await
        .unwrap();
    assert_eq!(delegation.current_serial(), Some(Serial::FIRST));
    assert_eq!(workflow.effects().store.accepted_batches(), 1);
}

#[tokio::test]
async fn prepared_hashes_match_submitted_hashes() {
    let workflow = workflow(2);
    let request = fixtures::onboarding_request(&workflow.effects().signer, "bob");

    let prepared = workflow.prepare_party(&request).await.unwrap();
    let offline = topo_core::prepare_new_party(&request).unwrap();
    assert_eq!(prepared, offline);

    let outcome = workflow.onboard_party(&request).await.unwrap();
    assert_eq!(outcome.receipt.transaction_hashes, prepared.transaction_hashes());
    assert_eq!(outcome.receipt.combined_hash, prepared.combined_hash);
}

#[tokio::test]
async fn threshold_above_confirmers_is_rejected_before_submission() {
    let workflow = workflow(3);
    let mut request = fixtures::onboarding_request(&workflow.effects().signer, "carol");
    request.hosting = vec![
        fixtures::hosting("participant1", ParticipantPermission::Confirmation),
        fixtures::hosting("participant2", ParticipantPermission::Submission),
        fixtures::hosting("participant3", ParticipantPermission::Observation),
    ];
    request.confirming_threshold = 3;

    let err = workflow.onboard_party(&request).await.unwrap_err();
    assert_matches!(err, TopologyError::InvalidMapping { .. });
    assert_eq!(
        err.context().and_then(|c| c.kind),
        Some(MappingKind::PartyToParticipant)
    );
    assert_eq!(workflow.effects().store.accepted_batches(), 0);
}

#[tokio::test]
async fn multiple_hosts_with_higher_threshold() {
    let workflow = workflow(4);
    let mut request = fixtures::onboarding_request(&workflow.effects().signer, "dave");
    request.hosting = fixtures::confirmers(&["participant2", "participant1"]);
    request.confirming_threshold = 2;

    let outcome = workflow.onboard_party(&request).await.unwrap();
    let hosting = workflow
        .resolve(&UniqueKey::PartyToParticipant {
            party: outcome.party_id,
        })
        .await
        .unwrap();
    let names: Vec<String> = hosting
        .current_hosting()
        .iter()
        .map(|h| h.participant.uid().identifier().to_string())
        .collect();
    assert_eq!(names, vec!["participant1", "participant2"]);
}

#[tokio::test]
async fn add_signing_key_appends_in_order() {
    let workflow = workflow(5);
    let request = fixtures::onboarding_request(&workflow.effects().signer, "erin");
    let outcome = workflow.onboard_party(&request).await.unwrap();

    let second = Ed25519Signer::from_seed(50).public_key([SigningKeyUsage::Protocol]);
    let third = Ed25519Signer::from_seed(51).public_key([SigningKeyUsage::Protocol]);
    workflow
        .add_signing_key(&outcome.party_id, second.clone(), 1)
        .await
        .unwrap();
    workflow
        .add_signing_key(&outcome.party_id, third.clone(), 2)
        .await
        .unwrap();

    let keys = workflow
        .resolve(&UniqueKey::PartyToKey {
            party: outcome.party_id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(keys.next_serial, Serial::new(4).unwrap());
    assert_eq!(
        keys.current_signing_keys(),
        &[request.public_key.clone(), second.clone(), third]
    );

    // Adding a key twice is a mapping error, not a store rejection.
    assert_matches!(
        workflow.add_signing_key(&outcome.party_id, second, 1).await,
        Err(TopologyError::InvalidMapping { .. })
    );
}

#[tokio::test]
async fn onboarding_an_existing_party_is_a_mapping_error() {
    let workflow = workflow(6);
    let request = fixtures::onboarding_request(&workflow.effects().signer, "frank");
    let outcome = workflow.onboard_party(&request).await.unwrap();

    // The delegation is already in effect and the key already registered, so
    // nothing is submitted.
    let err = workflow.onboard_party(&request).await.unwrap_err();
    assert_matches!(err, TopologyError::InvalidMapping { .. });
    let context = err.context().unwrap();
    assert_eq!(
        context.unique_key,
        Some(UniqueKey::PartyToKey {
            party: outcome.party_id
        })
    );
    assert_eq!(context.attempted_serial, Serial::new(2));
    assert_eq!(workflow.effects().store.accepted_batches(), 1);
}

#[tokio::test]
async fn offline_batch_for_an_existing_party_conflicts_at_the_store() {
    let workflow = workflow(7);
    let request = fixtures::onboarding_request(&workflow.effects().signer, "grace");
    workflow.onboard_party(&request).await.unwrap();

    // Prepared without reading the store, the duplicate root delegation is
    // only caught on submission.
    let prepared = prepare_new_party(&request).unwrap();
    let signed = prepared
        .transactions
        .into_iter()
        .map(|tx| {
            let signatures = workflow.effects().signer.sign_hash(&tx.hash());
            tx.into_signed(signatures, true).unwrap()
        })
        .collect();
    let batch = TransactionBatch::new(workflow.store().clone(), signed).unwrap();

    let err = BatchSubmitter::new(workflow.effects())
        .submit(&batch)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        TopologyError::ConcurrencyConflict {
            expected_serial: Some(expected),
            ..
        } if expected == Serial::new(2).unwrap()
    );
    let context = err.context().unwrap();
    assert_eq!(context.transaction_index, Some(0));
    assert_eq!(context.kind, Some(MappingKind::NamespaceDelegation));
    assert_eq!(workflow.effects().store.accepted_batches(), 1);
}

#[tokio::test]
async fn one_key_onboards_several_parties() {
    let workflow = workflow(8);
    let alice = fixtures::onboarding_request(&workflow.effects().signer, "alice");
    let bob = fixtures::onboarding_request(&workflow.effects().signer, "bob");
    workflow.onboard_party(&alice).await.unwrap();

    let prepared = workflow.prepare_party(&bob).await.unwrap();
    let kinds: Vec<MappingKind> = prepared
        .transactions
        .iter()
        .map(|t| t.transaction().mapping().kind())
        .collect();
    assert_eq!(kinds, vec![MappingKind::PartyToParticipant, MappingKind::PartyToKey]);

    let outcome = workflow.onboard_party(&bob).await.unwrap();
    assert_eq!(outcome.party_id.namespace(), alice.namespace());
    assert_eq!(outcome.receipt.transaction_hashes, prepared.transaction_hashes());

    let store = &workflow.effects().store;
    let delegation = store.records(workflow.store(), &bob.root_delegation_key());
    assert_eq!(delegation.len(), 1);
    assert_eq!(store.accepted_batches(), 2);
}

#[tokio::test]
async fn removed_delegation_is_written_again_at_the_next_serial() {
    let workflow = workflow(9);
    let request = fixtures::onboarding_request(&workflow.effects().signer, "heidi");
    let store = &workflow.effects().store;

    let root = build_namespace_delegation(request.namespace(), request.public_key.clone(), true)
        .unwrap();
    store.seed(
        workflow.store(),
        StoredMapping {
            serial: Serial::FIRST,
            operation: TopologyChangeOp::Remove,
            mapping: root,
        },
    );

    workflow.onboard_party(&request).await.unwrap();
    assert_eq!(
        store.max_serial(workflow.store(), &request.root_delegation_key()),
        Serial::new(2)
    );
}

#[tokio::test]
async fn combined_signature_onboards_with_one_signing_request() {
    let workflow = workflow(10).with_signing_mode(SigningMode::Combined);
    let request = fixtures::onboarding_request(&workflow.effects().signer, "ivan");

    let prepared = workflow.prepare_party(&request).await.unwrap();
    let outcome = workflow.onboard_party(&request).await.unwrap();
    assert_eq!(outcome.receipt.combined_hash, prepared.combined_hash);
    assert_eq!(workflow.effects().store.accepted_batches(), 1);

    // Key rotation works the same way with a one-transaction batch.
    let second = Ed25519Signer::from_seed(100).public_key([SigningKeyUsage::Protocol]);
    workflow
        .add_signing_key(&outcome.party_id, second.clone(), 1)
        .await
        .unwrap();
    let keys = workflow
        .resolve(&UniqueKey::PartyToKey {
            party: outcome.party_id,
        })
        .await
        .unwrap();
    assert_eq!(keys.current_signing_keys(), &[request.public_key.clone(), second]);
}

#[tokio::test]
async fn combined_signature_covers_every_transaction() {
    let effects = TopologyTestEffects::from_seed(11);
    let request = fixtures::onboarding_request(&effects.signer, "judy");
    let prepared = prepare_new_party(&request).unwrap();
    let hashes = prepared.transaction_hashes();

    let signatures = effects.signer.sign_hash(&prepared.combined_hash);
    assert_eq!(signatures.len(), 1);
    let multi = MultiTransactionSignature::new(hashes.clone(), signatures[0].clone());
    assert_eq!(multi.combined_hash(), prepared.combined_hash);

    let mut tampered = signatures[0].clone();
    tampered.signature[0] ^= 0xff;
    let tampered = MultiTransactionSignature::new(hashes, tampered);

    let batch = |signature: &MultiTransactionSignature| {
        let signed = prepared
            .transactions
            .iter()
            .cloned()
            .map(|tx| tx.into_multi_signed(vec![signature.clone()], true).unwrap())
            .collect();
        TransactionBatch::new(fixtures::test_store(), signed).unwrap()
    };

    let submitter = BatchSubmitter::new(&effects);
    let err = submitter.submit(&batch(&tampered)).await.unwrap_err();
    assert_matches!(err, TopologyError::AuthorizationRejected { .. });
    assert_eq!(err.context().unwrap().transaction_index, Some(0));
    assert_eq!(effects.store.accepted_batches(), 0);

    submitter.submit(&batch(&multi)).await.unwrap();
    assert_eq!(effects.store.accepted_batches(), 1);

    // A signature over only part of the batch cannot be attached elsewhere.
    let partial = MultiTransactionSignature::new(
        [prepared.transactions[0].hash()],
        effects.signer.sign_hash(&prepared.transactions[0].hash())[0].clone(),
    );
    assert_matches!(
        prepared.transactions[1]
            .clone()
            .into_multi_signed(vec![partial], true),
        Err(TopologyError::AuthorizationRejected { .. })
    );
}
