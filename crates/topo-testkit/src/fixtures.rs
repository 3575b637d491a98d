//! Identity and request fixtures

use crate::signer::Ed25519Signer;
use topo_core::mapping::{HostingParticipant, ParticipantPermission};
use topo_core::{Fingerprint, OnboardingRequest, ParticipantId, StoreId, UniqueIdentifier};

/// Synchronizer store used across tests
pub fn test_store() -> StoreId {
    StoreId::Synchronizer("global-domain".into())
}

/// Participant `name` in a namespace derived from the name
pub fn participant(name: &str) -> ParticipantId {
    let namespace = Fingerprint::from_public_key_bytes(name.as_bytes());
    match UniqueIdentifier::new(name, namespace) {
        Ok(uid) => ParticipantId::new(uid),
        Err(e) => panic!("invalid participant fixture {name}: {e}"),
    }
}

/// Hosting entry for participant `name`
pub fn hosting(name: &str, permission: ParticipantPermission) -> HostingParticipant {
    HostingParticipant {
        participant: participant(name),
        permission,
    }
}

/// One confirming participant per name
pub fn confirmers(names: &[&str]) -> Vec<HostingParticipant> {
    names
        .iter()
        .map(|name| hosting(name, ParticipantPermission::Confirmation))
        .collect()
}

/// Onboarding request for the signer's primary key, hosted by `participant1`
pub fn onboarding_request(signer: &Ed25519Signer, hint: &str) -> OnboardingRequest {
    OnboardingRequest {
        public_key: signer.onboarding_key(),
        party_hint: Some(hint.to_string()),
        hosting: confirmers(&["participant1"]),
        confirming_threshold: 1,
        key_threshold: 1,
    }
}
