//! Construction of validated topology mappings
//!
//! Builders reject every business-rule violation with
//! [`TopologyError::InvalidMapping`] naming the constraint. They never clamp
//! thresholds or drop inputs.

use super::{
    DelegationRestriction, HostingParticipant, NamespaceDelegation, PartyToKeyMapping,
    PartyToParticipant, TopologyMapping, UniqueKey,
};
use crate::crypto::{Fingerprint, SigningKeyUsage, SigningPublicKey};
use crate::errors::{ErrorContext, Result, TopologyError};
use crate::types::{PartyId, Serial};
use std::collections::BTreeSet;

/// Build a namespace delegation to `target_key`.
///
/// A root delegation must be self-referential: `namespace` has to be the
/// fingerprint of `target_key`. Root delegations may sign every mapping,
/// other delegations every mapping except further namespace delegations.
/// Whether an identical delegation already exists is left to the store.
pub fn build_namespace_delegation(
    namespace: Fingerprint,
    target_key: SigningPublicKey,
    is_root: bool,
) -> Result<TopologyMapping> {
    let context = ErrorContext::for_key(&UniqueKey::NamespaceDelegation {
        namespace,
        target: target_key.fingerprint(),
    });

    if !target_key.has_usage(SigningKeyUsage::Namespace) {
        return Err(TopologyError::invalid_mapping(format!(
            "delegation target key {} lacks {} usage",
            target_key.fingerprint(),
            SigningKeyUsage::Namespace
        ))
        .with_context(context.clone()));
    }

    let restriction = if is_root {
        if namespace != target_key.fingerprint() {
            return Err(TopologyError::invalid_mapping(format!(
                "root delegation namespace {namespace} is not the fingerprint of its target key"
            ))
            .with_context(context));
        }
        DelegationRestriction::CanSignAllMappings
    } else {
        DelegationRestriction::CanSignAllButNamespaceDelegations
    };

    Ok(NamespaceDelegation {
        namespace,
        target_key,
        is_root_delegation: is_root,
        restriction,
    }
    .into())
}

/// A party-to-key mapping together with the serial it must be written at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyToKeyUpdate {
    /// Updated mapping
    pub mapping: TopologyMapping,
    /// Serial for the transaction carrying the mapping
    pub next_serial: Serial,
}

/// Append `new_key` to a party's signing keys.
///
/// `current_keys` and `current_serial` come from the latest stored mapping;
/// when `current_serial` is `None` nothing is stored and `current_keys` is
/// ignored. Existing keys keep their order.
pub fn build_party_to_key_update(
    party: PartyId,
    new_key: SigningPublicKey,
    current_keys: &[SigningPublicKey],
    current_serial: Option<Serial>,
    threshold: u32,
) -> Result<PartyToKeyUpdate> {
    let next_serial = Serial::after(current_serial)?;
    let context = ErrorContext::for_key(&UniqueKey::PartyToKey {
        party: party.clone(),
    })
    .with_serial(next_serial);
    let reject = |constraint: String| {
        TopologyError::invalid_mapping(constraint).with_context(context.clone())
    };

    let existing: &[SigningPublicKey] = if current_serial.is_some() {
        current_keys
    } else {
        &[]
    };

    if !new_key.has_usage(SigningKeyUsage::Protocol) {
        return Err(reject(format!(
            "signing key {} lacks {} usage",
            new_key.fingerprint(),
            SigningKeyUsage::Protocol
        )));
    }
    let new_fingerprint = new_key.fingerprint();
    if existing.iter().any(|k| k.fingerprint() == new_fingerprint) {
        return Err(reject(format!(
            "signing key {new_fingerprint} is already registered for {party}"
        )));
    }

    let mut signing_keys = Vec::with_capacity(existing.len() + 1);
    signing_keys.extend_from_slice(existing);
    signing_keys.push(new_key);

    check_threshold(threshold, signing_keys.len(), "signing keys").map_err(reject)?;

    Ok(PartyToKeyUpdate {
        mapping: PartyToKeyMapping {
            party,
            threshold,
            signing_keys,
        }
        .into(),
        next_serial,
    })
}

/// Build the hosting mapping for a party.
///
/// `threshold` counts participants holding at least
/// [`Confirmation`](super::ParticipantPermission::Confirmation).
/// Participants are put in canonical order by participant id.
pub fn build_party_to_participant(
    party: PartyId,
    hosting: Vec<HostingParticipant>,
    threshold: u32,
) -> Result<TopologyMapping> {
    let context = ErrorContext::for_key(&UniqueKey::PartyToParticipant {
        party: party.clone(),
    });
    let reject = |constraint: String| {
        TopologyError::invalid_mapping(constraint).with_context(context.clone())
    };

    if hosting.is_empty() {
        return Err(reject(format!("party {party} needs at least one hosting participant")));
    }

    let mut seen = BTreeSet::new();
    for host in &hosting {
        if !seen.insert(&host.participant) {
            return Err(reject(format!(
                "participant {} listed more than once",
                host.participant
            )));
        }
    }

    let mut participants = hosting;
    participants.sort_by(|a, b| a.participant.cmp(&b.participant));

    let mapping = PartyToParticipant {
        party,
        threshold,
        participants,
    };
    check_threshold(threshold, mapping.confirming_count(), "confirming participants")
        .map_err(reject)?;

    Ok(mapping.into())
}

fn check_threshold(
    threshold: u32,
    available: usize,
    what: &str,
) -> std::result::Result<(), String> {
    if threshold == 0 {
        return Err("threshold must be at least 1".to_string());
    }
    if threshold as usize > available {
        return Err(format!("threshold {threshold} exceeds {available} {what}"));
    }
    Ok(())
}
