//! Topology mappings and their unique keys
//!
//! A [`TopologyMapping`] is one of a closed set of facts about identities.
//! Each variant has a [`UniqueKey`]; the store keeps at most one effective
//! mapping per key, versioned by [`Serial`](crate::types::Serial).

pub mod builder;

pub use builder::{
    build_namespace_delegation, build_party_to_key_update, build_party_to_participant,
    PartyToKeyUpdate,
};

use crate::crypto::{Fingerprint, SigningPublicKey};
use crate::types::{ParticipantId, PartyId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a topology mapping, with its stable numeric code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    /// Namespace delegation
    NamespaceDelegation,
    /// Party to participant hosting
    PartyToParticipant,
    /// Party signing keys
    PartyToKey,
}

impl MappingKind {
    /// Stable numeric code
    pub const fn code(self) -> u32 {
        match self {
            MappingKind::NamespaceDelegation => 1,
            MappingKind::PartyToParticipant => 9,
            MappingKind::PartyToKey => 18,
        }
    }

    /// Kind for a numeric code
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(MappingKind::NamespaceDelegation),
            9 => Some(MappingKind::PartyToParticipant),
            18 => Some(MappingKind::PartyToKey),
            _ => None,
        }
    }

    /// Snake-case name
    pub const fn as_str(self) -> &'static str {
        match self {
            MappingKind::NamespaceDelegation => "namespace_delegation",
            MappingKind::PartyToParticipant => "party_to_participant",
            MappingKind::PartyToKey => "party_to_key",
        }
    }
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a namespace delegation allows its target key to sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationRestriction {
    /// Every mapping, including further namespace delegations
    CanSignAllMappings,
    /// Every mapping except namespace delegations
    CanSignAllButNamespaceDelegations,
}

/// Grants a key authority over a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceDelegation {
    /// Namespace being delegated
    pub namespace: Fingerprint,
    /// Key receiving authority
    pub target_key: SigningPublicKey,
    /// Self-signed root of the namespace
    pub is_root_delegation: bool,
    /// Scope of the granted authority
    pub restriction: DelegationRestriction,
}

impl NamespaceDelegation {
    /// Whether the delegated key may sign mappings of `kind`
    pub fn permits(&self, kind: MappingKind) -> bool {
        match self.restriction {
            DelegationRestriction::CanSignAllMappings => true,
            DelegationRestriction::CanSignAllButNamespaceDelegations => {
                kind != MappingKind::NamespaceDelegation
            }
        }
    }
}

/// Signing keys that authorize transactions on behalf of a party
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyToKeyMapping {
    /// The party
    pub party: PartyId,
    /// Signatures required to authorize a party transaction
    pub threshold: u32,
    /// Keys in insertion order
    pub signing_keys: Vec<SigningPublicKey>,
}

/// Rights a participant holds for a hosted party
///
/// Declared weakest first so the derived order matches
/// `Submission > Confirmation > Observation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantPermission {
    /// Sees the party's transactions
    Observation,
    /// Also confirms them
    Confirmation,
    /// Also submits them
    Submission,
}

impl ParticipantPermission {
    /// Stable numeric code
    pub const fn code(self) -> u32 {
        match self {
            ParticipantPermission::Submission => 1,
            ParticipantPermission::Confirmation => 2,
            ParticipantPermission::Observation => 3,
        }
    }

    /// Whether this permission counts towards the confirming threshold
    pub fn can_confirm(self) -> bool {
        self >= ParticipantPermission::Confirmation
    }
}

impl fmt::Display for ParticipantPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParticipantPermission::Submission => "submission",
            ParticipantPermission::Confirmation => "confirmation",
            ParticipantPermission::Observation => "observation",
        };
        f.write_str(name)
    }
}

/// One participant hosting a party
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostingParticipant {
    /// Hosting participant
    pub participant: ParticipantId,
    /// Rights held for the party
    pub permission: ParticipantPermission,
}

/// Participants hosting a party and the confirmations required
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyToParticipant {
    /// The party
    pub party: PartyId,
    /// Confirming participants required
    pub threshold: u32,
    /// Hosting participants, canonically ordered by participant id
    pub participants: Vec<HostingParticipant>,
}

impl PartyToParticipant {
    /// Number of participants that can confirm
    pub fn confirming_count(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.permission.can_confirm())
            .count()
    }
}

/// A topology mapping
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyMapping {
    /// Namespace delegation
    NamespaceDelegation(NamespaceDelegation),
    /// Party signing keys
    PartyToKey(PartyToKeyMapping),
    /// Party hosting
    PartyToParticipant(PartyToParticipant),
}

impl TopologyMapping {
    /// Kind of this mapping
    pub fn kind(&self) -> MappingKind {
        match self {
            TopologyMapping::NamespaceDelegation(_) => MappingKind::NamespaceDelegation,
            TopologyMapping::PartyToKey(_) => MappingKind::PartyToKey,
            TopologyMapping::PartyToParticipant(_) => MappingKind::PartyToParticipant,
        }
    }

    /// Unique key under which the store versions this mapping
    pub fn unique_key(&self) -> UniqueKey {
        match self {
            TopologyMapping::NamespaceDelegation(d) => UniqueKey::NamespaceDelegation {
                namespace: d.namespace,
                target: d.target_key.fingerprint(),
            },
            TopologyMapping::PartyToKey(m) => UniqueKey::PartyToKey {
                party: m.party.clone(),
            },
            TopologyMapping::PartyToParticipant(m) => UniqueKey::PartyToParticipant {
                party: m.party.clone(),
            },
        }
    }

    /// Namespace whose authority this mapping needs
    pub fn namespace(&self) -> Fingerprint {
        match self {
            TopologyMapping::NamespaceDelegation(d) => d.namespace,
            TopologyMapping::PartyToKey(m) => m.party.namespace(),
            TopologyMapping::PartyToParticipant(m) => m.party.namespace(),
        }
    }

    /// The namespace delegation, if this is one
    pub fn as_namespace_delegation(&self) -> Option<&NamespaceDelegation> {
        match self {
            TopologyMapping::NamespaceDelegation(d) => Some(d),
            _ => None,
        }
    }

    /// The party-to-key mapping, if this is one
    pub fn as_party_to_key(&self) -> Option<&PartyToKeyMapping> {
        match self {
            TopologyMapping::PartyToKey(m) => Some(m),
            _ => None,
        }
    }

    /// The party-to-participant mapping, if this is one
    pub fn as_party_to_participant(&self) -> Option<&PartyToParticipant> {
        match self {
            TopologyMapping::PartyToParticipant(m) => Some(m),
            _ => None,
        }
    }
}

impl From<NamespaceDelegation> for TopologyMapping {
    fn from(value: NamespaceDelegation) -> Self {
        TopologyMapping::NamespaceDelegation(value)
    }
}

impl From<PartyToKeyMapping> for TopologyMapping {
    fn from(value: PartyToKeyMapping) -> Self {
        TopologyMapping::PartyToKey(value)
    }
}

impl From<PartyToParticipant> for TopologyMapping {
    fn from(value: PartyToParticipant) -> Self {
        TopologyMapping::PartyToParticipant(value)
    }
}

/// Key under which the store keeps at most one effective mapping
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueKey {
    /// A delegation of `namespace` to the key with fingerprint `target`
    NamespaceDelegation {
        /// Delegated namespace
        namespace: Fingerprint,
        /// Fingerprint of the target key
        target: Fingerprint,
    },
    /// The signing keys of a party
    PartyToKey {
        /// The party
        party: PartyId,
    },
    /// The hosting of a party
    PartyToParticipant {
        /// The party
        party: PartyId,
    },
}

impl UniqueKey {
    /// Kind of mapping stored under this key
    pub fn kind(&self) -> MappingKind {
        match self {
            UniqueKey::NamespaceDelegation { .. } => MappingKind::NamespaceDelegation,
            UniqueKey::PartyToKey { .. } => MappingKind::PartyToKey,
            UniqueKey::PartyToParticipant { .. } => MappingKind::PartyToParticipant,
        }
    }

    /// Namespace the key lives in
    pub fn namespace(&self) -> Fingerprint {
        match self {
            UniqueKey::NamespaceDelegation { namespace, .. } => *namespace,
            UniqueKey::PartyToKey { party } | UniqueKey::PartyToParticipant { party } => {
                party.namespace()
            }
        }
    }
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueKey::NamespaceDelegation { namespace, target } => {
                write!(f, "{}/{namespace}/{target}", self.kind())
            }
            UniqueKey::PartyToKey { party } | UniqueKey::PartyToParticipant { party } => {
                write!(f, "{}/{party}", self.kind())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SigningKeyUsage;

    fn party(seed: u8) -> PartyId {
        let fp = Fingerprint::from_public_key_bytes(&[seed; 32]);
        PartyId::from_fingerprint(&fp, Some("p")).unwrap()
    }

    #[test]
    fn test_kind_codes() {
        for kind in [
            MappingKind::NamespaceDelegation,
            MappingKind::PartyToParticipant,
            MappingKind::PartyToKey,
        ] {
            assert_eq!(MappingKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(MappingKind::PartyToKey.code(), 18);
        assert_eq!(MappingKind::from_code(2), None);
    }

    #[test]
    fn test_permission_rank() {
        assert!(ParticipantPermission::Submission > ParticipantPermission::Confirmation);
        assert!(ParticipantPermission::Confirmation > ParticipantPermission::Observation);
        assert!(ParticipantPermission::Submission.can_confirm());
        assert!(!ParticipantPermission::Observation.can_confirm());
    }

    #[test]
    fn test_party_keys_differ_by_kind() {
        let p = party(1);
        let to_key = UniqueKey::PartyToKey { party: p.clone() };
        let to_participant = UniqueKey::PartyToParticipant { party: p };
        assert_ne!(to_key, to_participant);
        assert_eq!(to_key.namespace(), to_participant.namespace());
    }

    #[test]
    fn test_delegation_unique_key_uses_target_fingerprint() {
        let key = SigningPublicKey::ed25519([2u8; 32], [SigningKeyUsage::Namespace]);
        let delegation = NamespaceDelegation {
            namespace: key.fingerprint(),
            target_key: key.clone(),
            is_root_delegation: true,
            restriction: DelegationRestriction::CanSignAllMappings,
        };
        let mapping = TopologyMapping::from(delegation);
        assert_eq!(
            mapping.unique_key(),
            UniqueKey::NamespaceDelegation {
                namespace: key.fingerprint(),
                target: key.fingerprint(),
            }
        );
        assert!(mapping
            .as_namespace_delegation()
            .unwrap()
            .permits(MappingKind::NamespaceDelegation));
    }
}
