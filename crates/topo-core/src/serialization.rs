//! Canonical DAG-CBOR encoding of mappings and transactions
//!
//! DAG-CBOR is the deterministic subset of CBOR: map keys sorted length-first
//! then bytewise, minimal integer widths, definite lengths only. Together with
//! the representation choices below, every semantic value has exactly one
//! byte sequence:
//!
//! - enum tags are fixed snake_case strings
//! - key bytes are CBOR byte strings
//! - usage sets are encoded in sorted order
//! - hosting participants are ordered by participant id
//! - signing keys keep their insertion order, which is part of the value
//!
//! Transaction hashes are computed over these bytes, so any change here is a
//! wire-format change.

use crate::errors::{ErrorContext, Result, TopologyError};
use crate::mapping::TopologyMapping;
use crate::transaction::{TopologyChangeOp, TopologyTransaction};
use crate::types::Serial;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Version tag written into every serialized transaction
pub const SCHEMA_VERSION: u32 = 30;

/// Serialize any serde-compatible value to DAG-CBOR bytes
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_ipld_dagcbor::to_vec(value)
        .map_err(|e| TopologyError::encoding(format!("Failed to serialize to DAG-CBOR: {e}")))
}

/// Deserialize DAG-CBOR bytes
pub fn from_slice<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_ipld_dagcbor::from_slice(bytes)
        .map_err(|e| TopologyError::encoding(format!("Failed to decode DAG-CBOR: {e}")))
}

/// Canonical bytes of a mapping.
///
/// Fails when a required field is missing or a threshold cannot be met.
pub fn encode(mapping: &TopologyMapping) -> Result<Vec<u8>> {
    let canonical = canonicalize(mapping)?;
    to_vec(canonical.as_ref()).map_err(|e| e.with_context(ErrorContext::for_kind(mapping.kind())))
}

/// Canonical bytes of a transaction: `{version, operation, serial, mapping}`
pub fn encode_transaction(transaction: &TopologyTransaction) -> Result<Vec<u8>> {
    let mapping = canonicalize(transaction.mapping())
        .map_err(|e| e.with_context(ErrorContext::new().with_serial(transaction.serial())))?;
    let envelope = EnvelopeRef {
        version: SCHEMA_VERSION,
        operation: transaction.operation(),
        serial: transaction.serial(),
        mapping: mapping.as_ref(),
    };
    to_vec(&envelope)
}

/// Decode a transaction, rejecting anything not in canonical form
pub fn decode_transaction(bytes: &[u8]) -> Result<TopologyTransaction> {
    let envelope: Envelope = from_slice(bytes)?;
    if envelope.version != SCHEMA_VERSION {
        return Err(TopologyError::encoding(format!(
            "unsupported transaction version {}, expected {SCHEMA_VERSION}",
            envelope.version
        )));
    }
    let transaction =
        TopologyTransaction::new(envelope.operation, envelope.serial, envelope.mapping);
    if encode_transaction(&transaction)? != bytes {
        return Err(TopologyError::encoding("transaction bytes are not canonical")
            .with_context(
                ErrorContext::for_key(&transaction.mapping().unique_key())
                    .with_serial(transaction.serial()),
            ));
    }
    Ok(transaction)
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    operation: TopologyChangeOp,
    serial: Serial,
    mapping: &'a TopologyMapping,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    operation: TopologyChangeOp,
    serial: Serial,
    mapping: TopologyMapping,
}

/// Check required fields and put the mapping in canonical order
fn canonicalize(mapping: &TopologyMapping) -> Result<Cow<'_, TopologyMapping>> {
    let missing = |message: String| {
        TopologyError::encoding(message).with_context(ErrorContext::for_key(&mapping.unique_key()))
    };

    match mapping {
        TopologyMapping::NamespaceDelegation(d) => {
            if d.target_key.key_bytes().is_empty() {
                return Err(missing("delegation target key has no bytes".into()));
            }
            Ok(Cow::Borrowed(mapping))
        }
        TopologyMapping::PartyToKey(m) => {
            if m.signing_keys.is_empty() {
                return Err(missing("party-to-key mapping has no signing keys".into()));
            }
            check_threshold(m.threshold, m.signing_keys.len()).map_err(missing)?;
            Ok(Cow::Borrowed(mapping))
        }
        TopologyMapping::PartyToParticipant(m) => {
            if m.participants.is_empty() {
                return Err(missing("party-to-participant mapping has no participants".into()));
            }
            check_threshold(m.threshold, m.confirming_count()).map_err(missing)?;
            let sorted = m
                .participants
                .windows(2)
                .all(|w| w[0].participant < w[1].participant);
            if sorted {
                return Ok(Cow::Borrowed(mapping));
            }
            let mut owned = m.clone();
            owned.participants.sort_by(|a, b| a.participant.cmp(&b.participant));
            Ok(Cow::Owned(TopologyMapping::PartyToParticipant(owned)))
        }
    }
}

fn check_threshold(threshold: u32, available: usize) -> std::result::Result<(), String> {
    if threshold == 0 {
        Err("threshold is zero".to_string())
    } else if threshold as usize > available {
        Err(format!("threshold {threshold} exceeds {available} eligible entries"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{SigningKeyUsage, SigningPublicKey};
    use crate::mapping::{
        HostingParticipant, ParticipantPermission, PartyToKeyMapping, PartyToParticipant,
    };
    use crate::types::{ParticipantId, PartyId, UniqueIdentifier};
    use assert_matches::assert_matches;

    fn party() -> PartyId {
        let key = SigningPublicKey::ed25519([1u8; 32], [SigningKeyUsage::Namespace]);
        PartyId::from_fingerprint(&key.fingerprint(), Some("alice")).unwrap()
    }

    fn host(name: &str) -> HostingParticipant {
        let ns = crate::crypto::Fingerprint::from_public_key_bytes(name.as_bytes());
        HostingParticipant {
            participant: ParticipantId::new(UniqueIdentifier::new(name, ns).unwrap()),
            permission: ParticipantPermission::Confirmation,
        }
    }

    fn party_to_key(keys: Vec<SigningPublicKey>, threshold: u32) -> TopologyMapping {
        PartyToKeyMapping {
            party: party(),
            threshold,
            signing_keys: keys,
        }
        .into()
    }

    /// `{party_to_key: {party, threshold: 1, signing_keys: [key]}}` for the
    /// key `[1; 32]` with namespace and protocol usage and hint `alice`
    const ALICE_PARTY_TO_KEY: &str = concat!(
        "a16c70617274795f746f5f6b6579a3657061727479784b616c6963653a3a3132",
        "3230393734636238306537386632666561303737363238613032666161346335",
        "3764363861363530333665656132376662333436333038386131633835323761",
        "3939697468726573686f6c64016c7369676e696e675f6b65797381a565757361",
        "676582696e616d6573706163656870726f746f636f6c66666f726d6174637261",
        "7766736368656d656765643235353139686b65795f737065636d65635f637572",
        "766532353531396a7075626c69635f6b65795820010101010101010101010101",
        "0101010101010101010101010101010101010101",
    );

    fn alice_party_to_key() -> TopologyMapping {
        let key = SigningPublicKey::ed25519(
            [1u8; 32],
            [SigningKeyUsage::Namespace, SigningKeyUsage::Protocol],
        );
        let party = PartyId::from_fingerprint(&key.fingerprint(), Some("alice")).unwrap();
        PartyToKeyMapping {
            party,
            threshold: 1,
            signing_keys: vec![key],
        }
        .into()
    }

    #[test]
    fn test_known_mapping_bytes() {
        let bytes = encode(&alice_party_to_key()).unwrap();
        assert_eq!(hex::encode(&bytes), ALICE_PARTY_TO_KEY);
    }

    #[test]
    fn test_known_transaction_bytes_and_hash() {
        let tx = TopologyTransaction::add_replace(Serial::FIRST, alice_party_to_key());
        let bytes = encode_transaction(&tx).unwrap();
        let encoded = hex::encode(&bytes);

        // {serial: 1, mapping: .., version: 30, operation: "add_replace"}
        assert!(encoded.starts_with("a46673657269616c01676d617070696e67"));
        assert!(encoded.contains(ALICE_PARTY_TO_KEY));
        assert!(encoded.ends_with("6776657273696f6e181e696f7065726174696f6e6b6164645f7265706c616365"));
        assert_eq!(
            tx.prepare().unwrap().hash().to_hex(),
            "12207b652d3ee8a0ccd9b5f5f89402c9c4c947cdea68b0499e92a1d3243fb0e03d74"
        );
    }

    #[test]
    fn test_participant_order_does_not_change_bytes() {
        let forward = PartyToParticipant {
            party: party(),
            threshold: 1,
            participants: vec![host("a"), host("b")],
        };
        let mut reversed = forward.clone();
        reversed.participants.reverse();

        assert_eq!(
            encode(&forward.into()).unwrap(),
            encode(&reversed.into()).unwrap()
        );
    }

    #[test]
    fn test_signing_key_order_is_significant() {
        let k1 = SigningPublicKey::ed25519([2u8; 32], [SigningKeyUsage::Protocol]);
        let k2 = SigningPublicKey::ed25519([3u8; 32], [SigningKeyUsage::Protocol]);

        assert_ne!(
            encode(&party_to_key(vec![k1.clone(), k2.clone()], 1)).unwrap(),
            encode(&party_to_key(vec![k2, k1], 1)).unwrap()
        );
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert_matches!(
            encode(&party_to_key(Vec::new(), 1)),
            Err(TopologyError::Encoding { .. })
        );
        let k1 = SigningPublicKey::ed25519([2u8; 32], [SigningKeyUsage::Protocol]);
        assert_matches!(
            encode(&party_to_key(vec![k1.clone()], 0)),
            Err(TopologyError::Encoding { .. })
        );
        assert_matches!(
            encode(&party_to_key(vec![k1], 2)),
            Err(TopologyError::Encoding { .. })
        );

        let no_hosts = PartyToParticipant {
            party: party(),
            threshold: 1,
            participants: Vec::new(),
        };
        assert_matches!(encode(&no_hosts.into()), Err(TopologyError::Encoding { .. }));
    }

    #[test]
    fn test_transaction_decode_rejects_foreign_version() {
        let k1 = SigningPublicKey::ed25519([2u8; 32], [SigningKeyUsage::Protocol]);
        let envelope = EnvelopeRef {
            version: 29,
            operation: TopologyChangeOp::AddReplace,
            serial: Serial::FIRST,
            mapping: &party_to_key(vec![k1], 1),
        };
        let bytes = to_vec(&envelope).unwrap();
        assert_matches!(decode_transaction(&bytes), Err(TopologyError::Encoding { .. }));
    }

    #[test]
    fn test_transaction_decode_rejects_non_canonical_order() {
        let unsorted = PartyToParticipant {
            party: party(),
            threshold: 1,
            participants: vec![host("b"), host("a")],
        };
        let mapping: TopologyMapping = unsorted.into();
        let envelope = EnvelopeRef {
            version: SCHEMA_VERSION,
            operation: TopologyChangeOp::AddReplace,
            serial: Serial::FIRST,
            mapping: &mapping,
        };
        let raw = to_vec(&envelope).unwrap();
        let participants_sorted = {
            let tx = TopologyTransaction::new(TopologyChangeOp::AddReplace, Serial::FIRST, mapping);
            encode_transaction(&tx).unwrap()
        };

        assert_ne!(raw, participants_sorted);
        assert_matches!(decode_transaction(&raw), Err(TopologyError::Encoding { .. }));
        assert!(decode_transaction(&participants_sorted).is_ok());
    }
}
