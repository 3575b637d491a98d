//! Serial resolution against the topology store
//!
//! The store enforces optimistic concurrency: a transaction is accepted only
//! when its serial is exactly one above the highest serial stored under its
//! unique key. The resolver reads that maximum and proposes the next serial.
//! It does not reserve anything; two writers that resolve concurrently will
//! both propose the same serial and the store rejects the slower one.

use crate::crypto::SigningPublicKey;
use crate::effects::{StoredMapping, TopologyReadEffects};
use crate::errors::{ErrorContext, Result, TopologyError};
use crate::mapping::{HostingParticipant, TopologyMapping, UniqueKey};
use crate::transaction::TopologyChangeOp;
use crate::types::{Serial, StoreId};
use tracing::{debug, error};

/// Outcome of resolving a unique key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialResolution {
    /// The resolved key
    pub unique_key: UniqueKey,
    /// Serial the next write under this key must carry
    pub next_serial: Serial,
    /// Highest stored version, whether it added or removed the mapping
    pub current: Option<StoredMapping>,
}

impl SerialResolution {
    /// Serial of the highest stored version
    pub fn current_serial(&self) -> Option<Serial> {
        self.current.as_ref().map(|c| c.serial)
    }

    /// The effective mapping; `None` when nothing is stored or the latest
    /// version is a removal
    pub fn effective_mapping(&self) -> Option<&TopologyMapping> {
        self.current
            .as_ref()
            .filter(|c| c.operation == TopologyChangeOp::AddReplace)
            .map(|c| &c.mapping)
    }

    /// Signing keys of the effective party-to-key mapping
    pub fn current_signing_keys(&self) -> &[SigningPublicKey] {
        self.effective_mapping()
            .and_then(TopologyMapping::as_party_to_key)
            .map(|m| m.signing_keys.as_slice())
            .unwrap_or(&[])
    }

    /// Hosting participants of the effective party-to-participant mapping
    pub fn current_hosting(&self) -> &[HostingParticipant] {
        self.effective_mapping()
            .and_then(TopologyMapping::as_party_to_participant)
            .map(|m| m.participants.as_slice())
            .unwrap_or(&[])
    }
}

/// Resolves next serials for one store
pub struct SerialResolver<'a, R: ?Sized> {
    reader: &'a R,
    store: StoreId,
}

impl<'a, R> SerialResolver<'a, R>
where
    R: TopologyReadEffects + ?Sized,
{
    /// Create a resolver over `reader` for `store`
    pub fn new(reader: &'a R, store: StoreId) -> Self {
        Self { reader, store }
    }

    /// Store this resolver reads from
    pub fn store(&self) -> &StoreId {
        &self.store
    }

    /// Read all versions under `unique_key` and pick the next serial.
    ///
    /// An empty store yields [`Serial::FIRST`] and no payload. Contradictory
    /// records are reported as [`TopologyError::InconsistentState`] and never
    /// retried.
    pub async fn resolve_next_serial(&self, unique_key: &UniqueKey) -> Result<SerialResolution> {
        let records = self
            .reader
            .list_mappings(&self.store, unique_key)
            .await
            .map_err(|e| e.with_context(ErrorContext::for_key(unique_key)))?;

        let resolution = select_latest(unique_key, records)?;
        debug!(
            store = %self.store,
            unique_key = %unique_key,
            current_serial = ?resolution.current_serial().map(Serial::value),
            next_serial = resolution.next_serial.value(),
            "Resolved topology serial"
        );
        Ok(resolution)
    }
}

/// Pick the highest-serial record and derive the next serial
pub fn select_latest(
    unique_key: &UniqueKey,
    records: Vec<StoredMapping>,
) -> Result<SerialResolution> {
    let mut latest: Option<StoredMapping> = None;
    let mut duplicate_max = false;

    for record in records {
        let record_key = record.mapping.unique_key();
        if &record_key != unique_key {
            error!(
                expected = %unique_key,
                found = %record_key,
                serial = record.serial.value(),
                "Topology store returned a record for a different key"
            );
            return Err(TopologyError::inconsistent_state(format!(
                "store returned a record for {record_key}"
            ))
            .with_context(ErrorContext::for_key(unique_key).with_serial(record.serial)));
        }

        match latest.as_ref().map(|l| l.serial) {
            Some(max) if record.serial < max => {}
            Some(max) if record.serial == max => duplicate_max = true,
            _ => {
                duplicate_max = false;
                latest = Some(record);
            }
        }
    }

    if duplicate_max {
        let serial = latest.as_ref().map(|l| l.serial);
        error!(
            unique_key = %unique_key,
            serial = ?serial.map(Serial::value),
            "Topology store holds two versions at the same serial"
        );
        let mut context = ErrorContext::for_key(unique_key);
        if let Some(serial) = serial {
            context = context.with_serial(serial);
        }
        return Err(TopologyError::inconsistent_state(
            "store holds two versions at the highest serial",
        )
        .with_context(context));
    }

    let next_serial = Serial::after(latest.as_ref().map(|l| l.serial))
        .map_err(|e| e.with_context(ErrorContext::for_key(unique_key)))?;

    Ok(SerialResolution {
        unique_key: unique_key.clone(),
        next_serial,
        current: latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SigningKeyUsage;
    use crate::mapping::PartyToKeyMapping;
    use crate::types::PartyId;
    use assert_matches::assert_matches;

    fn key(seed: u8) -> SigningPublicKey {
        SigningPublicKey::ed25519([seed; 32], [SigningKeyUsage::Protocol])
    }

    fn party(seed: u8) -> PartyId {
        PartyId::from_fingerprint(&key(seed).fingerprint(), Some("party")).unwrap()
    }

    fn record(party: &PartyId, serial: u32, op: TopologyChangeOp) -> StoredMapping {
        StoredMapping {
            serial: Serial::new(serial).unwrap(),
            operation: op,
            mapping: PartyToKeyMapping {
                party: party.clone(),
                threshold: 1,
                signing_keys: vec![key(serial as u8)],
            }
            .into(),
        }
    }

    #[test]
    fn test_empty_yields_first_serial() {
        let key = UniqueKey::PartyToKey { party: party(1) };
        let resolution = select_latest(&key, Vec::new()).unwrap();
        assert_eq!(resolution.next_serial, Serial::FIRST);
        assert!(resolution.current.is_none());
        assert!(resolution.current_signing_keys().is_empty());
    }

    #[test]
    fn test_unordered_records() {
        let p = party(1);
        let key = UniqueKey::PartyToKey { party: p.clone() };
        let records = vec![
            record(&p, 3, TopologyChangeOp::AddReplace),
            record(&p, 7, TopologyChangeOp::AddReplace),
            record(&p, 1, TopologyChangeOp::AddReplace),
        ];
        let resolution = select_latest(&key, records).unwrap();
        assert_eq!(resolution.next_serial.value(), 8);
        assert_eq!(resolution.current_signing_keys(), &[self::key(7)]);
    }

    #[test]
    fn test_removal_advances_serial_without_payload() {
        let p = party(1);
        let key = UniqueKey::PartyToKey { party: p.clone() };
        let records = vec![
            record(&p, 1, TopologyChangeOp::AddReplace),
            record(&p, 2, TopologyChangeOp::Remove),
        ];
        let resolution = select_latest(&key, records).unwrap();
        assert_eq!(resolution.next_serial.value(), 3);
        assert_eq!(resolution.current_serial(), Serial::new(2));
        assert!(resolution.effective_mapping().is_none());
    }

    #[test]
    fn test_duplicate_max_serial_is_inconsistent() {
        let p = party(1);
        let key = UniqueKey::PartyToKey { party: p.clone() };
        let records = vec![
            record(&p, 4, TopologyChangeOp::AddReplace),
            record(&p, 4, TopologyChangeOp::AddReplace),
            record(&p, 2, TopologyChangeOp::AddReplace),
        ];
        assert_matches!(
            select_latest(&key, records),
            Err(TopologyError::InconsistentState { .. })
        );
    }

    #[test]
    fn test_duplicate_below_max_is_superseded() {
        let p = party(1);
        let key = UniqueKey::PartyToKey { party: p.clone() };
        let records = vec![
            record(&p, 2, TopologyChangeOp::AddReplace),
            record(&p, 2, TopologyChangeOp::AddReplace),
            record(&p, 5, TopologyChangeOp::AddReplace),
        ];
        assert_eq!(select_latest(&key, records).unwrap().next_serial.value(), 6);
    }

    #[test]
    fn test_foreign_key_is_inconsistent() {
        let key = UniqueKey::PartyToKey { party: party(1) };
        let records = vec![record(&party(2), 1, TopologyChangeOp::AddReplace)];
        assert_matches!(
            select_latest(&key, records),
            Err(TopologyError::InconsistentState { .. })
        );
    }
}
