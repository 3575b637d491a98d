//! Identifiers for parties, participants and topology stores
//!
//! Parties and participants are both named by a [`UniqueIdentifier`]:
//! a free-form identifier scoped to the namespace of the key that controls it,
//! rendered as `identifier::namespace`.

use crate::crypto::Fingerprint;
use crate::errors::{Result, TopologyError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between identifier and namespace
pub const DELIMITER: &str = "::";

/// Longest identifier part accepted by the store
pub const MAX_IDENTIFIER_LEN: usize = 185;

/// Characters of the fingerprint used as the default party hint
pub const DEFAULT_HINT_LEN: usize = 5;

/// Identifier scoped to a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UniqueIdentifier {
    identifier: String,
    namespace: Fingerprint,
}

impl UniqueIdentifier {
    /// Create an identifier, checking the identifier part
    pub fn new(identifier: impl Into<String>, namespace: Fingerprint) -> Result<Self> {
        let identifier = identifier.into();
        if identifier.is_empty() {
            return Err(TopologyError::encoding("identifier must not be empty"));
        }
        if identifier.len() > MAX_IDENTIFIER_LEN {
            return Err(TopologyError::encoding(format!(
                "identifier exceeds {MAX_IDENTIFIER_LEN} characters"
            )));
        }
        if identifier.contains(DELIMITER) {
            return Err(TopologyError::encoding(format!(
                "identifier must not contain '{DELIMITER}'"
            )));
        }
        Ok(Self {
            identifier,
            namespace,
        })
    }

    /// Identifier part
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Namespace part
    pub fn namespace(&self) -> Fingerprint {
        self.namespace
    }
}

impl fmt::Display for UniqueIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{DELIMITER}{}", self.identifier, self.namespace)
    }
}

impl FromStr for UniqueIdentifier {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self> {
        let (identifier, namespace) = s.rsplit_once(DELIMITER).ok_or_else(|| {
            TopologyError::encoding(format!("missing '{DELIMITER}' in identifier: {s}"))
        })?;
        Self::new(identifier, namespace.parse()?)
    }
}

impl TryFrom<String> for UniqueIdentifier {
    type Error = TopologyError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<UniqueIdentifier> for String {
    fn from(value: UniqueIdentifier) -> Self {
        value.to_string()
    }
}

/// A ledger party
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(UniqueIdentifier);

impl PartyId {
    /// Wrap a unique identifier
    pub fn new(uid: UniqueIdentifier) -> Self {
        Self(uid)
    }

    /// Party controlled by the namespace `fingerprint`.
    ///
    /// Without a hint the identifier is the first characters of the fingerprint.
    pub fn from_fingerprint(fingerprint: &Fingerprint, hint: Option<&str>) -> Result<Self> {
        let identifier = match hint {
            Some(hint) => hint.to_string(),
            None => fingerprint.to_hex()[..DEFAULT_HINT_LEN].to_string(),
        };
        UniqueIdentifier::new(identifier, *fingerprint).map(Self)
    }

    /// Identifier part
    pub fn hint(&self) -> &str {
        self.0.identifier()
    }

    /// Namespace the party belongs to
    pub fn namespace(&self) -> Fingerprint {
        self.0.namespace()
    }

    /// Underlying unique identifier
    pub fn uid(&self) -> &UniqueIdentifier {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PartyId {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse().map(Self)
    }
}

/// A participant node that can host parties
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(UniqueIdentifier);

impl ParticipantId {
    /// Wrap a unique identifier
    pub fn new(uid: UniqueIdentifier) -> Self {
        Self(uid)
    }

    /// Underlying unique identifier
    pub fn uid(&self) -> &UniqueIdentifier {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ParticipantId {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse().map(Self)
    }
}

/// Topology store a transaction targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreId {
    /// The store of a synchronizer
    Synchronizer(String),
    /// The participant's authorized store
    Authorized,
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreId::Synchronizer(id) => write!(f, "synchronizer:{id}"),
            StoreId::Authorized => f.write_str("authorized"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace() -> Fingerprint {
        Fingerprint::from_public_key_bytes(&[4u8; 32])
    }

    #[test]
    fn test_party_id_roundtrip() {
        let party = PartyId::from_fingerprint(&namespace(), Some("alice")).unwrap();
        let rendered = party.to_string();
        assert!(rendered.starts_with("alice::1220"));
        assert_eq!(rendered.parse::<PartyId>().unwrap(), party);
    }

    #[test]
    fn test_default_hint_is_fingerprint_prefix() {
        let ns = namespace();
        let party = PartyId::from_fingerprint(&ns, None).unwrap();
        assert_eq!(party.hint(), &ns.to_hex()[..DEFAULT_HINT_LEN]);
        assert_eq!(party.namespace(), ns);
    }

    #[test]
    fn test_identifier_constraints() {
        assert!(UniqueIdentifier::new("", namespace()).is_err());
        assert!(UniqueIdentifier::new("a::b", namespace()).is_err());
        assert!(UniqueIdentifier::new("x".repeat(MAX_IDENTIFIER_LEN + 1), namespace()).is_err());
        assert!(UniqueIdentifier::new("x".repeat(MAX_IDENTIFIER_LEN), namespace()).is_ok());
    }

    #[test]
    fn test_parse_requires_valid_namespace() {
        assert!("alice".parse::<PartyId>().is_err());
        assert!("alice::1220zz".parse::<PartyId>().is_err());
    }
}
