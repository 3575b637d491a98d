//! Identifier and sequencing types

pub mod identifiers;
pub mod serial;

pub use identifiers::{ParticipantId, PartyId, StoreId, UniqueIdentifier};
pub use serial::Serial;
