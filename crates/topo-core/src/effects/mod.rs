//! Effect trait definitions
//!
//! This module defines **what** the onboarding flow needs from the outside
//! world; handlers define **how**. All effect-using code is parameterized by
//! these traits so tests can swap in deterministic in-memory handlers.

pub mod topology;

pub use topology::{
    BatchRejection, RejectionReason, StoredMapping, TopologyReadEffects, TopologySignerEffects,
    TopologyWriteEffects, WriteFailure,
};

/// Supertrait for the full onboarding flow
///
/// Combines store reads, store writes and signing.
pub trait TopologyEffects: TopologyReadEffects + TopologyWriteEffects + TopologySignerEffects {}

/// Automatic implementation for types that satisfy the required bounds
impl<T> TopologyEffects for T where
    T: TopologyReadEffects + TopologyWriteEffects + TopologySignerEffects
{
}
