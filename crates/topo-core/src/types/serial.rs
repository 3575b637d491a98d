//! Per-unique-key sequence numbers

use crate::errors::{Result, TopologyError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

/// Strictly positive version number of a mapping under its unique key.
///
/// The store accepts a transaction only when its serial is exactly one above
/// the highest serial it holds for that key, or [`Serial::FIRST`] when it holds
/// none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Serial(NonZeroU32);

impl Serial {
    /// Serial of the first mapping under a unique key
    pub const FIRST: Serial = Serial(NonZeroU32::MIN);

    /// Create a serial; `None` for zero
    pub const fn new(value: u32) -> Option<Self> {
        match NonZeroU32::new(value) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Numeric value
    pub const fn value(self) -> u32 {
        self.0.get()
    }

    /// The serial a successor mapping must carry
    pub fn next(self) -> Result<Self> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or_else(|| TopologyError::invalid_mapping("serial space exhausted"))
    }

    /// Serial following `current`, or [`Serial::FIRST`] when nothing is stored
    pub fn after(current: Option<Serial>) -> Result<Self> {
        match current {
            Some(serial) => serial.next(),
            None => Ok(Self::FIRST),
        }
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Serial> for u32 {
    fn from(serial: Serial) -> Self {
        serial.value()
    }
}

impl TryFrom<u32> for Serial {
    type Error = TopologyError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value).ok_or_else(|| TopologyError::encoding("serial must be positive"))
    }
}
