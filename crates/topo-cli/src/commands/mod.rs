//! Subcommand implementations

pub mod common;
#[cfg(feature = "development")]
pub mod demo;
pub mod fingerprint;
pub mod prepare;
