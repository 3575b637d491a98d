//! Topo Testkit - test handlers for topology workflows
//!
//! - [`InMemoryTopologyStore`]: fenced, atomic, signature-verifying store
//!   with one-shot fault injection
//! - [`Ed25519Signer`]: deterministic keys from a seed
//! - [`StaticTopologyReader`]: fixed answers for resolver tests
//! - [`TopologyTestEffects`]: store and signer behind one handler
//!
//! ```rust,ignore
//! use topo_testkit::{fixtures, TopologyTestEffects};
//! use topo_core::TopologyWorkflow;
//!
//! let effects = TopologyTestEffects::from_seed(1);
//! let request = fixtures::onboarding_request(&effects.signer, "alice");
//! let workflow = TopologyWorkflow::new(effects, fixtures::test_store());
//! let outcome = workflow.onboard_party(&request).await?;
//! ```

#![forbid(unsafe_code)]

pub mod effects;
pub mod fixtures;
pub mod reader;
pub mod signer;
pub mod store;

pub use effects::TopologyTestEffects;
pub use reader::StaticTopologyReader;
pub use signer::{public_key_of, Ed25519Signer};
pub use store::{InMemoryTopologyStore, WriteFault};
