//! In-memory onboarding demo
//!
//! Onboards a party against a fenced in-memory store, then adds a second
//! signing key, printing what the store holds afterwards.

use super::common::print_json;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use topo_core::crypto::SigningKeyUsage;
use topo_core::mapping::UniqueKey;
use topo_core::{RetryPolicy, SigningMode, TopologyWorkflow};
use topo_testkit::{fixtures, Ed25519Signer, TopologyTestEffects};
use tracing::info;

/// Arguments for the demo command
#[derive(Args)]
pub struct DemoArgs {
    /// Seed for the party's key
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Party hint
    #[arg(long, default_value = "alice")]
    party_hint: String,

    /// Sign each batch once, over its combined hash
    #[arg(long)]
    combined: bool,
}

#[derive(Debug, Serialize)]
struct DemoOutput {
    party_id: String,
    onboarding_hash: String,
    key_update_hash: String,
    signing_keys: Vec<String>,
    next_key_serial: u32,
}

/// Run onboarding and a key addition end to end
pub async fn run(args: &DemoArgs) -> Result<()> {
    let effects = TopologyTestEffects::from_seed(args.seed);
    let request = fixtures::onboarding_request(&effects.signer, &args.party_hint);
    let workflow = TopologyWorkflow::new(effects, fixtures::test_store())
        .with_retry(RetryPolicy::exponential())
        .with_signing_mode(if args.combined {
            SigningMode::Combined
        } else {
            SigningMode::PerTransaction
        });

    let outcome = workflow.onboard_party(&request).await?;
    info!(party = %outcome.party_id, "Demo party onboarded");

    let second_key =
        Ed25519Signer::from_seed(args.seed.wrapping_add(1)).public_key([SigningKeyUsage::Protocol]);
    let update = workflow
        .add_signing_key(&outcome.party_id, second_key, 1)
        .await?;

    let keys = workflow
        .resolve(&UniqueKey::PartyToKey {
            party: outcome.party_id.clone(),
        })
        .await?;

    print_json(&DemoOutput {
        party_id: outcome.party_id.to_string(),
        onboarding_hash: outcome.receipt.combined_hash.to_hex(),
        key_update_hash: update.combined_hash.to_hex(),
        signing_keys: keys
            .current_signing_keys()
            .iter()
            .map(|k| k.fingerprint().to_hex())
            .collect(),
        next_key_serial: keys.next_serial.value(),
    })
}
