//! Offline preparation of onboarding transactions
//!
//! Writes nothing to any store. The output lists every transaction hash in
//! submission order plus the combined hash, ready for external signing.

use super::common::{parse_public_key, print_json};
use anyhow::{Context, Result};
use base64::Engine;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use topo_core::{prepare_new_party, OnboardingConfig, PreparedParty, StoreId, ONBOARDING_USAGE};
use tracing::info;

/// Arguments for the prepare command
#[derive(Args)]
pub struct PrepareArgs {
    /// Onboarding configuration (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Raw Ed25519 public key of the party, hex or base64
    #[arg(long)]
    public_key: String,
}

#[derive(Debug, Serialize)]
struct PreparedTransactionOutput {
    kind: String,
    serial: u32,
    hash: String,
    /// Canonical transaction bytes, base64
    serialized: String,
}

#[derive(Debug, Serialize)]
struct PrepareOutput {
    store: StoreId,
    party_id: String,
    namespace: String,
    combined_hash: String,
    transactions: Vec<PreparedTransactionOutput>,
}

impl PrepareOutput {
    fn new(store: StoreId, prepared: &PreparedParty) -> Self {
        let transactions = prepared
            .transactions
            .iter()
            .map(|tx| PreparedTransactionOutput {
                kind: tx.transaction().mapping().kind().to_string(),
                serial: tx.transaction().serial().value(),
                hash: tx.hash().to_hex(),
                serialized: base64::engine::general_purpose::STANDARD.encode(tx.serialized()),
            })
            .collect();
        Self {
            store,
            party_id: prepared.party_id.to_string(),
            namespace: prepared.namespace.to_string(),
            combined_hash: prepared.combined_hash.to_hex(),
            transactions,
        }
    }
}

/// Prepare the transactions for a party that does not exist yet
pub fn run(args: &PrepareArgs) -> Result<()> {
    let config = OnboardingConfig::load_from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let key = parse_public_key(&args.public_key, ONBOARDING_USAGE)?;

    let prepared = prepare_new_party(&config.to_request(key))?;
    info!(
        party = %prepared.party_id,
        transactions = prepared.transactions.len(),
        combined_hash = %prepared.combined_hash,
        "Prepared onboarding transactions"
    );
    print_json(&PrepareOutput::new(config.store, &prepared))
}
