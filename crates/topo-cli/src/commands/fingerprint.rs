//! Key fingerprint inspection

use super::common::{parse_public_key, print_json};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use topo_core::{PartyId, ONBOARDING_USAGE};

/// Arguments for the fingerprint command
#[derive(Args)]
pub struct FingerprintArgs {
    /// Raw Ed25519 public key, hex or base64
    #[arg(long)]
    public_key: String,

    /// Party hint; defaults to a fingerprint prefix
    #[arg(long)]
    party_hint: Option<String>,
}

#[derive(Debug, Serialize)]
struct FingerprintOutput {
    fingerprint: String,
    party_id: String,
}

/// Print the key's fingerprint and the party id it would root
pub fn run(args: &FingerprintArgs) -> Result<()> {
    let key = parse_public_key(&args.public_key, ONBOARDING_USAGE)?;
    let fingerprint = key.fingerprint();
    let party = PartyId::from_fingerprint(&fingerprint, args.party_hint.as_deref())?;
    print_json(&FingerprintOutput {
        fingerprint: fingerprint.to_hex(),
        party_id: party.to_string(),
    })
}
