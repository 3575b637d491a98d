//! Helpers shared by subcommands

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;
use topo_core::crypto::{SigningKeyUsage, SigningPublicKey};

/// Parse a raw Ed25519 public key given as hex or standard base64
pub fn parse_public_key(
    value: &str,
    usage: impl IntoIterator<Item = SigningKeyUsage>,
) -> Result<SigningPublicKey> {
    let value = value.trim();
    let bytes = if value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
        hex::decode(value).context("invalid hex public key")?
    } else {
        base64::engine::general_purpose::STANDARD
            .decode(value)
            .map_err(|e| anyhow!("public key is neither 64 hex characters nor base64: {e}"))?
    };

    let Ok(key) = <[u8; 32]>::try_from(bytes.as_slice()) else {
        bail!("Ed25519 public key must be 32 bytes, got {}", bytes.len());
    };
    Ok(SigningPublicKey::ed25519(key, usage))
}

/// Print `value` as pretty JSON on stdout
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{json}");
    Ok(())
}
