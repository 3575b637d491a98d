//! Operator CLI for external party onboarding
//!
//! Computes key fingerprints and prepares the onboarding transactions of a
//! party offline, so the hashes can be signed by external key custody.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[cfg(feature = "development")]
use commands::demo::{self, DemoArgs};
use commands::{
    fingerprint::{self, FingerprintArgs},
    prepare::{self, PrepareArgs},
};

#[derive(Parser)]
#[command(name = "topo")]
#[command(about = "Topo - external party onboarding for topology stores", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the fingerprint and default party id of a public key
    Fingerprint(FingerprintArgs),

    /// Prepare onboarding transactions for a new party
    Prepare(PrepareArgs),

    /// Onboard a party and add a key against an in-memory store
    #[cfg(feature = "development")]
    Demo(DemoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the flag when set.
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fingerprint(args) => fingerprint::run(&args)?,
        Commands::Prepare(args) => prepare::run(&args)?,
        #[cfg(feature = "development")]
        Commands::Demo(args) => demo::run(&args).await?,
    }

    Ok(())
}
