//! Cypher node for sealed-bid token launches.
//!
//! This binary holds the node's X25519 identity and runs settlement:
//! - Generating and exporting the node keypair
//! - Settling all pending bids and finalizing the launch
//! - Watching the ledger and settling bids as they arrive

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use tracing::{info, warn};

use launch_crypto::NodeKeypair;
use launch_settler::{RpcLedger, SettlementReport, SettlementService, SettlerConfig};
use launch_types::parse_address;

#[derive(Parser)]
#[command(name = "cypher-node")]
#[command(about = "Sealed-bid launch cypher node")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ledger RPC endpoint (overrides config)
    #[arg(long)]
    rpc: Option<String>,

    /// Node keypair file (overrides config)
    #[arg(long)]
    keypair: Option<PathBuf>,

    /// Launch authority address, hex (overrides config)
    #[arg(long)]
    authority: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the node keypair
    Keygen {
        /// Replace an existing keypair
        #[arg(long)]
        force: bool,
    },

    /// Print the node public key for bidders
    Pubkey,

    /// Write a configuration file with default settings
    InitConfig {
        /// Where to write the file
        #[arg(long, default_value = "cypher-node.toml")]
        out: PathBuf,
    },

    /// Settle all pending bids and finalize the launch
    Settle,

    /// Settle bids as they arrive; finalize on Ctrl+C
    Watch,
}

fn load_config(cli: &Cli) -> Result<SettlerConfig> {
    let mut config = match &cli.config {
        Some(path) => SettlerConfig::read(path)?,
        None => SettlerConfig::default(),
    };

    if let Some(rpc) = &cli.rpc {
        config.rpc_endpoint = rpc.clone();
    }
    if let Some(keypair) = &cli.keypair {
        config.keypair_path = keypair.clone();
    }
    if let Some(authority) = &cli.authority {
        config.authority = parse_address(authority)
            .with_context(|| format!("Invalid authority {}", authority))?;
    }

    Ok(config)
}

fn load_keypair(config: &SettlerConfig) -> Result<NodeKeypair> {
    NodeKeypair::load(&config.keypair_path).with_context(|| {
        format!(
            "Failed to load keypair from {} (run `cypher-node keygen` first)",
            config.keypair_path.display()
        )
    })
}

fn build_service(config: SettlerConfig) -> Result<SettlementService> {
    config.validate()?;
    let keypair = load_keypair(&config)?;
    let ledger = RpcLedger::with_timeout(
        &config.rpc_endpoint,
        config.authority,
        config.commit_timeout(),
    )?;

    info!(
        rpc = %config.rpc_endpoint,
        public_key = %keypair.public_key_hex(),
        "Cypher node ready"
    );
    Ok(SettlementService::new(config, Arc::new(ledger), keypair)?)
}

fn print_report(report: &SettlementReport) {
    println!("Settlement report:");
    println!("  Committed: {} bids, {} tokens", report.committed.len(), report.total_committed());
    println!("  Forfeited: {}", report.forfeited.len());
    println!("  Skipped: {}", report.skipped.len());
    println!("  Failed: {}", report.failed.len());
    for failed in &report.failed {
        println!("    {}: {}", hex::encode(failed.bidder), failed.error);
    }
    println!("  Tokens distributed: {}", report.tokens_distributed);
    println!("  Finalized: {}", report.finalized);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cypher_node=info".parse()?)
                .add_directive("launch_settler=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Keygen { force } => {
            let path = &config.keypair_path;
            if path.exists() && !force {
                bail!(
                    "Keypair already exists at {} (use --force to replace it)",
                    path.display()
                );
            }

            let keypair = NodeKeypair::generate(&mut OsRng);
            keypair.save(path)?;

            info!("Keypair saved to {}", path.display());
            println!("{}", keypair.public_key_hex());
        }

        Commands::Pubkey => {
            let (keypair, generated) =
                NodeKeypair::load_or_generate(&config.keypair_path, &mut OsRng)?;
            if generated {
                warn!("No keypair found, generated {}", config.keypair_path.display());
            }
            println!("{}", keypair.public_key_hex());
        }

        Commands::InitConfig { out } => {
            if out.exists() {
                bail!("{} already exists", out.display());
            }
            config.save(&out)?;
            println!("Wrote {}", out.display());
        }

        Commands::Settle => {
            let service = build_service(config)?;
            let report = service.run_once().await?;
            print_report(&report);
        }

        Commands::Watch => {
            let service = build_service(config)?;
            info!(
                interval_secs = service.config().poll_interval_secs,
                "Watching for bids. Press Ctrl+C to finalize and stop."
            );

            let report = service
                .watch(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "Failed to listen for Ctrl+C");
                    }
                })
                .await?;
            print_report(&report);
        }
    }

    Ok(())
}
