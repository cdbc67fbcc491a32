//! Mock ledger server binary.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use launch_program::{get_launch_summary, LaunchGenesisConfig};
use mock_ledger::{start_server, LedgerState};

#[derive(Parser)]
#[command(name = "mock-ledger")]
#[command(about = "JSON-RPC mock ledger for sealed-bid launches")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:9944")]
    listen: SocketAddr,

    /// Genesis configuration (JSON); required unless resuming from a snapshot
    #[arg(long)]
    genesis: Option<PathBuf>,

    /// Persist state to this file after every call, resuming from it if present
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn load_genesis(path: &Path) -> Result<LaunchGenesisConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read genesis file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse genesis file {}", path.display()))
}

fn initial_state(args: &Args) -> Result<LedgerState> {
    if let Some(snapshot) = &args.snapshot {
        if snapshot.exists() {
            let program = LedgerState::load_snapshot(snapshot)?;
            match get_launch_summary(&program) {
                Some(summary) => info!(
                    path = %snapshot.display(),
                    bids = summary.num_bids,
                    processed = summary.num_processed,
                    claimed = summary.num_claimed,
                    tokens_distributed = summary.tokens_distributed,
                    total_tokens = summary.total_tokens,
                    finalized = summary.is_finalized,
                    "Resuming from snapshot"
                ),
                None => info!(path = %snapshot.display(), "Resuming from snapshot with no launch"),
            }
            return Ok(LedgerState::new(program).with_snapshot(snapshot.clone()));
        }
    }

    let genesis_path = args
        .genesis
        .as_ref()
        .context("--genesis is required when no snapshot exists")?;
    let genesis = load_genesis(genesis_path)?;
    let program = genesis.build_state()?;
    info!(
        authority = %hex::encode(genesis.authority),
        total_tokens = genesis.total_tokens,
        max_allocation_per_user = genesis.max_allocation_per_user,
        "Launch initialized from genesis"
    );

    let state = LedgerState::new(program);
    let state = match &args.snapshot {
        Some(path) => state.with_snapshot(path.clone()),
        None => state,
    };
    state.persist()?;
    Ok(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mock_ledger=info".parse()?)
                .add_directive("launch_program=info".parse()?)
                .add_directive("jsonrpsee=warn".parse()?),
        )
        .init();

    let args = Args::parse();
    let state = initial_state(&args)?;

    let (handle, addr) = start_server(args.listen, state).await?;
    info!("Mock ledger running on {}. Press Ctrl+C to stop.", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    handle.stop()?;
    handle.stopped().await;

    Ok(())
}
