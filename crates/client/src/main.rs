//! CLI for bidding in sealed-bid token launches.
//!
//! This binary provides commands for:
//! - Submitting sealed bids
//! - Querying launch and bid status
//! - Claiming allocations

use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use tracing::info;

use launch_client::{prepare_bid, BidStatus};
use launch_crypto::parse_public_key;
use launch_settler::{ClaimResolver, LaunchLedger, RpcLedger};
use launch_types::rpc::DEFAULT_RPC_ENDPOINT;
use launch_types::{parse_address, Address};

#[derive(Parser)]
#[command(name = "launch-cli")]
#[command(about = "CLI for sealed-bid token launches")]
struct Cli {
    /// Mock ledger RPC endpoint
    #[arg(long, default_value = DEFAULT_RPC_ENDPOINT)]
    rpc: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a sealed bid
    Bid {
        /// Sender address (hex)
        #[arg(long)]
        sender: String,

        /// Cypher node public key (hex)
        #[arg(long)]
        node_pubkey: String,

        /// Bid amount (will be encrypted)
        #[arg(long)]
        amount: f64,

        /// Payment tokens to escrow (visible on the ledger)
        #[arg(long, default_value = "0")]
        escrow: u64,
    },

    /// Claim a settled allocation
    Claim {
        /// Sender address (hex)
        #[arg(long)]
        sender: String,
    },

    /// Show the launch
    Launch,

    /// List bids in arrival order
    Bids,

    /// Show where a bid stands
    Status {
        /// Bidder address (hex)
        #[arg(long)]
        bidder: String,
    },

    /// Show an associated token balance
    Balance {
        /// Owner address (hex)
        #[arg(long)]
        owner: String,

        /// Mint address (hex); defaults to the launch mint
        #[arg(long)]
        mint: Option<String>,
    },
}

fn address_arg(value: &str) -> Result<Address> {
    parse_address(value).map_err(|e| anyhow!("Invalid address {}: {}", value, e))
}

async fn submit_bid_cmd(
    ledger: &RpcLedger,
    sender: &str,
    node_pubkey: &str,
    amount: f64,
    escrow: u64,
) -> Result<()> {
    let bidder = address_arg(sender)?;
    let node_public_key = parse_public_key(node_pubkey)?;

    let prepared = prepare_bid(&node_public_key, amount, escrow, &mut OsRng)?;
    let submission = ledger
        .submit_bid(&bidder, prepared.encrypted_payload, prepared.escrow_amount)
        .await?;

    if submission.created {
        info!(sequence = submission.bid.sequence, "Bid submitted");
        println!("Bid submitted successfully");
        println!("  Sequence: {}", submission.bid.sequence);
        println!("  Amount: {} (encrypted)", amount);
        println!("  Escrow: {}", escrow);
    } else {
        println!("A bid already exists for this sender; nothing was changed");
        println!("  Sequence: {}", submission.bid.sequence);
        println!("  Escrow: {}", submission.bid.escrowed_amount);
    }

    Ok(())
}

async fn claim_cmd(ledger: Arc<RpcLedger>, sender: &str) -> Result<()> {
    let bidder = address_arg(sender)?;
    let resolver = ClaimResolver::new(ledger);
    let receipt = resolver.claim(&bidder).await?;

    println!("Claimed {} tokens", receipt.amount);
    println!("  Destination: {}", hex::encode(receipt.destination));
    if receipt.destination_created {
        println!("  (destination account created)");
    }

    Ok(())
}

async fn launch_cmd(ledger: &RpcLedger) -> Result<()> {
    let launch = ledger.fetch_launch().await?;

    println!("Launch:");
    println!("  State: {:?}", launch.state());
    println!("  Authority: {}", hex::encode(launch.authority));
    println!("  Mint: {}", hex::encode(launch.mint));
    println!("  Payment Mint: {}", hex::encode(launch.payment_mint));
    println!(
        "  Distributed: {} / {}",
        launch.tokens_distributed, launch.total_tokens
    );
    println!("  Max Per User: {}", launch.max_allocation_per_user);

    Ok(())
}

async fn bids_cmd(ledger: &RpcLedger) -> Result<()> {
    let launch = ledger.fetch_launch().await?;
    let bids = ledger.fetch_bids().await?;

    if bids.is_empty() {
        println!("No bids");
    } else {
        println!("Bids:");
        for bid in &bids {
            println!(
                "  [{}] {} - escrow {} - {}",
                bid.sequence,
                hex::encode(bid.bidder),
                bid.escrowed_amount,
                BidStatus::resolve(&launch, Some(bid))
            );
        }
    }

    Ok(())
}

async fn status_cmd(ledger: &RpcLedger, bidder: &str) -> Result<()> {
    let bidder = address_arg(bidder)?;
    let launch = ledger.fetch_launch().await?;
    let bid = ledger.fetch_bid(&bidder).await?;

    println!("{}", BidStatus::resolve(&launch, bid.as_ref()));
    Ok(())
}

async fn balance_cmd(ledger: &RpcLedger, owner: &str, mint: Option<&str>) -> Result<()> {
    let owner = address_arg(owner)?;
    let mint = match mint {
        Some(mint) => address_arg(mint)?,
        None => ledger.fetch_launch().await?.mint,
    };

    let balance = ledger.token_balance(&owner, &mint).await?;
    println!("{}", balance);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("launch_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    // Bidders never sign authority calls
    let ledger = Arc::new(RpcLedger::new(&cli.rpc, [0u8; 32])?);

    match cli.command {
        Commands::Bid {
            sender,
            node_pubkey,
            amount,
            escrow,
        } => {
            submit_bid_cmd(&ledger, &sender, &node_pubkey, amount, escrow).await?;
        }

        Commands::Claim { sender } => {
            claim_cmd(ledger, &sender).await?;
        }

        Commands::Launch => {
            launch_cmd(&ledger).await?;
        }

        Commands::Bids => {
            bids_cmd(&ledger).await?;
        }

        Commands::Status { bidder } => {
            status_cmd(&ledger, &bidder).await?;
        }

        Commands::Balance { owner, mint } => {
            balance_cmd(&ledger, &owner, mint.as_deref()).await?;
        }
    }

    Ok(())
}
