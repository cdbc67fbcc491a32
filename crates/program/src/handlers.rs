//! Call handlers for the launch program.
//!
//! Each handler runs against `&mut LaunchProgramState` and either applies all
//! of its effects or returns an error having applied none, so every handler
//! is one atomic ledger transaction.

use crate::call::{CallOutcome, LaunchCall};
use crate::error::ProgramError;
use crate::state::LaunchProgramState;
use launch_types::{
    launch_address, payment_vault_address, pool_account_address, short_address, Address, Bid,
    BidSubmission, ClaimReceipt, FinalizeOutcome, Launch, RecordOutcome,
};
use tracing::{debug, info};

/// Largest accepted sealed payload, in bytes.
pub const MAX_PAYLOAD_LEN: usize = 200;

/// Context provided by the runtime for each call.
pub struct CallContext {
    /// Signer of the transaction
    pub sender: Address,
}

/// Result type for handlers.
pub type HandlerResult<T> = Result<T, ProgramError>;

/// Route a call to its handler.
pub fn dispatch(
    state: &mut LaunchProgramState,
    ctx: &CallContext,
    call: LaunchCall,
) -> HandlerResult<CallOutcome> {
    debug!(call = call.name(), sender = %short_address(&ctx.sender), "Dispatching call");

    match call {
        LaunchCall::InitializeLaunch {
            mint,
            payment_mint,
            total_tokens,
            max_allocation_per_user,
        } => handle_initialize_launch(
            state,
            ctx,
            mint,
            payment_mint,
            total_tokens,
            max_allocation_per_user,
        )
        .map(CallOutcome::Initialized),

        LaunchCall::SubmitBid {
            encrypted_payload,
            escrow_amount,
        } => handle_submit_bid(state, ctx, encrypted_payload, escrow_amount)
            .map(CallOutcome::BidSubmitted),

        LaunchCall::RecordAllocation {
            bidder,
            amount,
            expected_tokens_distributed,
        } => handle_record_allocation(state, ctx, bidder, amount, expected_tokens_distributed)
            .map(CallOutcome::AllocationRecorded),

        LaunchCall::FinalizeLaunch => {
            handle_finalize_launch(state, ctx).map(CallOutcome::Finalized)
        }

        LaunchCall::ClaimTokens => handle_claim_tokens(state, ctx).map(CallOutcome::Claimed),
    }
}

/// Handle InitializeLaunch call.
pub fn handle_initialize_launch(
    state: &mut LaunchProgramState,
    ctx: &CallContext,
    mint: Address,
    payment_mint: Address,
    total_tokens: u64,
    max_allocation_per_user: u64,
) -> HandlerResult<Launch> {
    if state.launch.is_some() {
        return Err(ProgramError::LaunchAlreadyInitialized);
    }
    if total_tokens == 0 {
        return Err(ProgramError::InvalidConfig("total tokens must be positive".into()));
    }
    if max_allocation_per_user == 0 {
        return Err(ProgramError::InvalidConfig(
            "max allocation per user must be positive".into(),
        ));
    }

    let launch_pda = launch_address();
    let pool_account = pool_account_address(&mint);
    let payment_vault = payment_vault_address(&payment_mint);

    state.open_account(pool_account, launch_pda, mint);
    state.open_account(payment_vault, launch_pda, payment_mint);

    let launch = Launch {
        authority: ctx.sender,
        mint,
        payment_mint,
        pool_account,
        payment_vault,
        total_tokens,
        tokens_distributed: 0,
        max_allocation_per_user,
        is_finalized: false,
    };
    state.launch = Some(launch.clone());

    info!(total_tokens, max_allocation_per_user, "Launch initialized");
    Ok(launch)
}

/// Handle SubmitBid call.
///
/// A bidder that already has a bid gets it back unchanged, with no second
/// escrow transfer, so client retries are safe.
pub fn handle_submit_bid(
    state: &mut LaunchProgramState,
    ctx: &CallContext,
    encrypted_payload: Vec<u8>,
    escrow_amount: u64,
) -> HandlerResult<BidSubmission> {
    let launch = state.launch()?;

    if let Some(existing) = state.get_bid(&ctx.sender) {
        debug!(bidder = %short_address(&ctx.sender), "Duplicate bid submission");
        return Ok(BidSubmission {
            bid: existing.clone(),
            created: false,
        });
    }

    if launch.is_finalized {
        return Err(ProgramError::LaunchFinalized);
    }

    if encrypted_payload.is_empty() || encrypted_payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProgramError::InvalidPayload(format!(
            "length {} outside 1..={}",
            encrypted_payload.len(),
            MAX_PAYLOAD_LEN
        )));
    }

    // Escrow payment into the vault
    let source = launch_types::associated_token_address(&ctx.sender, &launch.payment_mint);
    let vault = launch.payment_vault;
    state.transfer(&source, &vault, escrow_amount)?;

    let sequence = state.allocate_sequence();
    let bid = Bid::new(ctx.sender, encrypted_payload, escrow_amount, sequence);

    state.bids.insert(ctx.sender, bid.clone());
    state.bid_order.push(ctx.sender);

    info!(
        bidder = %short_address(&ctx.sender),
        sequence,
        escrow_amount,
        "Bid submitted"
    );
    Ok(BidSubmission { bid, created: true })
}

/// Handle RecordAllocation call.
///
/// This is a compare-and-commit: the write only lands if the ledger's
/// `tokens_distributed` still equals `expected_tokens_distributed`.
pub fn handle_record_allocation(
    state: &mut LaunchProgramState,
    ctx: &CallContext,
    bidder: Address,
    amount: u64,
    expected_tokens_distributed: u64,
) -> HandlerResult<RecordOutcome> {
    let launch = state.launch()?;

    if ctx.sender != launch.authority {
        return Err(ProgramError::NotAuthorized);
    }

    let bid = state
        .get_bid(&bidder)
        .ok_or_else(|| ProgramError::BidNotFound(hex::encode(bidder)))?;

    if bid.is_processed {
        if bid.allocation == amount {
            return Ok(RecordOutcome::AlreadyRecorded { allocation: amount });
        }
        return Err(ProgramError::AllocationConflict {
            recorded: bid.allocation,
            requested: amount,
        });
    }

    if launch.is_finalized {
        return Err(ProgramError::LaunchFinalized);
    }

    if launch.tokens_distributed != expected_tokens_distributed {
        return Err(ProgramError::StaleBudget {
            expected: expected_tokens_distributed,
            actual: launch.tokens_distributed,
        });
    }

    if amount > launch.max_allocation_per_user {
        return Err(ProgramError::ExceedsMaxAllocation {
            amount,
            max: launch.max_allocation_per_user,
        });
    }

    let remaining = launch.remaining();
    if amount > remaining {
        return Err(ProgramError::PoolExhausted {
            requested: amount,
            remaining,
        });
    }

    let launch = state.launch_mut()?;
    launch.tokens_distributed += amount;
    let tokens_distributed = launch.tokens_distributed;

    if let Some(bid) = state.bids.get_mut(&bidder) {
        bid.allocation = amount;
        bid.is_processed = true;
    }

    debug!(
        bidder = %short_address(&bidder),
        amount,
        tokens_distributed,
        "Allocation recorded"
    );
    Ok(RecordOutcome::Recorded { tokens_distributed })
}

/// Handle FinalizeLaunch call.
pub fn handle_finalize_launch(
    state: &mut LaunchProgramState,
    ctx: &CallContext,
) -> HandlerResult<FinalizeOutcome> {
    let launch = state.launch_mut()?;

    if ctx.sender != launch.authority {
        return Err(ProgramError::NotAuthorized);
    }

    if launch.is_finalized {
        return Ok(FinalizeOutcome::AlreadyFinalized);
    }

    launch.is_finalized = true;
    info!(
        tokens_distributed = launch.tokens_distributed,
        total_tokens = launch.total_tokens,
        "Launch finalized"
    );
    Ok(FinalizeOutcome::Finalized)
}

/// Handle ClaimTokens call.
///
/// Opens the bidder's associated token account if needed, moves the
/// allocation out of the pool and marks the bid claimed. Every precondition
/// is checked before the first write.
pub fn handle_claim_tokens(
    state: &mut LaunchProgramState,
    ctx: &CallContext,
) -> HandlerResult<ClaimReceipt> {
    let launch = state.launch()?;

    if !launch.is_finalized {
        return Err(ProgramError::LaunchNotFinalized);
    }

    let bid = state
        .get_bid(&ctx.sender)
        .ok_or_else(|| ProgramError::BidNotFound(hex::encode(ctx.sender)))?;

    if !bid.is_processed {
        return Err(ProgramError::BidNotProcessed);
    }
    if bid.is_claimed {
        return Err(ProgramError::AlreadyClaimed);
    }
    if bid.allocation == 0 {
        return Err(ProgramError::NothingToClaim);
    }

    let amount = bid.allocation;
    let mint = launch.mint;
    let pool = launch.pool_account;

    let available = state.account_balance(&pool);
    if available < amount {
        return Err(ProgramError::InsufficientFunds {
            required: amount,
            available,
        });
    }

    let (destination, destination_created) = state.open_associated_account(ctx.sender, mint);
    state.transfer(&pool, &destination, amount)?;

    if let Some(bid) = state.bids.get_mut(&ctx.sender) {
        bid.is_claimed = true;
    }

    info!(
        bidder = %short_address(&ctx.sender),
        amount,
        destination_created,
        "Tokens claimed"
    );
    Ok(ClaimReceipt {
        bidder: ctx.sender,
        destination,
        amount,
        destination_created,
    })
}
