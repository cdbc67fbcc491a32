//! Ledger program for sealed-bid token launches.
//!
//! The program owns the launch singleton, one bid record per bidder, and the
//! token accounts funds move between:
//!
//! - Launch initialization with a fixed supply and per-user cap
//! - Sealed bid submission with payment escrow
//! - Compare-and-commit allocation recording
//! - Idempotent finalization
//! - Atomic claims into the bidder's associated token account
//!
//! # Architecture
//!
//! - `call`: Message types for state-changing operations
//! - `handlers`: Business logic for processing calls
//! - `queries`: Read-only state access
//! - `state`: Ledger-resident state
//! - `genesis`: Initial configuration
//! - `error`: Error types
//!
//! # Example
//!
//! ```ignore
//! use launch_program::{handlers, LaunchProgramState};
//!
//! let mut state = LaunchProgramState::new();
//! let ctx = handlers::CallContext { sender: authority };
//!
//! handlers::handle_initialize_launch(&mut state, &ctx, mint, payment_mint, 1_000_000, 5_000)?;
//! handlers::handle_record_allocation(&mut state, &ctx, bidder, 5_000, 0)?;
//! ```

pub mod call;
pub mod error;
pub mod genesis;
pub mod handlers;
pub mod queries;
pub mod state;

pub use call::{CallOutcome, LaunchCall};
pub use error::ProgramError;
pub use genesis::{GenesisBalance, GenesisValidationError, LaunchGenesisConfig};
pub use handlers::{dispatch, CallContext, HandlerResult, MAX_PAYLOAD_LEN};
pub use queries::{
    get_launch_summary, handle_query, LaunchQuery, LaunchQueryResponse, LaunchSummary,
};
pub use state::LaunchProgramState;
