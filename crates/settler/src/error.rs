//! Settlement error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::scoring::ScoringConfigError;

/// Errors that halt a settlement run.
///
/// Per-bid problems (forfeits, exhausted commit retries) never surface here;
/// they are reported in the run's `SettlementReport`.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Budget conflict: {conflicts} stale commits in one run, giving up")]
    BudgetConflict { conflicts: u32 },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scoring configuration error: {0}")]
    Scoring(#[from] ScoringConfigError),
}
