//! Deterministic bid scoring.
//!
//! A score in `[0, 1]` combines the normalized bid amount with the bidder's
//! normalized wallet age. The raw allocation is `floor(amount * score *
//! multiplier)`; per-user and pool caps are applied later by settlement.

use std::collections::HashMap;

use launch_types::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance for the weights summing to one.
const WEIGHT_EPSILON: f64 = 1e-9;

/// Inputs to a scoring model for one bid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoringInputs {
    /// Decrypted bid amount
    pub bid_amount: f64,
    /// Age of the bidder's wallet in days
    pub wallet_age_days: u64,
}

/// A scoring model.
///
/// Implementations must be pure: the same inputs always give the same score.
pub trait ScoringModel: Send + Sync {
    /// Score a bid, in `[0, 1]`.
    fn score(&self, inputs: &ScoringInputs) -> f64;

    /// Allocation before any cap is applied.
    fn raw_allocation(&self, bid_amount: f64, score: f64) -> u64;

    /// Score and size a bid in one step.
    fn allocate(&self, inputs: &ScoringInputs) -> u64 {
        self.raw_allocation(inputs.bid_amount, self.score(inputs))
    }
}

/// Errors in scoring configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringConfigError {
    #[error("{name} ceiling must be positive and finite, got {value}")]
    InvalidCeiling { name: &'static str, value: f64 },

    #[error("{name} weight must be non-negative and finite, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("Weights must sum to 1, got {0}")]
    WeightSum(f64),

    #[error("Multiplier must be non-negative and finite, got {0}")]
    InvalidMultiplier(f64),
}

/// Parameters of the linear scoring model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Bid amount at which the bid component saturates
    pub bid_ceiling: f64,
    /// Wallet age (days) at which the age component saturates
    pub wallet_age_ceiling_days: f64,
    pub bid_weight: f64,
    pub wallet_age_weight: f64,
    /// Tokens per unit of `amount * score`
    pub multiplier: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            bid_ceiling: 1000.0,
            wallet_age_ceiling_days: 365.0,
            bid_weight: 0.8,
            wallet_age_weight: 0.2,
            multiplier: 10.0,
        }
    }
}

impl ScoringConfig {
    /// Validate the scoring configuration.
    pub fn validate(&self) -> Result<(), ScoringConfigError> {
        for (name, value) in [
            ("bid", self.bid_ceiling),
            ("wallet age", self.wallet_age_ceiling_days),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ScoringConfigError::InvalidCeiling { name, value });
            }
        }

        for (name, value) in [("bid", self.bid_weight), ("wallet age", self.wallet_age_weight)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoringConfigError::InvalidWeight { name, value });
            }
        }

        let sum = self.bid_weight + self.wallet_age_weight;
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(ScoringConfigError::WeightSum(sum));
        }

        if !self.multiplier.is_finite() || self.multiplier < 0.0 {
            return Err(ScoringConfigError::InvalidMultiplier(self.multiplier));
        }

        Ok(())
    }
}

/// Weighted sum of normalized bid amount and wallet age.
#[derive(Clone, Debug)]
pub struct LinearScoringModel {
    config: ScoringConfig,
}

impl LinearScoringModel {
    /// Build a model from a validated configuration.
    pub fn new(config: ScoringConfig) -> Result<Self, ScoringConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }
}

impl Default for LinearScoringModel {
    fn default() -> Self {
        Self {
            config: ScoringConfig::default(),
        }
    }
}

fn normalize(value: f64, ceiling: f64) -> f64 {
    (value / ceiling).clamp(0.0, 1.0)
}

impl ScoringModel for LinearScoringModel {
    fn score(&self, inputs: &ScoringInputs) -> f64 {
        let nb = normalize(inputs.bid_amount, self.config.bid_ceiling);
        let na = normalize(inputs.wallet_age_days as f64, self.config.wallet_age_ceiling_days);
        self.config.bid_weight * nb + self.config.wallet_age_weight * na
    }

    fn raw_allocation(&self, bid_amount: f64, score: f64) -> u64 {
        let raw = (bid_amount * score * self.config.multiplier).floor();
        // Float to int casts saturate; NaN maps to zero
        raw as u64
    }
}

/// Source of wallet ages for bidders.
pub trait WalletAgeSource: Send + Sync {
    fn wallet_age_days(&self, bidder: &Address) -> u64;
}

/// Wallet ages from a fixed table.
#[derive(Clone, Debug, Default)]
pub struct StaticWalletAges {
    ages: HashMap<Address, u64>,
    default_days: u64,
}

impl StaticWalletAges {
    pub fn new(ages: HashMap<Address, u64>) -> Self {
        Self {
            ages,
            default_days: 0,
        }
    }

    /// Age reported for bidders missing from the table.
    pub fn with_default(mut self, days: u64) -> Self {
        self.default_days = days;
        self
    }

    pub fn insert(&mut self, bidder: Address, days: u64) {
        self.ages.insert(bidder, days);
    }
}

impl FromIterator<(Address, u64)> for StaticWalletAges {
    fn from_iter<I: IntoIterator<Item = (Address, u64)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl WalletAgeSource for StaticWalletAges {
    fn wallet_age_days(&self, bidder: &Address) -> u64 {
        self.ages.get(bidder).copied().unwrap_or(self.default_days)
    }
}
