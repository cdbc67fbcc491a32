//! Genesis configuration for the launch program.
//!
//! This defines the launch and the token balances a fresh ledger starts
//! with.

use crate::handlers::{handle_initialize_launch, CallContext};
use crate::state::LaunchProgramState;
use launch_types::{launch_address, Address};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

/// Genesis configuration for the launch program.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaunchGenesisConfig {
    /// Launch authority (the cypher node's signer)
    #[serde_as(as = "Hex")]
    pub authority: Address,

    /// Mint of the token being distributed
    #[serde_as(as = "Hex")]
    pub mint: Address,

    /// Mint of the token bidders escrow
    #[serde_as(as = "Hex")]
    pub payment_mint: Address,

    pub total_tokens: u64,
    pub max_allocation_per_user: u64,

    /// Credit the pool with `total_tokens` at genesis
    #[serde(default = "default_fund_pool")]
    pub fund_pool: bool,

    /// Initial associated token balances
    #[serde(default)]
    pub balances: Vec<GenesisBalance>,
}

/// An initial token balance.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisBalance {
    #[serde_as(as = "Hex")]
    pub owner: Address,
    #[serde_as(as = "Hex")]
    pub mint: Address,
    pub amount: u64,
}

fn default_fund_pool() -> bool {
    true
}

impl LaunchGenesisConfig {
    /// Create a funded launch with no initial balances.
    pub fn new(
        authority: Address,
        mint: Address,
        payment_mint: Address,
        total_tokens: u64,
        max_allocation_per_user: u64,
    ) -> Self {
        Self {
            authority,
            mint,
            payment_mint,
            total_tokens,
            max_allocation_per_user,
            fund_pool: true,
            balances: Vec::new(),
        }
    }

    /// Add an initial balance.
    pub fn with_balance(mut self, owner: Address, mint: Address, amount: u64) -> Self {
        self.balances.push(GenesisBalance { owner, mint, amount });
        self
    }

    /// Validate the genesis configuration.
    pub fn validate(&self) -> Result<(), GenesisValidationError> {
        if self.total_tokens == 0 {
            return Err(GenesisValidationError::InvalidSupply(
                "Total tokens cannot be zero".into(),
            ));
        }
        if self.max_allocation_per_user == 0 {
            return Err(GenesisValidationError::InvalidSupply(
                "Max allocation per user cannot be zero".into(),
            ));
        }
        if self.mint == self.payment_mint {
            return Err(GenesisValidationError::MintCollision);
        }

        let launch = launch_address();
        if let Some(balance) = self
            .balances
            .iter()
            .find(|b| b.owner == launch && b.mint == self.mint)
        {
            return Err(GenesisValidationError::InvalidBalance(format!(
                "pool balance for {} must come from fund_pool",
                hex::encode(balance.owner)
            )));
        }

        Ok(())
    }

    /// Build the initial program state.
    pub fn build_state(&self) -> Result<LaunchProgramState, GenesisValidationError> {
        self.validate()?;

        let mut state = LaunchProgramState::new();
        let ctx = CallContext {
            sender: self.authority,
        };
        handle_initialize_launch(
            &mut state,
            &ctx,
            self.mint,
            self.payment_mint,
            self.total_tokens,
            self.max_allocation_per_user,
        )
        .map_err(|e| GenesisValidationError::InvalidSupply(e.to_string()))?;

        if self.fund_pool {
            state.mint_to(launch_address(), self.mint, self.total_tokens);
        }
        for balance in &self.balances {
            state.mint_to(balance.owner, balance.mint, balance.amount);
        }

        Ok(state)
    }
}

/// Errors that can occur during genesis validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenesisValidationError {
    #[error("Invalid supply configuration: {0}")]
    InvalidSupply(String),

    #[error("Launch mint and payment mint must differ")]
    MintCollision,

    #[error("Invalid initial balance: {0}")]
    InvalidBalance(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use launch_types::pool_account_address;

    fn sample_config() -> LaunchGenesisConfig {
        LaunchGenesisConfig::new([1u8; 32], [2u8; 32], [3u8; 32], 1_000_000, 5_000)
    }

    #[test]
    fn test_default_config_builds_funded_pool() {
        let config = sample_config().with_balance([9u8; 32], [3u8; 32], 500);
        let state = config.build_state().unwrap();

        let launch = state.launch().unwrap();
        assert_eq!(launch.authority, [1u8; 32]);
        assert_eq!(state.account_balance(&pool_account_address(&[2u8; 32])), 1_000_000);
        assert_eq!(state.token_balance(&[9u8; 32], &[3u8; 32]), 500);
    }

    #[test]
    fn test_unfunded_pool() {
        let mut config = sample_config();
        config.fund_pool = false;
        let state = config.build_state().unwrap();
        assert_eq!(state.account_balance(&pool_account_address(&[2u8; 32])), 0);
    }

    #[test]
    fn test_invalid_zero_supply() {
        let mut config = sample_config();
        config.total_tokens = 0;
        assert!(matches!(
            config.validate(),
            Err(GenesisValidationError::InvalidSupply(_))
        ));
    }

    #[test]
    fn test_mint_collision() {
        let mut config = sample_config();
        config.payment_mint = config.mint;
        assert!(matches!(
            config.validate(),
            Err(GenesisValidationError::MintCollision)
        ));
    }

    #[test]
    fn test_parse_json_defaults() {
        let json = format!(
            r#"{{"authority":"{}","mint":"{}","payment_mint":"{}","total_tokens":10,"max_allocation_per_user":5}}"#,
            hex::encode([1u8; 32]),
            hex::encode([2u8; 32]),
            hex::encode([3u8; 32]),
        );
        let config: LaunchGenesisConfig = serde_json::from_str(&json).unwrap();
        assert!(config.fund_pool);
        assert!(config.balances.is_empty());
        assert!(config.validate().is_ok());
    }
}
