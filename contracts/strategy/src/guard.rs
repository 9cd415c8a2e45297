//! Slippage Guards
//!
//! Caller-supplied bounds checked around every venue interaction. The guard
//! variant also declares the expected net flow direction of a DHW step.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use yieldvault_common::{
    errors::{VaultError, VaultResult},
    types::StrategyId,
    validation::require_same_length,
};

/// Accepted range of the venue's pool exchange rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PoolBounds {
    pub min_rate: u128,
    pub max_rate: u128,
}

impl PoolBounds {
    pub fn new(min_rate: u128, max_rate: u128) -> Self {
        Self { min_rate, max_rate }
    }

    /// Accept any pool rate
    pub fn any() -> Self {
        Self {
            min_rate: 0,
            max_rate: u128::MAX,
        }
    }

    pub fn check(&self, strategy: &StrategyId, rate: u128) -> VaultResult<()> {
        if rate < self.min_rate {
            return Err(VaultError::SlippageExceeded {
                strategy: *strategy,
                expected: self.min_rate,
                actual: rate,
            });
        }
        if rate > self.max_rate {
            return Err(VaultError::SlippageExceeded {
                strategy: *strategy,
                expected: self.max_rate,
                actual: rate,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum SlippageGuard {
    /// No venue flow expected
    Idle,
    /// Net deposit into the venue
    Deposit { pool: PoolBounds, min_shares_out: u128 },
    /// Net redemption from the venue; `min_assets_out` may be empty
    Redeem { pool: PoolBounds, min_assets_out: Vec<u128> },
}

impl SlippageGuard {
    /// Redeem guard without bounds
    pub fn redeem_any() -> Self {
        Self::Redeem {
            pool: PoolBounds::any(),
            min_assets_out: Vec::new(),
        }
    }

    /// Deposit guard without bounds
    pub fn deposit_any() -> Self {
        Self::Deposit {
            pool: PoolBounds::any(),
            min_shares_out: 0,
        }
    }

    /// Minimum shares a deposit must produce
    pub fn check_shares_out(&self, strategy: &StrategyId, shares: u128) -> VaultResult<()> {
        if let Self::Deposit { min_shares_out, .. } = self {
            if shares < *min_shares_out {
                return Err(VaultError::SlippageExceeded {
                    strategy: *strategy,
                    expected: *min_shares_out,
                    actual: shares,
                });
            }
        }
        Ok(())
    }

    /// Minimum per-asset amounts a redemption must return
    pub fn check_assets_out(&self, strategy: &StrategyId, assets: &[u128]) -> VaultResult<()> {
        if let Self::Redeem { min_assets_out, .. } = self {
            if min_assets_out.is_empty() {
                return Ok(());
            }
            require_same_length(assets.len(), min_assets_out.len())?;
            check_minimums(strategy, assets, min_assets_out)?;
        }
        Ok(())
    }
}

/// Bounds for reward harvesting and reinvestment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CompoundInstruction {
    /// Minimum harvested amount per asset; empty disables the check
    pub min_proceeds: Vec<u128>,
}

impl CompoundInstruction {
    pub fn check(&self, strategy: &StrategyId, proceeds: &[u128]) -> VaultResult<()> {
        if self.min_proceeds.is_empty() {
            return Ok(());
        }
        require_same_length(proceeds.len(), self.min_proceeds.len())?;
        check_minimums(strategy, proceeds, &self.min_proceeds)
    }
}

fn check_minimums(strategy: &StrategyId, actual: &[u128], minimum: &[u128]) -> VaultResult<()> {
    for (got, min) in actual.iter().zip(minimum) {
        if got < min {
            return Err(VaultError::SlippageExceeded {
                strategy: *strategy,
                expected: *min,
                actual: *got,
            });
        }
    }
    Ok(())
}
