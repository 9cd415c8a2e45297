//! Yield Venues
//!
//! The external protocol a strategy deploys capital into. Each venue kind
//! implements [`YieldVenue`]; strategies hold a [`Venue`], the tagged enum
//! over all kinds, so strategy state stays cloneable and serializable.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use yieldvault_common::{errors::VaultResult, Vec};

use crate::lending::LendingPool;
use crate::staking::CooldownStaking;

/// Result of a venue redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// Assets are available now
    Completed(Vec<u128>),
    /// Redemption started; resume later with this payload
    Pending(Vec<u8>),
}

/// Capability interface of a yield venue
pub trait YieldVenue {
    /// Per-asset balances held for the strategy
    fn underlying(&self) -> Vec<u128>;

    /// Externally observed pool exchange rate (1e18 scaled)
    fn pool_rate(&self) -> u128;

    /// Whether redemptions complete in the same call
    fn is_atomic(&self) -> bool;

    fn deposit(&mut self, amounts: &[u128]) -> VaultResult<()>;

    /// Redeem `numerator / denominator` of the position
    fn redeem(&mut self, numerator: u128, denominator: u128, now: u64) -> VaultResult<RedeemOutcome>;

    /// Collect reward proceeds, converted to underlying amounts
    fn harvest(&mut self) -> VaultResult<Vec<u128>>;

    /// Finish a pending redemption
    fn resume(&mut self, payload: &[u8], data: &[u8], now: u64) -> VaultResult<Vec<u128>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum Venue {
    LendingPool(LendingPool),
    CooldownStaking(CooldownStaking),
}

impl Venue {
    pub fn as_lending_pool_mut(&mut self) -> Option<&mut LendingPool> {
        match self {
            Venue::LendingPool(pool) => Some(pool),
            Venue::CooldownStaking(_) => None,
        }
    }

    pub fn as_cooldown_staking_mut(&mut self) -> Option<&mut CooldownStaking> {
        match self {
            Venue::CooldownStaking(staking) => Some(staking),
            Venue::LendingPool(_) => None,
        }
    }

    /// Apply a yield (signed, `YIELD_FULL_PERCENT` units) to the position
    pub fn accrue(&mut self, yield_pct: i128) -> VaultResult<()> {
        match self {
            Venue::LendingPool(pool) => pool.accrue(yield_pct),
            Venue::CooldownStaking(staking) => staking.accrue(yield_pct),
        }
    }

    /// Credit reward proceeds to be picked up by the next harvest
    pub fn add_rewards(&mut self, amounts: &[u128]) -> VaultResult<()> {
        match self {
            Venue::LendingPool(pool) => pool.add_rewards(amounts),
            Venue::CooldownStaking(staking) => staking.add_rewards(amounts),
        }
    }
}

impl YieldVenue for Venue {
    fn underlying(&self) -> Vec<u128> {
        match self {
            Venue::LendingPool(pool) => pool.underlying(),
            Venue::CooldownStaking(staking) => staking.underlying(),
        }
    }

    fn pool_rate(&self) -> u128 {
        match self {
            Venue::LendingPool(pool) => pool.pool_rate(),
            Venue::CooldownStaking(staking) => staking.pool_rate(),
        }
    }

    fn is_atomic(&self) -> bool {
        match self {
            Venue::LendingPool(pool) => pool.is_atomic(),
            Venue::CooldownStaking(staking) => staking.is_atomic(),
        }
    }

    fn deposit(&mut self, amounts: &[u128]) -> VaultResult<()> {
        match self {
            Venue::LendingPool(pool) => pool.deposit(amounts),
            Venue::CooldownStaking(staking) => staking.deposit(amounts),
        }
    }

    fn redeem(&mut self, numerator: u128, denominator: u128, now: u64) -> VaultResult<RedeemOutcome> {
        match self {
            Venue::LendingPool(pool) => pool.redeem(numerator, denominator, now),
            Venue::CooldownStaking(staking) => staking.redeem(numerator, denominator, now),
        }
    }

    fn harvest(&mut self) -> VaultResult<Vec<u128>> {
        match self {
            Venue::LendingPool(pool) => pool.harvest(),
            Venue::CooldownStaking(staking) => staking.harvest(),
        }
    }

    fn resume(&mut self, payload: &[u8], data: &[u8], now: u64) -> VaultResult<Vec<u128>> {
        match self {
            Venue::LendingPool(pool) => pool.resume(payload, data, now),
            Venue::CooldownStaking(staking) => staking.resume(payload, data, now),
        }
    }
}
