//! Lending Pool Venue
//!
//! Atomic venue: supplied assets earn interest in place and can be pulled
//! out in the same call. Interest and reward accrual are driven externally
//! through [`LendingPool::accrue`] and [`LendingPool::add_rewards`].

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use yieldvault_common::{
    constants::percent::YIELD_FULL_PERCENT,
    constants::precision::PRICE_PRECISION,
    errors::{VaultError, VaultResult},
    math::{add_amounts, mul_div, scale_amounts, zero_amounts},
    Vec,
};

use crate::venue::{RedeemOutcome, YieldVenue};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LendingPool {
    /// Supplied balances including accrued interest
    balances: Vec<u128>,
    /// Rewards waiting for harvest, already in underlying terms
    pending_rewards: Vec<u128>,
    /// Pool token exchange rate
    pool_rate: u128,
}

impl LendingPool {
    pub fn new(asset_count: usize) -> Self {
        Self {
            balances: zero_amounts(asset_count),
            pending_rewards: zero_amounts(asset_count),
            pool_rate: PRICE_PRECISION,
        }
    }

    /// Grow (or shrink) every balance and the pool rate by `yield_pct`
    pub fn accrue(&mut self, yield_pct: i128) -> VaultResult<()> {
        let factor = YIELD_FULL_PERCENT
            .checked_add(yield_pct)
            .filter(|f| *f >= 0)
            .ok_or(VaultError::Underflow)? as u128;
        let full = YIELD_FULL_PERCENT as u128;
        self.balances = scale_amounts(&self.balances, factor, full)?;
        self.pool_rate = mul_div(self.pool_rate, factor, full)?;
        Ok(())
    }

    pub fn add_rewards(&mut self, amounts: &[u128]) -> VaultResult<()> {
        add_amounts(&mut self.pending_rewards, amounts)
    }

    pub fn set_pool_rate(&mut self, rate: u128) {
        self.pool_rate = rate;
    }
}

impl YieldVenue for LendingPool {
    fn underlying(&self) -> Vec<u128> {
        self.balances.clone()
    }

    fn pool_rate(&self) -> u128 {
        self.pool_rate
    }

    fn is_atomic(&self) -> bool {
        true
    }

    fn deposit(&mut self, amounts: &[u128]) -> VaultResult<()> {
        add_amounts(&mut self.balances, amounts)
    }

    fn redeem(&mut self, numerator: u128, denominator: u128, _now: u64) -> VaultResult<RedeemOutcome> {
        if numerator > denominator {
            return Err(VaultError::InsufficientBalance {
                available: denominator,
                requested: numerator,
            });
        }
        let assets = scale_amounts(&self.balances, numerator, denominator)?;
        for (balance, out) in self.balances.iter_mut().zip(&assets) {
            *balance -= *out;
        }
        Ok(RedeemOutcome::Completed(assets))
    }

    fn harvest(&mut self) -> VaultResult<Vec<u128>> {
        let len = self.pending_rewards.len();
        Ok(core::mem::replace(&mut self.pending_rewards, zero_amounts(len)))
    }

    fn resume(&mut self, _payload: &[u8], _data: &[u8], _now: u64) -> VaultResult<Vec<u128>> {
        // Redemptions always complete immediately
        Err(VaultError::InvalidStateTransition)
    }
}
