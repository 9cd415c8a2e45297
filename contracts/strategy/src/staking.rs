//! Cooldown Staking Venue
//!
//! Non-atomic venue: redemptions start an unstake that can only be
//! completed once a cooldown has elapsed. The continuation payload is a
//! CBOR-encoded [`UnstakeTicket`].

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::debug;

use yieldvault_common::{
    constants::percent::YIELD_FULL_PERCENT,
    constants::precision::PRICE_PRECISION,
    errors::{VaultError, VaultResult},
    math::{add_amounts, mul_div, scale_amounts, zero_amounts},
    validation::require_sufficient_balance,
    Vec,
};

use crate::venue::{RedeemOutcome, YieldVenue};

/// A started unstake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeTicket {
    pub amounts: Vec<u128>,
    pub ready_at: u64,
}

impl UnstakeTicket {
    pub fn encode(&self) -> VaultResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|_| VaultError::InvalidEncoding { what: "unstake ticket" })?;
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> VaultResult<Self> {
        ciborium::from_reader(bytes).map_err(|_| VaultError::InvalidEncoding { what: "unstake ticket" })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CooldownStaking {
    staked: Vec<u128>,
    /// Amounts in cooldown, no longer owned by the strategy's holders
    unstaking: Vec<u128>,
    pending_rewards: Vec<u128>,
    pool_rate: u128,
    cooldown: u64,
}

impl CooldownStaking {
    pub fn new(asset_count: usize, cooldown: u64) -> Self {
        Self {
            staked: zero_amounts(asset_count),
            unstaking: zero_amounts(asset_count),
            pending_rewards: zero_amounts(asset_count),
            pool_rate: PRICE_PRECISION,
            cooldown,
        }
    }

    /// Apply staking yield to the staked position
    pub fn accrue(&mut self, yield_pct: i128) -> VaultResult<()> {
        let factor = YIELD_FULL_PERCENT
            .checked_add(yield_pct)
            .filter(|f| *f >= 0)
            .ok_or(VaultError::Underflow)? as u128;
        let full = YIELD_FULL_PERCENT as u128;
        self.staked = scale_amounts(&self.staked, factor, full)?;
        self.pool_rate = mul_div(self.pool_rate, factor, full)?;
        Ok(())
    }

    pub fn add_rewards(&mut self, amounts: &[u128]) -> VaultResult<()> {
        add_amounts(&mut self.pending_rewards, amounts)
    }

    pub fn cooldown(&self) -> u64 {
        self.cooldown
    }

    /// Amounts currently in cooldown
    pub fn unstaking(&self) -> &[u128] {
        &self.unstaking
    }
}

impl YieldVenue for CooldownStaking {
    fn underlying(&self) -> Vec<u128> {
        self.staked.clone()
    }

    fn pool_rate(&self) -> u128 {
        self.pool_rate
    }

    fn is_atomic(&self) -> bool {
        false
    }

    fn deposit(&mut self, amounts: &[u128]) -> VaultResult<()> {
        add_amounts(&mut self.staked, amounts)
    }

    fn redeem(&mut self, numerator: u128, denominator: u128, now: u64) -> VaultResult<RedeemOutcome> {
        require_sufficient_balance(denominator, numerator)?;
        let amounts = scale_amounts(&self.staked, numerator, denominator)?;
        for (staked, out) in self.staked.iter_mut().zip(&amounts) {
            *staked -= *out;
        }
        add_amounts(&mut self.unstaking, &amounts)?;

        let ticket = UnstakeTicket {
            amounts,
            ready_at: now.saturating_add(self.cooldown),
        };
        debug!(ready_at = ticket.ready_at, "unstake started");
        Ok(RedeemOutcome::Pending(ticket.encode()?))
    }

    fn harvest(&mut self) -> VaultResult<Vec<u128>> {
        let len = self.pending_rewards.len();
        Ok(core::mem::replace(&mut self.pending_rewards, zero_amounts(len)))
    }

    fn resume(&mut self, payload: &[u8], _data: &[u8], now: u64) -> VaultResult<Vec<u128>> {
        let ticket = UnstakeTicket::decode(payload)?;
        if now < ticket.ready_at {
            return Err(VaultError::CooldownNotElapsed {
                ready_at: ticket.ready_at,
                now,
            });
        }
        if ticket.amounts.len() != self.unstaking.len() {
            return Err(VaultError::InvalidArrayLength {
                expected: self.unstaking.len(),
                actual: ticket.amounts.len(),
            });
        }
        for (pending, amount) in self.unstaking.iter().zip(&ticket.amounts) {
            require_sufficient_balance(*pending, *amount)?;
        }
        for (pending, amount) in self.unstaking.iter_mut().zip(&ticket.amounts) {
            *pending -= *amount;
        }
        Ok(ticket.amounts)
    }
}
