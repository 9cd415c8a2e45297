//! Core Types for the YieldVault Kernel
//!
//! Identifiers and the small value types passed between components.

use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Type alias for addresses (32-byte hash)
pub type Address = [u8; 32];

/// Type alias for strategy identifiers
pub type StrategyId = [u8; 32];

/// Type alias for smart vault identifiers
pub type VaultId = [u8; 32];

/// Type alias for asset group identifiers (sequential, starting at 1)
pub type AssetGroupId = u64;

/// Per-strategy settlement counter
pub type DhwIndex = u64;

/// Receipt token identifier
pub type ReceiptId = u128;

/// Who is calling and when
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// Caller address
    pub caller: Address,
    /// Current timestamp (seconds)
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(caller: Address, timestamp: u64) -> Self {
        Self { caller, timestamp }
    }
}

/// Per-vault flush bookkeeping
///
/// `current` collects new deposits and redemptions; every index in
/// `to_sync..current` has been flushed and waits for sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FlushIndex {
    /// Index collecting new flows
    pub current: u64,
    /// Oldest flushed index not yet synced
    pub to_sync: u64,
}

impl FlushIndex {
    /// Returns true when every flushed index has been synced
    pub fn is_synced(&self) -> bool {
        self.to_sync == self.current
    }

    /// Returns true when the flush index has completed sync
    pub fn is_index_synced(&self, flush_index: u64) -> bool {
        flush_index < self.to_sync
    }
}

/// Inclusive lower/upper bound on an exchange rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RateBounds {
    pub min: u128,
    pub max: u128,
}

impl RateBounds {
    pub fn new(min: u128, max: u128) -> Self {
        Self { min, max }
    }

    /// Bounds that accept any rate
    pub fn unbounded() -> Self {
        Self { min: 0, max: u128::MAX }
    }

    pub fn contains(&self, rate: u128) -> bool {
        rate >= self.min && rate <= self.max
    }
}

/// Smart vault fee configuration (in `FULL_PERCENT` units)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SmartVaultFees {
    /// Annual management fee
    pub management_fee_pct: u128,
    /// Fee on new deposits
    pub deposit_fee_pct: u128,
    /// Fee on realized yield
    pub performance_fee_pct: u128,
}

/// Platform fee configuration for strategy yield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PlatformFees {
    /// Ecosystem fee recipient
    pub ecosystem_fee_receiver: Address,
    /// Ecosystem fee (`FULL_PERCENT` units)
    pub ecosystem_fee_pct: u128,
    /// Treasury fee recipient
    pub treasury_fee_receiver: Address,
    /// Treasury fee (`FULL_PERCENT` units)
    pub treasury_fee_pct: u128,
}

impl PlatformFees {
    /// Combined fee percentage
    pub fn total_pct(&self) -> u128 {
        self.ecosystem_fee_pct.saturating_add(self.treasury_fee_pct)
    }
}

/// Per-asset amounts in asset group order
pub type AssetAmounts = Vec<u128>;
