//! Smart Vault State
//!
//! A smart vault pools one asset group across several strategies according
//! to a target allocation. This module holds the state shared by the deposit
//! and withdrawal flows; the flows themselves live in their own crates.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::GHOST_STRATEGY;
use crate::errors::{VaultError, VaultResult};
use crate::receipt::ReceiptBook;
use crate::shares::ShareLedger;
use crate::types::{Address, AssetGroupId, DhwIndex, FlushIndex, SmartVaultFees, StrategyId, VaultId};
use crate::{BTreeMap, Vec};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SmartVault {
    pub id: VaultId,
    pub asset_group_id: AssetGroupId,
    /// Strategies in routing order; removed ones become [`GHOST_STRATEGY`]
    pub strategies: Vec<StrategyId>,
    /// Target allocation per strategy (`FULL_PERCENT` units)
    pub allocation: Vec<u128>,
    pub fees: SmartVaultFees,
    pub fee_recipient: Address,
    /// Vault share (SVT) ledger
    pub shares: ShareLedger,
    pub receipts: ReceiptBook,
    pub flush_index: FlushIndex,
    /// DHW indexes each flush was routed into, aligned with `strategies`
    pub flush_dhw_indexes: BTreeMap<u64, Vec<DhwIndex>>,
    /// Per strategy, the cumulative net-yield index at the last sync
    pub synced_yield_index: Vec<u128>,
    /// Timestamp of the last synced DHW
    pub last_sync_timestamp: u64,
}

impl SmartVault {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: VaultId,
        asset_group_id: AssetGroupId,
        strategies: Vec<StrategyId>,
        allocation: Vec<u128>,
        fees: SmartVaultFees,
        fee_recipient: Address,
        yield_indexes: Vec<u128>,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            asset_group_id,
            strategies,
            allocation,
            fees,
            fee_recipient,
            shares: ShareLedger::new(),
            receipts: ReceiptBook::new(),
            flush_index: FlushIndex::default(),
            flush_dhw_indexes: BTreeMap::new(),
            synced_yield_index: yield_indexes,
            last_sync_timestamp: created_at,
        }
    }

    /// Position of a strategy in the routing list
    pub fn strategy_position(&self, strategy: &StrategyId) -> Option<usize> {
        self.strategies.iter().position(|s| s == strategy)
    }

    /// Replace a strategy by the ghost placeholder with zero allocation
    pub fn ghost_strategy(&mut self, strategy: &StrategyId) -> bool {
        match self.strategy_position(strategy) {
            Some(i) => {
                self.strategies[i] = GHOST_STRATEGY;
                self.allocation[i] = 0;
                true
            }
            None => false,
        }
    }

    /// Strategies that are not ghosted, with their positions
    pub fn live_strategies(&self) -> impl Iterator<Item = (usize, &StrategyId)> {
        self.strategies
            .iter()
            .enumerate()
            .filter(|(_, s)| **s != GHOST_STRATEGY)
    }

    /// DHW indexes of a flushed index
    pub fn flush_dhw(&self, flush_index: u64) -> VaultResult<&[DhwIndex]> {
        self.flush_dhw_indexes
            .get(&flush_index)
            .map(|indexes| indexes.as_slice())
            .ok_or(VaultError::InvalidInput {
                param: "flush_index",
                reason: "flush index was never flushed",
            })
    }

    /// Close the current flush index after routing it into strategy epochs
    pub fn close_flush(&mut self, dhw_indexes: Vec<DhwIndex>) -> u64 {
        let closed = self.flush_index.current;
        self.flush_dhw_indexes.insert(closed, dhw_indexes);
        self.flush_index.current += 1;
        closed
    }

    /// Mark the oldest unsynced flush as synced
    pub fn advance_sync(&mut self, timestamp: u64) -> VaultResult<u64> {
        if self.flush_index.is_synced() {
            return Err(VaultError::InvalidStateTransition);
        }
        let synced = self.flush_index.to_sync;
        self.flush_index.to_sync += 1;
        self.last_sync_timestamp = timestamp;
        Ok(synced)
    }
}
