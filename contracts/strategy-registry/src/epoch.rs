//! DHW Epoch Records
//!
//! One record per strategy per settled DHW index. Records are append-only;
//! a `Settled` record never changes again.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use yieldvault_common::errors::{VaultError, VaultResult};
use yieldvault_common::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum EpochStatus {
    /// Venue redemption started, waiting for `do_hard_work_continue`
    PendingContinuation,
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct EpochRecord {
    pub status: EpochStatus,
    /// Deposits routed into this index
    pub deposited: Vec<u128>,
    /// Strategy shares redeemed (burned from escrow)
    pub shares_redeemed: u128,
    /// Strategy shares minted for the deposits
    pub shares_minted: u128,
    /// Assets paid out for the redeemed shares
    pub assets_withdrawn: Vec<u128>,
    /// Exchange rates used for settlement
    pub exchange_rates: Vec<u128>,
    /// Position value after compounding and before flows
    pub value_at_dhw: u128,
    /// Share supply after platform fees and before flows
    pub supply_at_dhw: u128,
    /// Gross yield since the previous DHW
    pub yield_pct: i128,
    /// Platform fee shares minted
    pub fee_shares: u128,
    /// Cumulative net yield index after this epoch
    pub yield_index: u128,
    pub timestamp: u64,
    /// Continuation payload while pending
    pub payload: Option<Vec<u8>>,
}

impl EpochRecord {
    pub fn is_settled(&self) -> bool {
        self.status == EpochStatus::Settled
    }

    /// SHA-256 over the borsh encoding
    pub fn digest(&self) -> VaultResult<[u8; 32]> {
        let bytes = borsh::to_vec(self).map_err(|_| VaultError::InvalidEncoding { what: "epoch record" })?;
        Ok(Sha256::digest(bytes).into())
    }
}
