//! Strategy Unit
//!
//! A strategy pairs a yield venue with a strategy share (SST) ledger. Vaults
//! never touch venues directly: deposits and redemptions are batched into
//! the strategy's current DHW index and settled by the registry, which uses
//! the building blocks exposed here.
//!
//! ## Valuation
//!
//! After every DHW the venue balances are snapshotted. Yield for the next
//! DHW is the change in value between that snapshot and the live balances,
//! both priced at the same exchange rates, so asset price moves never show
//! up as strategy yield.

pub mod guard;
pub mod lending;
pub mod staking;
pub mod venue;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use yieldvault_common::{
    constants::precision::INITIAL_SHARE_MULTIPLIER,
    constants::yield_bounds::{DEFAULT_MAX_YIELD, DEFAULT_MIN_YIELD},
    constants::UNCLAIMED_HOLDER,
    errors::{VaultError, VaultResult},
    math::{assets_value, initial_index, mul_div, yield_percentage, zero_amounts},
    shares::ShareLedger,
    types::{Address, AssetGroupId, DhwIndex, StrategyId},
    Vec,
};

pub use guard::{CompoundInstruction, PoolBounds, SlippageGuard};
pub use lending::LendingPool;
pub use staking::{CooldownStaking, UnstakeTicket};
pub use venue::{RedeemOutcome, Venue, YieldVenue};

// ============ Strategy Types ============

/// Accepted per-DHW yield range (`YIELD_FULL_PERCENT` units)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct YieldBounds {
    pub min: i128,
    pub max: i128,
}

impl Default for YieldBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_YIELD,
            max: DEFAULT_MAX_YIELD,
        }
    }
}

impl YieldBounds {
    pub fn new(min: i128, max: i128) -> VaultResult<Self> {
        if min > max {
            return Err(VaultError::InvalidInput {
                param: "yield_bounds",
                reason: "min yield above max yield",
            });
        }
        Ok(Self { min, max })
    }
}

/// Strategy lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum StrategyStatus {
    Active,
    /// Emergency exit started on a non-atomic venue
    EmergencyPending { payload: Vec<u8> },
    /// Venue position fully withdrawn
    EmergencyExited,
    Removed,
}

/// Strategy unit state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Strategy {
    pub id: StrategyId,
    pub asset_group_id: AssetGroupId,
    pub venue: Venue,
    /// Strategy share (SST) ledger
    pub shares: ShareLedger,
    /// Index collecting new flows; starts at 1
    pub dhw_index: DhwIndex,
    /// Deposits routed into the current index
    pub pending_deposits: Vec<u128>,
    /// Strategy shares released for redemption in the current index
    pub pending_redeemed_shares: u128,
    pub yield_bounds: YieldBounds,
    /// Venue balances right after the last DHW
    pub snapshot: Vec<u128>,
    /// Cumulative net-of-fee yield index
    pub yield_index: u128,
    pub status: StrategyStatus,
}

impl Strategy {
    pub fn new(
        id: StrategyId,
        asset_group_id: AssetGroupId,
        asset_count: usize,
        venue: Venue,
        yield_bounds: YieldBounds,
    ) -> Self {
        let snapshot = venue.underlying();
        Self {
            id,
            asset_group_id,
            venue,
            shares: ShareLedger::new(),
            dhw_index: 1,
            pending_deposits: zero_amounts(asset_count),
            pending_redeemed_shares: 0,
            yield_bounds,
            snapshot,
            yield_index: initial_index(),
            status: StrategyStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == StrategyStatus::Active
    }

    pub fn require_active(&self) -> VaultResult<()> {
        if !self.is_active() {
            return Err(VaultError::StrategyNotActive { strategy: self.id });
        }
        Ok(())
    }

    pub fn is_atomic(&self) -> bool {
        self.venue.is_atomic()
    }

    /// Whether the current index has collected any flows
    pub fn has_pending_flows(&self) -> bool {
        self.pending_redeemed_shares > 0 || self.pending_deposits.iter().any(|a| *a > 0)
    }

    // ============ Valuation ============

    /// Value of the live venue position
    pub fn value(&self, rates: &[u128]) -> VaultResult<u128> {
        assets_value(&self.venue.underlying(), rates)
    }

    /// Value of the post-DHW snapshot
    pub fn snapshot_value(&self, rates: &[u128]) -> VaultResult<u128> {
        assets_value(&self.snapshot, rates)
    }

    /// Yield since the last DHW, rejected (never clamped) outside the bounds
    pub fn compute_yield(&self, rates: &[u128]) -> VaultResult<i128> {
        let before = self.snapshot_value(rates)?;
        let after = self.value(rates)?;
        let yield_pct = yield_percentage(before, after)?;
        if yield_pct < self.yield_bounds.min || yield_pct > self.yield_bounds.max {
            warn!(strategy = ?self.id, yield_pct, "yield out of bounds");
            return Err(VaultError::YieldOutOfBounds {
                strategy: self.id,
                yield_pct,
                min: self.yield_bounds.min,
                max: self.yield_bounds.max,
            });
        }
        Ok(yield_pct)
    }

    pub fn take_snapshot(&mut self) {
        self.snapshot = self.venue.underlying();
    }

    /// Shares worth `value` when the current supply is worth `current_value`
    pub fn shares_for_value(&self, value: u128, current_value: u128) -> VaultResult<u128> {
        let supply = self.shares.total_supply();
        if supply == 0 || current_value == 0 {
            return value
                .checked_mul(INITIAL_SHARE_MULTIPLIER)
                .ok_or(VaultError::Overflow);
        }
        mul_div(supply, value, current_value)
    }

    // ============ Slippage Checks ============

    /// Deposit guard: variant and pool rate
    pub fn before_deposit_check(&self, guard: &SlippageGuard) -> VaultResult<()> {
        match guard {
            SlippageGuard::Deposit { pool, .. } => pool.check(&self.id, self.venue.pool_rate()),
            _ => Err(VaultError::InvalidSlippageMode { strategy: self.id }),
        }
    }

    /// Redeem guard: variant and pool rate
    pub fn before_redeem_check(&self, guard: &SlippageGuard) -> VaultResult<()> {
        match guard {
            SlippageGuard::Redeem { pool, .. } => pool.check(&self.id, self.venue.pool_rate()),
            _ => Err(VaultError::InvalidSlippageMode { strategy: self.id }),
        }
    }

    // ============ Venue Operations ============

    /// Harvest rewards and reinvest them; returns the proceeds
    pub fn compound(&mut self, instruction: &CompoundInstruction) -> VaultResult<Vec<u128>> {
        let proceeds = self.venue.harvest()?;
        instruction.check(&self.id, &proceeds)?;
        if proceeds.iter().any(|a| *a > 0) {
            self.venue.deposit(&proceeds)?;
            debug!(strategy = ?self.id, ?proceeds, "compounded rewards");
        }
        Ok(proceeds)
    }

    /// Mint strategy shares worth `value` to the unclaimed holder
    pub fn mint_for_value(&mut self, value: u128, current_value: u128) -> VaultResult<u128> {
        let shares = self.shares_for_value(value, current_value)?;
        self.shares.mint(&UNCLAIMED_HOLDER, shares)?;
        Ok(shares)
    }

    /// Put `amounts` into the venue and mint shares worth `credited_value`.
    ///
    /// `current_value` is the position value before the deposit.
    pub fn deposit(
        &mut self,
        amounts: &[u128],
        credited_value: u128,
        current_value: u128,
        guard: &SlippageGuard,
    ) -> VaultResult<u128> {
        self.before_deposit_check(guard)?;
        let shares = self.mint_for_value(credited_value, current_value)?;
        guard.check_shares_out(&self.id, shares)?;
        self.venue.deposit(amounts)?;
        Ok(shares)
    }

    /// Redeem `shares / supply` of the venue position.
    ///
    /// Shares are not burned here; minimum outputs are only checked for
    /// completed redemptions.
    pub fn redeem(
        &mut self,
        shares: u128,
        supply: u128,
        guard: &SlippageGuard,
        now: u64,
    ) -> VaultResult<RedeemOutcome> {
        self.before_redeem_check(guard)?;
        let outcome = self.venue.redeem(shares, supply, now)?;
        if let RedeemOutcome::Completed(assets) = &outcome {
            guard.check_assets_out(&self.id, assets)?;
        }
        Ok(outcome)
    }

    /// Burn `shares` held by `holder` and redeem them synchronously
    pub fn redeem_shares(
        &mut self,
        holder: &Address,
        shares: u128,
        guard: &SlippageGuard,
        now: u64,
    ) -> VaultResult<Vec<u128>> {
        self.require_active()?;
        if !self.is_atomic() {
            return Err(VaultError::NonAtomicStrategy { strategy: self.id });
        }
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let supply = self.shares.total_supply();
        let outcome = self.redeem(shares, supply, guard, now)?;
        self.shares.burn(holder, shares)?;
        match outcome {
            RedeemOutcome::Completed(assets) => {
                self.take_snapshot_after_redeem(&assets);
                Ok(assets)
            }
            RedeemOutcome::Pending(_) => Err(VaultError::NonAtomicStrategy { strategy: self.id }),
        }
    }

    /// Remove redeemed amounts from the snapshot so they are not read as a loss
    fn take_snapshot_after_redeem(&mut self, redeemed: &[u128]) {
        for (snap, out) in self.snapshot.iter_mut().zip(redeemed) {
            *snap = snap.saturating_sub(*out);
        }
    }

    /// Withdraw the whole venue position.
    ///
    /// Atomic venues exit in one call. Cooldown venues first enter
    /// `EmergencyPending`; a later call finishes the exit.
    pub fn emergency_withdraw(&mut self, guard: &SlippageGuard, now: u64) -> VaultResult<RedeemOutcome> {
        match &self.status {
            StrategyStatus::Active => {
                if !matches!(guard, SlippageGuard::Idle) {
                    self.before_redeem_check(guard)?;
                }
                let outcome = self.venue.redeem(1, 1, now)?;
                match &outcome {
                    RedeemOutcome::Completed(assets) => {
                        guard.check_assets_out(&self.id, assets)?;
                        self.status = StrategyStatus::EmergencyExited;
                    }
                    RedeemOutcome::Pending(payload) => {
                        self.status = StrategyStatus::EmergencyPending {
                            payload: payload.clone(),
                        };
                    }
                }
                self.take_snapshot();
                Ok(outcome)
            }
            StrategyStatus::EmergencyPending { payload } => {
                let payload = payload.clone();
                let assets = self.venue.resume(&payload, &[], now)?;
                guard.check_assets_out(&self.id, &assets)?;
                self.status = StrategyStatus::EmergencyExited;
                Ok(RedeemOutcome::Completed(assets))
            }
            StrategyStatus::EmergencyExited | StrategyStatus::Removed => {
                Err(VaultError::StrategyNotActive { strategy: self.id })
            }
        }
    }
}
