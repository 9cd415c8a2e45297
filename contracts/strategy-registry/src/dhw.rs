//! Do-Hard-Work Settlement
//!
//! A DHW batch settles the current index of every listed strategy:
//!
//! 1. Validate the whole batch (expiry, shapes, asset groups, oracle rates)
//!    before touching any state.
//! 2. Per strategy: compound rewards, measure yield against the last
//!    snapshot, mint platform fee shares, match deposits against
//!    redemptions and push only the net flow to the venue.
//! 3. Write the epoch record and advance the index.
//!
//! Deposits and redemptions of the same index are matched at the DHW price:
//! redeemers are paid out of incoming deposits first, and only the
//! difference reaches the venue. A redemption from a non-atomic venue leaves
//! the epoch in `PendingContinuation` until [`StrategyRegistry::do_hard_work_continue`].

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use yieldvault_common::{
    asset_group::AssetGroupRegistry,
    asset_ledger::AssetLedger,
    constants::components::STRATEGY_REGISTRY,
    constants::REDEEM_ESCROW_HOLDER,
    errors::{VaultError, VaultResult},
    events::{EventLog, VaultEvent},
    math::{
        add_amounts, assets_value, compound_index, mul_div, net_yield, platform_fee_shares, safe_sub,
        scale_amounts, zero_amounts,
    },
    oracle::PriceFeed,
    types::{Address, AssetGroupId, RateBounds, StrategyId},
    validation::{require_not_ghost, require_same_length},
    BTreeSet, Vec,
};
use yieldvault_strategy::{CompoundInstruction, RedeemOutcome, SlippageGuard, YieldVenue};

use crate::epoch::{EpochRecord, EpochStatus};
use crate::StrategyRegistry;

// ============ Batch Parameters ============

/// Per-strategy DHW parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StrategyDhwParams {
    pub strategy: StrategyId,
    /// Must match the net flow direction
    pub guard: SlippageGuard,
    /// Harvest and reinvest rewards first
    pub compound: Option<CompoundInstruction>,
}

/// Strategies of one asset group, settled at one set of exchange rates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DhwGroup {
    pub asset_group_id: AssetGroupId,
    /// Must equal the registered asset group
    pub tokens: Vec<Address>,
    /// Accepted oracle rate per token
    pub exchange_rate_bounds: Vec<RateBounds>,
    pub strategies: Vec<StrategyDhwParams>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DhwBatch {
    pub groups: Vec<DhwGroup>,
    /// Latest timestamp the batch may run at
    pub valid_until: u64,
}

/// Continuation parameters for one pending strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ContinueParams {
    pub strategy: StrategyId,
    /// Must be a redeem guard
    pub guard: SlippageGuard,
    /// Venue-specific continuation data
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DhwContinueBatch {
    pub strategies: Vec<ContinueParams>,
    pub valid_until: u64,
}

/// Direction of a strategy's net flow at the next DHW
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetFlow {
    Idle,
    Deposit,
    Redeem,
}

impl NetFlow {
    /// Guard of the matching variant accepting any pool rate and output
    pub fn any_guard(&self) -> SlippageGuard {
        match self {
            NetFlow::Idle => SlippageGuard::Idle,
            NetFlow::Deposit => SlippageGuard::deposit_any(),
            NetFlow::Redeem => SlippageGuard::redeem_any(),
        }
    }
}

// ============ Settlement ============

impl StrategyRegistry {
    /// Keeper preview of the guard variant the next DHW will require.
    ///
    /// Ignores the platform fee dilution, which only matters when deposits
    /// and redemptions cancel out almost exactly.
    pub fn net_flow(&self, id: &StrategyId, rates: &[u128]) -> VaultResult<NetFlow> {
        let strategy = self.strategy(id)?;
        let deposited = &strategy.pending_deposits;
        let redeemed = strategy.pending_redeemed_shares;
        if redeemed == 0 && deposited.iter().all(|a| *a == 0) {
            return Ok(NetFlow::Idle);
        }
        let supply = strategy.shares.total_supply();
        let deposit_value = assets_value(deposited, rates)?;
        let redeem_value = if redeemed > 0 && supply > 0 {
            mul_div(strategy.value(rates)?, redeemed, supply)?
        } else {
            0
        };
        if deposit_value < redeem_value {
            return Ok(NetFlow::Redeem);
        }
        let matched = if deposit_value > 0 {
            scale_amounts(deposited, redeem_value, deposit_value)?
        } else {
            zero_amounts(deposited.len())
        };
        if deposited.iter().zip(&matched).any(|(d, m)| d > m) {
            Ok(NetFlow::Deposit)
        } else {
            Ok(NetFlow::Idle)
        }
    }

    /// Settle the current index of every strategy in the batch.
    ///
    /// All-or-nothing: any failure leaves the registry and ledger untouched.
    pub fn do_hard_work<P: PriceFeed + ?Sized>(
        &mut self,
        ledger: &mut AssetLedger,
        asset_groups: &AssetGroupRegistry,
        price_feed: &P,
        batch: &DhwBatch,
        now: u64,
    ) -> VaultResult<EventLog> {
        let group_rates = self.validate_batch(asset_groups, price_feed, batch, now)?;

        self.staged(ledger, |registry, ledger| {
            let mut events = EventLog::new();
            for (group, rates) in batch.groups.iter().zip(&group_rates) {
                for params in &group.strategies {
                    registry.settle_strategy(ledger, &group.tokens, rates, params, now, &mut events)?;
                }
            }
            info!(strategies = batch.groups.iter().map(|g| g.strategies.len()).sum::<usize>(), "DHW batch settled");
            Ok(events)
        })
    }

    /// Check the batch and fetch the rates of every group
    fn validate_batch<P: PriceFeed + ?Sized>(
        &self,
        asset_groups: &AssetGroupRegistry,
        price_feed: &P,
        batch: &DhwBatch,
        now: u64,
    ) -> VaultResult<Vec<Vec<u128>>> {
        if now > batch.valid_until {
            return Err(VaultError::DoHardWorkParametersExpired {
                valid_until: batch.valid_until,
                now,
            });
        }
        if batch.groups.is_empty() {
            return Err(VaultError::NoStrategies);
        }

        let mut seen = BTreeSet::new();
        for group in &batch.groups {
            if group.strategies.is_empty() {
                return Err(VaultError::NoStrategies);
            }
            require_same_length(group.tokens.len(), group.exchange_rate_bounds.len())?;
            asset_groups.require_matches(group.asset_group_id, &group.tokens)?;

            for params in &group.strategies {
                let id = params.strategy;
                require_not_ghost(&id)?;
                let strategy = self.strategy(&id)?;
                if strategy.asset_group_id != group.asset_group_id {
                    return Err(VaultError::InvalidAssetGroup {
                        asset_group_id: group.asset_group_id,
                    });
                }
                strategy.require_active()?;
                if self.has_pending_continuation(&id) {
                    return Err(VaultError::ContinuationPending {
                        strategy: id,
                        dhw_index: strategy.dhw_index - 1,
                    });
                }
                if !seen.insert(id) {
                    return Err(VaultError::InvalidInput {
                        param: "strategies",
                        reason: "strategy listed twice",
                    });
                }
            }
        }

        let mut group_rates = Vec::with_capacity(batch.groups.len());
        for group in &batch.groups {
            let rates = price_feed.exchange_rates(&group.tokens)?;
            for ((asset, rate), bounds) in group.tokens.iter().zip(&rates).zip(&group.exchange_rate_bounds) {
                if !bounds.contains(*rate) {
                    return Err(VaultError::ExchangeRateOutOfSlippages {
                        asset: *asset,
                        rate: *rate,
                        min: bounds.min,
                        max: bounds.max,
                    });
                }
            }
            group_rates.push(rates);
        }
        Ok(group_rates)
    }

    fn settle_strategy(
        &mut self,
        ledger: &mut AssetLedger,
        tokens: &[Address],
        rates: &[u128],
        params: &StrategyDhwParams,
        now: u64,
        events: &mut EventLog,
    ) -> VaultResult<()> {
        let fees = self.platform_fees;
        let total_fee_pct = fees.total_pct();
        let id = params.strategy;
        let guard = &params.guard;
        let strategy = self
            .strategies
            .get_mut(&id)
            .ok_or(VaultError::InvalidStrategy { strategy: id })?;

        // Yield
        let value_last = strategy.snapshot_value(rates)?;
        if let Some(instruction) = &params.compound {
            strategy.compound(instruction)?;
        }
        let yield_pct = strategy.compute_yield(rates)?;
        let value_now = strategy.value(rates)?;

        // Platform fees
        let supply = strategy.shares.total_supply();
        let fee_shares = platform_fee_shares(supply, value_now, yield_pct, total_fee_pct)?;
        let ecosystem_shares = if fee_shares > 0 {
            mul_div(fee_shares, fees.ecosystem_fee_pct, total_fee_pct)?
        } else {
            0
        };
        let treasury_shares = safe_sub(fee_shares, ecosystem_shares)?;
        strategy.shares.mint(&fees.ecosystem_fee_receiver, ecosystem_shares)?;
        strategy.shares.mint(&fees.treasury_fee_receiver, treasury_shares)?;
        let supply_at_dhw = strategy.shares.total_supply();

        // Flows
        let asset_count = strategy.pending_deposits.len();
        let deposited = core::mem::replace(&mut strategy.pending_deposits, zero_amounts(asset_count));
        let redeemed = core::mem::take(&mut strategy.pending_redeemed_shares);
        let deposit_value = assets_value(&deposited, rates)?;
        let redeem_value = if redeemed > 0 {
            mul_div(value_now, redeemed, supply_at_dhw)?
        } else {
            0
        };

        let mut status = EpochStatus::Settled;
        let mut payload = None;
        let (shares_minted, assets_withdrawn) = if redeemed == 0 && deposited.iter().all(|a| *a == 0) {
            if !matches!(guard, SlippageGuard::Idle) {
                return Err(VaultError::InvalidSlippageMode { strategy: id });
            }
            (0, zero_amounts(asset_count))
        } else if deposit_value >= redeem_value {
            // Net deposit: redeemers are paid from the deposits
            let matched = if deposit_value > 0 {
                scale_amounts(&deposited, redeem_value, deposit_value)?
            } else {
                zero_amounts(asset_count)
            };
            let mut to_venue = Vec::with_capacity(asset_count);
            for (d, m) in deposited.iter().zip(&matched) {
                to_venue.push(safe_sub(*d, *m)?);
            }

            let minted = if to_venue.iter().any(|a| *a > 0) {
                let minted = strategy.deposit(&to_venue, deposit_value, value_now, guard)?;
                ledger.transfer_out_many(&STRATEGY_REGISTRY, tokens, &to_venue, &id)?;
                minted
            } else {
                if !matches!(guard, SlippageGuard::Idle) {
                    return Err(VaultError::InvalidSlippageMode { strategy: id });
                }
                strategy.mint_for_value(deposit_value, value_now)?
            };
            (minted, matched)
        } else {
            // Net redeem: depositors buy part of the redeemed shares
            let minted = if deposit_value > 0 {
                strategy.mint_for_value(deposit_value, value_now)?
            } else {
                0
            };
            let venue_shares = redeemed.saturating_sub(minted);
            let mut withdrawn = deposited.clone();
            match strategy.redeem(venue_shares, supply_at_dhw, guard, now)? {
                RedeemOutcome::Completed(assets) => {
                    ledger.transfer_in_many(&STRATEGY_REGISTRY, tokens, &assets)?;
                    add_amounts(&mut withdrawn, &assets)?;
                }
                RedeemOutcome::Pending(ticket) => {
                    status = EpochStatus::PendingContinuation;
                    payload = Some(ticket);
                }
            }
            (minted, withdrawn)
        };
        strategy.shares.burn(&REDEEM_ESCROW_HOLDER, redeemed)?;
        strategy.shares.check_conservation()?;

        // Seal the epoch
        strategy.yield_index = compound_index(strategy.yield_index, net_yield(yield_pct, total_fee_pct))?;
        strategy.take_snapshot();
        let dhw_index = strategy.dhw_index;
        strategy.dhw_index += 1;

        debug!(
            strategy = ?id,
            dhw_index,
            value_last,
            value_now,
            yield_pct,
            shares_minted,
            shares_redeemed = redeemed,
            "strategy settled"
        );

        let record = EpochRecord {
            status,
            deposited,
            shares_redeemed: redeemed,
            shares_minted,
            assets_withdrawn,
            exchange_rates: rates.to_vec(),
            value_at_dhw: value_now,
            supply_at_dhw,
            yield_pct,
            fee_shares,
            yield_index: strategy.yield_index,
            timestamp: now,
            payload,
        };
        let settled = record.is_settled();
        self.epochs.insert((id, dhw_index), record);

        if fee_shares > 0 {
            events.emit(VaultEvent::PlatformFeesMinted {
                strategy: id,
                dhw_index,
                ecosystem_shares,
                treasury_shares,
                timestamp: now,
            });
        }
        events.emit(VaultEvent::StrategyDhw {
            strategy: id,
            dhw_index,
            yield_pct,
            value_at_dhw: value_now,
            shares_minted,
            shares_redeemed: redeemed,
            settled,
            timestamp: now,
        });
        Ok(())
    }

    /// Complete pending non-atomic epochs.
    ///
    /// A venue error (for example a running cooldown) fails the call and
    /// leaves the epoch pending.
    pub fn do_hard_work_continue(
        &mut self,
        ledger: &mut AssetLedger,
        asset_groups: &AssetGroupRegistry,
        batch: &DhwContinueBatch,
        now: u64,
    ) -> VaultResult<EventLog> {
        if now > batch.valid_until {
            return Err(VaultError::DoHardWorkParametersExpired {
                valid_until: batch.valid_until,
                now,
            });
        }
        if batch.strategies.is_empty() {
            return Err(VaultError::NoStrategies);
        }

        self.staged(ledger, |registry, ledger| {
            let mut events = EventLog::new();
            for params in &batch.strategies {
                let id = params.strategy;
                require_not_ghost(&id)?;
                let strategy = registry
                    .strategies
                    .get_mut(&id)
                    .ok_or(VaultError::InvalidStrategy { strategy: id })?;
                let dhw_index = strategy.dhw_index - 1;
                let record = registry
                    .epochs
                    .get_mut(&(id, dhw_index))
                    .filter(|r| r.status == EpochStatus::PendingContinuation)
                    .ok_or(VaultError::NoPendingContinuation { strategy: id })?;
                let payload = record.payload.clone().ok_or(VaultError::InvalidStateTransition)?;

                strategy.before_redeem_check(&params.guard)?;
                let assets = strategy.venue.resume(&payload, &params.data, now)?;
                params.guard.check_assets_out(&id, &assets)?;

                let tokens = asset_groups.get(strategy.asset_group_id)?;
                ledger.transfer_in_many(&STRATEGY_REGISTRY, tokens, &assets)?;
                add_amounts(&mut record.assets_withdrawn, &assets)?;
                record.status = EpochStatus::Settled;
                record.payload = None;

                info!(strategy = ?id, dhw_index, "DHW continuation settled");
                events.emit(VaultEvent::StrategyDhwContinued {
                    strategy: id,
                    dhw_index,
                    assets_withdrawn: assets,
                    timestamp: now,
                });
            }
            Ok(events)
        })
    }
}
