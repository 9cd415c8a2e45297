//! Strategy Registry
//!
//! Owns every strategy unit and its epoch history, and settles them in
//! do-hard-work batches (see [`dhw`]).
//!
//! ## Atomicity
//!
//! Every mutating entry point that touches more than one strategy, or the
//! asset ledger, runs on a staged copy of the registry and ledger and only
//! commits when the whole call succeeded.

pub mod dhw;
pub mod epoch;

use tracing::{info, warn};

use yieldvault_common::{
    asset_group::AssetGroupRegistry,
    asset_ledger::AssetLedger,
    config::validate_platform_fees,
    constants::components::STRATEGY_REGISTRY,
    constants::{GHOST_STRATEGY, REDEEM_ESCROW_HOLDER, UNCLAIMED_HOLDER},
    errors::{VaultError, VaultResult},
    events::{EventLog, VaultEvent},
    math::{add_amounts, zero_amounts},
    types::{Address, AssetGroupId, DhwIndex, PlatformFees, StrategyId, VaultId},
    validation::require_same_length,
    BTreeMap, Vec,
};
use yieldvault_strategy::{RedeemOutcome, SlippageGuard, Strategy, StrategyStatus, Venue, YieldBounds, YieldVenue};

pub use dhw::{ContinueParams, DhwBatch, DhwContinueBatch, DhwGroup, NetFlow, StrategyDhwParams};
pub use epoch::{EpochRecord, EpochStatus};

#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: BTreeMap<StrategyId, Strategy>,
    epochs: BTreeMap<(StrategyId, DhwIndex), EpochRecord>,
    platform_fees: PlatformFees,
}

impl StrategyRegistry {
    pub fn new(platform_fees: PlatformFees) -> VaultResult<Self> {
        validate_platform_fees(&platform_fees)?;
        Ok(Self {
            strategies: BTreeMap::new(),
            epochs: BTreeMap::new(),
            platform_fees,
        })
    }

    /// Run `f` on a staged copy of the registry and ledger; commit on success
    fn staged<T>(
        &mut self,
        ledger: &mut AssetLedger,
        f: impl FnOnce(&mut Self, &mut AssetLedger) -> VaultResult<T>,
    ) -> VaultResult<T> {
        let mut registry = self.clone();
        let mut staged_ledger = ledger.clone();
        let result = f(&mut registry, &mut staged_ledger)?;
        *self = registry;
        *ledger = staged_ledger;
        Ok(result)
    }

    // ============ Registration ============

    pub fn register_strategy(
        &mut self,
        id: StrategyId,
        asset_groups: &AssetGroupRegistry,
        asset_group_id: AssetGroupId,
        venue: Venue,
        yield_bounds: YieldBounds,
    ) -> VaultResult<()> {
        if id == GHOST_STRATEGY || id == UNCLAIMED_HOLDER || id == REDEEM_ESCROW_HOLDER {
            return Err(VaultError::InvalidStrategy { strategy: id });
        }
        if self.strategies.contains_key(&id) {
            return Err(VaultError::StrategyAlreadyRegistered { strategy: id });
        }
        let asset_count = asset_groups.group_len(asset_group_id)?;
        require_same_length(asset_count, venue.underlying().len())?;

        self.strategies
            .insert(id, Strategy::new(id, asset_group_id, asset_count, venue, yield_bounds));
        info!(strategy = ?id, asset_group_id, "strategy registered");
        Ok(())
    }

    /// Retire a strategy.
    ///
    /// Active strategies must have no unsettled flows; an emergency-exited
    /// strategy can always be removed.
    pub fn remove_strategy(&mut self, id: &StrategyId) -> VaultResult<()> {
        let has_continuation = self.has_pending_continuation(id);
        let strategy = self.strategy_mut(id)?;
        match strategy.status {
            StrategyStatus::Active => {
                if strategy.has_pending_flows() || has_continuation {
                    return Err(VaultError::StrategyHasPendingFlows { strategy: *id });
                }
            }
            StrategyStatus::EmergencyExited => {}
            StrategyStatus::EmergencyPending { .. } => {
                return Err(VaultError::StrategyHasPendingFlows { strategy: *id });
            }
            StrategyStatus::Removed => {
                return Err(VaultError::StrategyNotActive { strategy: *id });
            }
        }
        strategy.status = StrategyStatus::Removed;
        info!(strategy = ?id, "strategy removed");
        Ok(())
    }

    pub fn set_platform_fees(&mut self, fees: PlatformFees) -> VaultResult<()> {
        validate_platform_fees(&fees)?;
        self.platform_fees = fees;
        Ok(())
    }

    pub fn platform_fees(&self) -> &PlatformFees {
        &self.platform_fees
    }

    // ============ Queries ============

    pub fn strategy(&self, id: &StrategyId) -> VaultResult<&Strategy> {
        self.strategies
            .get(id)
            .ok_or(VaultError::InvalidStrategy { strategy: *id })
    }

    fn strategy_mut(&mut self, id: &StrategyId) -> VaultResult<&mut Strategy> {
        self.strategies
            .get_mut(id)
            .ok_or(VaultError::InvalidStrategy { strategy: *id })
    }

    /// Test and operator hook: direct access to a strategy's venue
    pub fn venue_mut(&mut self, id: &StrategyId) -> VaultResult<&mut Venue> {
        Ok(&mut self.strategy_mut(id)?.venue)
    }

    pub fn is_registered(&self, id: &StrategyId) -> bool {
        self.strategies.contains_key(id)
    }

    /// Index currently collecting flows
    pub fn current_index(&self, id: &StrategyId) -> VaultResult<DhwIndex> {
        Ok(self.strategy(id)?.dhw_index)
    }

    pub fn epoch(&self, id: &StrategyId, index: DhwIndex) -> Option<&EpochRecord> {
        self.epochs.get(&(*id, index))
    }

    /// Whether DHW index `index` of the strategy has fully settled.
    ///
    /// The ghost strategy is always settled.
    pub fn is_settled(&self, id: &StrategyId, index: DhwIndex) -> bool {
        if *id == GHOST_STRATEGY {
            return true;
        }
        self.epoch(id, index).map(|r| r.is_settled()).unwrap_or(false)
    }

    /// Whether the latest epoch is waiting for continuation
    pub fn has_pending_continuation(&self, id: &StrategyId) -> bool {
        self.strategies
            .get(id)
            .and_then(|s| self.epoch(id, s.dhw_index.saturating_sub(1)))
            .map(|r| r.status == EpochStatus::PendingContinuation)
            .unwrap_or(false)
    }

    /// Value of the live venue position at the given rates
    pub fn strategy_value(&self, id: &StrategyId, rates: &[u128]) -> VaultResult<u128> {
        self.strategy(id)?.value(rates)
    }

    pub fn share_balance(&self, id: &StrategyId, holder: &Address) -> VaultResult<u128> {
        Ok(self.strategy(id)?.shares.balance_of(holder))
    }

    pub fn share_supply(&self, id: &StrategyId) -> VaultResult<u128> {
        Ok(self.strategy(id)?.shares.total_supply())
    }

    pub fn strategy_ids(&self) -> impl Iterator<Item = &StrategyId> {
        self.strategies.keys()
    }

    // ============ Vault Flows ============

    /// Route flushed deposits into each strategy's current index.
    ///
    /// Ghost strategies must receive nothing and report index 0.
    pub fn add_deposits(&mut self, strategies: &[StrategyId], amounts: &[Vec<u128>]) -> VaultResult<Vec<DhwIndex>> {
        require_same_length(strategies.len(), amounts.len())?;
        let mut indexes = Vec::with_capacity(strategies.len());
        for (id, deposit) in strategies.iter().zip(amounts) {
            if *id == GHOST_STRATEGY {
                if deposit.iter().any(|a| *a > 0) {
                    return Err(VaultError::GhostStrategy { strategy: *id });
                }
                indexes.push(0);
                continue;
            }
            let strategy = self.strategy_mut(id)?;
            if deposit.iter().any(|a| *a > 0) {
                strategy.require_active()?;
                add_amounts(&mut strategy.pending_deposits, deposit)?;
            }
            indexes.push(strategy.dhw_index);
        }
        Ok(indexes)
    }

    /// Route released strategy shares into each strategy's current index
    pub fn add_withdrawals(&mut self, strategies: &[StrategyId], shares: &[u128]) -> VaultResult<Vec<DhwIndex>> {
        require_same_length(strategies.len(), shares.len())?;
        let mut indexes = Vec::with_capacity(strategies.len());
        for (id, amount) in strategies.iter().zip(shares) {
            if *id == GHOST_STRATEGY {
                indexes.push(0);
                continue;
            }
            let strategy = self.strategy_mut(id)?;
            if *amount > 0 {
                strategy.require_active()?;
                strategy.pending_redeemed_shares = strategy
                    .pending_redeemed_shares
                    .checked_add(*amount)
                    .ok_or(VaultError::Overflow)?;
            }
            indexes.push(strategy.dhw_index);
        }
        Ok(indexes)
    }

    /// Move a vault's strategy shares into the redemption escrow
    pub fn release_strategy_shares(
        &mut self,
        vault: &VaultId,
        strategies: &[StrategyId],
        shares: &[u128],
    ) -> VaultResult<()> {
        require_same_length(strategies.len(), shares.len())?;
        for (id, amount) in strategies.iter().zip(shares) {
            if *id == GHOST_STRATEGY || *amount == 0 {
                continue;
            }
            self.strategy_mut(id)?
                .shares
                .transfer(vault, &REDEEM_ESCROW_HOLDER, *amount)?;
        }
        Ok(())
    }

    /// Move minted strategy shares from the unclaimed holder to a vault
    pub fn claim_strategy_shares(
        &mut self,
        vault: &VaultId,
        strategies: &[StrategyId],
        shares: &[u128],
    ) -> VaultResult<()> {
        require_same_length(strategies.len(), shares.len())?;
        for (id, amount) in strategies.iter().zip(shares) {
            if *id == GHOST_STRATEGY || *amount == 0 {
                continue;
            }
            self.strategy_mut(id)?
                .shares
                .transfer(&UNCLAIMED_HOLDER, vault, *amount)?;
        }
        Ok(())
    }

    // ============ Direct Redemptions ============

    /// Fee recipients redeem strategy shares straight from the venue.
    ///
    /// Assets are paid to `receiver` through the ledger.
    #[allow(clippy::too_many_arguments)]
    pub fn redeem_strategy_shares(
        &mut self,
        ledger: &mut AssetLedger,
        asset_groups: &AssetGroupRegistry,
        holder: &Address,
        strategies: &[StrategyId],
        shares: &[u128],
        guards: &[SlippageGuard],
        receiver: &Address,
        now: u64,
    ) -> VaultResult<(Vec<Vec<u128>>, EventLog)> {
        require_same_length(strategies.len(), shares.len())?;
        require_same_length(strategies.len(), guards.len())?;
        if *holder == UNCLAIMED_HOLDER || *holder == REDEEM_ESCROW_HOLDER {
            return Err(VaultError::InvalidInput {
                param: "holder",
                reason: "reserved holder",
            });
        }

        self.staged(ledger, |registry, ledger| {
            let mut events = EventLog::new();
            let mut paid = Vec::with_capacity(strategies.len());
            for ((id, amount), guard) in strategies.iter().zip(shares).zip(guards) {
                let strategy = registry.strategy_mut(id)?;
                let assets = strategy.redeem_shares(holder, *amount, guard, now)?;
                let tokens = asset_groups.get(strategy.asset_group_id)?;
                ledger.transfer_in_many(&STRATEGY_REGISTRY, tokens, &assets)?;
                ledger.transfer_out_many(&STRATEGY_REGISTRY, tokens, &assets, receiver)?;

                events.emit(VaultEvent::StrategySharesRedeemed {
                    strategy: *id,
                    holder: *holder,
                    receiver: *receiver,
                    shares: *amount,
                    assets: assets.clone(),
                    timestamp: now,
                });
                paid.push(assets);
            }
            Ok((paid, events))
        })
    }

    /// Synchronous pro-rata redemption of a vault's strategy shares.
    ///
    /// Redeemed assets land in ledger custody; the caller pays them out.
    /// Only atomic strategies qualify.
    #[allow(clippy::too_many_arguments)]
    pub fn redeem_fast(
        &mut self,
        ledger: &mut AssetLedger,
        asset_groups: &AssetGroupRegistry,
        vault: &VaultId,
        strategies: &[StrategyId],
        shares: &[u128],
        guards: &[SlippageGuard],
        now: u64,
    ) -> VaultResult<Vec<u128>> {
        require_same_length(strategies.len(), shares.len())?;
        require_same_length(strategies.len(), guards.len())?;

        self.staged(ledger, |registry, ledger| {
            let mut total: Option<Vec<u128>> = None;
            for ((id, amount), guard) in strategies.iter().zip(shares).zip(guards) {
                if *id == GHOST_STRATEGY || *amount == 0 {
                    continue;
                }
                let strategy = registry.strategy_mut(id)?;
                if !strategy.is_atomic() {
                    return Err(VaultError::NonAtomicStrategy { strategy: *id });
                }
                let assets = strategy.redeem_shares(vault, *amount, guard, now)?;
                let tokens = asset_groups.get(strategy.asset_group_id)?;
                ledger.transfer_in_many(&STRATEGY_REGISTRY, tokens, &assets)?;

                let sum = total.get_or_insert_with(|| zero_amounts(assets.len()));
                add_amounts(sum, &assets)?;
            }
            total.ok_or(VaultError::ZeroAmount)
        })
    }

    // ============ Emergency ============

    /// Pull every listed venue position out to `recipient`.
    ///
    /// Cooldown venues need two calls: the first starts the unstake, the
    /// second (after the cooldown) pays out. Flushed deposits the strategy
    /// has not invested yet go to `recipient` on the first call.
    pub fn emergency_withdraw(
        &mut self,
        ledger: &mut AssetLedger,
        asset_groups: &AssetGroupRegistry,
        strategies: &[StrategyId],
        guards: &[SlippageGuard],
        recipient: &Address,
        now: u64,
    ) -> VaultResult<EventLog> {
        require_same_length(strategies.len(), guards.len())?;

        self.staged(ledger, |registry, ledger| {
            let mut events = EventLog::new();
            for (id, guard) in strategies.iter().zip(guards) {
                let strategy = registry.strategy_mut(id)?;
                let outcome = strategy.emergency_withdraw(guard, now)?;
                let tokens = asset_groups.get(strategy.asset_group_id)?;

                let asset_count = strategy.pending_deposits.len();
                let swept = core::mem::replace(&mut strategy.pending_deposits, zero_amounts(asset_count));
                if swept.iter().any(|a| *a > 0) {
                    ledger.transfer_out_many(&STRATEGY_REGISTRY, tokens, &swept, recipient)?;
                }

                let (mut assets, completed) = match outcome {
                    RedeemOutcome::Completed(assets) => {
                        ledger.transfer_in_many(&STRATEGY_REGISTRY, tokens, &assets)?;
                        ledger.transfer_out_many(&STRATEGY_REGISTRY, tokens, &assets, recipient)?;
                        (assets, true)
                    }
                    RedeemOutcome::Pending(_) => (zero_amounts(asset_count), false),
                };
                add_amounts(&mut assets, &swept)?;
                warn!(strategy = ?id, completed, ?swept, "emergency withdrawal");
                events.emit(VaultEvent::EmergencyWithdrawal {
                    strategy: *id,
                    recipient: *recipient,
                    assets,
                    completed,
                    timestamp: now,
                });
            }
            Ok(events)
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use yieldvault_strategy::LendingPool;

    #[test]
    fn test_register_validation() {
        let mut f = fixture();
        assert_eq!(
            f.registry.register_strategy(
                LENDING,
                &f.groups,
                1,
                Venue::LendingPool(LendingPool::new(1)),
                YieldBounds::default()
            ),
            Err(VaultError::StrategyAlreadyRegistered { strategy: LENDING })
        );
        assert!(matches!(
            f.registry.register_strategy(
                GHOST_STRATEGY,
                &f.groups,
                1,
                Venue::LendingPool(LendingPool::new(1)),
                YieldBounds::default()
            ),
            Err(VaultError::InvalidStrategy { .. })
        ));
        assert_eq!(
            f.registry.register_strategy(
                [0x99; 32],
                &f.groups,
                9,
                Venue::LendingPool(LendingPool::new(1)),
                YieldBounds::default()
            ),
            Err(VaultError::InvalidAssetGroup { asset_group_id: 9 })
        );
        assert!(matches!(
            f.registry.register_strategy(
                [0x99; 32],
                &f.groups,
                1,
                Venue::LendingPool(LendingPool::new(2)),
                YieldBounds::default()
            ),
            Err(VaultError::InvalidArrayLength { .. })
        ));
    }

    #[test]
    fn test_flows_report_current_index() {
        let mut f = fixture();
        assert_eq!(f.registry.current_index(&LENDING).unwrap(), 1);
        let index = f.route_deposit(LENDING, 100 * ONE);
        assert_eq!(index, 1);
        assert!(f.registry.strategy(&LENDING).unwrap().has_pending_flows());
        assert!(!f.registry.is_settled(&LENDING, 1));
        assert!(f.registry.is_settled(&GHOST_STRATEGY, 1));

        assert!(matches!(
            f.registry.add_deposits(&[GHOST_STRATEGY], &[vec![1]]),
            Err(VaultError::GhostStrategy { .. })
        ));
    }

    #[test]
    fn test_remove_requires_no_pending_flows() {
        let mut f = fixture();
        f.route_deposit(LENDING, ONE);
        assert_eq!(
            f.registry.remove_strategy(&LENDING),
            Err(VaultError::StrategyHasPendingFlows { strategy: LENDING })
        );
        f.registry.remove_strategy(&STAKING).unwrap();
        assert_eq!(
            f.registry.strategy(&STAKING).unwrap().status,
            StrategyStatus::Removed
        );
        assert!(f.registry.remove_strategy(&[0x99; 32]).is_err());
    }

    #[test]
    fn test_emergency_withdraw_sweeps_uninvested_deposits() {
        let mut f = fixture();
        let recovery: Address = [0xEE; 32];
        f.route_deposit(LENDING, 300 * ONE);

        let events = f
            .registry
            .emergency_withdraw(&mut f.ledger, &f.groups, &[LENDING], &[SlippageGuard::redeem_any()], &recovery, 5)
            .unwrap();
        assert_eq!(f.ledger.paid_out(&recovery, &USDC), 300 * ONE);
        assert_eq!(f.ledger.balance_of(&USDC), 0);

        let strategy = f.registry.strategy(&LENDING).unwrap();
        assert_eq!(strategy.pending_deposits, vec![0]);
        assert_eq!(strategy.status, StrategyStatus::EmergencyExited);
        assert_eq!(
            events.events(),
            &[VaultEvent::EmergencyWithdrawal {
                strategy: LENDING,
                recipient: recovery,
                assets: vec![300 * ONE],
                completed: true,
                timestamp: 5,
            }]
        );
        f.registry.remove_strategy(&LENDING).unwrap();
    }

    #[test]
    fn test_platform_fee_caps() {
        let mut f = fixture();
        let mut fees = platform_fees();
        fees.ecosystem_fee_pct = 25_00;
        assert!(matches!(
            f.registry.set_platform_fees(fees),
            Err(VaultError::FeeTooLarge { .. })
        ));
        assert_eq!(f.registry.platform_fees(), &platform_fees());
    }
}
