//! Smart Vault Manager
//!
//! Orchestrator façade over the settlement kernel. It owns the asset
//! ledger, asset groups, strategy registry, both flow managers and every
//! smart vault, and receives its collaborators (price feed, guard engine,
//! allocation provider) at construction.
//!
//! ## Call model
//!
//! Every entry point takes a [`CallContext`] (caller and timestamp), checks
//! roles and guards, and then runs on a staged copy of the kernel state
//! that is only committed when the whole call succeeded. User requests run
//! the guard engine's post-request guards on the staged copy as well.
//!
//! ## Lifecycle of a vault flow
//!
//! ```text
//! deposit / redeem ──► flush_smart_vault ──► do_hard_work ──► sync_smart_vault ──► claim
//!                                            (continue)
//! ```

#[cfg(test)]
mod integration_tests;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use yieldvault_common::{
    access_control::{AccessControl, Role, RoleRegistry},
    asset_group::AssetGroupRegistry,
    asset_ledger::AssetLedger,
    config::KernelConfig,
    constants::components::{DEPOSIT_MANAGER, STRATEGY_REGISTRY, WITHDRAWAL_MANAGER},
    constants::limits::STRATEGY_COUNT_CAP,
    constants::vault_fees::{DEPOSIT_FEE_MAX, MANAGEMENT_FEE_MAX, PERFORMANCE_FEE_MAX},
    errors::{VaultError, VaultResult},
    events::{EventLog, VaultEvent},
    guard::{AllocationProvider, GuardEngine, RequestContext, RequestType},
    math::zero_amounts,
    oracle::PriceFeed,
    types::{Address, AssetGroupId, CallContext, PlatformFees, ReceiptId, SmartVaultFees, StrategyId, VaultId},
    validation::{require_fee_within, require_full_allocation, require_not_ghost, require_unique},
    vault::SmartVault,
    BTreeMap, Vec,
};
use yieldvault_deposit_manager::{DepositManager, DepositSyncResult};
use yieldvault_strategy::{CooldownStaking, SlippageGuard, Venue, YieldBounds, YieldVenue};
use yieldvault_strategy_registry::{DhwBatch, DhwContinueBatch, StrategyRegistry};
use yieldvault_withdrawal_manager::WithdrawalManager;

// ============ Parameters and Results ============

/// Smart vault creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct VaultParams {
    pub id: VaultId,
    pub asset_group_id: AssetGroupId,
    pub strategies: Vec<StrategyId>,
    /// Requested allocation, passed through the allocation provider
    pub allocation: Vec<u128>,
    pub fees: SmartVaultFees,
    pub fee_recipient: Address,
}

/// Result of syncing one flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushSync {
    pub flush_index: u64,
    pub deposits: DepositSyncResult,
    /// Assets withdrawn for the flush's redemptions
    pub assets_withdrawn: Vec<u128>,
}

// ============ Kernel State ============

/// Everything a call may mutate
#[derive(Debug, Clone)]
pub struct KernelState {
    pub ledger: AssetLedger,
    pub asset_groups: AssetGroupRegistry,
    pub registry: StrategyRegistry,
    pub deposits: DepositManager,
    pub withdrawals: WithdrawalManager,
    pub vaults: BTreeMap<VaultId, SmartVault>,
    pub events: EventLog,
}

impl KernelState {
    fn new(platform_fees: PlatformFees) -> VaultResult<Self> {
        let mut ledger = AssetLedger::new();
        ledger.allow(DEPOSIT_MANAGER);
        ledger.allow(WITHDRAWAL_MANAGER);
        ledger.allow(STRATEGY_REGISTRY);
        Ok(Self {
            ledger,
            asset_groups: AssetGroupRegistry::new(),
            registry: StrategyRegistry::new(platform_fees)?,
            deposits: DepositManager::new(),
            withdrawals: WithdrawalManager::new(),
            vaults: BTreeMap::new(),
            events: EventLog::new(),
        })
    }

    /// Run `f` on a copy of the state; commit on success
    fn staged<T>(&mut self, f: impl FnOnce(&mut Self) -> VaultResult<T>) -> VaultResult<T> {
        let mut staged = self.clone();
        let result = f(&mut staged)?;
        *self = staged;
        Ok(result)
    }

    fn vault(&self, id: &VaultId) -> VaultResult<&SmartVault> {
        self.vaults
            .get(id)
            .ok_or(VaultError::SmartVaultNotFound { vault: *id })
    }

    fn vault_mut(&mut self, id: &VaultId) -> VaultResult<&mut SmartVault> {
        self.vaults
            .get_mut(id)
            .ok_or(VaultError::SmartVaultNotFound { vault: *id })
    }

    /// Route the vault's pending deposits and redemptions into the
    /// strategies' current DHW indexes and close the flush.
    fn flush_vault<P: PriceFeed + ?Sized>(&mut self, price_feed: &P, vault_id: &VaultId, now: u64) -> VaultResult<u64> {
        let vault = self
            .vaults
            .get(vault_id)
            .ok_or(VaultError::SmartVaultNotFound { vault: *vault_id })?;
        let tokens = self.asset_groups.get(vault.asset_group_id)?;
        let rates = price_feed.exchange_rates(tokens)?;
        let deposits = self
            .deposits
            .pending_deposits(vault_id)
            .map(|amounts| amounts.to_vec())
            .unwrap_or_else(|| zero_amounts(tokens.len()));
        let vault_shares_redeemed = self.withdrawals.pending_shares(vault_id);

        let deposit_indexes = match self.deposits.flush_smart_vault(vault, &mut self.registry, &rates) {
            Ok(indexes) => Some(indexes),
            Err(VaultError::NothingToFlush) => None,
            Err(e) => return Err(e),
        };
        let withdrawal_indexes = match self.withdrawals.flush_smart_vault(vault, &mut self.registry) {
            Ok(indexes) => Some(indexes),
            Err(VaultError::NothingToFlush) => None,
            Err(e) => return Err(e),
        };
        let dhw_indexes = deposit_indexes
            .or(withdrawal_indexes)
            .ok_or(VaultError::NothingToFlush)?;

        // An unsynced flush sharing a strategy epoch could not be told apart at sync
        for earlier in vault.flush_index.to_sync..vault.flush_index.current {
            let earlier_indexes = vault.flush_dhw(earlier)?;
            for (i, strategy) in vault.live_strategies() {
                if earlier_indexes[i] == dhw_indexes[i] {
                    return Err(VaultError::FlushOverlap {
                        strategy: *strategy,
                        dhw_index: dhw_indexes[i],
                    });
                }
            }
        }

        let vault = self.vault_mut(vault_id)?;
        let flush_index = vault.close_flush(dhw_indexes.clone());
        info!(vault = ?vault_id, flush_index, ?dhw_indexes, "smart vault flushed");
        self.events.emit(VaultEvent::SmartVaultFlushed {
            vault: *vault_id,
            flush_index,
            deposits,
            vault_shares_redeemed,
            dhw_indexes,
            timestamp: now,
        });
        Ok(flush_index)
    }

    /// Sync the oldest unsynced flush
    fn sync_flush(&mut self, vault_id: &VaultId, now: u64) -> VaultResult<FlushSync> {
        let vault = self.vault(vault_id)?;
        if vault.flush_index.is_synced() {
            return Err(VaultError::InvalidStateTransition);
        }
        let flush_index = vault.flush_index.to_sync;
        let asset_count = self.asset_groups.group_len(vault.asset_group_id)?;
        // Burned by redemptions not flushed yet; still priced into the vault
        let pending_redeemed = self.withdrawals.pending_shares(vault_id);

        // Settlement checks before anything moves
        self.deposits
            .sync_deposits_simulate(vault, &self.registry, flush_index, pending_redeemed)?;
        self.withdrawals
            .withdrawn_assets(vault, &self.registry, flush_index, asset_count)?;

        let vault = self
            .vaults
            .get_mut(vault_id)
            .ok_or(VaultError::SmartVaultNotFound { vault: *vault_id })?;
        let deposits = self
            .deposits
            .sync_deposits(vault, &mut self.registry, flush_index, pending_redeemed)?;
        let assets_withdrawn = self
            .withdrawals
            .sync_withdrawals(vault, &self.registry, flush_index, asset_count)?;
        vault.advance_sync(deposits.dhw_timestamp)?;
        vault.shares.check_conservation()?;

        self.events.emit(VaultEvent::SmartVaultSynced {
            vault: *vault_id,
            flush_index,
            vault_shares_minted: deposits.vault_shares_minted,
            fee_shares_minted: deposits.fee_shares(),
            assets_withdrawn: assets_withdrawn.clone(),
            timestamp: now,
        });
        Ok(FlushSync {
            flush_index,
            deposits,
            assets_withdrawn,
        })
    }
}

// ============ Smart Vault Manager ============

pub struct SmartVaultManager<P, G, A> {
    state: KernelState,
    roles: RoleRegistry,
    config: KernelConfig,
    price_feed: P,
    guards: G,
    allocation: A,
}

impl<P, G, A> SmartVaultManager<P, G, A>
where
    P: PriceFeed,
    G: GuardEngine,
    A: AllocationProvider,
{
    /// Create a kernel with `admin` as the bootstrap administrator.
    ///
    /// # Errors
    /// Returns `FeeTooLarge` or `InvalidInput` if `config` does not validate.
    pub fn new(admin: Address, config: KernelConfig, price_feed: P, guards: G, allocation: A) -> VaultResult<Self> {
        config.validate()?;
        Ok(Self {
            state: KernelState::new(config.platform_fees)?,
            roles: RoleRegistry::new(admin),
            config,
            price_feed,
            guards,
            allocation,
        })
    }

    // ============ Accessors ============

    pub fn state(&self) -> &KernelState {
        &self.state
    }

    pub fn vault(&self, id: &VaultId) -> VaultResult<&SmartVault> {
        self.state.vault(id)
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.state.registry
    }

    pub fn ledger(&self) -> &AssetLedger {
        &self.state.ledger
    }

    pub fn events(&self) -> &EventLog {
        &self.state.events
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    pub fn price_feed_mut(&mut self) -> &mut P {
        &mut self.price_feed
    }

    pub fn guards_mut(&mut self) -> &mut G {
        &mut self.guards
    }

    /// Test and operator hook on a strategy's venue
    pub fn venue_mut(&mut self, strategy: &StrategyId) -> VaultResult<&mut Venue> {
        self.state.registry.venue_mut(strategy)
    }

    pub fn grant_role(&mut self, ctx: &CallContext, role: Role, account: Address) -> VaultResult<()> {
        self.roles.grant_role(&ctx.caller, role, account)
    }

    pub fn revoke_role(&mut self, ctx: &CallContext, role: Role, account: &Address) -> VaultResult<()> {
        self.roles.revoke_role(&ctx.caller, role, account)
    }

    // ============ Administration ============

    pub fn register_asset_group(&mut self, ctx: &CallContext, assets: &[Address]) -> VaultResult<AssetGroupId> {
        self.roles.ensure_role(Role::Admin, &ctx.caller)?;
        let asset_group_id = self.state.asset_groups.register(assets)?;
        self.state.events.emit(VaultEvent::AssetGroupRegistered {
            asset_group_id,
            assets: assets.to_vec(),
            timestamp: ctx.timestamp,
        });
        Ok(asset_group_id)
    }

    /// Register a strategy; `yield_bounds` defaults to the configured bounds
    pub fn register_strategy(
        &mut self,
        ctx: &CallContext,
        strategy: StrategyId,
        asset_group_id: AssetGroupId,
        venue: Venue,
        yield_bounds: Option<YieldBounds>,
    ) -> VaultResult<()> {
        self.roles.ensure_role(Role::Admin, &ctx.caller)?;
        let bounds = match yield_bounds {
            Some(bounds) => bounds,
            None => YieldBounds::new(self.config.default_min_yield, self.config.default_max_yield)?,
        };
        let atomic = venue.is_atomic();
        self.state
            .registry
            .register_strategy(strategy, &self.state.asset_groups, asset_group_id, venue, bounds)?;
        self.state.events.emit(VaultEvent::StrategyRegistered {
            strategy,
            asset_group_id,
            atomic,
            timestamp: ctx.timestamp,
        });
        Ok(())
    }

    /// Cooldown venue for an asset group using the configured unstake cooldown
    pub fn cooldown_venue(&self, asset_group_id: AssetGroupId) -> VaultResult<Venue> {
        let asset_count = self.state.asset_groups.group_len(asset_group_id)?;
        Ok(Venue::CooldownStaking(CooldownStaking::new(
            asset_count,
            self.config.unstake_cooldown,
        )))
    }

    pub fn set_platform_fees(&mut self, ctx: &CallContext, fees: PlatformFees) -> VaultResult<()> {
        self.roles.ensure_role(Role::Admin, &ctx.caller)?;
        self.state.registry.set_platform_fees(fees)?;
        self.config.platform_fees = fees;
        self.state.events.emit(VaultEvent::PlatformFeesUpdated {
            ecosystem_fee_pct: fees.ecosystem_fee_pct,
            treasury_fee_pct: fees.treasury_fee_pct,
            timestamp: ctx.timestamp,
        });
        Ok(())
    }

    /// Create a smart vault.
    ///
    /// Strategies must be registered, active, distinct and in the vault's
    /// asset group; the provider's allocation must sum to 100%.
    pub fn create_vault(&mut self, ctx: &CallContext, params: VaultParams) -> VaultResult<()> {
        if !self.roles.has_role(Role::Admin, &ctx.caller) {
            self.roles.ensure_role(Role::VaultIntegrator, &ctx.caller)?;
        }
        if self.state.vaults.contains_key(&params.id) {
            return Err(VaultError::SmartVaultAlreadyRegistered { vault: params.id });
        }
        self.state.asset_groups.get(params.asset_group_id)?;
        if params.strategies.is_empty() {
            return Err(VaultError::NoStrategies);
        }
        if params.strategies.len() > STRATEGY_COUNT_CAP {
            return Err(VaultError::InvalidInput {
                param: "strategies",
                reason: "too many strategies",
            });
        }
        require_unique(&params.strategies, "strategies")?;

        let mut yield_indexes = Vec::with_capacity(params.strategies.len());
        for id in &params.strategies {
            require_not_ghost(id)?;
            let strategy = self.state.registry.strategy(id)?;
            strategy.require_active()?;
            if strategy.asset_group_id != params.asset_group_id {
                return Err(VaultError::InvalidAssetGroup {
                    asset_group_id: params.asset_group_id,
                });
            }
            yield_indexes.push(strategy.yield_index);
        }

        require_fee_within(params.fees.management_fee_pct, MANAGEMENT_FEE_MAX)?;
        require_fee_within(params.fees.deposit_fee_pct, DEPOSIT_FEE_MAX)?;
        require_fee_within(params.fees.performance_fee_pct, PERFORMANCE_FEE_MAX)?;

        let allocation = self.allocation.allocation(&params.strategies, &params.allocation)?;
        require_full_allocation(&allocation)?;

        let vault = SmartVault::new(
            params.id,
            params.asset_group_id,
            params.strategies.clone(),
            allocation.clone(),
            params.fees,
            params.fee_recipient,
            yield_indexes,
            ctx.timestamp,
        );
        self.state.vaults.insert(params.id, vault);
        info!(vault = ?params.id, asset_group_id = params.asset_group_id, "smart vault created");
        self.state.events.emit(VaultEvent::SmartVaultCreated {
            vault: params.id,
            asset_group_id: params.asset_group_id,
            strategies: params.strategies,
            allocation,
            timestamp: ctx.timestamp,
        });
        Ok(())
    }

    /// Retire a strategy and ghost it in every vault.
    ///
    /// Vaults forfeit whatever the strategy still holds for them, so the
    /// position should be emergency withdrawn first.
    pub fn remove_strategy(&mut self, ctx: &CallContext, strategy: &StrategyId) -> VaultResult<u32> {
        self.roles.ensure_role(Role::Admin, &ctx.caller)?;
        self.state.staged(|state| {
            state.registry.remove_strategy(strategy)?;
            let mut vaults_affected = 0u32;
            for vault in state.vaults.values_mut() {
                if vault.ghost_strategy(strategy) {
                    vaults_affected += 1;
                }
            }
            warn!(strategy = ?strategy, vaults_affected, "strategy removed");
            state.events.emit(VaultEvent::StrategyRemoved {
                strategy: *strategy,
                vaults_affected,
                timestamp: ctx.timestamp,
            });
            Ok(vaults_affected)
        })
    }

    // ============ User Flows ============

    /// Run the pre-request guards and return the context for the post-request ones
    fn run_guards(
        &self,
        ctx: &CallContext,
        vault: &VaultId,
        request_type: RequestType,
        owner: Address,
        receiver: Address,
        amounts: Vec<u128>,
    ) -> VaultResult<RequestContext> {
        let request = RequestContext {
            vault: *vault,
            request_type,
            executor: ctx.caller,
            owner,
            receiver,
            amounts,
        };
        self.guards.run_guards(&request)?;
        Ok(request)
    }

    /// Deposit assets for `receiver`; optionally flush right away
    pub fn deposit(
        &mut self,
        ctx: &CallContext,
        vault_id: &VaultId,
        assets: &[u128],
        receiver: &Address,
        referral: Option<Address>,
        do_flush: bool,
    ) -> VaultResult<ReceiptId> {
        let request = self.run_guards(ctx, vault_id, RequestType::Deposit, ctx.caller, *receiver, assets.to_vec())?;
        let price_feed = &self.price_feed;
        let guard_engine = &self.guards;
        self.state.staged(|state| {
            let vault = state
                .vaults
                .get_mut(vault_id)
                .ok_or(VaultError::SmartVaultNotFound { vault: *vault_id })?;
            let tokens = state.asset_groups.get(vault.asset_group_id)?;
            let receipt_id = state
                .deposits
                .deposit_assets(&mut state.ledger, vault, tokens, assets, receiver, ctx.timestamp)?;
            let flush_index = vault.flush_index.current;
            state.events.emit(VaultEvent::DepositInitiated {
                vault: *vault_id,
                receipt_id,
                receiver: *receiver,
                assets: assets.to_vec(),
                flush_index,
                referral: referral.unwrap_or([0u8; 32]),
                timestamp: ctx.timestamp,
            });
            if do_flush {
                state.flush_vault(price_feed, vault_id, ctx.timestamp)?;
            }
            guard_engine.run_post_guards(&request)?;
            Ok(receipt_id)
        })
    }

    /// Queue the caller's vault shares for redemption to `receiver`
    pub fn redeem(
        &mut self,
        ctx: &CallContext,
        vault_id: &VaultId,
        shares: u128,
        receiver: &Address,
        do_flush: bool,
    ) -> VaultResult<ReceiptId> {
        let owner = ctx.caller;
        let request = self.run_guards(ctx, vault_id, RequestType::Withdrawal, owner, *receiver, Vec::from([shares]))?;
        let price_feed = &self.price_feed;
        let guard_engine = &self.guards;
        self.state.staged(|state| {
            let vault = state
                .vaults
                .get_mut(vault_id)
                .ok_or(VaultError::SmartVaultNotFound { vault: *vault_id })?;
            let receipt_id = state.withdrawals.redeem(vault, shares, &owner, receiver)?;
            let flush_index = vault.flush_index.current;
            state.events.emit(VaultEvent::RedeemInitiated {
                vault: *vault_id,
                receipt_id,
                owner,
                receiver: *receiver,
                vault_shares: shares,
                flush_index,
                timestamp: ctx.timestamp,
            });
            if do_flush {
                state.flush_vault(price_feed, vault_id, ctx.timestamp)?;
            }
            guard_engine.run_post_guards(&request)?;
            Ok(receipt_id)
        })
    }

    /// Redeem the caller's vault shares synchronously from atomic venues
    pub fn redeem_fast(
        &mut self,
        ctx: &CallContext,
        vault_id: &VaultId,
        shares: u128,
        guards: &[SlippageGuard],
    ) -> VaultResult<Vec<u128>> {
        let owner = ctx.caller;
        let request = self.run_guards(ctx, vault_id, RequestType::FastRedeem, owner, owner, Vec::from([shares]))?;
        let guard_engine = &self.guards;
        self.state.staged(|state| {
            let vault = state
                .vaults
                .get_mut(vault_id)
                .ok_or(VaultError::SmartVaultNotFound { vault: *vault_id })?;
            let assets = state.withdrawals.redeem_fast(
                &mut state.ledger,
                &mut state.registry,
                &state.asset_groups,
                vault,
                shares,
                &owner,
                guards,
                ctx.timestamp,
            )?;
            state.events.emit(VaultEvent::FastRedeem {
                vault: *vault_id,
                owner,
                vault_shares: shares,
                assets: assets.clone(),
                timestamp: ctx.timestamp,
            });
            guard_engine.run_post_guards(&request)?;
            Ok(assets)
        })
    }

    /// Flush pending deposits and redemptions of a vault together
    pub fn flush_smart_vault(&mut self, ctx: &CallContext, vault_id: &VaultId) -> VaultResult<u64> {
        let price_feed = &self.price_feed;
        self.state
            .staged(|state| state.flush_vault(price_feed, vault_id, ctx.timestamp))
    }

    /// Sync every flushed index whose epochs have settled, oldest first.
    ///
    /// Fails with `DhwNotSettled` when not even the oldest one can sync; an
    /// already synced vault returns an empty list.
    pub fn sync_smart_vault(&mut self, ctx: &CallContext, vault_id: &VaultId) -> VaultResult<Vec<FlushSync>> {
        self.state.staged(|state| {
            let mut synced = Vec::new();
            while !state.vault(vault_id)?.flush_index.is_synced() {
                match state.sync_flush(vault_id, ctx.timestamp) {
                    Ok(outcome) => synced.push(outcome),
                    Err(VaultError::DhwNotSettled { .. }) if !synced.is_empty() => break,
                    Err(e) => return Err(e),
                }
            }
            Ok(synced)
        })
    }

    /// Preview the deposit side of the next sync
    pub fn simulate_sync(&self, vault_id: &VaultId) -> VaultResult<DepositSyncResult> {
        let vault = self.state.vault(vault_id)?;
        if vault.flush_index.is_synced() {
            return Err(VaultError::InvalidStateTransition);
        }
        self.state.deposits.sync_deposits_simulate(
            vault,
            &self.state.registry,
            vault.flush_index.to_sync,
            self.state.withdrawals.pending_shares(vault_id),
        )
    }

    pub fn preview_claim(&self, vault_id: &VaultId, receipt_ids: &[ReceiptId], fractions: &[u128]) -> VaultResult<u128> {
        let vault = self.state.vault(vault_id)?;
        self.state.deposits.preview_claim(vault, receipt_ids, fractions)
    }

    pub fn claim_smart_vault_tokens(
        &mut self,
        ctx: &CallContext,
        vault_id: &VaultId,
        receipt_ids: &[ReceiptId],
        fractions: &[u128],
    ) -> VaultResult<u128> {
        self.state.staged(|state| {
            let vault = state
                .vaults
                .get_mut(vault_id)
                .ok_or(VaultError::SmartVaultNotFound { vault: *vault_id })?;
            let vault_shares = state
                .deposits
                .claim_smart_vault_tokens(vault, receipt_ids, fractions, &ctx.caller)?;
            state.events.emit(VaultEvent::SmartVaultTokensClaimed {
                vault: *vault_id,
                claimer: ctx.caller,
                receipt_ids: receipt_ids.to_vec(),
                vault_shares,
                timestamp: ctx.timestamp,
            });
            Ok(vault_shares)
        })
    }

    pub fn claim_withdrawal(
        &mut self,
        ctx: &CallContext,
        vault_id: &VaultId,
        receipt_ids: &[ReceiptId],
        fractions: &[u128],
    ) -> VaultResult<Vec<u128>> {
        self.state.staged(|state| {
            let vault = state
                .vaults
                .get_mut(vault_id)
                .ok_or(VaultError::SmartVaultNotFound { vault: *vault_id })?;
            let tokens = state.asset_groups.get(vault.asset_group_id)?;
            let assets = state.withdrawals.claim_withdrawal(
                &mut state.ledger,
                vault,
                tokens,
                receipt_ids,
                fractions,
                &ctx.caller,
            )?;
            state.events.emit(VaultEvent::WithdrawalClaimed {
                vault: *vault_id,
                claimer: ctx.caller,
                receipt_ids: receipt_ids.to_vec(),
                assets: assets.clone(),
                timestamp: ctx.timestamp,
            });
            Ok(assets)
        })
    }

    /// Move receipt fractions from the caller to `to`
    pub fn transfer_receipt(
        &mut self,
        ctx: &CallContext,
        vault_id: &VaultId,
        receipt_id: ReceiptId,
        to: &Address,
        fractions: u128,
    ) -> VaultResult<()> {
        let request = self.run_guards(ctx, vault_id, RequestType::TransferReceipt, ctx.caller, *to, Vec::from([fractions]))?;
        let guard_engine = &self.guards;
        self.state.staged(|state| {
            let vault = state.vault_mut(vault_id)?;
            vault.receipts.transfer(receipt_id, &ctx.caller, to, fractions)?;
            state.events.emit(VaultEvent::ReceiptTransferred {
                vault: *vault_id,
                receipt_id,
                from: ctx.caller,
                to: *to,
                fractions,
                timestamp: ctx.timestamp,
            });
            guard_engine.run_post_guards(&request)
        })
    }

    // ============ Keeper and Emergency ============

    pub fn do_hard_work(&mut self, ctx: &CallContext, batch: &DhwBatch) -> VaultResult<()> {
        self.roles.ensure_role(Role::DoHardWorker, &ctx.caller)?;
        let state = &mut self.state;
        let events = state.registry.do_hard_work(
            &mut state.ledger,
            &state.asset_groups,
            &self.price_feed,
            batch,
            ctx.timestamp,
        )?;
        state.events.append(events);
        Ok(())
    }

    pub fn do_hard_work_continue(&mut self, ctx: &CallContext, batch: &DhwContinueBatch) -> VaultResult<()> {
        self.roles.ensure_role(Role::DoHardWorker, &ctx.caller)?;
        let state = &mut self.state;
        let events = state
            .registry
            .do_hard_work_continue(&mut state.ledger, &state.asset_groups, batch, ctx.timestamp)?;
        state.events.append(events);
        Ok(())
    }

    pub fn emergency_withdraw(
        &mut self,
        ctx: &CallContext,
        strategies: &[StrategyId],
        guards: &[SlippageGuard],
        recipient: &Address,
    ) -> VaultResult<()> {
        self.roles.ensure_role(Role::EmergencyWithdrawalExecutor, &ctx.caller)?;
        let state = &mut self.state;
        let events = state.registry.emergency_withdraw(
            &mut state.ledger,
            &state.asset_groups,
            strategies,
            guards,
            recipient,
            ctx.timestamp,
        )?;
        state.events.append(events);
        Ok(())
    }

    /// Redeem strategy shares held by the caller (platform fee recipients)
    pub fn redeem_strategy_shares(
        &mut self,
        ctx: &CallContext,
        strategies: &[StrategyId],
        shares: &[u128],
        guards: &[SlippageGuard],
        receiver: &Address,
    ) -> VaultResult<Vec<Vec<u128>>> {
        let state = &mut self.state;
        let (assets, events) = state.registry.redeem_strategy_shares(
            &mut state.ledger,
            &state.asset_groups,
            &ctx.caller,
            strategies,
            shares,
            guards,
            receiver,
            ctx.timestamp,
        )?;
        state.events.append(events);
        Ok(assets)
    }
}
