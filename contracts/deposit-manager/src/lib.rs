//! Deposit Manager
//!
//! Deposit side of the flush → DHW → sync cycle for every smart vault.
//!
//! ## Flow
//!
//! 1. **Deposit**: assets move into ledger custody, the vault's pending
//!    total for the current flush grows and a deposit receipt is minted.
//! 2. **Flush**: the pending total is split across the vault's strategies
//!    by allocation and routed into each strategy's current DHW index.
//! 3. **Sync**: once every routed epoch has settled, the vault claims its
//!    strategy shares, takes its fees and mints vault shares for the
//!    depositors to the unclaimed holder.
//! 4. **Claim**: receipt holders burn receipt fractions for their
//!    proportional part of the minted vault shares.
//!
//! The manager owns only the per-flush bookkeeping; vault state
//! ([`SmartVault`]) and the strategy registry are passed in by the
//! orchestrator, which also stages every call.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use yieldvault_common::{
    asset_ledger::AssetLedger,
    constants::components::DEPOSIT_MANAGER,
    constants::percent::FULL_PERCENT,
    constants::precision::INITIAL_SHARE_MULTIPLIER,
    constants::receipts::NFT_MINTED_SHARES,
    constants::UNCLAIMED_HOLDER,
    errors::{VaultError, VaultResult},
    math::{
        add_amounts, assets_value, dilution_shares, management_fee_shares, mul_div, safe_add, safe_sub,
        split_by_allocation, yield_value_between, zero_amounts,
    },
    receipt::DepositMetadata,
    types::{Address, DhwIndex, ReceiptId, VaultId},
    validation::{require_any_nonzero, require_same_length},
    vault::SmartVault,
    BTreeMap, Vec,
};
use yieldvault_strategy_registry::StrategyRegistry;

// ============ Records ============

/// A flushed batch of deposits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FlushedDeposits {
    /// Total deposited per asset
    pub deposits: Vec<u128>,
    /// Routed amounts, `[strategy][asset]` aligned with the vault's strategies
    pub strategy_amounts: Vec<Vec<u128>>,
    /// Exchange rates at flush, used to split minted shares between receipts
    pub exchange_rates: Vec<u128>,
    /// Vault shares minted for the depositors, once synced
    pub vault_shares_minted: Option<u128>,
}

/// Outcome of syncing one flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositSyncResult {
    pub flush_index: u64,
    /// Vault shares minted for depositors (net of the deposit fee)
    pub vault_shares_minted: u128,
    pub management_fee_shares: u128,
    pub performance_fee_shares: u128,
    pub deposit_fee_shares: u128,
    /// Strategy shares claimed by the vault, per strategy
    pub strategy_shares: Vec<u128>,
    /// Value of the flushed deposits at the DHW exchange rates
    pub deposit_value: u128,
    /// Value of the vault's existing strategy shares at DHW
    pub existing_value: u128,
    /// Strategy yield indexes the vault is synced to afterwards
    pub yield_indexes: Vec<u128>,
    /// Latest DHW timestamp among the flush's epochs
    pub dhw_timestamp: u64,
}

impl DepositSyncResult {
    /// Vault shares minted to the fee recipient
    pub fn fee_shares(&self) -> u128 {
        self.management_fee_shares
            .saturating_add(self.performance_fee_shares)
            .saturating_add(self.deposit_fee_shares)
    }
}

// ============ Deposit Manager ============

#[derive(Debug, Clone, Default)]
pub struct DepositManager {
    /// Deposits collected for each vault's current flush
    pending: BTreeMap<VaultId, Vec<u128>>,
    flushes: BTreeMap<(VaultId, u64), FlushedDeposits>,
}

impl DepositManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending deposits of the vault's current flush
    pub fn pending_deposits(&self, vault: &VaultId) -> Option<&[u128]> {
        self.pending.get(vault).map(|amounts| amounts.as_slice())
    }

    pub fn flushed(&self, vault: &VaultId, flush_index: u64) -> Option<&FlushedDeposits> {
        self.flushes.get(&(*vault, flush_index))
    }

    /// Take custody of `assets` and mint a deposit receipt to `receiver`.
    ///
    /// # Errors
    /// * `InvalidArrayLength` if `assets` does not match the asset group
    /// * `ZeroAmount` if every amount is zero
    pub fn deposit_assets(
        &mut self,
        ledger: &mut AssetLedger,
        vault: &mut SmartVault,
        tokens: &[Address],
        assets: &[u128],
        receiver: &Address,
        now: u64,
    ) -> VaultResult<ReceiptId> {
        require_same_length(tokens.len(), assets.len())?;
        require_any_nonzero(assets)?;

        ledger.transfer_in_many(&DEPOSIT_MANAGER, tokens, assets)?;
        let pending = self
            .pending
            .entry(vault.id)
            .or_insert_with(|| zero_amounts(assets.len()));
        add_amounts(pending, assets)?;

        let flush_index = vault.flush_index.current;
        let receipt_id = vault.receipts.mint_deposit(
            receiver,
            DepositMetadata {
                assets: assets.to_vec(),
                flush_index,
                initiated_at: now,
            },
        )?;
        debug!(vault = ?vault.id, receipt_id, flush_index, "deposit received");
        Ok(receipt_id)
    }

    /// Split the pending deposits by allocation and route them into the
    /// strategies' current DHW indexes.
    ///
    /// Returns the DHW index of every strategy (0 for ghosts).
    pub fn flush_smart_vault(
        &mut self,
        vault: &SmartVault,
        registry: &mut StrategyRegistry,
        exchange_rates: &[u128],
    ) -> VaultResult<Vec<DhwIndex>> {
        let deposits = match self.pending.get(&vault.id) {
            Some(amounts) if amounts.iter().any(|a| *a > 0) => amounts.clone(),
            _ => return Err(VaultError::NothingToFlush),
        };
        require_same_length(deposits.len(), exchange_rates.len())?;

        let strategy_amounts = split_by_allocation(&deposits, &vault.allocation)?;
        let dhw_indexes = registry.add_deposits(&vault.strategies, &strategy_amounts)?;

        let flush_index = vault.flush_index.current;
        self.pending.remove(&vault.id);
        self.flushes.insert(
            (vault.id, flush_index),
            FlushedDeposits {
                deposits,
                strategy_amounts,
                exchange_rates: exchange_rates.to_vec(),
                vault_shares_minted: None,
            },
        );
        debug!(vault = ?vault.id, flush_index, ?dhw_indexes, "deposits flushed");
        Ok(dhw_indexes)
    }

    // ============ Sync ============

    /// Compute the sync of `flush_index` without changing any state.
    ///
    /// `pending_redeemed` is the vault shares burned by redemptions not yet
    /// flushed. Their strategy shares are still held by the vault, so they
    /// count towards the supply the existing value is priced against.
    ///
    /// Fails with `DhwNotSettled` while any routed epoch is unsettled.
    pub fn sync_deposits_simulate(
        &self,
        vault: &SmartVault,
        registry: &StrategyRegistry,
        flush_index: u64,
        pending_redeemed: u128,
    ) -> VaultResult<DepositSyncResult> {
        let dhw_indexes = vault.flush_dhw(flush_index)?;
        let flushed = self.flushed(&vault.id, flush_index);

        let mut strategy_shares = zero_amounts(vault.strategies.len());
        let mut yield_indexes = vault.synced_yield_index.clone();
        let mut deposit_value = 0u128;
        let mut existing_value = 0u128;
        let mut yield_value = 0u128;
        let mut dhw_timestamp = vault.last_sync_timestamp;

        for (i, id) in vault.live_strategies() {
            let dhw_index = dhw_indexes[i];
            let epoch = registry
                .epoch(id, dhw_index)
                .filter(|epoch| epoch.is_settled())
                .ok_or(VaultError::DhwNotSettled {
                    strategy: *id,
                    dhw_index,
                })?;
            dhw_timestamp = dhw_timestamp.max(epoch.timestamp);

            // Position held before this flush, priced at DHW
            let held = registry.share_balance(id, &vault.id)?;
            let held_value = if epoch.supply_at_dhw > 0 {
                mul_div(held, epoch.value_at_dhw, epoch.supply_at_dhw)?
            } else {
                0
            };
            existing_value = safe_add(existing_value, held_value)?;
            yield_value = safe_add(
                yield_value,
                yield_value_between(held_value, vault.synced_yield_index[i], epoch.yield_index)?,
            )?;
            yield_indexes[i] = epoch.yield_index;

            // Vault's part of the shares minted for the epoch's deposits
            if let Some(flushed) = flushed {
                let routed_value = assets_value(&flushed.strategy_amounts[i], &epoch.exchange_rates)?;
                if routed_value > 0 {
                    let epoch_value = assets_value(&epoch.deposited, &epoch.exchange_rates)?;
                    strategy_shares[i] = mul_div(epoch.shares_minted, routed_value, epoch_value)?;
                    deposit_value = safe_add(deposit_value, routed_value)?;
                }
            }
        }

        // Fees on the existing supply
        let fees = vault.fees;
        let supply = safe_add(vault.shares.total_supply(), pending_redeemed)?;
        let elapsed = dhw_timestamp.saturating_sub(vault.last_sync_timestamp);
        let management_fee_shares = management_fee_shares(supply, fees.management_fee_pct, elapsed)?;
        let performance_fee_value = mul_div(yield_value, fees.performance_fee_pct, FULL_PERCENT)?;
        let performance_fee_shares = dilution_shares(supply, existing_value, performance_fee_value)?;
        let supply_after_fees = safe_add(supply, safe_add(management_fee_shares, performance_fee_shares)?)?;

        // New shares for the deposits
        let minted = if deposit_value == 0 {
            0
        } else if supply_after_fees == 0 || existing_value == 0 {
            deposit_value
                .checked_mul(INITIAL_SHARE_MULTIPLIER)
                .ok_or(VaultError::Overflow)?
        } else {
            mul_div(supply_after_fees, deposit_value, existing_value)?
        };
        let deposit_fee_shares = mul_div(minted, fees.deposit_fee_pct, FULL_PERCENT)?;

        Ok(DepositSyncResult {
            flush_index,
            vault_shares_minted: safe_sub(minted, deposit_fee_shares)?,
            management_fee_shares,
            performance_fee_shares,
            deposit_fee_shares,
            strategy_shares,
            deposit_value,
            existing_value,
            yield_indexes,
            dhw_timestamp,
        })
    }

    /// Sync `flush_index`: claim strategy shares, mint fee shares and the
    /// depositors' vault shares.
    ///
    /// Does not advance the vault's flush index; the orchestrator does that
    /// once withdrawals are synced too.
    pub fn sync_deposits(
        &mut self,
        vault: &mut SmartVault,
        registry: &mut StrategyRegistry,
        flush_index: u64,
        pending_redeemed: u128,
    ) -> VaultResult<DepositSyncResult> {
        let result = self.sync_deposits_simulate(vault, registry, flush_index, pending_redeemed)?;

        registry.claim_strategy_shares(&vault.id, &vault.strategies, &result.strategy_shares)?;
        let fee_recipient = vault.fee_recipient;
        vault.shares.mint(&fee_recipient, result.fee_shares())?;
        vault.shares.mint(&UNCLAIMED_HOLDER, result.vault_shares_minted)?;
        vault.synced_yield_index = result.yield_indexes.clone();

        if let Some(flushed) = self.flushes.get_mut(&(vault.id, flush_index)) {
            flushed.vault_shares_minted = Some(result.vault_shares_minted);
        }

        info!(
            vault = ?vault.id,
            flush_index,
            vault_shares_minted = result.vault_shares_minted,
            fee_shares = result.fee_shares(),
            "deposits synced"
        );
        Ok(result)
    }

    // ============ Claims ============

    /// Vault shares owed for `fractions` of a deposit receipt
    fn receipt_shares(&self, vault: &SmartVault, receipt_id: ReceiptId, fractions: u128) -> VaultResult<u128> {
        let metadata = vault.receipts.deposit_metadata(receipt_id)?;
        if !vault.flush_index.is_index_synced(metadata.flush_index) {
            return Err(VaultError::DepositNotSyncedYet {
                flush_index: metadata.flush_index,
            });
        }
        let flushed = self
            .flushed(&vault.id, metadata.flush_index)
            .ok_or(VaultError::InvalidReceipt { receipt_id })?;
        let minted = flushed.vault_shares_minted.ok_or(VaultError::DepositNotSyncedYet {
            flush_index: metadata.flush_index,
        })?;

        let flush_value = assets_value(&flushed.deposits, &flushed.exchange_rates)?;
        if flush_value == 0 {
            return Ok(0);
        }
        let receipt_value = assets_value(&metadata.assets, &flushed.exchange_rates)?;
        let whole = mul_div(minted, receipt_value, flush_value)?;
        mul_div(whole, fractions, NFT_MINTED_SHARES)
    }

    /// Vault shares `fractions` of each receipt would claim
    pub fn preview_claim(&self, vault: &SmartVault, receipt_ids: &[ReceiptId], fractions: &[u128]) -> VaultResult<u128> {
        require_same_length(receipt_ids.len(), fractions.len())?;
        receipt_ids
            .iter()
            .zip(fractions)
            .try_fold(0u128, |total, (id, f)| safe_add(total, self.receipt_shares(vault, *id, *f)?))
    }

    /// Burn receipt fractions held by `claimer` and hand over the vault
    /// shares they represent.
    pub fn claim_smart_vault_tokens(
        &self,
        vault: &mut SmartVault,
        receipt_ids: &[ReceiptId],
        fractions: &[u128],
        claimer: &Address,
    ) -> VaultResult<u128> {
        require_same_length(receipt_ids.len(), fractions.len())?;
        let mut claimed = 0u128;
        for (id, f) in receipt_ids.iter().zip(fractions) {
            claimed = safe_add(claimed, self.receipt_shares(vault, *id, *f)?)?;
            vault.receipts.burn(*id, claimer, *f)?;
        }
        vault.shares.transfer(&UNCLAIMED_HOLDER, claimer, claimed)?;
        debug!(vault = ?vault.id, claimed, "vault shares claimed");
        Ok(claimed)
    }
}
