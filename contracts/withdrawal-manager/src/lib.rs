//! Withdrawal Manager
//!
//! Withdrawal side of the flush → DHW → sync cycle.
//!
//! Redeemed vault shares are burned when the request is made. At flush the
//! vault releases the matching fraction of its strategy shares into the
//! registry's redemption escrow; after DHW the assets each strategy paid
//! out are split pro rata between the vaults that released shares into
//! that epoch. Withdrawal receipts are then claimed for assets.
//!
//! [`WithdrawalManager::redeem_fast`] skips the cycle entirely and redeems
//! straight from atomic venues.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use yieldvault_common::{
    asset_group::AssetGroupRegistry,
    asset_ledger::AssetLedger,
    constants::components::WITHDRAWAL_MANAGER,
    constants::receipts::NFT_MINTED_SHARES,
    errors::{VaultError, VaultResult},
    math::{add_amounts, mul_div, safe_add, scale_amounts, zero_amounts},
    receipt::WithdrawalMetadata,
    types::{Address, DhwIndex, ReceiptId, StrategyId, VaultId},
    validation::{require_same_length, require_sufficient_balance},
    vault::SmartVault,
    BTreeMap, Vec,
};
use yieldvault_strategy::SlippageGuard;
use yieldvault_strategy_registry::StrategyRegistry;

/// A flushed batch of redemptions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FlushedWithdrawals {
    /// Vault shares redeemed in the flush
    pub vault_shares: u128,
    /// Strategies as they were at flush time
    pub strategies: Vec<StrategyId>,
    /// Strategy shares released per strategy
    pub strategy_shares: Vec<u128>,
    /// DHW index each release was routed into
    pub dhw_indexes: Vec<DhwIndex>,
    /// Assets withdrawn for the flush, once synced
    pub assets: Option<Vec<u128>>,
}

#[derive(Debug, Clone, Default)]
pub struct WithdrawalManager {
    /// Vault shares redeemed in each vault's current flush
    pending: BTreeMap<VaultId, u128>,
    flushes: BTreeMap<(VaultId, u64), FlushedWithdrawals>,
}

impl WithdrawalManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_shares(&self, vault: &VaultId) -> u128 {
        self.pending.get(vault).copied().unwrap_or(0)
    }

    pub fn flushed(&self, vault: &VaultId, flush_index: u64) -> Option<&FlushedWithdrawals> {
        self.flushes.get(&(*vault, flush_index))
    }

    /// Burn `shares` of `owner` and mint a withdrawal receipt to `receiver`
    pub fn redeem(
        &mut self,
        vault: &mut SmartVault,
        shares: u128,
        owner: &Address,
        receiver: &Address,
    ) -> VaultResult<ReceiptId> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        vault.shares.burn(owner, shares)?;

        let pending = self.pending.entry(vault.id).or_insert(0);
        *pending = safe_add(*pending, shares)?;

        let flush_index = vault.flush_index.current;
        let receipt_id = vault.receipts.mint_withdrawal(
            receiver,
            WithdrawalMetadata {
                vault_shares: shares,
                flush_index,
            },
        )?;
        debug!(vault = ?vault.id, receipt_id, shares, flush_index, "redeem requested");
        Ok(receipt_id)
    }

    /// Release the strategy shares behind the pending redemptions.
    ///
    /// Each strategy gives up `vault_ssts * shares / (supply + shares)`,
    /// where `supply` no longer includes the burned `shares`.
    pub fn flush_smart_vault(
        &mut self,
        vault: &SmartVault,
        registry: &mut StrategyRegistry,
    ) -> VaultResult<Vec<DhwIndex>> {
        let shares = self.pending_shares(&vault.id);
        if shares == 0 {
            return Err(VaultError::NothingToFlush);
        }
        let supply_before = safe_add(vault.shares.total_supply(), shares)?;

        let mut strategy_shares = zero_amounts(vault.strategies.len());
        for (i, id) in vault.live_strategies() {
            let held = registry.share_balance(id, &vault.id)?;
            strategy_shares[i] = mul_div(held, shares, supply_before)?;
        }

        registry.release_strategy_shares(&vault.id, &vault.strategies, &strategy_shares)?;
        let dhw_indexes = registry.add_withdrawals(&vault.strategies, &strategy_shares)?;

        let flush_index = vault.flush_index.current;
        self.pending.remove(&vault.id);
        self.flushes.insert(
            (vault.id, flush_index),
            FlushedWithdrawals {
                vault_shares: shares,
                strategies: vault.strategies.clone(),
                strategy_shares,
                dhw_indexes: dhw_indexes.clone(),
                assets: None,
            },
        );
        debug!(vault = ?vault.id, flush_index, shares, "withdrawals flushed");
        Ok(dhw_indexes)
    }

    /// Assets the flush would withdraw, without changing state.
    ///
    /// Uses the strategies recorded at flush so a strategy removed after
    /// settling still pays its redeemers.
    pub fn withdrawn_assets(
        &self,
        vault: &SmartVault,
        registry: &StrategyRegistry,
        flush_index: u64,
        asset_count: usize,
    ) -> VaultResult<Vec<u128>> {
        let mut total = zero_amounts(asset_count);
        let Some(flushed) = self.flushed(&vault.id, flush_index) else {
            return Ok(total);
        };

        for ((id, released), dhw_index) in flushed
            .strategies
            .iter()
            .zip(&flushed.strategy_shares)
            .zip(&flushed.dhw_indexes)
        {
            if *released == 0 {
                continue;
            }
            let epoch = registry
                .epoch(id, *dhw_index)
                .filter(|epoch| epoch.is_settled())
                .ok_or(VaultError::DhwNotSettled {
                    strategy: *id,
                    dhw_index: *dhw_index,
                })?;
            let assets = scale_amounts(&epoch.assets_withdrawn, *released, epoch.shares_redeemed)?;
            add_amounts(&mut total, &assets)?;
        }
        Ok(total)
    }

    /// Record the assets withdrawn for `flush_index`
    pub fn sync_withdrawals(
        &mut self,
        vault: &SmartVault,
        registry: &StrategyRegistry,
        flush_index: u64,
        asset_count: usize,
    ) -> VaultResult<Vec<u128>> {
        let assets = self.withdrawn_assets(vault, registry, flush_index, asset_count)?;
        if let Some(flushed) = self.flushes.get_mut(&(vault.id, flush_index)) {
            flushed.assets = Some(assets.clone());
            info!(vault = ?vault.id, flush_index, ?assets, "withdrawals synced");
        }
        Ok(assets)
    }

    /// Assets owed for `fractions` of a withdrawal receipt
    fn receipt_assets(&self, vault: &SmartVault, receipt_id: ReceiptId, fractions: u128) -> VaultResult<Vec<u128>> {
        let metadata = *vault.receipts.withdrawal_metadata(receipt_id)?;
        if !vault.flush_index.is_index_synced(metadata.flush_index) {
            return Err(VaultError::WithdrawalNotSyncedYet {
                flush_index: metadata.flush_index,
            });
        }
        let flushed = self
            .flushed(&vault.id, metadata.flush_index)
            .ok_or(VaultError::InvalidReceipt { receipt_id })?;
        let assets = flushed.assets.as_ref().ok_or(VaultError::WithdrawalNotSyncedYet {
            flush_index: metadata.flush_index,
        })?;

        let whole = scale_amounts(assets, metadata.vault_shares, flushed.vault_shares)?;
        scale_amounts(&whole, fractions, NFT_MINTED_SHARES)
    }

    /// Burn receipt fractions held by `claimer` and pay out their assets
    pub fn claim_withdrawal(
        &self,
        ledger: &mut AssetLedger,
        vault: &mut SmartVault,
        tokens: &[Address],
        receipt_ids: &[ReceiptId],
        fractions: &[u128],
        claimer: &Address,
    ) -> VaultResult<Vec<u128>> {
        require_same_length(receipt_ids.len(), fractions.len())?;
        let mut total = zero_amounts(tokens.len());
        for (id, f) in receipt_ids.iter().zip(fractions) {
            let assets = self.receipt_assets(vault, *id, *f)?;
            add_amounts(&mut total, &assets)?;
            vault.receipts.burn(*id, claimer, *f)?;
        }
        ledger.transfer_out_many(&WITHDRAWAL_MANAGER, tokens, &total, claimer)?;
        debug!(vault = ?vault.id, ?total, "withdrawal claimed");
        Ok(total)
    }

    /// Redeem vault shares synchronously from atomic venues.
    ///
    /// Requires every flush of the vault to be synced. Shares burned by
    /// unflushed redemptions still own their strategy shares, so they stay
    /// in the pricing supply.
    #[allow(clippy::too_many_arguments)]
    pub fn redeem_fast(
        &self,
        ledger: &mut AssetLedger,
        registry: &mut StrategyRegistry,
        asset_groups: &AssetGroupRegistry,
        vault: &mut SmartVault,
        shares: u128,
        owner: &Address,
        guards: &[SlippageGuard],
        now: u64,
    ) -> VaultResult<Vec<u128>> {
        if !vault.flush_index.is_synced() {
            return Err(VaultError::VaultNotSynced { vault: vault.id });
        }
        require_same_length(vault.strategies.len(), guards.len())?;
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }

        require_sufficient_balance(vault.shares.balance_of(owner), shares)?;
        let supply = safe_add(vault.shares.total_supply(), self.pending_shares(&vault.id))?;

        let mut strategy_shares = zero_amounts(vault.strategies.len());
        for (i, id) in vault.live_strategies() {
            let held = registry.share_balance(id, &vault.id)?;
            strategy_shares[i] = mul_div(held, shares, supply)?;
        }
        let assets = registry.redeem_fast(
            ledger,
            asset_groups,
            &vault.id,
            &vault.strategies,
            &strategy_shares,
            guards,
            now,
        )?;
        vault.shares.burn(owner, shares)?;
        let tokens = asset_groups.get(vault.asset_group_id)?;
        ledger.transfer_out_many(&WITHDRAWAL_MANAGER, tokens, &assets, owner)?;
        info!(vault = ?vault.id, shares, ?assets, "fast redeem");
        Ok(assets)
    }
}
