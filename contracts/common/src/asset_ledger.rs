//! Asset Ledger
//!
//! Custodial escrow for every asset the kernel holds outside of strategy
//! venues: pending deposits, withdrawn assets awaiting claim. Only
//! allow-listed components may move funds.

use tracing::debug;

use crate::errors::{VaultError, VaultResult};
use crate::types::Address;
use crate::validation::{require_same_length, require_sufficient_balance};
use crate::{BTreeMap, BTreeSet};

/// Asset custody with a caller allow-list
#[derive(Debug, Clone, Default)]
pub struct AssetLedger {
    balances: BTreeMap<Address, u128>,
    allow_list: BTreeSet<Address>,
    /// Amounts paid out, by (recipient, asset)
    paid_out: BTreeMap<(Address, Address), u128>,
}

impl AssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow a component to move funds
    pub fn allow(&mut self, caller: Address) {
        self.allow_list.insert(caller);
    }

    /// Remove a component from the allow-list
    pub fn disallow(&mut self, caller: &Address) {
        self.allow_list.remove(caller);
    }

    pub fn is_allowed(&self, caller: &Address) -> bool {
        self.allow_list.contains(caller)
    }

    fn require_allowed(&self, caller: &Address) -> VaultResult<()> {
        if !self.is_allowed(caller) {
            return Err(VaultError::CallerNotAllowed { caller: *caller });
        }
        Ok(())
    }

    /// Take custody of `amount` of `asset`
    pub fn transfer_in(&mut self, caller: &Address, asset: &Address, amount: u128) -> VaultResult<()> {
        self.require_allowed(caller)?;
        let balance = self.balances.entry(*asset).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(VaultError::Overflow)?;
        debug!(asset = ?asset, amount, "ledger transfer in");
        Ok(())
    }

    /// Release `amount` of `asset` to `recipient`
    pub fn transfer_out(
        &mut self,
        caller: &Address,
        asset: &Address,
        amount: u128,
        recipient: &Address,
    ) -> VaultResult<()> {
        self.require_allowed(caller)?;
        let available = self.balance_of(asset);
        require_sufficient_balance(available, amount)?;
        self.balances.insert(*asset, available - amount);

        let paid = self.paid_out.entry((*recipient, *asset)).or_insert(0);
        *paid = paid.checked_add(amount).ok_or(VaultError::Overflow)?;
        debug!(asset = ?asset, amount, recipient = ?recipient, "ledger transfer out");
        Ok(())
    }

    /// Take custody of an amount vector
    pub fn transfer_in_many(&mut self, caller: &Address, assets: &[Address], amounts: &[u128]) -> VaultResult<()> {
        require_same_length(assets.len(), amounts.len())?;
        for (asset, amount) in assets.iter().zip(amounts) {
            self.transfer_in(caller, asset, *amount)?;
        }
        Ok(())
    }

    /// Release an amount vector to `recipient`
    pub fn transfer_out_many(
        &mut self,
        caller: &Address,
        assets: &[Address],
        amounts: &[u128],
        recipient: &Address,
    ) -> VaultResult<()> {
        require_same_length(assets.len(), amounts.len())?;
        for (asset, amount) in assets.iter().zip(amounts) {
            self.transfer_out(caller, asset, *amount, recipient)?;
        }
        Ok(())
    }

    /// Amount of `asset` in custody
    pub fn balance_of(&self, asset: &Address) -> u128 {
        self.balances.get(asset).copied().unwrap_or(0)
    }

    /// Total of `asset` paid out to `recipient` so far
    pub fn paid_out(&self, recipient: &Address, asset: &Address) -> u128 {
        self.paid_out.get(&(*recipient, *asset)).copied().unwrap_or(0)
    }
}
