//! Share Ledger
//!
//! Fungible share accounting used for both strategy shares and vault
//! shares. `total_supply` always equals the sum of balances.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{VaultError, VaultResult};
use crate::math::{safe_add, safe_sub};
use crate::types::Address;
use crate::validation::require_sufficient_balance;
use crate::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ShareLedger {
    total_supply: u128,
    balances: BTreeMap<Address, u128>,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn mint(&mut self, to: &Address, amount: u128) -> VaultResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.total_supply = safe_add(self.total_supply, amount)?;
        let balance = self.balances.entry(*to).or_insert(0);
        *balance = safe_add(*balance, amount)?;
        Ok(())
    }

    pub fn burn(&mut self, from: &Address, amount: u128) -> VaultResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let balance = self.balance_of(from);
        require_sufficient_balance(balance, amount)?;
        self.set_balance(from, balance - amount);
        self.total_supply = safe_sub(self.total_supply, amount)?;
        Ok(())
    }

    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> VaultResult<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        let balance = self.balance_of(from);
        require_sufficient_balance(balance, amount)?;
        self.set_balance(from, balance - amount);
        let receiver = self.balances.entry(*to).or_insert(0);
        *receiver = safe_add(*receiver, amount)?;
        Ok(())
    }

    fn set_balance(&mut self, holder: &Address, balance: u128) {
        if balance == 0 {
            self.balances.remove(holder);
        } else {
            self.balances.insert(*holder, balance);
        }
    }

    /// Holders with a non-zero balance
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &u128)> {
        self.balances.iter()
    }

    pub fn is_conserved(&self) -> bool {
        self.balances
            .values()
            .try_fold(0u128, |sum, b| sum.checked_add(*b))
            == Some(self.total_supply)
    }

    /// Fail with `ConservationViolated` unless supply matches balances
    pub fn check_conservation(&self) -> VaultResult<()> {
        if self.is_conserved() {
            return Ok(());
        }
        let balances = self
            .balances
            .values()
            .fold(0u128, |sum, b| sum.saturating_add(*b));
        Err(VaultError::ConservationViolated {
            supply: self.total_supply,
            balances,
        })
    }
}
