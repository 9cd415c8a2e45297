//! Receipt Tokens
//!
//! Semi-fungible receipts handed out for deposits and redemptions. Each
//! receipt is minted as [`NFT_MINTED_SHARES`] fractions, so holders can
//! transfer or claim part of a receipt. Deposit ids count up from 1,
//! withdrawal ids from `MAXIMAL_DEPOSIT_ID + 1`.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::receipts::{MAXIMAL_DEPOSIT_ID, NFT_MINTED_SHARES};
use crate::errors::{VaultError, VaultResult};
use crate::types::{Address, ReceiptId};
use crate::validation::require_sufficient_balance;
use crate::{BTreeMap, Vec};

/// Deposit receipt metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DepositMetadata {
    /// Deposited amounts in asset group order
    pub assets: Vec<u128>,
    /// Flush the deposit belongs to
    pub flush_index: u64,
    /// Deposit timestamp
    pub initiated_at: u64,
}

/// Withdrawal receipt metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct WithdrawalMetadata {
    /// Vault shares redeemed
    pub vault_shares: u128,
    /// Flush the redemption belongs to
    pub flush_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum ReceiptMetadata {
    Deposit(DepositMetadata),
    Withdrawal(WithdrawalMetadata),
}

/// Receipt tokens of a single vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ReceiptBook {
    last_deposit_id: ReceiptId,
    last_withdrawal_id: ReceiptId,
    metadata: BTreeMap<ReceiptId, ReceiptMetadata>,
    balances: BTreeMap<(ReceiptId, Address), u128>,
}

impl Default for ReceiptBook {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiptBook {
    pub fn new() -> Self {
        Self {
            last_deposit_id: 0,
            last_withdrawal_id: MAXIMAL_DEPOSIT_ID,
            metadata: BTreeMap::new(),
            balances: BTreeMap::new(),
        }
    }

    /// Deposit ids are `1..=MAXIMAL_DEPOSIT_ID`
    pub fn is_deposit_id(id: ReceiptId) -> bool {
        id > 0 && id <= MAXIMAL_DEPOSIT_ID
    }

    pub fn mint_deposit(&mut self, receiver: &Address, metadata: DepositMetadata) -> VaultResult<ReceiptId> {
        if self.last_deposit_id >= MAXIMAL_DEPOSIT_ID {
            return Err(VaultError::IdOverflow);
        }
        self.last_deposit_id += 1;
        let id = self.last_deposit_id;
        self.metadata.insert(id, ReceiptMetadata::Deposit(metadata));
        self.balances.insert((id, *receiver), NFT_MINTED_SHARES);
        Ok(id)
    }

    pub fn mint_withdrawal(&mut self, receiver: &Address, metadata: WithdrawalMetadata) -> VaultResult<ReceiptId> {
        let id = self
            .last_withdrawal_id
            .checked_add(1)
            .ok_or(VaultError::IdOverflow)?;
        self.last_withdrawal_id = id;
        self.metadata.insert(id, ReceiptMetadata::Withdrawal(metadata));
        self.balances.insert((id, *receiver), NFT_MINTED_SHARES);
        Ok(id)
    }

    pub fn metadata(&self, id: ReceiptId) -> VaultResult<&ReceiptMetadata> {
        self.metadata
            .get(&id)
            .ok_or(VaultError::InvalidReceipt { receipt_id: id })
    }

    pub fn deposit_metadata(&self, id: ReceiptId) -> VaultResult<&DepositMetadata> {
        match self.metadata(id)? {
            ReceiptMetadata::Deposit(metadata) => Ok(metadata),
            ReceiptMetadata::Withdrawal(_) => Err(VaultError::InvalidReceipt { receipt_id: id }),
        }
    }

    pub fn withdrawal_metadata(&self, id: ReceiptId) -> VaultResult<&WithdrawalMetadata> {
        match self.metadata(id)? {
            ReceiptMetadata::Withdrawal(metadata) => Ok(metadata),
            ReceiptMetadata::Deposit(_) => Err(VaultError::InvalidReceipt { receipt_id: id }),
        }
    }

    /// Fractions of receipt `id` held by `owner`
    pub fn balance_of(&self, id: ReceiptId, owner: &Address) -> u128 {
        self.balances.get(&(id, *owner)).copied().unwrap_or(0)
    }

    /// Burn fractions for a claim
    pub fn burn(&mut self, id: ReceiptId, owner: &Address, fractions: u128) -> VaultResult<()> {
        self.metadata(id)?;
        if fractions == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let balance = self.balance_of(id, owner);
        require_sufficient_balance(balance, fractions)?;
        self.set_balance(id, owner, balance - fractions);
        Ok(())
    }

    pub fn transfer(&mut self, id: ReceiptId, from: &Address, to: &Address, fractions: u128) -> VaultResult<()> {
        self.metadata(id)?;
        if fractions == 0 || from == to {
            return Ok(());
        }
        let balance = self.balance_of(id, from);
        require_sufficient_balance(balance, fractions)?;
        self.set_balance(id, from, balance - fractions);
        let receiver = self.balances.entry((id, *to)).or_insert(0);
        *receiver += fractions;
        Ok(())
    }

    fn set_balance(&mut self, id: ReceiptId, owner: &Address, balance: u128) {
        if balance == 0 {
            self.balances.remove(&(id, *owner));
        } else {
            self.balances.insert((id, *owner), balance);
        }
    }

    /// Receipt ids held (at least partially) by `owner`
    pub fn owned_by(&self, owner: &Address) -> Vec<ReceiptId> {
        self.balances
            .keys()
            .filter(|(_, holder)| holder == owner)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user1() -> Address {
        [1u8; 32]
    }

    fn user2() -> Address {
        [2u8; 32]
    }

    fn deposit(flush_index: u64) -> DepositMetadata {
        DepositMetadata {
            assets: vec![100, 200],
            flush_index,
            initiated_at: 10,
        }
    }

    #[test]
    fn test_id_ranges() {
        let mut book = ReceiptBook::new();
        let d1 = book.mint_deposit(&user1(), deposit(0)).unwrap();
        let d2 = book.mint_deposit(&user1(), deposit(0)).unwrap();
        let w1 = book
            .mint_withdrawal(&user1(), WithdrawalMetadata { vault_shares: 5, flush_index: 0 })
            .unwrap();

        assert_eq!(d1, 1);
        assert_eq!(d2, 2);
        assert_eq!(w1, MAXIMAL_DEPOSIT_ID + 1);
        assert!(ReceiptBook::is_deposit_id(d2));
        assert!(!ReceiptBook::is_deposit_id(w1));
    }

    #[test]
    fn test_partial_burn_and_transfer() {
        let mut book = ReceiptBook::new();
        let id = book.mint_deposit(&user1(), deposit(0)).unwrap();

        book.transfer(id, &user1(), &user2(), NFT_MINTED_SHARES / 4).unwrap();
        book.burn(id, &user1(), NFT_MINTED_SHARES / 2).unwrap();

        assert_eq!(book.balance_of(id, &user1()), NFT_MINTED_SHARES / 4);
        assert_eq!(book.balance_of(id, &user2()), NFT_MINTED_SHARES / 4);
        assert!(book.burn(id, &user2(), NFT_MINTED_SHARES).is_err());
    }

    #[test]
    fn test_metadata_kind_checked() {
        let mut book = ReceiptBook::new();
        let id = book.mint_deposit(&user1(), deposit(3)).unwrap();
        assert_eq!(book.deposit_metadata(id).unwrap().flush_index, 3);
        assert_eq!(
            book.withdrawal_metadata(id),
            Err(VaultError::InvalidReceipt { receipt_id: id })
        );
        assert!(book.metadata(99).is_err());
    }
}
