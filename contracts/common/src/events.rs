//! Kernel Events
//!
//! Every state change the kernel commits is recorded as a [`VaultEvent`].
//! Events are borsh-encoded; [`EventLog::digest`] hashes the encoded stream
//! with SHA-256 so two runs over the same input and pre-state can be
//! compared byte for byte.

use crate::types::{Address, AssetGroupId, DhwIndex, ReceiptId, StrategyId, VaultId};
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Registry Events (0x01 - 0x0F)
    AssetGroupRegistered = 0x01,
    StrategyRegistered = 0x02,
    StrategyRemoved = 0x03,
    SmartVaultCreated = 0x04,
    PlatformFeesUpdated = 0x05,

    // Deposit Events (0x10 - 0x1F)
    DepositInitiated = 0x10,
    SmartVaultTokensClaimed = 0x11,

    // Withdrawal Events (0x20 - 0x2F)
    RedeemInitiated = 0x20,
    WithdrawalClaimed = 0x21,
    FastRedeem = 0x22,

    // Vault Settlement Events (0x30 - 0x3F)
    SmartVaultFlushed = 0x30,
    SmartVaultSynced = 0x31,

    // Strategy Events (0x40 - 0x4F)
    StrategyDhw = 0x40,
    StrategyDhwContinued = 0x41,
    PlatformFeesMinted = 0x42,
    StrategySharesRedeemed = 0x43,
    EmergencyWithdrawal = 0x44,

    // Receipt Events (0x50 - 0x5F)
    ReceiptTransferred = 0x50,
}

/// Main event enum containing all kernel events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum VaultEvent {
    // ============ Registry Events ============

    /// Emitted when an asset group is registered
    AssetGroupRegistered {
        asset_group_id: AssetGroupId,
        assets: Vec<Address>,
        timestamp: u64,
    },

    /// Emitted when a strategy is registered
    StrategyRegistered {
        strategy: StrategyId,
        asset_group_id: AssetGroupId,
        atomic: bool,
        timestamp: u64,
    },

    /// Emitted when a strategy is removed and ghosted in every vault
    StrategyRemoved {
        strategy: StrategyId,
        vaults_affected: u32,
        timestamp: u64,
    },

    /// Emitted when a smart vault is created
    SmartVaultCreated {
        vault: VaultId,
        asset_group_id: AssetGroupId,
        strategies: Vec<StrategyId>,
        allocation: Vec<u128>,
        timestamp: u64,
    },

    /// Emitted when platform fees change
    PlatformFeesUpdated {
        ecosystem_fee_pct: u128,
        treasury_fee_pct: u128,
        timestamp: u64,
    },

    // ============ Deposit Events ============

    /// Emitted when assets are deposited into a vault
    DepositInitiated {
        vault: VaultId,
        receipt_id: ReceiptId,
        receiver: Address,
        assets: Vec<u128>,
        flush_index: u64,
        referral: Address,
        timestamp: u64,
    },

    /// Emitted when deposit receipts are burned for vault shares
    SmartVaultTokensClaimed {
        vault: VaultId,
        claimer: Address,
        receipt_ids: Vec<ReceiptId>,
        vault_shares: u128,
        timestamp: u64,
    },

    // ============ Withdrawal Events ============

    /// Emitted when vault shares are queued for redemption
    RedeemInitiated {
        vault: VaultId,
        receipt_id: ReceiptId,
        owner: Address,
        receiver: Address,
        vault_shares: u128,
        flush_index: u64,
        timestamp: u64,
    },

    /// Emitted when withdrawal receipts are burned for assets
    WithdrawalClaimed {
        vault: VaultId,
        claimer: Address,
        receipt_ids: Vec<ReceiptId>,
        assets: Vec<u128>,
        timestamp: u64,
    },

    /// Emitted on a synchronous redemption
    FastRedeem {
        vault: VaultId,
        owner: Address,
        vault_shares: u128,
        assets: Vec<u128>,
        timestamp: u64,
    },

    // ============ Vault Settlement Events ============

    /// Emitted when a vault flush is routed into strategy epochs
    SmartVaultFlushed {
        vault: VaultId,
        flush_index: u64,
        deposits: Vec<u128>,
        vault_shares_redeemed: u128,
        dhw_indexes: Vec<DhwIndex>,
        timestamp: u64,
    },

    /// Emitted when a flush is synced into vault shares and withdrawable assets
    SmartVaultSynced {
        vault: VaultId,
        flush_index: u64,
        vault_shares_minted: u128,
        fee_shares_minted: u128,
        assets_withdrawn: Vec<u128>,
        timestamp: u64,
    },

    // ============ Strategy Events ============

    /// Emitted when a strategy epoch is processed by DHW
    StrategyDhw {
        strategy: StrategyId,
        dhw_index: DhwIndex,
        yield_pct: i128,
        value_at_dhw: u128,
        shares_minted: u128,
        shares_redeemed: u128,
        settled: bool,
        timestamp: u64,
    },

    /// Emitted when a pending non-atomic epoch is completed
    StrategyDhwContinued {
        strategy: StrategyId,
        dhw_index: DhwIndex,
        assets_withdrawn: Vec<u128>,
        timestamp: u64,
    },

    /// Emitted when platform fee shares are minted
    PlatformFeesMinted {
        strategy: StrategyId,
        dhw_index: DhwIndex,
        ecosystem_shares: u128,
        treasury_shares: u128,
        timestamp: u64,
    },

    /// Emitted when a holder redeems strategy shares directly
    StrategySharesRedeemed {
        strategy: StrategyId,
        holder: Address,
        receiver: Address,
        shares: u128,
        assets: Vec<u128>,
        timestamp: u64,
    },

    /// Emitted on each emergency withdrawal step
    EmergencyWithdrawal {
        strategy: StrategyId,
        recipient: Address,
        assets: Vec<u128>,
        completed: bool,
        timestamp: u64,
    },

    // ============ Receipt Events ============

    /// Emitted when receipt fractions change owner
    ReceiptTransferred {
        vault: VaultId,
        receipt_id: ReceiptId,
        from: Address,
        to: Address,
        fractions: u128,
        timestamp: u64,
    },
}

impl VaultEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::AssetGroupRegistered { .. } => EventType::AssetGroupRegistered,
            Self::StrategyRegistered { .. } => EventType::StrategyRegistered,
            Self::StrategyRemoved { .. } => EventType::StrategyRemoved,
            Self::SmartVaultCreated { .. } => EventType::SmartVaultCreated,
            Self::PlatformFeesUpdated { .. } => EventType::PlatformFeesUpdated,
            Self::DepositInitiated { .. } => EventType::DepositInitiated,
            Self::SmartVaultTokensClaimed { .. } => EventType::SmartVaultTokensClaimed,
            Self::RedeemInitiated { .. } => EventType::RedeemInitiated,
            Self::WithdrawalClaimed { .. } => EventType::WithdrawalClaimed,
            Self::FastRedeem { .. } => EventType::FastRedeem,
            Self::SmartVaultFlushed { .. } => EventType::SmartVaultFlushed,
            Self::SmartVaultSynced { .. } => EventType::SmartVaultSynced,
            Self::StrategyDhw { .. } => EventType::StrategyDhw,
            Self::StrategyDhwContinued { .. } => EventType::StrategyDhwContinued,
            Self::PlatformFeesMinted { .. } => EventType::PlatformFeesMinted,
            Self::StrategySharesRedeemed { .. } => EventType::StrategySharesRedeemed,
            Self::EmergencyWithdrawal { .. } => EventType::EmergencyWithdrawal,
            Self::ReceiptTransferred { .. } => EventType::ReceiptTransferred,
        }
    }

    /// Get the timestamp when event occurred
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::AssetGroupRegistered { timestamp, .. }
            | Self::StrategyRegistered { timestamp, .. }
            | Self::StrategyRemoved { timestamp, .. }
            | Self::SmartVaultCreated { timestamp, .. }
            | Self::PlatformFeesUpdated { timestamp, .. }
            | Self::DepositInitiated { timestamp, .. }
            | Self::SmartVaultTokensClaimed { timestamp, .. }
            | Self::RedeemInitiated { timestamp, .. }
            | Self::WithdrawalClaimed { timestamp, .. }
            | Self::FastRedeem { timestamp, .. }
            | Self::SmartVaultFlushed { timestamp, .. }
            | Self::SmartVaultSynced { timestamp, .. }
            | Self::StrategyDhw { timestamp, .. }
            | Self::StrategyDhwContinued { timestamp, .. }
            | Self::PlatformFeesMinted { timestamp, .. }
            | Self::StrategySharesRedeemed { timestamp, .. }
            | Self::EmergencyWithdrawal { timestamp, .. }
            | Self::ReceiptTransferred { timestamp, .. } => *timestamp,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }

    /// SHA-256 of the borsh encoding
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.to_bytes()).into()
    }
}

/// Event log for collecting events during execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<VaultEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: VaultEvent) {
        self.events.push(event);
    }

    /// Append every event of another log, preserving order
    pub fn append(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    /// Get all events
    pub fn events(&self) -> &[VaultEvent] {
        &self.events
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<VaultEvent> {
        self.events
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&VaultEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// SHA-256 over the length-prefixed borsh encoding of every event
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for event in &self.events {
            let bytes = event.to_bytes();
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dhw_event(yield_pct: i128) -> VaultEvent {
        VaultEvent::StrategyDhw {
            strategy: [1u8; 32],
            dhw_index: 1,
            yield_pct,
            value_at_dhw: 1_000,
            shares_minted: 1_000_000,
            shares_redeemed: 0,
            settled: true,
            timestamp: 100,
        }
    }

    #[test]
    fn test_event_type() {
        let event = dhw_event(0);
        assert_eq!(event.event_type(), EventType::StrategyDhw);
        assert_eq!(event.timestamp(), 100);
    }

    #[test]
    fn test_event_serialization() {
        let event = VaultEvent::DepositInitiated {
            vault: [1u8; 32],
            receipt_id: 1,
            receiver: [2u8; 32],
            assets: vec![600, 400],
            flush_index: 0,
            referral: [0u8; 32],
            timestamp: 200,
        };

        let bytes = event.to_bytes();
        let restored = VaultEvent::from_bytes(&bytes).unwrap();

        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();
        assert!(!log.has_events());

        log.emit(dhw_event(0));
        log.emit(VaultEvent::StrategyRemoved {
            strategy: [1u8; 32],
            vaults_affected: 2,
            timestamp: 300,
        });

        assert_eq!(log.len(), 2);
        assert_eq!(log.filter_by_type(EventType::StrategyDhw).len(), 1);
        assert_eq!(log.filter_by_type(EventType::FastRedeem).len(), 0);
    }

    #[test]
    fn test_digest_is_deterministic() {
        let mut a = EventLog::new();
        let mut b = EventLog::new();
        a.emit(dhw_event(5));
        b.emit(dhw_event(5));
        assert_eq!(a.digest(), b.digest());

        let mut c = EventLog::new();
        c.emit(dhw_event(6));
        assert_ne!(a.digest(), c.digest());
        assert_eq!(dhw_event(5).digest(), dhw_event(5).digest());
    }
}
