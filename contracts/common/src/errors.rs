//! Error Types for the YieldVault Kernel
//!
//! Every failure the kernel can report, grouped by how a caller is expected
//! to react: fix the input, adjust parameters or wait, or treat it as fatal.

use core::fmt;

use crate::access_control::Role;
use crate::types::{Address, AssetGroupId};

/// Result type alias for kernel operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Main error enum for all kernel errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    // ============ Input Validation Errors ============
    /// Two arrays that must line up have different lengths
    InvalidArrayLength { expected: usize, actual: usize },

    /// Asset group id unknown or not matching the declared one
    InvalidAssetGroup { asset_group_id: AssetGroupId },

    /// Strategy is not registered (or the id is reserved)
    InvalidStrategy { strategy: Address },

    /// Placeholder strategy passed where a live one is required
    GhostStrategy { strategy: Address },

    /// Strategy id registered twice
    StrategyAlreadyRegistered { strategy: Address },

    /// Empty strategy list
    NoStrategies,

    /// Zero amount not allowed
    ZeroAmount,

    /// Allocation does not add up to 100%
    InvalidAllocation { total: u128 },

    /// Fee percentage above its cap
    FeeTooLarge { fee: u128, maximum: u128 },

    /// Invalid input parameter
    InvalidInput { param: &'static str, reason: &'static str },

    /// DHW parameters were built for an earlier point in time
    DoHardWorkParametersExpired { valid_until: u64, now: u64 },

    /// Slippage guard variant does not match the strategy's net flow
    InvalidSlippageMode { strategy: Address },

    /// Receipt id unknown, of the wrong kind or owned by someone else
    InvalidReceipt { receipt_id: u128 },

    /// Smart vault not found
    SmartVaultNotFound { vault: Address },

    /// Smart vault id registered twice
    SmartVaultAlreadyRegistered { vault: Address },

    /// Caller lacks the role the entry point requires
    MissingRole { role: Role, account: Address },

    /// Caller is not on the asset ledger allow-list
    CallerNotAllowed { caller: Address },

    /// Operation requires an atomic strategy
    NonAtomicStrategy { strategy: Address },

    /// Bytes could not be decoded (config or continuation payload)
    InvalidEncoding { what: &'static str },

    /// Guard engine rejected the request
    GuardsFailed { vault: Address },

    // ============ Guard / Economic Errors ============
    /// Observed value outside caller-supplied bounds
    SlippageExceeded { strategy: Address, expected: u128, actual: u128 },

    /// Oracle exchange rate outside the batch tolerance
    ExchangeRateOutOfSlippages { asset: Address, rate: u128, min: u128, max: u128 },

    /// Realized yield outside the strategy's configured bounds
    YieldOutOfBounds { strategy: Address, yield_pct: i128, min: i128, max: i128 },

    /// Insufficient balance for operation
    InsufficientBalance { available: u128, requested: u128 },

    /// Nothing pending for the flush index
    NothingToFlush,

    /// Deposit receipt's flush index is not synced yet
    DepositNotSyncedYet { flush_index: u64 },

    /// Withdrawal receipt's flush index is not synced yet
    WithdrawalNotSyncedYet { flush_index: u64 },

    /// Strategy epoch a flush was routed into has not settled
    DhwNotSettled { strategy: Address, dhw_index: u64 },

    /// Strategy has an epoch waiting for continuation
    ContinuationPending { strategy: Address, dhw_index: u64 },

    /// Continuation requested for a strategy with nothing pending
    NoPendingContinuation { strategy: Address },

    /// External unstake cooldown still running
    CooldownNotElapsed { ready_at: u64, now: u64 },

    /// Vault has flushes that are not synced yet
    VaultNotSynced { vault: Address },

    /// Strategy still has unsettled flows
    StrategyHasPendingFlows { strategy: Address },

    /// Strategy is exited, removed or mid emergency withdrawal
    StrategyNotActive { strategy: Address },

    // ============ Invariant Violations ============
    /// Sequential id space exhausted
    IdOverflow,

    /// Two unsynced flushes routed into the same strategy epoch
    FlushOverlap { strategy: Address, dhw_index: u64 },

    /// Share supply no longer matches the sum of balances
    ConservationViolated { supply: u128, balances: u128 },

    /// Invalid state transition
    InvalidStateTransition,

    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,
}

/// How a caller should treat an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected before any mutation; resubmit corrected input
    InputValidation,
    /// Expected operational condition; adjust parameters or wait
    Economic,
    /// Should never happen; the call failed closed
    Invariant,
}

impl VaultError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArrayLength { .. } => "E001_INVALID_ARRAY_LENGTH",
            Self::InvalidAssetGroup { .. } => "E002_INVALID_ASSET_GROUP",
            Self::InvalidStrategy { .. } => "E003_INVALID_STRATEGY",
            Self::GhostStrategy { .. } => "E004_GHOST_STRATEGY",
            Self::StrategyAlreadyRegistered { .. } => "E005_STRATEGY_REGISTERED",
            Self::NoStrategies => "E006_NO_STRATEGIES",
            Self::ZeroAmount => "E007_ZERO_AMOUNT",
            Self::InvalidAllocation { .. } => "E008_INVALID_ALLOCATION",
            Self::FeeTooLarge { .. } => "E009_FEE_TOO_LARGE",
            Self::InvalidInput { .. } => "E010_INVALID_INPUT",
            Self::DoHardWorkParametersExpired { .. } => "E011_DHW_EXPIRED",
            Self::InvalidSlippageMode { .. } => "E012_INVALID_SLIPPAGE_MODE",
            Self::InvalidReceipt { .. } => "E013_INVALID_RECEIPT",
            Self::SmartVaultNotFound { .. } => "E014_VAULT_NOT_FOUND",
            Self::SmartVaultAlreadyRegistered { .. } => "E015_VAULT_REGISTERED",
            Self::MissingRole { .. } => "E016_MISSING_ROLE",
            Self::CallerNotAllowed { .. } => "E017_CALLER_NOT_ALLOWED",
            Self::NonAtomicStrategy { .. } => "E018_NON_ATOMIC",
            Self::InvalidEncoding { .. } => "E019_INVALID_ENCODING",
            Self::GuardsFailed { .. } => "E020_GUARDS_FAILED",
            Self::SlippageExceeded { .. } => "E030_SLIPPAGE",
            Self::ExchangeRateOutOfSlippages { .. } => "E031_EXCHANGE_RATE",
            Self::YieldOutOfBounds { .. } => "E032_YIELD_BOUNDS",
            Self::InsufficientBalance { .. } => "E033_INSUFFICIENT_BALANCE",
            Self::NothingToFlush => "E034_NOTHING_TO_FLUSH",
            Self::DepositNotSyncedYet { .. } => "E035_DEPOSIT_NOT_SYNCED",
            Self::WithdrawalNotSyncedYet { .. } => "E036_WITHDRAWAL_NOT_SYNCED",
            Self::DhwNotSettled { .. } => "E037_DHW_NOT_SETTLED",
            Self::ContinuationPending { .. } => "E038_CONTINUATION_PENDING",
            Self::NoPendingContinuation { .. } => "E039_NO_CONTINUATION",
            Self::CooldownNotElapsed { .. } => "E040_COOLDOWN",
            Self::VaultNotSynced { .. } => "E041_VAULT_NOT_SYNCED",
            Self::StrategyHasPendingFlows { .. } => "E042_PENDING_FLOWS",
            Self::StrategyNotActive { .. } => "E043_STRATEGY_INACTIVE",
            Self::IdOverflow => "E080_ID_OVERFLOW",
            Self::FlushOverlap { .. } => "E081_FLUSH_OVERLAP",
            Self::ConservationViolated { .. } => "E082_CONSERVATION",
            Self::InvalidStateTransition => "E083_INVALID_STATE",
            Self::Overflow => "E084_OVERFLOW",
            Self::Underflow => "E085_UNDERFLOW",
            Self::DivisionByZero => "E086_DIV_ZERO",
        }
    }

    /// Classify the error for retry decisions
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidArrayLength { .. }
            | Self::InvalidAssetGroup { .. }
            | Self::InvalidStrategy { .. }
            | Self::GhostStrategy { .. }
            | Self::StrategyAlreadyRegistered { .. }
            | Self::NoStrategies
            | Self::ZeroAmount
            | Self::InvalidAllocation { .. }
            | Self::FeeTooLarge { .. }
            | Self::InvalidInput { .. }
            | Self::DoHardWorkParametersExpired { .. }
            | Self::InvalidSlippageMode { .. }
            | Self::InvalidReceipt { .. }
            | Self::SmartVaultNotFound { .. }
            | Self::SmartVaultAlreadyRegistered { .. }
            | Self::MissingRole { .. }
            | Self::CallerNotAllowed { .. }
            | Self::NonAtomicStrategy { .. }
            | Self::InvalidEncoding { .. }
            | Self::GuardsFailed { .. } => ErrorClass::InputValidation,
            Self::SlippageExceeded { .. }
            | Self::ExchangeRateOutOfSlippages { .. }
            | Self::YieldOutOfBounds { .. }
            | Self::InsufficientBalance { .. }
            | Self::NothingToFlush
            | Self::DepositNotSyncedYet { .. }
            | Self::WithdrawalNotSyncedYet { .. }
            | Self::DhwNotSettled { .. }
            | Self::ContinuationPending { .. }
            | Self::NoPendingContinuation { .. }
            | Self::CooldownNotElapsed { .. }
            | Self::VaultNotSynced { .. }
            | Self::StrategyHasPendingFlows { .. }
            | Self::StrategyNotActive { .. } => ErrorClass::Economic,
            Self::IdOverflow
            | Self::FlushOverlap { .. }
            | Self::ConservationViolated { .. }
            | Self::InvalidStateTransition
            | Self::Overflow
            | Self::Underflow
            | Self::DivisionByZero => ErrorClass::Invariant,
        }
    }

    /// Returns true if waiting or adjusting parameters can make the call succeed
    pub fn is_recoverable(&self) -> bool {
        self.class() != ErrorClass::Invariant
    }
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.code(), self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for VaultError {}
