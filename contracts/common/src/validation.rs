//! Validation Helpers
//!
//! Reusable input checks shared by the kernel components. All of them run
//! before any state is touched.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use yieldvault_common::validation::{check, require_same_length};
//!
//! check!(amount > 0, VaultError::ZeroAmount);
//! require_same_length(assets.len(), amounts.len())?;
//! ```

use crate::{
    constants::percent::FULL_PERCENT,
    constants::GHOST_STRATEGY,
    errors::{VaultError, VaultResult},
    types::Address,
};

// ============ Validation Macro ============

/// Return `$error` from the enclosing function unless `$condition` holds.
#[macro_export]
macro_rules! check {
    ($condition:expr, $error:expr) => {
        if !($condition) {
            return Err($error);
        }
    };
}

pub use crate::check;

// ============ Common Validation Helpers ============

/// Require two parallel arrays to have the same length.
pub fn require_same_length(expected: usize, actual: usize) -> VaultResult<()> {
    if expected != actual {
        return Err(VaultError::InvalidArrayLength { expected, actual });
    }
    Ok(())
}

/// Require at least one non-zero amount.
pub fn require_any_nonzero(amounts: &[u128]) -> VaultResult<()> {
    if amounts.iter().all(|a| *a == 0) {
        return Err(VaultError::ZeroAmount);
    }
    Ok(())
}

/// Require sufficient balance for an operation.
pub fn require_sufficient_balance(available: u128, requested: u128) -> VaultResult<()> {
    if available < requested {
        return Err(VaultError::InsufficientBalance {
            available,
            requested,
        });
    }
    Ok(())
}

/// Require a fee percentage not to exceed its cap.
pub fn require_fee_within(fee: u128, maximum: u128) -> VaultResult<()> {
    if fee > maximum {
        return Err(VaultError::FeeTooLarge { fee, maximum });
    }
    Ok(())
}

/// Require allocations to sum to exactly 100%.
pub fn require_full_allocation(allocation: &[u128]) -> VaultResult<()> {
    let total = allocation
        .iter()
        .fold(0u128, |acc, pct| acc.saturating_add(*pct));
    if total != FULL_PERCENT {
        return Err(VaultError::InvalidAllocation { total });
    }
    Ok(())
}

/// Require a strategy id not to be the ghost placeholder.
pub fn require_not_ghost(strategy: &Address) -> VaultResult<()> {
    if *strategy == GHOST_STRATEGY {
        return Err(VaultError::GhostStrategy {
            strategy: *strategy,
        });
    }
    Ok(())
}

/// Require that a list contains no repeated entries.
pub fn require_unique(items: &[Address], param: &'static str) -> VaultResult<()> {
    for (i, item) in items.iter().enumerate() {
        if items[..i].contains(item) {
            return Err(VaultError::InvalidInput {
                param,
                reason: "duplicate entry",
            });
        }
    }
    Ok(())
}

// ============ Tests ============
