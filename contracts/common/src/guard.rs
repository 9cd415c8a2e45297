//! Guards and Allocation
//!
//! Pluggable policies the orchestrator consults: a guard engine that can
//! veto user requests, and an allocation provider that turns requested
//! strategy weights into the vault's target allocation.

use crate::constants::percent::FULL_PERCENT;
use crate::errors::{VaultError, VaultResult};
use crate::math::mul_div;
use crate::types::{Address, StrategyId, VaultId};
use crate::validation::{require_full_allocation, require_same_length};
use crate::{BTreeSet, Vec};

// ============================================================================
// Guard Engine
// ============================================================================

/// Request kinds subject to guards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Deposit,
    Withdrawal,
    FastRedeem,
    TransferReceipt,
}

/// What the guard engine sees about a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub vault: VaultId,
    pub request_type: RequestType,
    /// Account executing the call
    pub executor: Address,
    /// Account whose funds or shares are moved
    pub owner: Address,
    /// Account receiving the result
    pub receiver: Address,
    /// Asset amounts or, for redemptions, a single share amount
    pub amounts: Vec<u128>,
}

/// Request policy.
///
/// `run_guards` runs before the request touches any state. `run_post_guards`
/// runs once it has been applied; an error there rolls the request back.
pub trait GuardEngine {
    fn run_guards(&self, request: &RequestContext) -> VaultResult<()>;

    fn run_post_guards(&self, _request: &RequestContext) -> VaultResult<()> {
        Ok(())
    }
}

/// Guard engine that accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllGuards;

impl GuardEngine for AllowAllGuards {
    fn run_guards(&self, _request: &RequestContext) -> VaultResult<()> {
        Ok(())
    }
}

/// Guard engine rejecting requests that involve blocked accounts
#[derive(Debug, Clone, Default)]
pub struct BlocklistGuards {
    blocked: BTreeSet<Address>,
}

impl BlocklistGuards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&mut self, account: Address) {
        self.blocked.insert(account);
    }

    pub fn unblock(&mut self, account: &Address) {
        self.blocked.remove(account);
    }
}

impl GuardEngine for BlocklistGuards {
    fn run_guards(&self, request: &RequestContext) -> VaultResult<()> {
        let involved = [request.executor, request.owner, request.receiver];
        if involved.iter().any(|a| self.blocked.contains(a)) {
            return Err(VaultError::GuardsFailed { vault: request.vault });
        }
        Ok(())
    }
}

// ============================================================================
// Allocation Provider
// ============================================================================

/// Computes a vault's target allocation at creation
pub trait AllocationProvider {
    /// Allocation in `FULL_PERCENT` units, summing to 100%
    fn allocation(&self, strategies: &[StrategyId], requested: &[u128]) -> VaultResult<Vec<u128>>;
}

/// Uses the requested allocation as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedAllocation;

impl AllocationProvider for FixedAllocation {
    fn allocation(&self, strategies: &[StrategyId], requested: &[u128]) -> VaultResult<Vec<u128>> {
        require_same_length(strategies.len(), requested.len())?;
        require_full_allocation(requested)?;
        Ok(requested.to_vec())
    }
}

/// Normalises arbitrary weights to 100%; the remainder goes to the first
/// weighted strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedAllocation;

impl AllocationProvider for WeightedAllocation {
    fn allocation(&self, strategies: &[StrategyId], requested: &[u128]) -> VaultResult<Vec<u128>> {
        require_same_length(strategies.len(), requested.len())?;
        let total = requested
            .iter()
            .try_fold(0u128, |sum, w| sum.checked_add(*w))
            .ok_or(VaultError::Overflow)?;
        if total == 0 {
            return Err(VaultError::InvalidAllocation { total });
        }

        let mut allocation = requested
            .iter()
            .map(|w| mul_div(*w, FULL_PERCENT, total))
            .collect::<VaultResult<Vec<u128>>>()?;
        let assigned: u128 = allocation.iter().sum();
        if let Some(first) = requested.iter().position(|w| *w > 0) {
            allocation[first] += FULL_PERCENT - assigned;
        }
        Ok(allocation)
    }
}
