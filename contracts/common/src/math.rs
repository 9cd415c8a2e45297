//! Mathematical Utilities for the YieldVault Kernel
//!
//! Checked fixed-point arithmetic. Products of share supplies and USD values
//! routinely exceed `u128`, so every `a * b / c` goes through a 256-bit
//! intermediate and is floored.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::constants::percent::{FULL_PERCENT, YIELD_FULL_PERCENT, YIELD_FULL_PERCENT_U};
use crate::constants::precision::{INDEX_PRECISION, PRICE_PRECISION};
use crate::constants::vault_fees::SECONDS_IN_YEAR;
use crate::errors::{VaultError, VaultResult};
use crate::Vec;

/// Compute `a * b / denominator`, rounding down
pub fn mul_div(a: u128, b: u128, denominator: u128) -> VaultResult<u128> {
    if denominator == 0 {
        return Err(VaultError::DivisionByZero);
    }

    // Fast path when the product fits
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / denominator);
    }

    let wide = BigUint::from(a) * BigUint::from(b) / BigUint::from(denominator);
    wide.to_u128().ok_or(VaultError::Overflow)
}

/// Compute `a * b * c / denominator`, rounding down
pub fn mul_mul_div(a: u128, b: u128, c: u128, denominator: u128) -> VaultResult<u128> {
    if denominator == 0 {
        return Err(VaultError::DivisionByZero);
    }
    let wide = BigUint::from(a) * BigUint::from(b) * BigUint::from(c) / BigUint::from(denominator);
    if wide.is_zero() {
        return Ok(0);
    }
    wide.to_u128().ok_or(VaultError::Overflow)
}

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> VaultResult<u128> {
    a.checked_add(b).ok_or(VaultError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> VaultResult<u128> {
    a.checked_sub(b).ok_or(VaultError::Underflow)
}

/// Element-wise addition of two amount vectors
pub fn add_amounts(into: &mut [u128], amounts: &[u128]) -> VaultResult<()> {
    if into.len() != amounts.len() {
        return Err(VaultError::InvalidArrayLength {
            expected: into.len(),
            actual: amounts.len(),
        });
    }
    for (slot, amount) in into.iter_mut().zip(amounts) {
        *slot = safe_add(*slot, *amount)?;
    }
    Ok(())
}

/// A zeroed amount vector of the given length
pub fn zero_amounts(len: usize) -> Vec<u128> {
    let mut amounts = Vec::with_capacity(len);
    amounts.resize(len, 0u128);
    amounts
}

/// USD value of an asset amount at an exchange rate (1e18 scaled)
pub fn asset_value(amount: u128, rate: u128) -> VaultResult<u128> {
    mul_div(amount, rate, PRICE_PRECISION)
}

/// USD value of an amount vector at per-asset exchange rates
pub fn assets_value(amounts: &[u128], rates: &[u128]) -> VaultResult<u128> {
    if amounts.len() != rates.len() {
        return Err(VaultError::InvalidArrayLength {
            expected: rates.len(),
            actual: amounts.len(),
        });
    }
    amounts
        .iter()
        .zip(rates)
        .try_fold(0u128, |total, (amount, rate)| safe_add(total, asset_value(*amount, *rate)?))
}

/// Scale every amount by `numerator / denominator`, rounding down
pub fn scale_amounts(amounts: &[u128], numerator: u128, denominator: u128) -> VaultResult<Vec<u128>> {
    amounts
        .iter()
        .map(|amount| mul_div(*amount, numerator, denominator))
        .collect()
}

/// Split per-asset totals across strategies by allocation.
///
/// Each allocation is weighted against the allocation sum, so a vault whose
/// removed strategies were zeroed still routes everything. Per asset, the
/// rounding remainder goes to the first strategy with a non-zero allocation.
///
/// Returns `[strategy][asset]` amounts.
pub fn split_by_allocation(totals: &[u128], allocation: &[u128]) -> VaultResult<Vec<Vec<u128>>> {
    if allocation.is_empty() {
        return Err(VaultError::NoStrategies);
    }
    let allocation_sum = allocation
        .iter()
        .try_fold(0u128, |sum, pct| safe_add(sum, *pct))?;
    if allocation_sum == 0 {
        return Err(VaultError::InvalidAllocation { total: 0 });
    }
    let first_live = allocation
        .iter()
        .position(|pct| *pct > 0)
        .ok_or(VaultError::InvalidAllocation { total: 0 })?;

    let mut split: Vec<Vec<u128>> = allocation.iter().map(|_| zero_amounts(totals.len())).collect();

    for (asset, total) in totals.iter().enumerate() {
        let mut distributed = 0u128;
        for (strategy, pct) in allocation.iter().enumerate() {
            let share = mul_div(*total, *pct, allocation_sum)?;
            split[strategy][asset] = share;
            distributed = safe_add(distributed, share)?;
        }
        let dust = safe_sub(*total, distributed)?;
        split[first_live][asset] = safe_add(split[first_live][asset], dust)?;
    }

    Ok(split)
}

/// Signed yield percentage between two valuations (`YIELD_FULL_PERCENT` units).
///
/// A zero starting value yields zero: there was nothing to earn on.
pub fn yield_percentage(value_before: u128, value_after: u128) -> VaultResult<i128> {
    if value_before == 0 {
        return Ok(0);
    }
    if value_after >= value_before {
        let gain = mul_div(value_after - value_before, YIELD_FULL_PERCENT_U, value_before)?;
        i128::try_from(gain).map_err(|_| VaultError::Overflow)
    } else {
        let loss = mul_div(value_before - value_after, YIELD_FULL_PERCENT_U, value_before)?;
        i128::try_from(loss).map(|l| -l).map_err(|_| VaultError::Overflow)
    }
}

/// Shares to mint so that `fee_value` of `total_value` goes to new holders.
///
/// Solves `minted / (supply + minted) * total_value = fee_value`.
pub fn dilution_shares(supply: u128, total_value: u128, fee_value: u128) -> VaultResult<u128> {
    if fee_value == 0 || supply == 0 {
        return Ok(0);
    }
    if fee_value >= total_value {
        return Err(VaultError::InvalidStateTransition);
    }
    mul_div(supply, fee_value, total_value - fee_value)
}

/// Strategy shares minted as platform fees for a positive yield.
///
/// `total_value` already includes the yield; the yield's value is recovered
/// as `total_value * y / (1 + y)`.
pub fn platform_fee_shares(
    supply: u128,
    total_value: u128,
    yield_pct: i128,
    fee_pct: u128,
) -> VaultResult<u128> {
    if yield_pct <= 0 || fee_pct == 0 || supply == 0 {
        return Ok(0);
    }
    let y = yield_pct as u128;
    let yield_value = mul_div(total_value, y, safe_add(YIELD_FULL_PERCENT_U, y)?)?;
    let fee_value = mul_div(yield_value, fee_pct, FULL_PERCENT)?;
    dilution_shares(supply, total_value, fee_value)
}

/// Yield left for holders after platform fees
pub fn net_yield(yield_pct: i128, fee_pct: u128) -> i128 {
    if yield_pct <= 0 {
        return yield_pct;
    }
    let kept = FULL_PERCENT.saturating_sub(fee_pct) as i128;
    yield_pct * kept / FULL_PERCENT as i128
}

/// Advance a cumulative yield index (starting at `INDEX_PRECISION`) by one epoch
pub fn compound_index(index: u128, yield_pct: i128) -> VaultResult<u128> {
    let factor = YIELD_FULL_PERCENT
        .checked_add(yield_pct)
        .ok_or(VaultError::Overflow)?;
    if factor <= 0 {
        return Ok(0);
    }
    mul_div(index, factor as u128, YIELD_FULL_PERCENT_U)
}

/// Growth fraction of `value_now` attributable to the index moving from
/// `index_then` to `index_now`: `value_now * (1 - index_then / index_now)`
pub fn yield_value_between(value_now: u128, index_then: u128, index_now: u128) -> VaultResult<u128> {
    if index_now <= index_then || index_now == 0 {
        return Ok(0);
    }
    mul_div(value_now, index_now - index_then, index_now)
}

/// Vault shares minted as management fee over `elapsed` seconds
pub fn management_fee_shares(supply: u128, fee_pct: u128, elapsed: u64) -> VaultResult<u128> {
    if supply == 0 || fee_pct == 0 || elapsed == 0 {
        return Ok(0);
    }
    let denominator = SECONDS_IN_YEAR
        .checked_mul(FULL_PERCENT)
        .ok_or(VaultError::Overflow)?;
    mul_mul_div(supply, fee_pct, elapsed as u128, denominator)
}

/// Initial cumulative index
pub fn initial_index() -> u128 {
    INDEX_PRECISION
}
