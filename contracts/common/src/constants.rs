//! Protocol Constants
//!
//! All fixed-point scales, caps and reserved identifiers used by the
//! settlement kernel. Percentages come in two precisions: allocation and
//! fee percentages use [`percent::FULL_PERCENT`], yield percentages use the
//! much finer [`percent::YIELD_FULL_PERCENT`].

use crate::types::Address;

/// Percentage scales
pub mod percent {
    /// 100% for allocations and fees (basis points)
    pub const FULL_PERCENT: u128 = 100_00;

    /// 100% for yield percentages (1e12)
    pub const YIELD_FULL_PERCENT: i128 = 1_000_000_000_000;

    /// Same as [`YIELD_FULL_PERCENT`], unsigned
    pub const YIELD_FULL_PERCENT_U: u128 = YIELD_FULL_PERCENT as u128;
}

/// Price and share precision
pub mod precision {
    /// USD exchange rates are scaled by 1e18 per 1e18 asset base units
    pub const PRICE_PRECISION: u128 = 1_000_000_000_000_000_000;

    /// Cumulative yield indexes start at 1e18
    pub const INDEX_PRECISION: u128 = 1_000_000_000_000_000_000;

    /// Shares minted per USD unit when a share supply is empty
    pub const INITIAL_SHARE_MULTIPLIER: u128 = 1000;
}

/// Smart vault fee caps (in `FULL_PERCENT` units)
pub mod vault_fees {
    /// Maximum annual management fee (5%)
    pub const MANAGEMENT_FEE_MAX: u128 = 5_00;

    /// Maximum deposit fee (5%)
    pub const DEPOSIT_FEE_MAX: u128 = 5_00;

    /// Maximum performance fee (20%)
    pub const PERFORMANCE_FEE_MAX: u128 = 20_00;

    /// Seconds in a (tropical) year, used to pro-rate management fees
    pub const SECONDS_IN_YEAR: u128 = 31_556_926;
}

/// Platform fees minted as strategy shares at DHW
pub mod platform_fees {
    /// Maximum ecosystem fee (20%)
    pub const ECOSYSTEM_FEE_MAX: u128 = 20_00;

    /// Maximum treasury fee (10%)
    pub const TREASURY_FEE_MAX: u128 = 10_00;

    /// Default ecosystem fee (3%)
    pub const DEFAULT_ECOSYSTEM_FEE: u128 = 3_00;

    /// Default treasury fee (2%)
    pub const DEFAULT_TREASURY_FEE: u128 = 2_00;
}

/// DHW yield guard defaults (in `YIELD_FULL_PERCENT` units)
pub mod yield_bounds {
    use super::percent::YIELD_FULL_PERCENT;

    /// Default lowest yield accepted for one DHW (-20%)
    pub const DEFAULT_MIN_YIELD: i128 = -YIELD_FULL_PERCENT / 5;

    /// Default highest yield accepted for one DHW (+50%)
    pub const DEFAULT_MAX_YIELD: i128 = YIELD_FULL_PERCENT / 2;
}

/// Receipt tokens
pub mod receipts {
    /// Fractional units minted per receipt
    pub const NFT_MINTED_SHARES: u128 = 1_000_000;

    /// Highest id a deposit receipt can take; withdrawal ids start above it
    pub const MAXIMAL_DEPOSIT_ID: u128 = 1 << 127;
}

/// Structural limits
pub mod limits {
    /// Maximum number of strategies a vault can route to
    pub const STRATEGY_COUNT_CAP: usize = 16;

    /// Maximum number of assets in one asset group
    pub const ASSET_GROUP_SIZE_CAP: usize = 8;

    /// Default unstake cooldown for cooldown venues (7 days)
    pub const DEFAULT_UNSTAKE_COOLDOWN: u64 = 7 * 24 * 60 * 60;
}

/// Reserved holder: shares minted but not yet claimed
pub const UNCLAIMED_HOLDER: Address = [0xFD; 32];

/// Reserved holder: strategy shares released for redemption, burned at DHW
pub const REDEEM_ESCROW_HOLDER: Address = [0xFE; 32];

/// The ghost strategy, a placeholder left behind by removed strategies
pub const GHOST_STRATEGY: Address = [0u8; 32];

/// Component identities presented to the asset ledger allow-list
pub mod components {
    use crate::types::Address;

    /// Deposit manager
    pub const DEPOSIT_MANAGER: Address = [0xD1; 32];

    /// Withdrawal manager
    pub const WITHDRAWAL_MANAGER: Address = [0xD2; 32];

    /// Strategy registry
    pub const STRATEGY_REGISTRY: Address = [0xD3; 32];
}
