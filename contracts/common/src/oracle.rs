//! Price Feed
//!
//! USD exchange rates consumed by DHW, flush and sync. Rates are scaled by
//! [`PRICE_PRECISION`]: `value = amount * rate / PRICE_PRECISION`.

use crate::constants::precision::PRICE_PRECISION;
use crate::errors::{VaultError, VaultResult};
use crate::types::Address;
use crate::{BTreeMap, Vec};

/// Source of asset exchange rates
pub trait PriceFeed {
    /// USD exchange rate of one asset
    fn exchange_rate(&self, asset: &Address) -> VaultResult<u128>;

    /// Exchange rates of every asset, in order
    fn exchange_rates(&self, assets: &[Address]) -> VaultResult<Vec<u128>> {
        assets.iter().map(|asset| self.exchange_rate(asset)).collect()
    }
}

/// Price feed with operator-set rates
#[derive(Debug, Clone, Default)]
pub struct FixedPriceFeed {
    rates: BTreeMap<Address, u128>,
}

impl FixedPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style rate setter
    pub fn with_rate(mut self, asset: Address, rate: u128) -> Self {
        self.rates.insert(asset, rate);
        self
    }

    pub fn set_rate(&mut self, asset: Address, rate: u128) {
        self.rates.insert(asset, rate);
    }

    /// Set a rate of `usd` whole dollars per whole asset unit
    pub fn set_usd_price(&mut self, asset: Address, usd: u128) {
        self.set_rate(asset, usd.saturating_mul(PRICE_PRECISION));
    }
}

impl PriceFeed for FixedPriceFeed {
    fn exchange_rate(&self, asset: &Address) -> VaultResult<u128> {
        match self.rates.get(asset) {
            Some(rate) if *rate > 0 => Ok(*rate),
            _ => Err(VaultError::InvalidInput {
                param: "asset",
                reason: "no exchange rate for asset",
            }),
        }
    }
}
