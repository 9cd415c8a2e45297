//! Kernel Configuration
//!
//! Deployment-time parameters with defaults taken from [`crate::constants`].
//! Persisted as CBOR.

use serde::{Deserialize, Serialize};

use crate::constants::limits::DEFAULT_UNSTAKE_COOLDOWN;
use crate::constants::platform_fees::{
    DEFAULT_ECOSYSTEM_FEE, DEFAULT_TREASURY_FEE, ECOSYSTEM_FEE_MAX, TREASURY_FEE_MAX,
};
use crate::constants::yield_bounds::{DEFAULT_MAX_YIELD, DEFAULT_MIN_YIELD};
use crate::errors::{VaultError, VaultResult};
use crate::types::{Address, PlatformFees};
use crate::validation::require_fee_within;
#[cfg(feature = "std")]
use crate::Vec;

/// Kernel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Platform fees taken from strategy yield at DHW
    pub platform_fees: PlatformFees,
    /// Default lowest accepted DHW yield for new strategies
    pub default_min_yield: i128,
    /// Default highest accepted DHW yield for new strategies
    pub default_max_yield: i128,
    /// Unstake cooldown for cooldown venues (seconds)
    pub unstake_cooldown: u64,
}

impl KernelConfig {
    /// Default configuration paying platform fees to the given recipients
    pub fn with_recipients(ecosystem_fee_receiver: Address, treasury_fee_receiver: Address) -> Self {
        Self {
            platform_fees: PlatformFees {
                ecosystem_fee_receiver,
                ecosystem_fee_pct: DEFAULT_ECOSYSTEM_FEE,
                treasury_fee_receiver,
                treasury_fee_pct: DEFAULT_TREASURY_FEE,
            },
            default_min_yield: DEFAULT_MIN_YIELD,
            default_max_yield: DEFAULT_MAX_YIELD,
            unstake_cooldown: DEFAULT_UNSTAKE_COOLDOWN,
        }
    }

    /// Check caps and bound ordering
    pub fn validate(&self) -> VaultResult<()> {
        validate_platform_fees(&self.platform_fees)?;
        if self.default_min_yield > self.default_max_yield {
            return Err(VaultError::InvalidInput {
                param: "default_min_yield",
                reason: "min yield above max yield",
            });
        }
        Ok(())
    }

    /// Encode as CBOR
    #[cfg(feature = "std")]
    pub fn to_cbor(&self) -> VaultResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|_| VaultError::InvalidEncoding { what: "kernel config" })?;
        Ok(bytes)
    }

    /// Decode from CBOR and validate
    #[cfg(feature = "std")]
    pub fn from_cbor(bytes: &[u8]) -> VaultResult<Self> {
        let config: Self = ciborium::from_reader(bytes)
            .map_err(|_| VaultError::InvalidEncoding { what: "kernel config" })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a CBOR file
    #[cfg(feature = "std")]
    pub fn load(path: &std::path::Path) -> VaultResult<Self> {
        let bytes = std::fs::read(path).map_err(|_| VaultError::InvalidInput {
            param: "path",
            reason: "config file not readable",
        })?;
        Self::from_cbor(&bytes)
    }

    /// Save to a CBOR file
    #[cfg(feature = "std")]
    pub fn save(&self, path: &std::path::Path) -> VaultResult<()> {
        let bytes = self.to_cbor()?;
        std::fs::write(path, bytes).map_err(|_| VaultError::InvalidInput {
            param: "path",
            reason: "config file not writable",
        })
    }
}

/// Check platform fee caps
pub fn validate_platform_fees(fees: &PlatformFees) -> VaultResult<()> {
    require_fee_within(fees.ecosystem_fee_pct, ECOSYSTEM_FEE_MAX)?;
    require_fee_within(fees.treasury_fee_pct, TREASURY_FEE_MAX)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> KernelConfig {
        KernelConfig::with_recipients([0xE0; 32], [0xE1; 32])
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.platform_fees.total_pct(), 5_00);
    }

    #[test]
    fn test_fee_caps() {
        let mut config = config();
        config.platform_fees.ecosystem_fee_pct = 20_01;
        assert!(matches!(config.validate(), Err(VaultError::FeeTooLarge { .. })));

        let mut config = self::config();
        config.platform_fees.treasury_fee_pct = 10_01;
        assert!(matches!(config.validate(), Err(VaultError::FeeTooLarge { .. })));
    }

    #[test]
    fn test_cbor_roundtrip() {
        let mut config = config();
        config.unstake_cooldown = 3600;
        let bytes = config.to_cbor().unwrap();
        assert_eq!(KernelConfig::from_cbor(&bytes).unwrap(), config);
        assert!(matches!(
            KernelConfig::from_cbor(&[0xFF, 0x00]),
            Err(VaultError::InvalidEncoding { .. })
        ));
    }

    #[test]
    fn test_file_persistence() {
        let path = std::env::temp_dir().join("yieldvault-kernel-config-test.cbor");
        let config = config();
        config.save(&path).unwrap();
        assert_eq!(KernelConfig::load(&path).unwrap(), config);
        let _ = std::fs::remove_file(&path);
    }
}
