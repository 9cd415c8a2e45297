//! Asset Groups
//!
//! An asset group is the ordered list of assets a vault or strategy works
//! with. Every amount vector in the kernel is indexed in group order.

use crate::constants::limits::ASSET_GROUP_SIZE_CAP;
use crate::errors::{VaultError, VaultResult};
use crate::types::{Address, AssetGroupId};
use crate::validation::require_unique;
use crate::Vec;

/// Append-only registry of asset groups; ids are sequential from 1
#[derive(Debug, Clone, Default)]
pub struct AssetGroupRegistry {
    groups: Vec<Vec<Address>>,
}

impl AssetGroupRegistry {
    pub fn new() -> Self {
        Self { groups: Vec::new() }
    }

    /// Register a group, or return the id of an identical existing one
    pub fn register(&mut self, assets: &[Address]) -> VaultResult<AssetGroupId> {
        if assets.is_empty() {
            return Err(VaultError::InvalidInput {
                param: "assets",
                reason: "asset group is empty",
            });
        }
        if assets.len() > ASSET_GROUP_SIZE_CAP {
            return Err(VaultError::InvalidInput {
                param: "assets",
                reason: "asset group too large",
            });
        }
        require_unique(assets, "assets")?;

        if let Some(position) = self.groups.iter().position(|g| g.as_slice() == assets) {
            return Ok(position as AssetGroupId + 1);
        }

        self.groups.push(assets.to_vec());
        Ok(self.groups.len() as AssetGroupId)
    }

    /// Assets of a group
    pub fn get(&self, id: AssetGroupId) -> VaultResult<&[Address]> {
        if id == 0 {
            return Err(VaultError::InvalidAssetGroup { asset_group_id: id });
        }
        self.groups
            .get((id - 1) as usize)
            .map(|g| g.as_slice())
            .ok_or(VaultError::InvalidAssetGroup { asset_group_id: id })
    }

    /// Number of assets in a group
    pub fn group_len(&self, id: AssetGroupId) -> VaultResult<usize> {
        self.get(id).map(|g| g.len())
    }

    /// Fail unless `assets` is exactly the registered group
    pub fn require_matches(&self, id: AssetGroupId, assets: &[Address]) -> VaultResult<()> {
        if self.get(id)? != assets {
            return Err(VaultError::InvalidAssetGroup { asset_group_id: id });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
