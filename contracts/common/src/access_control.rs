//! Access Control Module
//!
//! Role-based permissions for kernel entry points. The kernel only consumes
//! the [`AccessControl`] trait; [`RoleRegistry`] is the in-memory
//! implementation wired in at deployment.

use crate::errors::{VaultError, VaultResult};
use crate::types::Address;
use crate::Vec;

// ============================================================================
// Types
// ============================================================================

/// Kernel roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    /// Protocol admin - registers strategies, sets fees, grants roles
    Admin,
    /// Runs do-hard-work batches and continuations
    DoHardWorker,
    /// Triggers emergency withdrawals
    EmergencyWithdrawalExecutor,
    /// Creates smart vaults
    VaultIntegrator,
}

impl Role {
    /// Get role priority (higher = more powerful)
    pub fn priority(&self) -> u8 {
        match self {
            Role::Admin => 100,
            Role::EmergencyWithdrawalExecutor => 60,
            Role::DoHardWorker => 50,
            Role::VaultIntegrator => 30,
        }
    }
}

/// Role lookup consumed by the kernel
pub trait AccessControl {
    /// Returns true if `account` holds `role`
    fn has_role(&self, role: Role, account: &Address) -> bool;

    /// Fail with `MissingRole` unless `account` holds `role`
    fn ensure_role(&self, role: Role, account: &Address) -> VaultResult<()> {
        if self.has_role(role, account) {
            Ok(())
        } else {
            Err(VaultError::MissingRole { role, account: *account })
        }
    }
}

/// Role assignment for an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    /// Address with the role
    pub address: Address,
    /// Assigned role
    pub role: Role,
    /// Address that granted the role
    pub granted_by: Address,
}

/// In-memory role registry
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    assignments: Vec<RoleAssignment>,
}

impl RoleRegistry {
    /// Create a registry with a bootstrap admin
    pub fn new(admin: Address) -> Self {
        Self {
            assignments: Vec::from([RoleAssignment {
                address: admin,
                role: Role::Admin,
                granted_by: admin,
            }]),
        }
    }

    /// Grant `role` to `account`; only admins can grant
    pub fn grant_role(&mut self, granter: &Address, role: Role, account: Address) -> VaultResult<()> {
        self.ensure_role(Role::Admin, granter)?;
        if !self.has_role(role, &account) {
            self.assignments.push(RoleAssignment {
                address: account,
                role,
                granted_by: *granter,
            });
        }
        Ok(())
    }

    /// Revoke `role` from `account`; the last admin cannot be removed
    pub fn revoke_role(&mut self, revoker: &Address, role: Role, account: &Address) -> VaultResult<()> {
        self.ensure_role(Role::Admin, revoker)?;
        if role == Role::Admin && self.members(Role::Admin).len() == 1 && self.has_role(role, account) {
            return Err(VaultError::InvalidInput {
                param: "account",
                reason: "cannot revoke the last admin",
            });
        }
        self.assignments
            .retain(|a| !(a.role == role && a.address == *account));
        Ok(())
    }

    /// All holders of a role
    pub fn members(&self, role: Role) -> Vec<Address> {
        self.assignments
            .iter()
            .filter(|a| a.role == role)
            .map(|a| a.address)
            .collect()
    }
}

impl AccessControl for RoleRegistry {
    fn has_role(&self, role: Role, account: &Address) -> bool {
        self.assignments
            .iter()
            .any(|a| a.role == role && a.address == *account)
    }
}
