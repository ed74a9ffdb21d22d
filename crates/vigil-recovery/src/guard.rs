//! Vault mutation lock
//!
//! A vault under recovery must not change shape: no new parties, no removed
//! guardians, no schedule edits. Write paths call [`VaultLockGuard::ensure_mutable`]
//! before any other validation so a locked vault always reports
//! [`VigilError::VaultLocked`], whatever else is wrong with the request.

use crate::types::{Vault, VaultStatus};
use vigil_core::{VigilError, VigilResult};

/// Gate in front of every vault and party mutation.
#[derive(Debug, Default, Clone, Copy)]
pub struct VaultLockGuard;

impl VaultLockGuard {
    /// False exactly while recovery is in progress.
    pub fn is_mutable(&self, vault: &Vault) -> bool {
        vault.status != VaultStatus::Triggered
    }

    /// Reject mutations on triggered vaults, then on terminal ones.
    pub fn ensure_mutable(&self, vault: &Vault) -> VigilResult<()> {
        if !self.is_mutable(vault) {
            tracing::debug!(vault_id = %vault.id, "mutation rejected, vault locked");
            return Err(VigilError::VaultLocked);
        }
        if vault.status.is_terminal() {
            return Err(VigilError::transition(vault.status, "modified"));
        }
        Ok(())
    }
}
