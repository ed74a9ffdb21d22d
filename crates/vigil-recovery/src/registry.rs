//! Party registry
//!
//! Guardians, beneficiaries and attestors of each vault. Guardian cardinality
//! follows the vault's scheme: at least `N` active guardians once set up, at
//! most `max(N, 5)`. Emails are compared case-insensitively and must be unique
//! per vault and role among parties that have not declined.

use crate::facts::VaultFact;
use crate::fragment_vault::FragmentVault;
use crate::guard::VaultLockGuard;
use crate::store::Transaction;
use crate::types::{Party, PartyRole, PartyStatus};
use vigil_core::{PartyId, PhysicalTime, VaultId, VigilError, VigilResult};

/// Normalize an email for comparison and storage.
pub fn normalize_email(email: &str) -> VigilResult<String> {
    let normalized = email.trim().to_lowercase();
    let well_formed = match normalized.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !normalized.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !well_formed {
        return Err(VigilError::invalid(format!("Malformed email '{}'", email.trim())));
    }
    Ok(normalized)
}

/// Counts of a vault's active parties by role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RosterCounts {
    pub guardians: usize,
    pub beneficiaries: usize,
    pub attestors: usize,
}

/// Party membership rules for every vault.
#[derive(Debug, Default, Clone, Copy)]
pub struct PartyRegistry {
    guard: VaultLockGuard,
}

impl PartyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active parties of the vault, by role.
    pub fn counts(&self, tx: &Transaction<'_>, vault_id: VaultId) -> RosterCounts {
        tx.parties(vault_id)
            .filter(|p| p.is_active())
            .fold(RosterCounts::default(), |mut counts, party| {
                match party.role {
                    PartyRole::Guardian => counts.guardians += 1,
                    PartyRole::Beneficiary => counts.beneficiaries += 1,
                    PartyRole::Attestor => counts.attestors += 1,
                }
                counts
            })
    }

    /// Create a pending party without a fragment.
    pub fn invite(
        &self,
        tx: &mut Transaction<'_>,
        vault_id: VaultId,
        role: PartyRole,
        email: &str,
        now: PhysicalTime,
    ) -> VigilResult<PartyId> {
        self.guard.ensure_mutable(tx.vault(vault_id)?)?;
        let email = normalize_email(email)?;
        let duplicate = tx.parties(vault_id).any(|p| {
            p.role == role && p.status != PartyStatus::Declined && p.email == email
        });
        if duplicate {
            return Err(VigilError::DuplicateParty);
        }

        let party = Party {
            id: PartyId::new(),
            vault_id,
            role,
            email,
            status: PartyStatus::Pending,
            fragment_id: None,
            created_at: now,
        };
        let party_id = party.id;
        tx.insert_party(party);
        tx.emit(VaultFact::PartyAdded {
            vault_id,
            party_id,
            role,
            at: now,
        });
        Ok(party_id)
    }

    /// Promote a pending party to active; guardians receive a fragment.
    pub fn accept(
        &self,
        tx: &mut Transaction<'_>,
        custody: &FragmentVault,
        party_id: PartyId,
        now: PhysicalTime,
    ) -> VigilResult<()> {
        let party = tx.party(party_id)?.clone();
        let vault = tx.vault(party.vault_id)?.clone();
        self.guard.ensure_mutable(&vault)?;
        if party.status != PartyStatus::Pending {
            return Err(VigilError::transition(party.status, "active"));
        }

        if party.role == PartyRole::Guardian {
            let active = self.counts(tx, vault.id).guardians;
            if active >= vault.scheme.max_guardians() {
                return Err(VigilError::GuardianCapExceeded {
                    maximum: vault.scheme.max_guardians(),
                });
            }
        }

        let fragment = if party.role == PartyRole::Guardian {
            Some(custody.assign(tx, vault.id, party_id, vault.scheme)?)
        } else {
            None
        };

        let record = tx.party_mut(party_id)?;
        record.status = PartyStatus::Active;
        record.fragment_id = fragment.map(|(id, _)| id);

        tx.emit(VaultFact::PartyAccepted {
            vault_id: vault.id,
            party_id,
            at: now,
        });
        if let Some((_, index)) = fragment {
            tx.emit(VaultFact::FragmentAssigned {
                vault_id: vault.id,
                party_id,
                index,
                at: now,
            });
        }
        Ok(())
    }

    /// Mark a pending invitation declined.
    pub fn decline(
        &self,
        tx: &mut Transaction<'_>,
        party_id: PartyId,
        now: PhysicalTime,
    ) -> VigilResult<()> {
        let party = tx.party(party_id)?.clone();
        self.guard.ensure_mutable(tx.vault(party.vault_id)?)?;
        if party.status != PartyStatus::Pending {
            return Err(VigilError::transition(party.status, "declined"));
        }
        tx.party_mut(party_id)?.status = PartyStatus::Declined;
        tx.emit(VaultFact::PartyDeclined {
            vault_id: party.vault_id,
            party_id,
            at: now,
        });
        Ok(())
    }

    /// Invite and accept in one step.
    pub fn add(
        &self,
        tx: &mut Transaction<'_>,
        custody: &FragmentVault,
        vault_id: VaultId,
        role: PartyRole,
        email: &str,
        now: PhysicalTime,
    ) -> VigilResult<PartyId> {
        let party_id = self.invite(tx, vault_id, role, email, now)?;
        self.accept(tx, custody, party_id, now)?;
        Ok(party_id)
    }

    /// Remove a party. Active guardians give up their fragment, which is
    /// revoked while the remaining fragments are renewed.
    pub fn remove(
        &self,
        tx: &mut Transaction<'_>,
        custody: &FragmentVault,
        party_id: PartyId,
        now: PhysicalTime,
    ) -> VigilResult<()> {
        let party = tx.party(party_id)?.clone();
        let vault = tx.vault(party.vault_id)?.clone();
        self.guard.ensure_mutable(&vault)?;

        if party.is_active_guardian() {
            let remaining = self.counts(tx, vault.id).guardians.saturating_sub(1);
            if remaining < vault.scheme.min_guardians() {
                return Err(VigilError::MinimumGuardiansRequired {
                    minimum: vault.scheme.min_guardians(),
                });
            }
        }

        tx.remove_party(party_id);
        tx.emit(VaultFact::PartyRemoved {
            vault_id: vault.id,
            party_id,
            role: party.role,
            at: now,
        });

        if let Some(fragment_id) = party.fragment_id {
            let (revoked_index, remaining) =
                custody.revoke(tx, vault.id, fragment_id, vault.scheme)?;
            tx.emit(VaultFact::FragmentsRenewed {
                vault_id: vault.id,
                revoked_index,
                remaining,
                at: now,
            });
        }
        Ok(())
    }
}
