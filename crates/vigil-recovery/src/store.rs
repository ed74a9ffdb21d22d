//! Transactional record store
//!
//! Every state-changing engine operation runs inside one
//! [`VaultStore::transaction`] call. The closure works on a private copy of the
//! tables; the copy replaces the committed state only when the closure
//! returns `Ok`. Transactions are serialized, so a check-in and a trigger
//! evaluation for the same vault can never interleave.
//!
//! Queries go through [`VaultStore::read`], which borrows the committed tables
//! under the same lock and never copies or persists them.
//!
//! Fragment rows are reachable one id at a time only; there is no accessor
//! that returns fragment contents in bulk.

use crate::facts::VaultFact;
use crate::types::{
    Attestation, CheckIn, FragmentRecord, Party, RecoveryRequest, Vault,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use vigil_core::{
    AttestationId, CheckInId, FragmentId, PartyId, RecoveryRequestId, VaultId, VigilError,
    VigilResult,
};

/// In-memory form of all records.
#[derive(Debug, Clone, Default)]
pub struct VaultTables {
    vaults: BTreeMap<VaultId, Vault>,
    parties: BTreeMap<PartyId, Party>,
    fragments: BTreeMap<FragmentId, FragmentRecord>,
    check_ins: BTreeMap<CheckInId, CheckIn>,
    requests: BTreeMap<RecoveryRequestId, RecoveryRequest>,
    attestations: BTreeMap<AttestationId, Attestation>,
}

/// Serialized form of [`VaultTables`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    vaults: Vec<Vault>,
    parties: Vec<Party>,
    fragments: Vec<FragmentRecord>,
    check_ins: Vec<CheckIn>,
    requests: Vec<RecoveryRequest>,
    attestations: Vec<Attestation>,
}

impl From<&VaultTables> for Snapshot {
    fn from(tables: &VaultTables) -> Self {
        Self {
            vaults: tables.vaults.values().cloned().collect(),
            parties: tables.parties.values().cloned().collect(),
            fragments: tables.fragments.values().cloned().collect(),
            check_ins: tables.check_ins.values().cloned().collect(),
            requests: tables.requests.values().cloned().collect(),
            attestations: tables.attestations.values().cloned().collect(),
        }
    }
}

impl From<Snapshot> for VaultTables {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            vaults: snapshot.vaults.into_iter().map(|v| (v.id, v)).collect(),
            parties: snapshot.parties.into_iter().map(|p| (p.id, p)).collect(),
            fragments: snapshot.fragments.into_iter().map(|f| (f.id, f)).collect(),
            check_ins: snapshot.check_ins.into_iter().map(|c| (c.id, c)).collect(),
            requests: snapshot.requests.into_iter().map(|r| (r.id, r)).collect(),
            attestations: snapshot
                .attestations
                .into_iter()
                .map(|a| (a.id, a))
                .collect(),
        }
    }
}

/// Scoped view over the tables for the duration of one transaction.
pub struct Transaction<'a> {
    tables: &'a mut VaultTables,
    facts: Vec<VaultFact>,
}

impl<'a> Transaction<'a> {
    fn new(tables: &'a mut VaultTables) -> Self {
        Self {
            tables,
            facts: Vec::new(),
        }
    }

    /// Queue a fact for publication after commit.
    pub fn emit(&mut self, fact: VaultFact) {
        self.facts.push(fact);
    }

    fn into_facts(self) -> Vec<VaultFact> {
        self.facts
    }

    // ---- vaults -------------------------------------------------------

    pub fn vault(&self, id: VaultId) -> VigilResult<&Vault> {
        self.tables
            .vaults
            .get(&id)
            .ok_or_else(|| VigilError::not_found(format!("Vault {id}")))
    }

    pub fn vault_mut(&mut self, id: VaultId) -> VigilResult<&mut Vault> {
        self.tables
            .vaults
            .get_mut(&id)
            .ok_or_else(|| VigilError::not_found(format!("Vault {id}")))
    }

    pub fn vault_ids(&self) -> Vec<VaultId> {
        self.tables.vaults.keys().copied().collect()
    }

    pub fn insert_vault(&mut self, vault: Vault) {
        self.tables.vaults.insert(vault.id, vault);
    }

    /// Remove the vault and every record that belongs to it.
    pub fn purge_vault(&mut self, id: VaultId) {
        self.tables.vaults.remove(&id);
        self.tables.parties.retain(|_, p| p.vault_id != id);
        self.tables.fragments.retain(|_, f| f.vault_id != id);
        self.tables.check_ins.retain(|_, c| c.vault_id != id);
        let requests: Vec<RecoveryRequestId> = self
            .tables
            .requests
            .values()
            .filter(|r| r.vault_id == id)
            .map(|r| r.id)
            .collect();
        self.tables
            .attestations
            .retain(|_, a| !requests.contains(&a.request_id));
        self.tables.requests.retain(|_, r| r.vault_id != id);
    }

    // ---- parties ------------------------------------------------------

    pub fn party(&self, id: PartyId) -> VigilResult<&Party> {
        self.tables
            .parties
            .get(&id)
            .ok_or_else(|| VigilError::not_found(format!("Party {id}")))
    }

    pub fn party_mut(&mut self, id: PartyId) -> VigilResult<&mut Party> {
        self.tables
            .parties
            .get_mut(&id)
            .ok_or_else(|| VigilError::not_found(format!("Party {id}")))
    }

    pub fn parties(&self, vault_id: VaultId) -> impl Iterator<Item = &Party> {
        self.tables
            .parties
            .values()
            .filter(move |p| p.vault_id == vault_id)
    }

    pub fn insert_party(&mut self, party: Party) {
        self.tables.parties.insert(party.id, party);
    }

    pub fn remove_party(&mut self, id: PartyId) -> Option<Party> {
        self.tables.parties.remove(&id)
    }

    // ---- fragments ----------------------------------------------------

    pub fn fragment(&self, id: FragmentId) -> VigilResult<&FragmentRecord> {
        self.tables
            .fragments
            .get(&id)
            .ok_or_else(|| VigilError::not_found(format!("Fragment {id}")))
    }

    /// Identifiers and indices of the vault's fragments, without contents.
    pub fn fragment_slots(&self, vault_id: VaultId) -> Vec<(FragmentId, u8, Option<PartyId>)> {
        self.tables
            .fragments
            .values()
            .filter(|f| f.vault_id == vault_id)
            .map(|f| (f.id, f.index, f.assigned_to))
            .collect()
    }

    pub fn upsert_fragment(&mut self, fragment: FragmentRecord) {
        self.tables.fragments.insert(fragment.id, fragment);
    }

    pub fn remove_fragment(&mut self, id: FragmentId) -> Option<FragmentRecord> {
        self.tables.fragments.remove(&id)
    }

    // ---- check-ins ----------------------------------------------------

    pub fn check_ins(&self, vault_id: VaultId) -> impl Iterator<Item = &CheckIn> {
        self.tables
            .check_ins
            .values()
            .filter(move |c| c.vault_id == vault_id)
    }

    pub fn insert_check_in(&mut self, check_in: CheckIn) {
        self.tables.check_ins.insert(check_in.id, check_in);
    }

    // ---- recovery requests --------------------------------------------

    pub fn request(&self, id: RecoveryRequestId) -> VigilResult<&RecoveryRequest> {
        self.tables
            .requests
            .get(&id)
            .ok_or_else(|| VigilError::not_found(format!("Recovery request {id}")))
    }

    pub fn request_mut(&mut self, id: RecoveryRequestId) -> VigilResult<&mut RecoveryRequest> {
        self.tables
            .requests
            .get_mut(&id)
            .ok_or_else(|| VigilError::not_found(format!("Recovery request {id}")))
    }

    /// The vault's non-terminal request, if any.
    pub fn open_request(&self, vault_id: VaultId) -> Option<&RecoveryRequest> {
        self.tables
            .requests
            .values()
            .find(|r| r.vault_id == vault_id && !r.status.is_terminal())
    }

    pub fn requests(&self, vault_id: VaultId) -> impl Iterator<Item = &RecoveryRequest> {
        self.tables
            .requests
            .values()
            .filter(move |r| r.vault_id == vault_id)
    }

    pub fn insert_request(&mut self, request: RecoveryRequest) {
        self.tables.requests.insert(request.id, request);
    }

    // ---- attestations -------------------------------------------------

    pub fn attestations(
        &self,
        request_id: RecoveryRequestId,
    ) -> impl Iterator<Item = &Attestation> {
        self.tables
            .attestations
            .values()
            .filter(move |a| a.request_id == request_id)
    }

    pub fn attestation_mut(&mut self, id: AttestationId) -> VigilResult<&mut Attestation> {
        self.tables
            .attestations
            .get_mut(&id)
            .ok_or_else(|| VigilError::not_found(format!("Attestation {id}")))
    }

    pub fn insert_attestation(&mut self, attestation: Attestation) {
        self.tables.attestations.insert(attestation.id, attestation);
    }
}

/// Durable, serialized transactions over the engine's records.
pub trait VaultStore: Send + Sync {
    /// Run `f` atomically. Returns its output together with the facts it
    /// emitted; nothing is committed when `f` fails.
    fn transaction<T, F>(&self, f: F) -> VigilResult<(T, Vec<VaultFact>)>
    where
        F: FnOnce(&mut Transaction<'_>) -> VigilResult<T>;

    /// Run `f` against the committed state. Nothing is copied or written.
    fn read<T, F>(&self, f: F) -> VigilResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> VigilResult<T>;
}

impl<S: VaultStore + ?Sized> VaultStore for std::sync::Arc<S> {
    fn transaction<T, F>(&self, f: F) -> VigilResult<(T, Vec<VaultFact>)>
    where
        F: FnOnce(&mut Transaction<'_>) -> VigilResult<T>,
    {
        (**self).transaction(f)
    }

    fn read<T, F>(&self, f: F) -> VigilResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> VigilResult<T>,
    {
        (**self).read(f)
    }
}

/// Shared view over committed tables; the lock stays held while `f` runs.
fn read_committed<T, F>(committed: &mut VaultTables, f: F) -> VigilResult<T>
where
    F: FnOnce(&Transaction<'_>) -> VigilResult<T>,
{
    f(&Transaction::new(committed))
}

/// Run `f` against a working copy and return it with the output.
fn run_on_copy<T, F>(committed: &VaultTables, f: F) -> VigilResult<(VaultTables, T, Vec<VaultFact>)>
where
    F: FnOnce(&mut Transaction<'_>) -> VigilResult<T>,
{
    let mut working = committed.clone();
    let mut tx = Transaction::new(&mut working);
    let output = f(&mut tx)?;
    let facts = tx.into_facts();
    Ok((working, output, facts))
}

/// Store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryVaultStore {
    tables: Mutex<VaultTables>,
}

impl MemoryVaultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VaultStore for MemoryVaultStore {
    fn transaction<T, F>(&self, f: F) -> VigilResult<(T, Vec<VaultFact>)>
    where
        F: FnOnce(&mut Transaction<'_>) -> VigilResult<T>,
    {
        let mut committed = self.tables.lock();
        let (working, output, facts) = run_on_copy(&committed, f)?;
        *committed = working;
        Ok((output, facts))
    }

    fn read<T, F>(&self, f: F) -> VigilResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> VigilResult<T>,
    {
        read_committed(&mut self.tables.lock(), f)
    }
}

/// Store persisting a JSON snapshot to disk on every commit.
///
/// The snapshot is written to a sibling temporary file and renamed into
/// place, so a crash leaves either the previous or the new state.
#[derive(Debug)]
pub struct FileVaultStore {
    path: PathBuf,
    tables: Mutex<VaultTables>,
}

impl FileVaultStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> VigilResult<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let bytes = fs::read(&path)?;
            let snapshot: Snapshot = serde_json::from_slice(&bytes)
                .map_err(|e| VigilError::storage(format!("Corrupt store {}: {e}", path.display())))?;
            VaultTables::from(snapshot)
        } else {
            VaultTables::default()
        };
        tracing::debug!(path = %path.display(), "opened vault store");
        Ok(Self {
            path,
            tables: Mutex::new(tables),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, tables: &VaultTables) -> VigilResult<()> {
        let bytes = serde_json::to_vec(&Snapshot::from(tables))
            .map_err(|e| VigilError::storage(format!("Serialize store: {e}")))?;
        let staging = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&staging)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl VaultStore for FileVaultStore {
    fn transaction<T, F>(&self, f: F) -> VigilResult<(T, Vec<VaultFact>)>
    where
        F: FnOnce(&mut Transaction<'_>) -> VigilResult<T>,
    {
        let mut committed = self.tables.lock();
        let (working, output, facts) = run_on_copy(&committed, f)?;
        self.persist(&working)?;
        *committed = working;
        Ok((output, facts))
    }

    fn read<T, F>(&self, f: F) -> VigilResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> VigilResult<T>,
    {
        read_committed(&mut self.tables.lock(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VaultStatus;
    use vigil_core::{OwnerId, PhysicalTime, Scheme};

    fn sample_vault() -> Vault {
        let now = PhysicalTime::from_ms(1_000);
        Vault {
            id: VaultId::new(),
            owner_id: OwnerId::new(),
            scheme: Scheme::TWO_OF_THREE,
            status: VaultStatus::Active,
            check_in_interval_ms: 10,
            grace_period_ms: 0,
            next_check_in_due: now.saturating_add_ms(10),
            last_check_in_at: now,
            check_in_streak: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn failed_transaction_commits_nothing() {
        let store = MemoryVaultStore::new();
        let vault = sample_vault();
        let id = vault.id;

        let result: VigilResult<((), Vec<VaultFact>)> = store.transaction(|tx| {
            tx.insert_vault(vault);
            Err(VigilError::internal("boom"))
        });
        assert!(result.is_err());

        let found = store.read(|tx| Ok(tx.vault(id).is_ok())).unwrap();
        assert!(!found);
    }

    #[test]
    fn committed_facts_are_returned() {
        let store = MemoryVaultStore::new();
        let vault = sample_vault();
        let id = vault.id;
        let ((), facts) = store
            .transaction(|tx| {
                tx.insert_vault(vault);
                tx.emit(VaultFact::VaultDeleted {
                    vault_id: id,
                    at: PhysicalTime::from_ms(1),
                });
                Ok(())
            })
            .unwrap();
        assert_eq!(facts.len(), 1);
    }
}
