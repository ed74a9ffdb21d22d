//! Vault engine façade
//!
//! [`VaultEngine`] owns the store, the clock, the configuration and the
//! fragment sealing key. Every public operation reads the clock once, runs
//! one store transaction, then publishes the transaction's facts. A recovered
//! secret is handed to the caller's [`SecretSink`] only after the completing
//! transaction committed, and is wiped when delivery returns.

use crate::attestation::{AttestationLedger, QuorumStatus};
use crate::facts::{FactSink, TracingFactSink, VaultFact};
use crate::fragment_vault::{FragmentVault, SealingKey};
use crate::guard::VaultLockGuard;
use crate::liveness::{CheckInRequest, LivenessTracker, NextDueInfo};
use crate::registry::PartyRegistry;
use crate::state_machine::{LivenessEvaluation, RecoveryStateMachine};
use crate::store::{Transaction, VaultStore};
use crate::types::{
    Attestation, CancellationReason, CheckIn, CheckInStatus, Decision, Party, PartyRole,
    RecoveryRequest, Vault, VaultStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use vigil_core::{
    CheckInId, EngineConfig, FragmentId, OwnerId, PartyId, PhysicalTime, PhysicalTimeEffects,
    RecoveryRequestId, Scheme, VaultId, VigilError, VigilResult,
};
use zeroize::Zeroizing;

// =============================================================================
// REQUESTS AND RECEIPTS
// =============================================================================

/// Everything needed to set up a vault.
#[derive(Clone)]
pub struct NewVault {
    pub owner_id: OwnerId,
    pub scheme: Scheme,
    pub secret: Zeroizing<Vec<u8>>,
    pub guardians: Vec<String>,
    pub beneficiaries: Vec<String>,
    pub attestors: Vec<String>,
    /// Overrides the configured interval
    pub check_in_interval_ms: Option<u64>,
    /// Overrides the configured grace period
    pub grace_period_ms: Option<u64>,
}

impl NewVault {
    pub fn new(owner_id: OwnerId, scheme: Scheme, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            owner_id,
            scheme,
            secret: Zeroizing::new(secret.into()),
            guardians: Vec::new(),
            beneficiaries: Vec::new(),
            attestors: Vec::new(),
            check_in_interval_ms: None,
            grace_period_ms: None,
        }
    }

    pub fn with_guardians<I, E>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
    {
        self.guardians.extend(emails.into_iter().map(Into::into));
        self
    }

    pub fn with_beneficiaries<I, E>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
    {
        self.beneficiaries.extend(emails.into_iter().map(Into::into));
        self
    }

    pub fn with_attestors<I, E>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
    {
        self.attestors.extend(emails.into_iter().map(Into::into));
        self
    }

    pub fn with_schedule(mut self, check_in_interval_ms: u64, grace_period_ms: u64) -> Self {
        self.check_in_interval_ms = Some(check_in_interval_ms);
        self.grace_period_ms = Some(grace_period_ms);
        self
    }
}

impl std::fmt::Debug for NewVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewVault")
            .field("owner_id", &self.owner_id)
            .field("scheme", &self.scheme)
            .field("guardians", &self.guardians.len())
            .field("beneficiaries", &self.beneficiaries.len())
            .field("attestors", &self.attestors.len())
            .finish_non_exhaustive()
    }
}

/// Outcome of a check-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInReceipt {
    pub check_in_id: CheckInId,
    pub status: CheckInStatus,
    pub next_check_in_due: PhysicalTime,
    pub grace_deadline: PhysicalTime,
    pub streak: u32,
    /// Recovery request closed by this check-in
    pub cancelled_request: Option<RecoveryRequestId>,
    /// True when this answers a retry of an earlier check-in
    pub replayed: bool,
}

impl CheckInReceipt {
    fn new(check_in: &CheckIn, info: NextDueInfo) -> Self {
        Self {
            check_in_id: check_in.id,
            status: check_in.status,
            next_check_in_due: info.next_check_in_due,
            grace_deadline: info.grace_deadline,
            streak: info.streak,
            cancelled_request: None,
            replayed: false,
        }
    }
}

/// Outcome of a completed recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReceipt {
    pub vault_id: VaultId,
    pub request_id: RecoveryRequestId,
    pub completed_at: PhysicalTime,
    /// Active beneficiaries at completion
    pub beneficiaries: Vec<PartyId>,
}

/// Fragment metadata without share material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentSummary {
    pub id: FragmentId,
    pub index: u8,
    pub assigned_to: Option<PartyId>,
}

/// Receives a reconstructed secret.
pub trait SecretSink {
    /// Called once per completed recovery. The buffer is wiped after return.
    fn deliver(&self, receipt: &RecoveryReceipt, secret: &[u8]) -> VigilResult<()>;
}

// =============================================================================
// ENGINE
// =============================================================================

/// Vault recovery engine.
pub struct VaultEngine<S: VaultStore, C: PhysicalTimeEffects> {
    store: S,
    clock: C,
    config: EngineConfig,
    facts: Arc<dyn FactSink>,
    guard: VaultLockGuard,
    registry: PartyRegistry,
    liveness: LivenessTracker,
    machine: RecoveryStateMachine,
    ledger: AttestationLedger,
    custody: FragmentVault,
}

impl<S: VaultStore, C: PhysicalTimeEffects> std::fmt::Debug for VaultEngine<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: VaultStore, C: PhysicalTimeEffects> VaultEngine<S, C> {
    /// Create an engine; the configuration is validated first.
    pub fn new(store: S, clock: C, config: EngineConfig, key: &SealingKey) -> VigilResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            clock,
            guard: VaultLockGuard,
            registry: PartyRegistry::new(),
            liveness: LivenessTracker::new(&config),
            machine: RecoveryStateMachine::new(&config),
            ledger: AttestationLedger::new(&config),
            custody: FragmentVault::new(key),
            facts: Arc::new(TracingFactSink),
            config,
        })
    }

    /// Publish facts to `sink` instead of the tracing log.
    pub fn with_fact_sink(mut self, sink: Arc<dyn FactSink>) -> Self {
        self.facts = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn now(&self) -> VigilResult<PhysicalTime> {
        Ok(self.clock.physical_time()?)
    }

    /// Run one transaction and publish its facts after commit.
    fn run<T, F>(&self, f: F) -> VigilResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> VigilResult<T>,
    {
        let (output, facts) = self.store.transaction(f)?;
        self.publish(&facts);
        Ok(output)
    }

    fn read<T, F>(&self, f: F) -> VigilResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> VigilResult<T>,
    {
        self.store.read(f)
    }

    /// Per-vault intervals obey the same bounds as the configured default.
    fn validate_interval(&self, interval_ms: u64) -> VigilResult<()> {
        if interval_ms == 0 {
            return Err(VigilError::invalid("Check-in interval must be positive"));
        }
        if interval_ms <= self.config.warning_lead_ms() {
            return Err(VigilError::invalid(
                "Check-in interval must be longer than the warning lead",
            ));
        }
        Ok(())
    }

    fn publish(&self, facts: &[VaultFact]) {
        for fact in facts {
            self.facts.publish(fact);
        }
    }

    // =========================================================================
    // VAULT LIFECYCLE
    // =========================================================================

    /// Split the secret, store the vault and enrol the listed parties.
    #[instrument(skip(self, request), fields(owner_id = %request.owner_id, scheme = %request.scheme))]
    pub fn create_vault(&self, request: NewVault) -> VigilResult<VaultId> {
        let now = self.now()?;
        let interval = request
            .check_in_interval_ms
            .unwrap_or_else(|| self.config.check_in_interval_ms());
        self.validate_interval(interval)?;
        let grace = request
            .grace_period_ms
            .unwrap_or_else(|| self.config.grace_period_ms());

        let vault_id = self.run(|tx| {
            let vault = Vault {
                id: VaultId::new(),
                owner_id: request.owner_id,
                scheme: request.scheme,
                status: VaultStatus::Active,
                check_in_interval_ms: interval,
                grace_period_ms: grace,
                next_check_in_due: now.saturating_add_ms(interval),
                last_check_in_at: now,
                check_in_streak: 0,
                created_at: now,
                updated_at: now,
            };
            let vault_id = vault.id;
            tx.insert_vault(vault);
            self.custody
                .seal_initial(tx, vault_id, &request.secret, request.scheme)?;
            tx.emit(VaultFact::VaultCreated {
                vault_id,
                scheme: request.scheme.to_string(),
                fragments: request.scheme.distribution(),
                at: now,
            });

            let roster = [
                (PartyRole::Guardian, &request.guardians),
                (PartyRole::Beneficiary, &request.beneficiaries),
                (PartyRole::Attestor, &request.attestors),
            ];
            for (role, emails) in roster {
                for email in emails {
                    self.registry
                        .add(tx, &self.custody, vault_id, role, email, now)?;
                }
            }
            let minimum = request.scheme.min_guardians();
            if self.registry.counts(tx, vault_id).guardians < minimum {
                return Err(VigilError::MinimumGuardiansRequired { minimum });
            }
            Ok(vault_id)
        })?;
        tracing::info!(%vault_id, "vault created");
        Ok(vault_id)
    }

    /// Change the check-in schedule. The next deadline is recomputed from the
    /// last successful check-in.
    #[instrument(skip(self))]
    pub fn update_schedule(
        &self,
        vault_id: VaultId,
        check_in_interval_ms: u64,
        grace_period_ms: u64,
    ) -> VigilResult<NextDueInfo> {
        let now = self.now()?;
        self.run(|tx| {
            self.guard.ensure_mutable(tx.vault(vault_id)?)?;
            self.validate_interval(check_in_interval_ms)?;
            let vault = tx.vault_mut(vault_id)?;
            vault.check_in_interval_ms = check_in_interval_ms;
            vault.grace_period_ms = grace_period_ms;
            vault.next_check_in_due = vault.last_check_in_at.saturating_add_ms(check_in_interval_ms);
            vault.updated_at = now;
            let snapshot = vault.clone();
            tx.emit(VaultFact::ScheduleUpdated {
                vault_id,
                check_in_interval_ms,
                grace_period_ms,
                at: now,
            });
            if snapshot.status == VaultStatus::Warning
                && !self.liveness.in_warning_window(&snapshot, now)
            {
                tx.vault_mut(vault_id)?.status = VaultStatus::Active;
                tx.emit(VaultFact::StatusChanged {
                    vault_id,
                    from: VaultStatus::Warning,
                    to: VaultStatus::Active,
                    at: now,
                });
            }
            Ok(NextDueInfo::of(&snapshot))
        })
    }

    /// Destroy the vault with all its parties, fragments and history.
    #[instrument(skip(self))]
    pub fn delete_vault(&self, vault_id: VaultId) -> VigilResult<()> {
        let now = self.now()?;
        self.run(|tx| {
            if !self.guard.is_mutable(tx.vault(vault_id)?) {
                return Err(VigilError::VaultLocked);
            }
            tx.purge_vault(vault_id);
            tx.emit(VaultFact::VaultDeleted { vault_id, at: now });
            Ok(())
        })?;
        tracing::info!(%vault_id, "vault deleted");
        Ok(())
    }

    // =========================================================================
    // LIVENESS
    // =========================================================================

    /// Record a check-in.
    ///
    /// A retry carrying the same client timestamp and method as an earlier
    /// successful check-in returns the earlier result. On a triggered vault a
    /// successful check-in cancels the recovery while the time-lock is open.
    #[instrument(skip(self, request), fields(vault_id = %request.vault_id, method = ?request.method))]
    pub fn check_in(&self, request: CheckInRequest) -> VigilResult<CheckInReceipt> {
        let now = self.now()?;
        let receipt = self.run(|tx| {
            let vault = tx.vault(request.vault_id)?.clone();
            if let Some(earlier) = self.liveness.find_replay(tx, &request) {
                let mut receipt = CheckInReceipt::new(earlier, NextDueInfo::of(&vault));
                receipt.replayed = true;
                return Ok(receipt);
            }

            match vault.status {
                VaultStatus::Completed | VaultStatus::Cancelled => {
                    Err(VigilError::transition(vault.status, "checked_in"))
                }
                VaultStatus::Triggered => {
                    if self.liveness.verdict(&request) != CheckInStatus::Success {
                        return Err(VigilError::VaultLocked);
                    }
                    let open = self.machine.triggered_request(tx, vault.id)?;
                    self.machine
                        .cancel(tx, open.id, CancellationReason::OwnerCheckIn, now)?;
                    let (check_in, info) =
                        self.liveness.record_check_in(tx, &request, now, false)?;
                    let mut receipt = CheckInReceipt::new(&check_in, info);
                    receipt.cancelled_request = Some(open.id);
                    Ok(receipt)
                }
                VaultStatus::Active | VaultStatus::Warning => {
                    let (check_in, info) =
                        self.liveness.record_check_in(tx, &request, now, true)?;
                    Ok(CheckInReceipt::new(&check_in, info))
                }
            }
        })?;
        tracing::debug!(
            status = ?receipt.status,
            streak = receipt.streak,
            replayed = receipt.replayed,
            "check-in processed"
        );
        Ok(receipt)
    }

    /// Evaluate one vault's deadlines.
    #[instrument(skip(self))]
    pub fn evaluate_liveness(&self, vault_id: VaultId) -> VigilResult<LivenessEvaluation> {
        let now = self.now()?;
        self.run(|tx| self.machine.evaluate(tx, &self.liveness, vault_id, now))
    }

    /// Evaluate every vault, one transaction each.
    pub fn evaluate_all(&self) -> VigilResult<Vec<(VaultId, LivenessEvaluation)>> {
        let vault_ids = self.read(|tx| Ok(tx.vault_ids()))?;
        let mut changed = Vec::new();
        for vault_id in vault_ids {
            let evaluation = self.evaluate_liveness(vault_id)?;
            if !matches!(evaluation, LivenessEvaluation::Unchanged(_)) {
                changed.push((vault_id, evaluation));
            }
        }
        tracing::debug!(changed = changed.len(), "liveness sweep finished");
        Ok(changed)
    }

    // =========================================================================
    // RECOVERY
    // =========================================================================

    /// Owner cancels the vault's recovery inside the time-lock window.
    #[instrument(skip(self))]
    pub fn cancel_recovery(
        &self,
        vault_id: VaultId,
        owner_id: OwnerId,
    ) -> VigilResult<RecoveryRequestId> {
        let now = self.now()?;
        self.run(|tx| self.machine.cancel_by_owner(tx, vault_id, owner_id, now))
    }

    /// Record a guardian or attestor decision.
    #[instrument(skip(self))]
    pub fn attest(
        &self,
        request_id: RecoveryRequestId,
        party_id: PartyId,
        decision: Decision,
    ) -> VigilResult<QuorumStatus> {
        let now = self.now()?;
        self.run(|tx| self.ledger.attest(tx, request_id, party_id, decision, now))
    }

    /// Reconstruct the secret and hand it to `sink`.
    ///
    /// Fails with [`VigilError::QuorumNotReached`] before quorum and
    /// [`VigilError::RecoveryNotEligible`] before the time-lock expires. Only
    /// fragments of approving guardians are opened.
    #[instrument(skip(self, sink))]
    pub fn complete_recovery(
        &self,
        request_id: RecoveryRequestId,
        sink: &dyn SecretSink,
    ) -> VigilResult<RecoveryReceipt> {
        let now = self.now()?;
        let (secret, receipt) = self.run(|tx| {
            let request = tx.request(request_id)?.clone();
            let quorum = self.ledger.tally(tx, &request);
            self.machine
                .ensure_completable(&request, quorum.quorum_reached, now)?;

            let vault = tx.vault(request.vault_id)?.clone();
            let fragments = self.ledger.approving_fragments(tx, request_id)?;
            let secret = self.custody.reconstruct(tx, &fragments, vault.scheme)?;
            self.machine.complete(tx, request_id, now)?;

            let beneficiaries = tx
                .parties(vault.id)
                .filter(|p| p.is_active() && p.role == PartyRole::Beneficiary)
                .map(|p| p.id)
                .collect();
            Ok((
                secret,
                RecoveryReceipt {
                    vault_id: vault.id,
                    request_id,
                    completed_at: now,
                    beneficiaries,
                },
            ))
        })?;

        tracing::info!(vault_id = %receipt.vault_id, %request_id, "recovery completed");
        if let Err(error) = sink.deliver(&receipt, &secret) {
            tracing::error!(vault_id = %receipt.vault_id, %request_id, %error, "secret delivery failed");
            return Err(error);
        }
        drop(secret);
        Ok(receipt)
    }

    // =========================================================================
    // PARTIES
    // =========================================================================

    /// Add an active party; guardians receive a fragment.
    #[instrument(skip(self, email))]
    pub fn add_party(
        &self,
        vault_id: VaultId,
        role: PartyRole,
        email: &str,
    ) -> VigilResult<PartyId> {
        let now = self.now()?;
        self.run(|tx| {
            self.registry
                .add(tx, &self.custody, vault_id, role, email, now)
        })
    }

    /// Create a pending party that must accept before it counts.
    #[instrument(skip(self, email))]
    pub fn invite_party(
        &self,
        vault_id: VaultId,
        role: PartyRole,
        email: &str,
    ) -> VigilResult<PartyId> {
        let now = self.now()?;
        self.run(|tx| self.registry.invite(tx, vault_id, role, email, now))
    }

    #[instrument(skip(self))]
    pub fn accept_invitation(&self, party_id: PartyId) -> VigilResult<()> {
        let now = self.now()?;
        self.run(|tx| self.registry.accept(tx, &self.custody, party_id, now))
    }

    #[instrument(skip(self))]
    pub fn decline_invitation(&self, party_id: PartyId) -> VigilResult<()> {
        let now = self.now()?;
        self.run(|tx| self.registry.decline(tx, party_id, now))
    }

    /// Remove a party; a removed guardian's fragment is revoked.
    #[instrument(skip(self))]
    pub fn remove_party(&self, party_id: PartyId) -> VigilResult<()> {
        let now = self.now()?;
        self.run(|tx| self.registry.remove(tx, &self.custody, party_id, now))
    }

    // =========================================================================
    // READERS
    // =========================================================================

    pub fn vault(&self, vault_id: VaultId) -> VigilResult<Vault> {
        self.read(|tx| tx.vault(vault_id).cloned())
    }

    pub fn is_mutable(&self, vault_id: VaultId) -> VigilResult<bool> {
        self.read(|tx| Ok(self.guard.is_mutable(tx.vault(vault_id)?)))
    }

    pub fn parties(&self, vault_id: VaultId) -> VigilResult<Vec<Party>> {
        self.read(|tx| {
            tx.vault(vault_id)?;
            Ok(tx.parties(vault_id).cloned().collect())
        })
    }

    pub fn check_ins(&self, vault_id: VaultId) -> VigilResult<Vec<CheckIn>> {
        self.read(|tx| {
            tx.vault(vault_id)?;
            let mut history: Vec<CheckIn> = tx.check_ins(vault_id).cloned().collect();
            history.sort_by_key(|c| c.recorded_at);
            Ok(history)
        })
    }

    pub fn fragments(&self, vault_id: VaultId) -> VigilResult<Vec<FragmentSummary>> {
        self.read(|tx| {
            tx.vault(vault_id)?;
            let mut slots: Vec<FragmentSummary> = tx
                .fragment_slots(vault_id)
                .into_iter()
                .map(|(id, index, assigned_to)| FragmentSummary {
                    id,
                    index,
                    assigned_to,
                })
                .collect();
            slots.sort_by_key(|s| s.index);
            Ok(slots)
        })
    }

    pub fn request(&self, request_id: RecoveryRequestId) -> VigilResult<RecoveryRequest> {
        self.read(|tx| tx.request(request_id).cloned())
    }

    /// The vault's non-terminal recovery request, if any.
    pub fn open_request(&self, vault_id: VaultId) -> VigilResult<Option<RecoveryRequest>> {
        self.read(|tx| {
            tx.vault(vault_id)?;
            Ok(tx.open_request(vault_id).cloned())
        })
    }

    pub fn requests(&self, vault_id: VaultId) -> VigilResult<Vec<RecoveryRequest>> {
        self.read(|tx| {
            let mut requests: Vec<RecoveryRequest> = tx.requests(vault_id).cloned().collect();
            requests.sort_by_key(|r| r.created_at);
            Ok(requests)
        })
    }

    pub fn attestations(&self, request_id: RecoveryRequestId) -> VigilResult<Vec<Attestation>> {
        self.read(|tx| {
            tx.request(request_id)?;
            let mut records: Vec<Attestation> = tx.attestations(request_id).cloned().collect();
            records.sort_by_key(|a| a.attested_at);
            Ok(records)
        })
    }

    pub fn quorum_status(&self, request_id: RecoveryRequestId) -> VigilResult<QuorumStatus> {
        self.read(|tx| {
            let request = tx.request(request_id)?.clone();
            Ok(self.ledger.tally(tx, &request))
        })
    }
}
