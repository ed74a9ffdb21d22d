//! Attestation ledger
//!
//! Guardians and attestors record approve/reject decisions on a triggered
//! recovery request. Quorum needs `K` distinct guardian approvals and
//! `min(required_attestors, active attestors)` attestor approvals.
//!
//! Until quorum a party may change its mind; the newer decision overwrites
//! the older one, so a rejection never closes the request by itself. Once quorum is reached the verdict is sticky: later
//! submissions are kept as uncounted audit records.

use crate::facts::VaultFact;
use crate::store::Transaction;
use crate::types::{
    Attestation, Decision, PartyRole, RecoveryRequest, RecoveryRequestStatus,
};
use serde::{Deserialize, Serialize};
use vigil_core::{
    AttestationId, EngineConfig, FragmentId, PartyId, PhysicalTime, RecoveryRequestId,
    VigilError, VigilResult,
};

/// Tally of a recovery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumStatus {
    pub request_id: RecoveryRequestId,
    pub request_status: RecoveryRequestStatus,
    pub quorum_reached: bool,
    pub guardian_approvals: usize,
    pub guardian_rejections: usize,
    pub attestor_approvals: usize,
    pub attestor_rejections: usize,
    pub required_guardians: usize,
    pub required_attestors: usize,
}

/// Counts decisions and decides quorum.
#[derive(Debug, Clone, Copy)]
pub struct AttestationLedger {
    required_attestors: usize,
}

impl AttestationLedger {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            required_attestors: config.required_attestors,
        }
    }

    /// Current tally without recording anything.
    pub fn tally(&self, tx: &Transaction<'_>, request: &RecoveryRequest) -> QuorumStatus {
        let vault = request.vault_id;
        let threshold = tx
            .vault(vault)
            .map(|v| usize::from(v.scheme.threshold()))
            .unwrap_or(usize::MAX);
        let active_attestors = tx
            .parties(vault)
            .filter(|p| p.is_active() && p.role == PartyRole::Attestor)
            .count();

        let mut status = QuorumStatus {
            request_id: request.id,
            request_status: request.status,
            quorum_reached: false,
            guardian_approvals: 0,
            guardian_rejections: 0,
            attestor_approvals: 0,
            attestor_rejections: 0,
            required_guardians: threshold,
            required_attestors: self.required_attestors.min(active_attestors),
        };
        for attestation in tx.attestations(request.id).filter(|a| a.counted) {
            match (attestation.role, attestation.decision) {
                (PartyRole::Guardian, Decision::Approve) => status.guardian_approvals += 1,
                (PartyRole::Guardian, Decision::Reject) => status.guardian_rejections += 1,
                (PartyRole::Attestor, Decision::Approve) => status.attestor_approvals += 1,
                (PartyRole::Attestor, Decision::Reject) => status.attestor_rejections += 1,
                (PartyRole::Beneficiary, _) => {}
            }
        }

        status.quorum_reached = request.quorum_reached_at.is_some()
            || (status.guardian_approvals >= status.required_guardians
                && status.attestor_approvals >= status.required_attestors);
        status
    }

    /// Record a decision and return the updated tally.
    pub fn attest(
        &self,
        tx: &mut Transaction<'_>,
        request_id: RecoveryRequestId,
        party_id: PartyId,
        decision: Decision,
        now: PhysicalTime,
    ) -> VigilResult<QuorumStatus> {
        let request = tx.request(request_id)?.clone();
        if request.status != RecoveryRequestStatus::Triggered {
            return Err(VigilError::transition(request.status, "attested"));
        }
        let party = tx.party(party_id)?.clone();
        if party.vault_id != request.vault_id {
            return Err(VigilError::permission_denied(
                "Party does not belong to the request's vault",
            ));
        }
        if !party.is_active() {
            return Err(VigilError::permission_denied("Party is not active"));
        }
        if !party.role.can_attest() {
            return Err(VigilError::permission_denied(format!(
                "A {} cannot attest",
                party.role
            )));
        }

        let sticky = request.quorum_reached_at.is_some();
        let earlier = tx
            .attestations(request_id)
            .find(|a| a.counted && a.party_id == party_id)
            .map(|a| a.id);

        match earlier {
            Some(id) if !sticky => {
                let record = tx.attestation_mut(id)?;
                record.decision = decision;
                record.attested_at = now;
            }
            _ => tx.insert_attestation(Attestation {
                id: AttestationId::new(),
                request_id,
                party_id,
                role: party.role,
                decision,
                attested_at: now,
                counted: !sticky,
            }),
        }
        tx.emit(VaultFact::AttestationRecorded {
            request_id,
            party_id,
            role: party.role,
            decision,
            counted: !sticky,
            at: now,
        });

        let status = self.tally(tx, &request);
        if status.quorum_reached && !sticky {
            tx.request_mut(request_id)?.quorum_reached_at = Some(now);
            tx.emit(VaultFact::QuorumReached {
                request_id,
                guardian_approvals: status.guardian_approvals,
                attestor_approvals: status.attestor_approvals,
                at: now,
            });
        }
        Ok(status)
    }

    /// Fragments held by guardians whose counted decision is approve.
    pub fn approving_fragments(
        &self,
        tx: &Transaction<'_>,
        request_id: RecoveryRequestId,
    ) -> VigilResult<Vec<FragmentId>> {
        let approvers: Vec<PartyId> = tx
            .attestations(request_id)
            .filter(|a| {
                a.counted && a.role == PartyRole::Guardian && a.decision == Decision::Approve
            })
            .map(|a| a.party_id)
            .collect();
        let mut fragments = Vec::with_capacity(approvers.len());
        for party_id in approvers {
            if let Some(fragment_id) = tx.party(party_id)?.fragment_id {
                fragments.push(fragment_id);
            }
        }
        Ok(fragments)
    }
}
