//! Audit facts
//!
//! Every committed operation produces facts describing what changed. They are
//! collected inside the transaction and handed to a [`FactSink`] only after
//! the transaction commits, so a rolled-back operation never leaves an audit
//! trail claiming otherwise. Facts never carry secret or share material.

use crate::types::{CancellationReason, Decision, PartyRole, VaultStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use vigil_core::{PartyId, PhysicalTime, RecoveryRequestId, VaultId};

/// Vault lifecycle facts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultFact {
    /// Vault created and secret split into fragments
    VaultCreated {
        vault_id: VaultId,
        scheme: String,
        fragments: u8,
        at: PhysicalTime,
    },

    /// Successful check-in moved the deadline
    CheckInRecorded {
        vault_id: VaultId,
        next_check_in_due: PhysicalTime,
        streak: u32,
        at: PhysicalTime,
    },

    /// Check-in attempt that did not prove liveness
    CheckInFailed { vault_id: VaultId, at: PhysicalTime },

    /// Vault status changed
    StatusChanged {
        vault_id: VaultId,
        from: VaultStatus,
        to: VaultStatus,
        at: PhysicalTime,
    },

    /// Recovery request opened behind a time-lock
    RecoveryTriggered {
        vault_id: VaultId,
        request_id: RecoveryRequestId,
        time_lock_expires_at: PhysicalTime,
        at: PhysicalTime,
    },

    /// Party recorded a decision
    AttestationRecorded {
        request_id: RecoveryRequestId,
        party_id: PartyId,
        role: PartyRole,
        decision: Decision,
        counted: bool,
        at: PhysicalTime,
    },

    /// Guardian and attestor quorum first reached
    QuorumReached {
        request_id: RecoveryRequestId,
        guardian_approvals: usize,
        attestor_approvals: usize,
        at: PhysicalTime,
    },

    /// Recovery request cancelled
    RecoveryCancelled {
        vault_id: VaultId,
        request_id: RecoveryRequestId,
        reason: CancellationReason,
        at: PhysicalTime,
    },

    /// Secret reconstructed for delivery
    RecoveryCompleted {
        vault_id: VaultId,
        request_id: RecoveryRequestId,
        at: PhysicalTime,
    },

    /// Party joined (active or pending)
    PartyAdded {
        vault_id: VaultId,
        party_id: PartyId,
        role: PartyRole,
        at: PhysicalTime,
    },

    /// Pending party accepted its invitation
    PartyAccepted {
        vault_id: VaultId,
        party_id: PartyId,
        at: PhysicalTime,
    },

    /// Pending party declined its invitation
    PartyDeclined {
        vault_id: VaultId,
        party_id: PartyId,
        at: PhysicalTime,
    },

    /// Party removed from the vault
    PartyRemoved {
        vault_id: VaultId,
        party_id: PartyId,
        role: PartyRole,
        at: PhysicalTime,
    },

    /// Fragment issued to a guardian
    FragmentAssigned {
        vault_id: VaultId,
        party_id: PartyId,
        index: u8,
        at: PhysicalTime,
    },

    /// Fragment revoked and the remaining lineage renewed
    FragmentsRenewed {
        vault_id: VaultId,
        revoked_index: u8,
        remaining: usize,
        at: PhysicalTime,
    },

    /// Check-in schedule changed by the owner
    ScheduleUpdated {
        vault_id: VaultId,
        check_in_interval_ms: u64,
        grace_period_ms: u64,
        at: PhysicalTime,
    },

    /// Vault and all its records destroyed
    VaultDeleted { vault_id: VaultId, at: PhysicalTime },
}

impl VaultFact {
    /// Stable name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultFact::VaultCreated { .. } => "vault_created",
            VaultFact::CheckInRecorded { .. } => "check_in_recorded",
            VaultFact::CheckInFailed { .. } => "check_in_failed",
            VaultFact::StatusChanged { .. } => "status_changed",
            VaultFact::RecoveryTriggered { .. } => "recovery_triggered",
            VaultFact::AttestationRecorded { .. } => "attestation_recorded",
            VaultFact::QuorumReached { .. } => "quorum_reached",
            VaultFact::RecoveryCancelled { .. } => "recovery_cancelled",
            VaultFact::RecoveryCompleted { .. } => "recovery_completed",
            VaultFact::PartyAdded { .. } => "party_added",
            VaultFact::PartyAccepted { .. } => "party_accepted",
            VaultFact::PartyDeclined { .. } => "party_declined",
            VaultFact::PartyRemoved { .. } => "party_removed",
            VaultFact::FragmentAssigned { .. } => "fragment_assigned",
            VaultFact::FragmentsRenewed { .. } => "fragments_renewed",
            VaultFact::ScheduleUpdated { .. } => "schedule_updated",
            VaultFact::VaultDeleted { .. } => "vault_deleted",
        }
    }
}

/// Receives facts after their transaction committed.
pub trait FactSink: Send + Sync {
    fn publish(&self, fact: &VaultFact);
}

/// Writes facts to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFactSink;

impl FactSink for TracingFactSink {
    fn publish(&self, fact: &VaultFact) {
        match serde_json::to_string(fact) {
            Ok(json) => tracing::info!(kind = fact.kind(), fact = %json, "vault fact"),
            Err(e) => tracing::warn!(kind = fact.kind(), error = %e, "unserializable vault fact"),
        }
    }
}

/// Keeps facts in memory; used by simulations and tests.
#[derive(Debug, Default)]
pub struct MemoryFactSink {
    facts: Mutex<Vec<VaultFact>>,
}

impl MemoryFactSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far.
    pub fn facts(&self) -> Vec<VaultFact> {
        self.facts.lock().clone()
    }

    /// Names of published facts in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.facts.lock().iter().map(VaultFact::kind).collect()
    }
}

impl FactSink for MemoryFactSink {
    fn publish(&self, fact: &VaultFact) {
        self.facts.lock().push(fact.clone());
    }
}

impl<T: FactSink + ?Sized> FactSink for std::sync::Arc<T> {
    fn publish(&self, fact: &VaultFact) {
        (**self).publish(fact);
    }
}
