//! Recovery state machine
//!
//! ```text
//! active ──> warning ──> triggered ──> completed
//!   ^           │            │
//!   └─ check-in ┘            └──────> cancelled
//! ```
//!
//! The vault status is the single source of truth for mutability. At most one
//! recovery request per vault is ever non-terminal; a triggered vault keeps
//! pointing at that request until it completes or is cancelled.
//!
//! Deadlines are compared lazily against the clock reading the caller took at
//! the start of the operation. Nothing here runs on a timer.

use crate::facts::VaultFact;
use crate::liveness::LivenessTracker;
use crate::store::Transaction;
use crate::types::{
    CancellationReason, RecoveryRequest, RecoveryRequestStatus, TriggerReason, VaultStatus,
};
use serde::{Deserialize, Serialize};
use vigil_core::{
    EngineConfig, OwnerId, PhysicalTime, RecoveryRequestId, VaultId, VigilError, VigilResult,
};

/// Result of evaluating a vault's liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LivenessEvaluation {
    /// Nothing changed
    Unchanged(VaultStatus),
    /// Vault entered the warning window
    Warning,
    /// Overdue vault locked and a recovery request opened
    Triggered(RecoveryRequestId),
    /// Vault was already under recovery; no new request
    AlreadyTriggered(RecoveryRequestId),
}

impl LivenessEvaluation {
    /// The request a triggered vault points at.
    pub fn request_id(&self) -> Option<RecoveryRequestId> {
        match self {
            Self::Triggered(id) | Self::AlreadyTriggered(id) => Some(*id),
            Self::Unchanged(_) | Self::Warning => None,
        }
    }
}

/// Drives vault and request status transitions.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryStateMachine {
    time_lock_ms: u64,
}

fn set_vault_status(
    tx: &mut Transaction<'_>,
    vault_id: VaultId,
    to: VaultStatus,
    now: PhysicalTime,
) -> VigilResult<()> {
    let vault = tx.vault_mut(vault_id)?;
    let from = vault.status;
    vault.status = to;
    vault.updated_at = now;
    tx.emit(VaultFact::StatusChanged {
        vault_id,
        from,
        to,
        at: now,
    });
    Ok(())
}

impl RecoveryStateMachine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            time_lock_ms: config.time_lock_ms(),
        }
    }

    /// The vault's open request, required to be triggered.
    pub fn triggered_request(
        &self,
        tx: &Transaction<'_>,
        vault_id: VaultId,
    ) -> VigilResult<RecoveryRequest> {
        tx.open_request(vault_id)
            .filter(|r| r.status == RecoveryRequestStatus::Triggered)
            .cloned()
            .ok_or_else(|| VigilError::internal(format!("Vault {vault_id} has no open request")))
    }

    /// Move the vault forward if its deadlines have passed.
    ///
    /// Idempotent: a triggered vault returns its existing request and terminal
    /// vaults are left alone.
    pub fn evaluate(
        &self,
        tx: &mut Transaction<'_>,
        liveness: &LivenessTracker,
        vault_id: VaultId,
        now: PhysicalTime,
    ) -> VigilResult<LivenessEvaluation> {
        let vault = tx.vault(vault_id)?.clone();
        match vault.status {
            VaultStatus::Completed | VaultStatus::Cancelled => {
                return Ok(LivenessEvaluation::Unchanged(vault.status))
            }
            VaultStatus::Triggered => {
                let request = self.triggered_request(tx, vault_id)?;
                return Ok(LivenessEvaluation::AlreadyTriggered(request.id));
            }
            VaultStatus::Active | VaultStatus::Warning => {}
        }

        if liveness.is_overdue(&vault, now) {
            if let Some(open) = tx.open_request(vault_id) {
                return Ok(LivenessEvaluation::AlreadyTriggered(open.id));
            }
            let request_id = self.trigger(tx, vault_id, now)?;
            return Ok(LivenessEvaluation::Triggered(request_id));
        }

        if vault.status == VaultStatus::Active && liveness.in_warning_window(&vault, now) {
            set_vault_status(tx, vault_id, VaultStatus::Warning, now)?;
            return Ok(LivenessEvaluation::Warning);
        }
        Ok(LivenessEvaluation::Unchanged(vault.status))
    }

    fn trigger(
        &self,
        tx: &mut Transaction<'_>,
        vault_id: VaultId,
        now: PhysicalTime,
    ) -> VigilResult<RecoveryRequestId> {
        let mut request = RecoveryRequest {
            id: RecoveryRequestId::new(),
            vault_id,
            created_at: now,
            status: RecoveryRequestStatus::Active,
            reason: TriggerReason::LivenessExpired,
            time_lock_expires_at: now.saturating_add_ms(self.time_lock_ms),
            quorum_reached_at: None,
            closed_at: None,
            cancellation: None,
        };
        // opened and confirmed in the same transaction
        request.status = RecoveryRequestStatus::Triggered;
        let request_id = request.id;
        let time_lock_expires_at = request.time_lock_expires_at;
        tx.insert_request(request);

        set_vault_status(tx, vault_id, VaultStatus::Triggered, now)?;
        tx.emit(VaultFact::RecoveryTriggered {
            vault_id,
            request_id,
            time_lock_expires_at,
            at: now,
        });
        tracing::info!(%vault_id, %request_id, %time_lock_expires_at, "recovery triggered");
        Ok(request_id)
    }

    /// Close a triggered request as cancelled; only inside the time-lock window.
    pub fn cancel(
        &self,
        tx: &mut Transaction<'_>,
        request_id: RecoveryRequestId,
        reason: CancellationReason,
        now: PhysicalTime,
    ) -> VigilResult<()> {
        let request = tx.request(request_id)?.clone();
        if request.status != RecoveryRequestStatus::Triggered {
            return Err(VigilError::transition(
                request.status,
                RecoveryRequestStatus::Cancelled,
            ));
        }
        if !request.within_time_lock(now) {
            return Err(VigilError::CancellationWindowClosed);
        }

        let record = tx.request_mut(request_id)?;
        record.status = RecoveryRequestStatus::Cancelled;
        record.closed_at = Some(now);
        record.cancellation = Some(reason);
        set_vault_status(tx, request.vault_id, VaultStatus::Cancelled, now)?;
        tx.emit(VaultFact::RecoveryCancelled {
            vault_id: request.vault_id,
            request_id,
            reason,
            at: now,
        });
        tracing::info!(vault_id = %request.vault_id, %request_id, ?reason, "recovery cancelled");
        Ok(())
    }

    /// Explicit owner cancellation of the vault's open request.
    pub fn cancel_by_owner(
        &self,
        tx: &mut Transaction<'_>,
        vault_id: VaultId,
        owner_id: OwnerId,
        now: PhysicalTime,
    ) -> VigilResult<RecoveryRequestId> {
        let vault = tx.vault(vault_id)?.clone();
        if vault.owner_id != owner_id {
            return Err(VigilError::permission_denied("Only the owner may cancel"));
        }
        if vault.status != VaultStatus::Triggered {
            return Err(VigilError::transition(vault.status, VaultStatus::Cancelled));
        }
        let request = self.triggered_request(tx, vault_id)?;
        self.cancel(tx, request.id, CancellationReason::OwnerCancelled, now)?;
        Ok(request.id)
    }

    /// Check that the request may complete: quorum first, then time-lock.
    pub fn ensure_completable(
        &self,
        request: &RecoveryRequest,
        quorum_reached: bool,
        now: PhysicalTime,
    ) -> VigilResult<()> {
        if request.status != RecoveryRequestStatus::Triggered {
            return Err(VigilError::transition(
                request.status,
                RecoveryRequestStatus::Completed,
            ));
        }
        if !quorum_reached {
            return Err(VigilError::QuorumNotReached);
        }
        if request.within_time_lock(now) {
            return Err(VigilError::RecoveryNotEligible);
        }
        Ok(())
    }

    /// Close request and vault as completed.
    pub fn complete(
        &self,
        tx: &mut Transaction<'_>,
        request_id: RecoveryRequestId,
        now: PhysicalTime,
    ) -> VigilResult<()> {
        let record = tx.request_mut(request_id)?;
        record.status = RecoveryRequestStatus::Completed;
        record.closed_at = Some(now);
        let vault_id = record.vault_id;
        set_vault_status(tx, vault_id, VaultStatus::Completed, now)?;
        tx.emit(VaultFact::RecoveryCompleted {
            vault_id,
            request_id,
            at: now,
        });
        Ok(())
    }
}
