//! Liveness tracking
//!
//! The owner proves liveness by checking in before `next_check_in_due`. The
//! vault becomes overdue only strictly after `next_check_in_due + grace`; a
//! check-in landing exactly on the grace deadline is on time. All comparisons
//! use the engine clock, read once by the caller; client timestamps are
//! recorded but never trusted for deadlines.

use crate::facts::VaultFact;
use crate::store::Transaction;
use crate::types::{CheckIn, CheckInMethod, CheckInStatus, Vault, VaultStatus};
use serde::{Deserialize, Serialize};
use vigil_core::{CheckInId, EngineConfig, PhysicalTime, VaultId, VigilResult};

/// A check-in submitted by the owner's client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub vault_id: VaultId,
    /// Client-reported time of the attempt
    pub timestamp: PhysicalTime,
    pub method: CheckInMethod,
    /// Whether the caller's authenticator accepted the proof
    pub verified: bool,
    /// Match score for biometric fallback (0.0..=1.0)
    pub confidence: Option<f32>,
}

/// Deadlines after a check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextDueInfo {
    pub next_check_in_due: PhysicalTime,
    pub grace_deadline: PhysicalTime,
    pub streak: u32,
}

impl NextDueInfo {
    pub fn of(vault: &Vault) -> Self {
        Self {
            next_check_in_due: vault.next_check_in_due,
            grace_deadline: vault.grace_deadline(),
            streak: vault.check_in_streak,
        }
    }
}

/// Check-in bookkeeping and deadline tests.
#[derive(Debug, Clone, Copy)]
pub struct LivenessTracker {
    warning_lead_ms: u64,
    min_biometric_confidence: f32,
}

impl LivenessTracker {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            warning_lead_ms: config.warning_lead_ms(),
            min_biometric_confidence: config.min_biometric_confidence,
        }
    }

    /// Strictly past the grace deadline.
    pub fn is_overdue(&self, vault: &Vault, now: PhysicalTime) -> bool {
        now > vault.grace_deadline()
    }

    /// Inside the warning lead before the due instant.
    pub fn in_warning_window(&self, vault: &Vault, now: PhysicalTime) -> bool {
        now >= vault.next_check_in_due.saturating_sub_ms(self.warning_lead_ms)
    }

    /// Whether the attempt proves liveness.
    pub fn verdict(&self, request: &CheckInRequest) -> CheckInStatus {
        let accepted = match request.method {
            CheckInMethod::BiometricFallback => {
                request.verified
                    && request
                        .confidence
                        .is_some_and(|c| c >= self.min_biometric_confidence)
            }
            CheckInMethod::Password | CheckInMethod::Totp | CheckInMethod::Webauthn => {
                request.verified
            }
        };
        if accepted {
            CheckInStatus::Success
        } else {
            CheckInStatus::Failed
        }
    }

    /// An earlier successful check-in this request is a retry of.
    pub fn find_replay<'t>(
        &self,
        tx: &'t Transaction<'_>,
        request: &CheckInRequest,
    ) -> Option<&'t CheckIn> {
        tx.check_ins(request.vault_id).find(|c| {
            c.status == CheckInStatus::Success
                && c.client_timestamp == request.timestamp
                && c.method == request.method
        })
    }

    /// Append the attempt and, on success, move the deadline.
    ///
    /// Failed attempts are stored for audit and leave the schedule alone.
    /// When `advance` is false the record is appended without touching the
    /// schedule; used when the check-in closes a recovery instead.
    pub fn record_check_in(
        &self,
        tx: &mut Transaction<'_>,
        request: &CheckInRequest,
        now: PhysicalTime,
        advance: bool,
    ) -> VigilResult<(CheckIn, NextDueInfo)> {
        let status = self.verdict(request);
        let check_in = CheckIn {
            id: CheckInId::new(),
            vault_id: request.vault_id,
            recorded_at: now,
            client_timestamp: request.timestamp,
            method: request.method,
            status,
            confidence: request.confidence,
        };
        tx.insert_check_in(check_in.clone());

        if status == CheckInStatus::Failed {
            let vault = tx.vault_mut(request.vault_id)?;
            vault.check_in_streak = 0;
            vault.updated_at = now;
            let info = NextDueInfo::of(vault);
            tx.emit(VaultFact::CheckInFailed {
                vault_id: request.vault_id,
                at: now,
            });
            return Ok((check_in, info));
        }
        if !advance {
            let info = NextDueInfo::of(tx.vault(request.vault_id)?);
            return Ok((check_in, info));
        }

        let vault = tx.vault_mut(request.vault_id)?;
        vault.check_in_streak = if now <= vault.next_check_in_due {
            vault.check_in_streak.saturating_add(1)
        } else {
            1
        };
        vault.last_check_in_at = now;
        vault.next_check_in_due = now.saturating_add_ms(vault.check_in_interval_ms);
        vault.updated_at = now;
        let previous = vault.status;
        if previous == VaultStatus::Warning {
            vault.status = VaultStatus::Active;
        }
        let info = NextDueInfo::of(vault);

        if previous == VaultStatus::Warning {
            tx.emit(VaultFact::StatusChanged {
                vault_id: request.vault_id,
                from: VaultStatus::Warning,
                to: VaultStatus::Active,
                at: now,
            });
        }
        tx.emit(VaultFact::CheckInRecorded {
            vault_id: request.vault_id,
            next_check_in_due: info.next_check_in_due,
            streak: info.streak,
            at: now,
        });
        Ok((check_in, info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{OwnerId, Scheme};

    const INTERVAL: u64 = 1_000;

    fn vault(grace: u64) -> Vault {
        let start = PhysicalTime::from_ms(0);
        Vault {
            id: VaultId::new(),
            owner_id: OwnerId::new(),
            scheme: Scheme::TWO_OF_THREE,
            status: VaultStatus::Active,
            check_in_interval_ms: INTERVAL,
            grace_period_ms: grace,
            next_check_in_due: start.saturating_add_ms(INTERVAL),
            last_check_in_at: start,
            check_in_streak: 0,
            created_at: start,
            updated_at: start,
        }
    }

    fn tracker() -> LivenessTracker {
        LivenessTracker {
            warning_lead_ms: 100,
            min_biometric_confidence: 0.8,
        }
    }

    fn request(method: CheckInMethod, verified: bool, confidence: Option<f32>) -> CheckInRequest {
        CheckInRequest {
            vault_id: VaultId::new(),
            timestamp: PhysicalTime::from_ms(0),
            method,
            verified,
            confidence,
        }
    }

    #[test]
    fn grace_deadline_itself_is_on_time() {
        let vault = vault(50);
        let tracker = tracker();
        assert!(!tracker.is_overdue(&vault, PhysicalTime::from_ms(1_050)));
        assert!(tracker.is_overdue(&vault, PhysicalTime::from_ms(1_051)));
    }

    #[test]
    fn warning_window_starts_at_lead() {
        let vault = vault(0);
        let tracker = tracker();
        assert!(!tracker.in_warning_window(&vault, PhysicalTime::from_ms(899)));
        assert!(tracker.in_warning_window(&vault, PhysicalTime::from_ms(900)));
    }

    #[test]
    fn biometric_fallback_needs_confidence() {
        let tracker = tracker();
        let method = CheckInMethod::BiometricFallback;
        assert_eq!(tracker.verdict(&request(method, true, Some(0.8))), CheckInStatus::Success);
        assert_eq!(tracker.verdict(&request(method, true, Some(0.79))), CheckInStatus::Failed);
        assert_eq!(tracker.verdict(&request(method, true, None)), CheckInStatus::Failed);
        assert_eq!(tracker.verdict(&request(method, false, Some(0.99))), CheckInStatus::Failed);
    }

    #[test]
    fn unverified_attempts_fail() {
        let tracker = tracker();
        assert_eq!(
            tracker.verdict(&request(CheckInMethod::Totp, false, None)),
            CheckInStatus::Failed
        );
        assert_eq!(
            tracker.verdict(&request(CheckInMethod::Webauthn, true, None)),
            CheckInStatus::Success
        );
    }
}
