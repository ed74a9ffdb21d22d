//! Vault lifecycle: liveness deadlines, trigger, time-lock, cancellation and
//! completion, driven end to end through the engine on a manual clock.

use assert_matches::assert_matches;
use vigil_core::time::{DAY_MS, HOUR_MS};
use vigil_core::{OwnerId, Scheme, VigilError};
use vigil_recovery::{
    CancellationReason, CheckInMethod, CheckInRequest, CheckInStatus, LivenessEvaluation,
    NewVault, PartyRole, RecoveryRequestStatus, VaultStatus,
};
use vigil_testkit::*;

#[test]
fn ninety_day_scenario_delivers_secret_after_time_lock() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 1);
    let sink = CapturingSecretSink::new();

    // day 90: due now, not yet overdue
    harness.advance_days(90);
    assert_matches!(
        harness.engine.evaluate_liveness(vault.vault_id).unwrap(),
        LivenessEvaluation::Warning
    );
    assert_matches!(
        harness.engine.evaluate_liveness(vault.vault_id).unwrap(),
        LivenessEvaluation::Unchanged(VaultStatus::Warning)
    );

    // day 91: overdue, recovery triggered
    harness.advance_days(1);
    let request_id = harness
        .engine
        .evaluate_liveness(vault.vault_id)
        .unwrap()
        .request_id()
        .unwrap();
    assert_eq!(
        harness.engine.vault(vault.vault_id).unwrap().status,
        VaultStatus::Triggered
    );

    // day 93: quorum, but the time-lock still runs
    harness.advance_days(2);
    let status = harness.approve_all(request_id, &vault.guardians[..2]);
    assert!(status.quorum_reached);
    assert_matches!(
        harness.engine.complete_recovery(request_id, &sink),
        Err(VigilError::RecoveryNotEligible)
    );
    assert_eq!(
        harness.engine.vault(vault.vault_id).unwrap().status,
        VaultStatus::Triggered
    );

    // one hour before day 98 the lock still holds
    harness.advance_days(4);
    harness.advance_ms(DAY_MS - HOUR_MS);
    assert_matches!(
        harness.engine.complete_recovery(request_id, &sink),
        Err(VigilError::RecoveryNotEligible)
    );
    assert_eq!(sink.delivery_count(), 0);

    // day 98: time-lock expired
    harness.advance_ms(HOUR_MS);
    let receipt = harness.engine.complete_recovery(request_id, &sink).unwrap();
    assert_eq!(receipt.beneficiaries, vault.beneficiaries);
    assert_eq!(sink.single_secret(), TEST_SECRET);

    assert_eq!(
        harness.engine.vault(vault.vault_id).unwrap().status,
        VaultStatus::Completed
    );
    assert_eq!(
        harness.engine.request(request_id).unwrap().status,
        RecoveryRequestStatus::Completed
    );
    assert_matches!(
        harness.engine.complete_recovery(request_id, &sink),
        Err(VigilError::InvalidStateTransition { .. })
    );
    assert_eq!(sink.delivery_count(), 1);
}

#[test]
fn completion_requires_quorum_before_time_lock() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    let request_id = harness.trigger(vault.vault_id);
    let sink = CapturingSecretSink::new();

    harness
        .engine
        .attest(request_id, vault.guardians[0], vigil_recovery::Decision::Approve)
        .unwrap();
    harness.advance_days(30);
    assert_matches!(
        harness.engine.complete_recovery(request_id, &sink),
        Err(VigilError::QuorumNotReached)
    );
}

#[test]
fn grace_deadline_is_inclusive() {
    let harness = EngineBuilder::new().with_grace_days(2).build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);

    harness.advance_days(92);
    assert_matches!(
        harness.engine.evaluate_liveness(vault.vault_id).unwrap(),
        LivenessEvaluation::Warning
    );
    harness.advance_ms(1);
    assert_matches!(
        harness.engine.evaluate_liveness(vault.vault_id).unwrap(),
        LivenessEvaluation::Triggered(_)
    );
}

#[test]
fn repeated_evaluation_creates_one_request() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    harness.advance_days(91);

    let first = harness.engine.evaluate_liveness(vault.vault_id).unwrap();
    let second = harness.engine.evaluate_liveness(vault.vault_id).unwrap();
    let swept = harness.engine.evaluate_all().unwrap();

    assert_matches!(first, LivenessEvaluation::Triggered(_));
    assert_eq!(second, LivenessEvaluation::AlreadyTriggered(first.request_id().unwrap()));
    assert_eq!(swept.len(), 1);
    assert_eq!(harness.engine.requests(vault.vault_id).unwrap().len(), 1);
    assert_eq!(
        harness
            .facts
            .kinds()
            .iter()
            .filter(|k| **k == "recovery_triggered")
            .count(),
        1
    );
}

#[test]
fn check_in_during_time_lock_cancels_recovery() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    let request_id = harness.trigger(vault.vault_id);
    harness.approve_all(request_id, &vault.guardians[..2]);

    harness.advance_days(3);
    let receipt = harness.check_in(vault.vault_id);
    assert_eq!(receipt.status, CheckInStatus::Success);
    assert_eq!(receipt.cancelled_request, Some(request_id));

    let request = harness.engine.request(request_id).unwrap();
    assert_eq!(request.status, RecoveryRequestStatus::Cancelled);
    assert_eq!(request.cancellation, Some(CancellationReason::OwnerCheckIn));
    assert_eq!(
        harness.engine.vault(vault.vault_id).unwrap().status,
        VaultStatus::Cancelled
    );

    harness.advance_days(10);
    assert_matches!(
        harness
            .engine
            .complete_recovery(request_id, &CapturingSecretSink::new()),
        Err(VigilError::InvalidStateTransition { .. })
    );
}

#[test]
fn check_in_after_time_lock_is_too_late() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    let request_id = harness.trigger(vault.vault_id);

    harness.advance_days(7);
    assert_matches!(
        harness
            .engine
            .check_in(password_check_in(vault.vault_id, harness.now())),
        Err(VigilError::CancellationWindowClosed)
    );
    assert_eq!(
        harness.engine.request(request_id).unwrap().status,
        RecoveryRequestStatus::Triggered
    );
    assert!(harness.engine.check_ins(vault.vault_id).unwrap().is_empty());
}

#[test]
fn failed_check_in_on_triggered_vault_is_locked_out() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    harness.trigger(vault.vault_id);

    let mut attempt = password_check_in(vault.vault_id, harness.now());
    attempt.verified = false;
    assert_matches!(harness.engine.check_in(attempt), Err(VigilError::VaultLocked));
}

#[test]
fn owner_cancellation_checks_owner_and_window() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    let request_id = harness.trigger(vault.vault_id);

    assert_matches!(
        harness.engine.cancel_recovery(vault.vault_id, OwnerId::new()),
        Err(VigilError::PermissionDenied { .. })
    );
    assert_eq!(
        harness
            .engine
            .cancel_recovery(vault.vault_id, vault.owner_id)
            .unwrap(),
        request_id
    );
    assert_eq!(
        harness.engine.request(request_id).unwrap().cancellation,
        Some(CancellationReason::OwnerCancelled)
    );
    assert_matches!(
        harness.engine.cancel_recovery(vault.vault_id, vault.owner_id),
        Err(VigilError::InvalidStateTransition { .. })
    );
}

#[test]
fn owner_cancellation_after_time_lock_is_rejected() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    harness.trigger(vault.vault_id);
    harness.advance_days(8);
    assert_matches!(
        harness.engine.cancel_recovery(vault.vault_id, vault.owner_id),
        Err(VigilError::CancellationWindowClosed)
    );
}

#[test]
fn retried_check_in_returns_original_receipt() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    harness.advance_days(10);

    let attempt = password_check_in(vault.vault_id, harness.now());
    let first = harness.engine.check_in(attempt.clone()).unwrap();
    harness.advance_ms(5_000);
    let retry = harness.engine.check_in(attempt).unwrap();

    assert_eq!(retry.check_in_id, first.check_in_id);
    assert_eq!(retry.next_check_in_due, first.next_check_in_due);
    assert!(retry.replayed);
    assert!(!first.replayed);
    assert_eq!(harness.engine.check_ins(vault.vault_id).unwrap().len(), 1);
}

#[test]
fn failed_check_in_is_audited_without_moving_deadline() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    harness.advance_days(10);
    harness.check_in(vault.vault_id);
    let before = harness.engine.vault(vault.vault_id).unwrap();
    assert_eq!(before.check_in_streak, 1);

    harness.advance_days(10);
    let receipt = harness
        .engine
        .check_in(CheckInRequest {
            vault_id: vault.vault_id,
            timestamp: harness.now(),
            method: CheckInMethod::BiometricFallback,
            verified: true,
            confidence: Some(0.5),
        })
        .unwrap();
    assert_eq!(receipt.status, CheckInStatus::Failed);
    assert_eq!(receipt.next_check_in_due, before.next_check_in_due);
    assert_eq!(receipt.streak, 0);

    let history = harness.engine.check_ins(vault.vault_id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].status, CheckInStatus::Failed);
}

#[test]
fn late_check_in_inside_grace_restarts_streak() {
    let harness = EngineBuilder::new().with_grace_days(5).build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);

    harness.advance_days(30);
    assert_eq!(harness.check_in(vault.vault_id).streak, 1);
    harness.advance_days(90);
    assert_eq!(harness.check_in(vault.vault_id).streak, 2);

    // two days into grace: accepted but late
    harness.advance_days(92);
    let receipt = harness.check_in(vault.vault_id);
    assert_eq!(receipt.streak, 1);
    assert_eq!(
        receipt.next_check_in_due,
        harness.now().saturating_add_ms(90 * DAY_MS)
    );
}

#[test]
fn check_in_clears_warning() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    harness.advance_days(85);
    harness.engine.evaluate_liveness(vault.vault_id).unwrap();
    assert_eq!(
        harness.engine.vault(vault.vault_id).unwrap().status,
        VaultStatus::Warning
    );

    harness.check_in(vault.vault_id);
    assert_eq!(
        harness.engine.vault(vault.vault_id).unwrap().status,
        VaultStatus::Active
    );
}

#[test]
fn schedule_update_recomputes_deadline_from_last_check_in() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    harness.advance_days(5);
    harness.check_in(vault.vault_id);
    let last = harness.now();

    harness.advance_days(1);
    let info = harness
        .engine
        .update_schedule(vault.vault_id, 30 * DAY_MS, DAY_MS)
        .unwrap();
    assert_eq!(info.next_check_in_due, last.saturating_add_ms(30 * DAY_MS));
    assert_eq!(
        info.grace_deadline,
        last.saturating_add_ms(31 * DAY_MS)
    );
    assert_matches!(
        harness.engine.update_schedule(vault.vault_id, 0, 0),
        Err(VigilError::Invalid { .. })
    );
}

#[test]
fn schedule_inside_warning_lead_is_rejected() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);

    // default warning lead is seven days
    assert_matches!(
        harness.engine.update_schedule(vault.vault_id, 7 * DAY_MS, 0),
        Err(VigilError::Invalid { .. })
    );
    let request = NewVault::new(OwnerId::new(), Scheme::TWO_OF_THREE, TEST_SECRET)
        .with_guardians((0..3).map(|n| email(PartyRole::Guardian, n)))
        .with_schedule(3 * DAY_MS, 0);
    assert_matches!(
        harness.engine.create_vault(request),
        Err(VigilError::Invalid { .. })
    );
    assert_eq!(
        harness.engine.vault(vault.vault_id).unwrap().status,
        VaultStatus::Active
    );
}

#[test]
fn terminal_vaults_are_read_only_but_deletable() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    harness.trigger(vault.vault_id);
    harness
        .engine
        .cancel_recovery(vault.vault_id, vault.owner_id)
        .unwrap();

    assert_matches!(
        harness.engine.check_in(password_check_in(vault.vault_id, harness.now())),
        Err(VigilError::InvalidStateTransition { .. })
    );
    assert_matches!(
        harness.engine.add_party(
            vault.vault_id,
            vigil_recovery::PartyRole::Beneficiary,
            "heir@example.com"
        ),
        Err(VigilError::InvalidStateTransition { .. })
    );
    assert_matches!(
        harness.engine.evaluate_liveness(vault.vault_id).unwrap(),
        LivenessEvaluation::Unchanged(VaultStatus::Cancelled)
    );

    harness.engine.delete_vault(vault.vault_id).unwrap();
    assert_matches!(
        harness.engine.vault(vault.vault_id),
        Err(VigilError::NotFound { .. })
    );
    assert!(harness.engine.requests(vault.vault_id).unwrap().is_empty());
}

#[test]
fn failed_operations_publish_no_facts() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    let published = harness.facts.facts().len();

    assert!(harness.engine.remove_party(vault.guardians[0]).is_err());
    assert_eq!(harness.facts.facts().len(), published);
}

#[test]
fn failed_delivery_still_closes_the_request() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    let request_id = harness.trigger(vault.vault_id);
    harness.approve_all(request_id, &vault.guardians[..2]);
    harness.advance_days(7);

    assert_matches!(
        harness.engine.complete_recovery(request_id, &FailingSecretSink),
        Err(VigilError::Internal { .. })
    );
    assert_eq!(
        harness.engine.request(request_id).unwrap().status,
        RecoveryRequestStatus::Completed
    );
}
