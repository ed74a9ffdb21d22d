//! Attestation ledger: eligibility, quorum with attestors, overwrite before
//! quorum, audit-only records after quorum, and rejections that stay open to
//! revision.

use assert_matches::assert_matches;
use vigil_core::{Scheme, VigilError};
use vigil_recovery::{Decision, PartyRole, RecoveryRequestStatus, VaultStatus};
use vigil_testkit::*;

#[test]
fn decision_can_change_until_quorum() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::THREE_OF_FIVE, 5, 0, 0);
    let request_id = harness.trigger(vault.vault_id);

    let status = harness
        .engine
        .attest(request_id, vault.guardians[0], Decision::Reject)
        .unwrap();
    assert_eq!(status.guardian_rejections, 1);

    let status = harness
        .engine
        .attest(request_id, vault.guardians[0], Decision::Approve)
        .unwrap();
    assert_eq!(status.guardian_rejections, 0);
    assert_eq!(status.guardian_approvals, 1);
    assert_eq!(harness.engine.attestations(request_id).unwrap().len(), 1);
}

#[test]
fn submissions_after_quorum_are_audit_only() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    let request_id = harness.trigger(vault.vault_id);

    let status = harness.approve_all(request_id, &vault.guardians[..2]);
    assert!(status.quorum_reached);
    let reached_at = harness
        .engine
        .request(request_id)
        .unwrap()
        .quorum_reached_at
        .unwrap();

    harness.advance_days(1);
    let status = harness
        .engine
        .attest(request_id, vault.guardians[0], Decision::Reject)
        .unwrap();
    assert!(status.quorum_reached);
    assert_eq!(status.guardian_approvals, 2);
    assert_eq!(status.request_status, RecoveryRequestStatus::Triggered);

    let records = harness.engine.attestations(request_id).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records.iter().filter(|a| !a.counted).count(), 1);
    assert_eq!(
        harness.engine.request(request_id).unwrap().quorum_reached_at,
        Some(reached_at)
    );
    assert_eq!(
        harness
            .facts
            .kinds()
            .iter()
            .filter(|k| **k == "quorum_reached")
            .count(),
        1
    );
}

#[test]
fn attestors_are_required_on_top_of_guardians() {
    let harness = EngineBuilder::new().with_required_attestors(2).build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 3, 0);
    let request_id = harness.trigger(vault.vault_id);

    let status = harness.approve_all(request_id, &vault.guardians);
    assert!(!status.quorum_reached);
    assert_eq!(status.required_attestors, 2);

    let status = harness.approve_all(request_id, &vault.attestors[..1]);
    assert!(!status.quorum_reached);
    let status = harness.approve_all(request_id, &vault.attestors[1..2]);
    assert!(status.quorum_reached);
    assert_eq!(status.attestor_approvals, 2);
}

#[test]
fn attestor_requirement_is_capped_by_active_attestors() {
    let harness = EngineBuilder::new().with_required_attestors(2).build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 1, 0);
    let request_id = harness.trigger(vault.vault_id);

    harness.approve_all(request_id, &vault.guardians[..2]);
    let status = harness.approve_all(request_id, &vault.attestors);
    assert_eq!(status.required_attestors, 1);
    assert!(status.quorum_reached);
}

#[test]
fn only_active_members_with_voting_roles_attest() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 1);
    let other = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    let request_id = harness.trigger(vault.vault_id);

    assert_matches!(
        harness
            .engine
            .attest(request_id, vault.beneficiaries[0], Decision::Approve),
        Err(VigilError::PermissionDenied { .. })
    );
    assert_matches!(
        harness
            .engine
            .attest(request_id, other.guardians[0], Decision::Approve),
        Err(VigilError::PermissionDenied { .. })
    );
}

#[test]
fn attestation_requires_triggered_request() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    let request_id = harness.trigger(vault.vault_id);
    harness
        .engine
        .cancel_recovery(vault.vault_id, vault.owner_id)
        .unwrap();

    assert_matches!(
        harness
            .engine
            .attest(request_id, vault.guardians[0], Decision::Approve),
        Err(VigilError::InvalidStateTransition { .. })
    );
}

#[test]
fn rejections_do_not_close_the_request() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    let request_id = harness.trigger(vault.vault_id);

    for guardian in &vault.guardians {
        let status = harness
            .engine
            .attest(request_id, *guardian, Decision::Reject)
            .unwrap();
        assert_eq!(status.request_status, RecoveryRequestStatus::Triggered);
    }
    assert_eq!(
        harness.engine.vault(vault.vault_id).unwrap().status,
        VaultStatus::Triggered
    );

    // two guardians change their minds
    harness.advance_days(1);
    harness
        .engine
        .attest(request_id, vault.guardians[0], Decision::Approve)
        .unwrap();
    let status = harness
        .engine
        .attest(request_id, vault.guardians[1], Decision::Approve)
        .unwrap();
    assert!(status.quorum_reached);
    assert_eq!(status.guardian_approvals, 2);
    assert_eq!(status.guardian_rejections, 1);

    harness.advance_days(7);
    let sink = CapturingSecretSink::new();
    harness.engine.complete_recovery(request_id, &sink).unwrap();
    assert_eq!(sink.single_secret(), TEST_SECRET);
    assert!(!harness.facts.kinds().contains(&"recovery_cancelled"));
}

#[test]
fn reconstruction_uses_only_approving_guardians() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 4, 0, 0);
    let request_id = harness.trigger(vault.vault_id);
    let sink = CapturingSecretSink::new();

    harness
        .engine
        .attest(request_id, vault.guardians[3], Decision::Reject)
        .unwrap();
    harness.approve_all(request_id, &vault.guardians[1..3]);
    harness.advance_days(7);

    harness.engine.complete_recovery(request_id, &sink).unwrap();
    assert_eq!(sink.single_secret(), TEST_SECRET);
    let roles: Vec<PartyRole> = harness
        .engine
        .attestations(request_id)
        .unwrap()
        .iter()
        .map(|a| a.role)
        .collect();
    assert!(roles.iter().all(|r| *r == PartyRole::Guardian));
}
