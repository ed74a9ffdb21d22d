//! Party registry through the engine: guardian bounds, duplicates,
//! invitations, and fragment hand-off on guardian changes.

use assert_matches::assert_matches;
use vigil_core::{OwnerId, Scheme, VigilError};
use vigil_recovery::{NewVault, PartyRole, PartyStatus, VaultFact};
use vigil_testkit::*;

#[test]
fn two_of_three_removal_from_three_guardians_fails() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 1);

    assert_matches!(
        harness.engine.remove_party(vault.guardians[0]),
        Err(VigilError::MinimumGuardiansRequired { minimum: 3 })
    );
    assert_eq!(harness.engine.parties(vault.vault_id).unwrap().len(), 4);
}

#[test]
fn two_of_three_removal_from_four_guardians_succeeds() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 4, 0, 1);

    harness.engine.remove_party(vault.guardians[0]).unwrap();

    let fixture = harness.fixture(vault.vault_id, vault.owner_id);
    assert_eq!(fixture.guardians.len(), 3);
    let fragments = harness.engine.fragments(vault.vault_id).unwrap();
    assert_eq!(fragments.len(), 3);
    assert!(fragments.iter().all(|f| f.assigned_to.is_some()));
    assert!(harness
        .facts
        .kinds()
        .contains(&"fragments_renewed"));
}

#[test]
fn guardian_cap_follows_scheme() {
    let harness = EngineBuilder::new().build();

    let small = harness.vault(Scheme::TWO_OF_THREE, 5, 0, 0);
    assert_matches!(
        harness
            .engine
            .add_party(small.vault_id, PartyRole::Guardian, "sixth@example.com"),
        Err(VigilError::GuardianCapExceeded { maximum: 5 })
    );

    let large = harness.vault(Scheme::THREE_OF_FIVE, 5, 0, 0);
    assert_matches!(
        harness
            .engine
            .add_party(large.vault_id, PartyRole::Guardian, "sixth@example.com"),
        Err(VigilError::GuardianCapExceeded { maximum: 5 })
    );
    assert_matches!(
        harness.engine.remove_party(large.guardians[0]),
        Err(VigilError::MinimumGuardiansRequired { minimum: 5 })
    );
}

#[test]
fn extra_guardians_get_extended_fragments() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 5, 0, 0);

    let indices: Vec<u8> = harness
        .engine
        .fragments(vault.vault_id)
        .unwrap()
        .iter()
        .map(|f| f.index)
        .collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);
}

#[test]
fn duplicate_emails_are_case_insensitive_per_role() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);

    assert_matches!(
        harness
            .engine
            .add_party(vault.vault_id, PartyRole::Guardian, "  GUARDIAN0@Example.com "),
        Err(VigilError::DuplicateParty)
    );
    // same person in another role is fine
    harness
        .engine
        .add_party(vault.vault_id, PartyRole::Beneficiary, "guardian0@example.com")
        .unwrap();
}

#[test]
fn declined_invitation_frees_the_email() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);

    let invited = harness
        .engine
        .invite_party(vault.vault_id, PartyRole::Attestor, "notary@example.com")
        .unwrap();
    assert_matches!(
        harness
            .engine
            .invite_party(vault.vault_id, PartyRole::Attestor, "notary@example.com"),
        Err(VigilError::DuplicateParty)
    );

    harness.engine.decline_invitation(invited).unwrap();
    harness
        .engine
        .invite_party(vault.vault_id, PartyRole::Attestor, "notary@example.com")
        .unwrap();

    assert_matches!(
        harness.engine.accept_invitation(invited),
        Err(VigilError::InvalidStateTransition { .. })
    );
}

#[test]
fn accepted_guardian_invitation_receives_fragment() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);

    let invited = harness
        .engine
        .invite_party(vault.vault_id, PartyRole::Guardian, "late@example.com")
        .unwrap();
    let pending = harness
        .engine
        .parties(vault.vault_id)
        .unwrap()
        .into_iter()
        .find(|p| p.id == invited)
        .unwrap();
    assert_eq!(pending.status, PartyStatus::Pending);
    assert_eq!(pending.fragment_id, None);

    harness.engine.accept_invitation(invited).unwrap();
    let accepted = harness
        .engine
        .parties(vault.vault_id)
        .unwrap()
        .into_iter()
        .find(|p| p.id == invited)
        .unwrap();
    assert_eq!(accepted.status, PartyStatus::Active);
    assert!(accepted.fragment_id.is_some());
    assert!(harness.facts.facts().iter().any(|fact| matches!(
        fact,
        VaultFact::FragmentAssigned { party_id, index: 4, .. } if *party_id == invited
    )));
}

#[test]
fn setup_uses_the_initial_split_before_extending() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::THREE_OF_FIVE, 5, 0, 0);

    let fragments = harness.engine.fragments(vault.vault_id).unwrap();
    let indices: Vec<u8> = fragments.iter().map(|f| f.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);
    assert!(fragments.iter().all(|f| f.assigned_to.is_some()));
    assert!(!harness.facts.kinds().contains(&"fragments_renewed"));
}

#[test]
fn vault_below_scheme_minimum_is_rejected() {
    let harness = EngineBuilder::new().build();
    for (scheme, guardians) in [(Scheme::TWO_OF_THREE, 2), (Scheme::THREE_OF_FIVE, 4)] {
        let request = NewVault::new(OwnerId::new(), scheme, TEST_SECRET)
            .with_guardians((0..guardians).map(|n| email(PartyRole::Guardian, n)))
            .with_beneficiaries([email(PartyRole::Beneficiary, 0)]);
        let minimum = scheme.min_guardians();
        assert_matches!(
            harness.engine.create_vault(request),
            Err(VigilError::MinimumGuardiansRequired { minimum: m }) if m == minimum
        );
    }
    assert!(harness.facts.facts().is_empty());
}

#[test]
fn triggered_vault_rejects_party_mutations() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 4, 0, 1);
    harness.trigger(vault.vault_id);

    assert_matches!(
        harness
            .engine
            .add_party(vault.vault_id, PartyRole::Guardian, "new@example.com"),
        Err(VigilError::VaultLocked)
    );
    // malformed input still reports the lock first
    assert_matches!(
        harness
            .engine
            .add_party(vault.vault_id, PartyRole::Guardian, "not an email"),
        Err(VigilError::VaultLocked)
    );
    assert_matches!(
        harness.engine.remove_party(vault.guardians[0]),
        Err(VigilError::VaultLocked)
    );
    assert_matches!(
        harness.engine.update_schedule(vault.vault_id, 1_000, 0),
        Err(VigilError::VaultLocked)
    );
    assert_matches!(
        harness.engine.delete_vault(vault.vault_id),
        Err(VigilError::VaultLocked)
    );
    assert!(!harness.engine.is_mutable(vault.vault_id).unwrap());
}

#[test]
fn malformed_emails_are_invalid() {
    let harness = EngineBuilder::new().build();
    let vault = harness.vault(Scheme::TWO_OF_THREE, 3, 0, 0);
    assert_matches!(
        harness
            .engine
            .add_party(vault.vault_id, PartyRole::Beneficiary, "nobody"),
        Err(VigilError::Invalid { .. })
    );
}
