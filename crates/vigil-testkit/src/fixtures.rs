//! Engine and vault fixtures

use std::sync::Arc;
use vigil_core::time::DAY_MS;
use vigil_core::{
    EngineConfig, ManualClock, OwnerId, PartyId, PhysicalTime, RecoveryRequestId, Scheme,
    VaultId,
};
use vigil_recovery::{
    CheckInMethod, CheckInReceipt, CheckInRequest, Decision, MemoryFactSink, MemoryVaultStore,
    NewVault, PartyRole, QuorumStatus, SealingKey, VaultEngine,
};

/// Secret used by fixtures.
pub const TEST_SECRET: &[u8] = b"abandon ability able about above absent absorb abstract absurd";

/// Start of the fixture clock (2024-01-01T00:00:00Z).
pub const EPOCH: PhysicalTime = PhysicalTime::from_ms(1_704_067_200_000);

/// Engine type used across tests.
pub type TestEngine = VaultEngine<MemoryVaultStore, Arc<ManualClock>>;

/// Builds an engine on a manual clock and memory store.
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    config: EngineConfig,
    start: PhysicalTime,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Default configuration with no attestor requirement.
    pub fn new() -> Self {
        Self {
            config: EngineConfig {
                required_attestors: 0,
                ..EngineConfig::default()
            },
            start: EPOCH,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_required_attestors(mut self, required: usize) -> Self {
        self.config.required_attestors = required;
        self
    }

    pub fn with_grace_days(mut self, days: u64) -> Self {
        self.config.grace_period_secs = days * 24 * 60 * 60;
        self
    }

    pub fn starting_at(mut self, start: PhysicalTime) -> Self {
        self.start = start;
        self
    }

    pub fn build(self) -> Harness {
        let clock = Arc::new(ManualClock::new(self.start));
        let facts = Arc::new(MemoryFactSink::new());
        let engine = VaultEngine::new(
            MemoryVaultStore::new(),
            clock.clone(),
            self.config,
            &SealingKey::generate(),
        )
        .expect("fixture config is valid")
        .with_fact_sink(facts.clone());
        Harness {
            engine,
            clock,
            facts,
        }
    }
}

/// Engine with handles on its clock and fact log.
pub struct Harness {
    pub engine: TestEngine,
    pub clock: Arc<ManualClock>,
    pub facts: Arc<MemoryFactSink>,
}

/// A vault created by [`Harness::vault`].
#[derive(Debug, Clone)]
pub struct VaultFixture {
    pub vault_id: VaultId,
    pub owner_id: OwnerId,
    pub guardians: Vec<PartyId>,
    pub attestors: Vec<PartyId>,
    pub beneficiaries: Vec<PartyId>,
}

/// Fixture email for the `n`th party of a role.
pub fn email(role: PartyRole, n: usize) -> String {
    format!("{role}{n}@example.com")
}

impl Harness {
    /// Create a vault with the given roster sizes.
    pub fn vault(
        &self,
        scheme: Scheme,
        guardians: usize,
        attestors: usize,
        beneficiaries: usize,
    ) -> VaultFixture {
        let owner_id = OwnerId::new();
        let request = NewVault::new(owner_id, scheme, TEST_SECRET)
            .with_guardians((0..guardians).map(|n| email(PartyRole::Guardian, n)))
            .with_attestors((0..attestors).map(|n| email(PartyRole::Attestor, n)))
            .with_beneficiaries((0..beneficiaries).map(|n| email(PartyRole::Beneficiary, n)));
        let vault_id = self.engine.create_vault(request).expect("vault created");
        self.fixture(vault_id, owner_id)
    }

    /// Re-read the roster of an existing vault.
    pub fn fixture(&self, vault_id: VaultId, owner_id: OwnerId) -> VaultFixture {
        let mut parties = self.engine.parties(vault_id).expect("vault exists");
        parties.sort_by(|a, b| a.email.cmp(&b.email));
        let ids = |role: PartyRole| -> Vec<PartyId> {
            parties
                .iter()
                .filter(|p| p.role == role && p.is_active())
                .map(|p| p.id)
                .collect()
        };
        VaultFixture {
            vault_id,
            owner_id,
            guardians: ids(PartyRole::Guardian),
            attestors: ids(PartyRole::Attestor),
            beneficiaries: ids(PartyRole::Beneficiary),
        }
    }

    pub fn now(&self) -> PhysicalTime {
        self.clock.now()
    }

    pub fn advance_days(&self, days: u64) {
        self.clock.advance_days(days);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.clock.advance_ms(ms);
    }

    /// Verified password check-in stamped with the current clock.
    pub fn check_in(&self, vault_id: VaultId) -> CheckInReceipt {
        self.engine
            .check_in(password_check_in(vault_id, self.now()))
            .expect("check-in accepted")
    }

    /// Move past the default 90-day deadline and trigger recovery.
    pub fn trigger(&self, vault_id: VaultId) -> RecoveryRequestId {
        let vault = self.engine.vault(vault_id).expect("vault exists");
        let overdue_by = vault.grace_deadline().ms_until(self.now());
        if overdue_by == 0 {
            self.clock.set(vault.grace_deadline());
            self.clock.advance_ms(DAY_MS);
        }
        self.engine
            .evaluate_liveness(vault_id)
            .expect("evaluation succeeds")
            .request_id()
            .expect("vault triggered")
    }

    /// Approve with each listed party and return the final tally.
    pub fn approve_all(&self, request_id: RecoveryRequestId, parties: &[PartyId]) -> QuorumStatus {
        let mut last = None;
        for party in parties {
            last = Some(
                self.engine
                    .attest(request_id, *party, Decision::Approve)
                    .expect("attestation accepted"),
            );
        }
        last.expect("at least one party")
    }
}

/// A verified password check-in.
pub fn password_check_in(vault_id: VaultId, timestamp: PhysicalTime) -> CheckInRequest {
    CheckInRequest {
        vault_id,
        timestamp,
        method: CheckInMethod::Password,
        verified: true,
        confidence: None,
    }
}
