//! `vigil simulate`: drive one vault through silence, trigger, attestation
//! and release on a manual clock.

use crate::config::CliConfig;
use anyhow::{bail, Context, Result};
use clap::Args;
use std::cell::Cell;
use std::io::Write;
use std::sync::Arc;
use vigil_core::time::DAY_MS;
use vigil_core::{
    ManualClock, OwnerId, PhysicalTime, PhysicalTimeEffects, Scheme, SystemClock, VigilError,
    VigilResult,
};
use vigil_recovery::{
    Decision, FileVaultStore, LivenessEvaluation, MemoryFactSink, MemoryVaultStore, NewVault,
    PartyRole, RecoveryReceipt, SecretSink, VaultEngine, VaultStore,
};

const SCENARIO_SECRET: &[u8] = b"simulated vault secret";

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Fragment scheme of the simulated vault
    #[arg(short, long, default_value = "2-of-3")]
    pub scheme: Scheme,

    /// Print every committed fact as a JSON line after the run
    #[arg(long)]
    pub facts: bool,
}

/// Checks the released secret instead of handing it anywhere.
#[derive(Default)]
struct VerifyingSink {
    matched: Cell<bool>,
}

impl SecretSink for VerifyingSink {
    fn deliver(&self, receipt: &RecoveryReceipt, secret: &[u8]) -> VigilResult<()> {
        tracing::info!(
            vault_id = %receipt.vault_id,
            beneficiaries = receipt.beneficiaries.len(),
            "secret released"
        );
        self.matched.set(secret == SCENARIO_SECRET);
        Ok(())
    }
}

fn day_of(start: PhysicalTime, now: PhysicalTime) -> u64 {
    start.ms_until(now) / DAY_MS
}

pub fn run(args: &SimulateArgs, config: &CliConfig, out: &mut impl Write) -> Result<()> {
    let key = config.store.sealing_key()?;
    let start = SystemClock.physical_time().map_err(VigilError::from)?;
    let clock = Arc::new(ManualClock::new(start));
    let facts = Arc::new(MemoryFactSink::new());

    match &config.store.path {
        Some(path) => {
            let store = FileVaultStore::open(path)
                .with_context(|| format!("Failed to open store {}", path.display()))?;
            let engine = VaultEngine::new(store, clock.clone(), config.engine.clone(), &key)?
                .with_fact_sink(facts.clone());
            scenario(&engine, &clock, args.scheme, out)?;
        }
        None => {
            let engine =
                VaultEngine::new(MemoryVaultStore::new(), clock.clone(), config.engine.clone(), &key)?
                    .with_fact_sink(facts.clone());
            scenario(&engine, &clock, args.scheme, out)?;
        }
    }

    if args.facts {
        for fact in facts.facts() {
            writeln!(out, "{}", serde_json::to_string(&fact)?)?;
        }
    }
    Ok(())
}

fn scenario<S: VaultStore>(
    engine: &VaultEngine<S, Arc<ManualClock>>,
    clock: &ManualClock,
    scheme: Scheme,
    out: &mut impl Write,
) -> Result<()> {
    let start = clock.now();
    let attestors = engine.config().required_attestors;
    let request = NewVault::new(OwnerId::new(), scheme, SCENARIO_SECRET)
        .with_guardians((0..scheme.min_guardians()).map(|n| format!("guardian{n}@example.com")))
        .with_attestors((0..attestors).map(|n| format!("attestor{n}@example.com")))
        .with_beneficiaries(["heir@example.com"]);
    let vault_id = engine.create_vault(request)?;
    writeln!(out, "day 0: created {scheme} vault {vault_id}")?;

    let vault = engine.vault(vault_id)?;
    let warning_at = vault
        .next_check_in_due
        .saturating_sub_ms(engine.config().warning_lead_ms());
    clock.set(warning_at);
    for (id, evaluation) in engine.evaluate_all()? {
        writeln!(out, "day {}: {id} -> {evaluation:?}", day_of(start, clock.now()))?;
    }

    clock.set(vault.grace_deadline().saturating_add_ms(DAY_MS));
    let request_id = match engine.evaluate_liveness(vault_id)? {
        LivenessEvaluation::Triggered(id) => id,
        other => bail!("Expected the vault to trigger, got {other:?}"),
    };
    let request = engine.request(request_id)?;
    writeln!(
        out,
        "day {}: recovery {request_id} triggered, time-lock until day {}",
        day_of(start, clock.now()),
        day_of(start, request.time_lock_expires_at)
    )?;

    clock.advance_days(1);
    let parties = engine.parties(vault_id)?;
    let guardians = parties.iter().filter(|p| p.role == PartyRole::Guardian);
    let attestors = parties.iter().filter(|p| p.role == PartyRole::Attestor);
    for party in guardians
        .take(usize::from(scheme.threshold()))
        .chain(attestors)
    {
        let status = engine.attest(request_id, party.id, Decision::Approve)?;
        writeln!(
            out,
            "day {}: {} {} approved (quorum reached: {})",
            day_of(start, clock.now()),
            party.role,
            party.email,
            status.quorum_reached
        )?;
    }

    let sink = VerifyingSink::default();
    match engine.complete_recovery(request_id, &sink) {
        Err(VigilError::RecoveryNotEligible) => writeln!(
            out,
            "day {}: completion refused while the time-lock holds",
            day_of(start, clock.now())
        )?,
        Err(e) => return Err(e.into()),
        Ok(_) => bail!("Recovery completed inside the time-lock"),
    }

    clock.set(request.time_lock_expires_at);
    let receipt = engine.complete_recovery(request_id, &sink)?;
    writeln!(
        out,
        "day {}: recovery completed for {} beneficiary(ies), secret intact: {}",
        day_of(start, receipt.completed_at),
        receipt.beneficiaries.len(),
        sink.matched.get()
    )?;
    if !sink.matched.get() {
        bail!("Released secret does not match the original");
    }
    Ok(())
}
