//! # Vigil Recovery - Vault Recovery Engine
//!
//! Dead man's switch custody for a single secret per vault: the owner checks
//! in on a schedule, and if the owner stops, a quorum of guardians (plus
//! attestors) can reconstruct the secret for the beneficiaries once a
//! time-lock has passed.
//!
//! ## Components
//!
//! - **codec**: Shamir secret sharing over GF(256) with split lineage ids and
//!   checksums; every failure is the same `InvalidFragmentSet`
//! - **registry**: guardians, beneficiaries and attestors with scheme-derived
//!   guardian bounds
//! - **liveness**: check-ins, deadlines, grace and warning windows
//! - **state_machine**: `active → warning → triggered → completed | cancelled`
//! - **attestation**: approve/reject decisions and quorum
//! - **guard**: rejects mutations while a vault is triggered
//! - **fragment_vault**: sealed fragment custody, revocation and reconstruction
//!
//! ## What Does NOT Belong Here
//!
//! - Transport, sessions, notification delivery
//! - Capturing biometrics or WebAuthn assertions; the engine only consumes a
//!   `verified` flag and an optional confidence score
//!
//! ## Design Principles
//!
//! - One store transaction per operation; failures commit nothing
//! - The clock is read once per operation and deadlines are compared lazily
//! - Facts are published and secrets delivered only after commit
//! - Share and secret buffers are zeroized; nothing secret is logged

#![allow(missing_docs)]
#![forbid(unsafe_code)]

/// Attestation ledger and quorum
pub mod attestation;

/// Threshold fragment codec
pub mod codec;

/// Engine façade
pub mod engine;

/// Audit facts and sinks
pub mod facts;

/// Sealed fragment custody
pub mod fragment_vault;

/// Vault mutation lock
pub mod guard;

/// Check-in tracking
pub mod liveness;

/// Party membership
pub mod registry;

/// Recovery state machine
pub mod state_machine;

/// Transactional record store
pub mod store;

/// Durable records
pub mod types;

pub use attestation::{AttestationLedger, QuorumStatus};
pub use codec::{FragmentError, Share};
pub use engine::{
    CheckInReceipt, FragmentSummary, NewVault, RecoveryReceipt, SecretSink, VaultEngine,
};
pub use facts::{FactSink, MemoryFactSink, TracingFactSink, VaultFact};
pub use fragment_vault::{FragmentVault, SealingKey};
pub use guard::VaultLockGuard;
pub use liveness::{CheckInRequest, LivenessTracker, NextDueInfo};
pub use registry::{normalize_email, PartyRegistry, RosterCounts};
pub use state_machine::{LivenessEvaluation, RecoveryStateMachine};
pub use store::{FileVaultStore, MemoryVaultStore, Transaction, VaultStore};
pub use types::{
    Attestation, CancellationReason, CheckIn, CheckInMethod, CheckInStatus, Decision,
    FragmentRecord, Party, PartyRole, PartyStatus, RecoveryRequest, RecoveryRequestStatus,
    TriggerReason, Vault, VaultStatus,
};
