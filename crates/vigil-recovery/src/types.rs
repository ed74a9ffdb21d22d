//! Durable records of the recovery engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use vigil_core::{
    AttestationId, CheckInId, FragmentId, OwnerId, PartyId, PhysicalTime, RecoveryRequestId,
    Scheme, VaultId,
};

/// Lifecycle of a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultStatus {
    /// Owner is checking in; vault is mutable
    Active,
    /// Check-in deadline approaching; vault is still mutable
    Warning,
    /// Owner overdue; recovery in progress, mutations locked
    Triggered,
    /// Secret reconstructed and delivered
    Completed,
    /// Recovery cancelled before completion
    Cancelled,
}

impl VaultStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Warning => "warning",
            Self::Triggered => "triggered",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A protected secret and its liveness schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    pub owner_id: OwnerId,
    pub scheme: Scheme,
    pub status: VaultStatus,
    /// Time between required check-ins (ms)
    pub check_in_interval_ms: u64,
    /// Extra time after the due instant before the vault is overdue (ms)
    pub grace_period_ms: u64,
    pub next_check_in_due: PhysicalTime,
    /// Last successful check-in, or creation time before the first one
    pub last_check_in_at: PhysicalTime,
    /// Consecutive successful check-ins that arrived on time
    pub check_in_streak: u32,
    pub created_at: PhysicalTime,
    pub updated_at: PhysicalTime,
}

impl Vault {
    /// Instant after which the vault counts as overdue.
    pub fn grace_deadline(&self) -> PhysicalTime {
        self.next_check_in_due
            .saturating_add_ms(self.grace_period_ms)
    }
}

/// What a party does for the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    /// Holds one fragment and votes on recovery
    Guardian,
    /// Receives the secret once recovery completes
    Beneficiary,
    /// Second, independent approval tier
    Attestor,
}

impl PartyRole {
    /// Whether the role may attest on a recovery request.
    pub fn can_attest(self) -> bool {
        matches!(self, Self::Guardian | Self::Attestor)
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Guardian => "guardian",
            Self::Beneficiary => "beneficiary",
            Self::Attestor => "attestor",
        };
        f.write_str(label)
    }
}

/// Invitation status of a party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyStatus {
    Active,
    Pending,
    Declined,
}

impl fmt::Display for PartyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Declined => "declined",
        };
        f.write_str(label)
    }
}

/// A guardian, beneficiary, or attestor of one vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub vault_id: VaultId,
    pub role: PartyRole,
    /// Lower-cased, trimmed address
    pub email: String,
    pub status: PartyStatus,
    /// Fragment held by an active guardian
    pub fragment_id: Option<FragmentId>,
    pub created_at: PhysicalTime,
}

impl Party {
    pub fn is_active(&self) -> bool {
        self.status == PartyStatus::Active
    }

    pub fn is_active_guardian(&self) -> bool {
        self.is_active() && self.role == PartyRole::Guardian
    }
}

/// A sealed share held in custody by the vault.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub id: FragmentId,
    pub vault_id: VaultId,
    /// Evaluation point of the share
    pub index: u8,
    /// AEAD nonce used when sealing
    pub nonce: [u8; 12],
    /// Encrypted share bytes
    pub sealed: Vec<u8>,
    /// Share checksum (hex)
    pub checksum: String,
    /// Split lineage the share belongs to (hex)
    pub split_id: String,
    /// Guardian currently holding the fragment
    pub assigned_to: Option<PartyId>,
}

impl fmt::Debug for FragmentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentRecord")
            .field("id", &self.id)
            .field("vault_id", &self.vault_id)
            .field("index", &self.index)
            .field("split_id", &self.split_id)
            .field("assigned_to", &self.assigned_to)
            .finish_non_exhaustive()
    }
}

/// How the owner proved liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInMethod {
    Password,
    Totp,
    Webauthn,
    BiometricFallback,
}

/// Outcome of a check-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    Success,
    Failed,
}

/// Append-only record of a check-in attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckIn {
    pub id: CheckInId,
    pub vault_id: VaultId,
    /// Authoritative engine clock reading
    pub recorded_at: PhysicalTime,
    /// Timestamp reported by the client
    pub client_timestamp: PhysicalTime,
    pub method: CheckInMethod,
    pub status: CheckInStatus,
    pub confidence: Option<f32>,
}

/// Lifecycle of a recovery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryRequestStatus {
    /// Opened, trigger not yet confirmed
    Active,
    /// Collecting attestations behind the time-lock
    Triggered,
    Completed,
    Cancelled,
}

impl RecoveryRequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for RecoveryRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Triggered => "triggered",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Why a recovery request was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// Owner missed the check-in deadline and grace period
    LivenessExpired,
}

/// Why a recovery request was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    /// Owner checked in inside the time-lock window
    OwnerCheckIn,
    /// Owner cancelled explicitly inside the time-lock window
    OwnerCancelled,
}

/// A recovery attempt for one vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRequest {
    pub id: RecoveryRequestId,
    pub vault_id: VaultId,
    pub created_at: PhysicalTime,
    pub status: RecoveryRequestStatus,
    pub reason: TriggerReason,
    pub time_lock_expires_at: PhysicalTime,
    /// Set once when quorum is first reached; never cleared
    pub quorum_reached_at: Option<PhysicalTime>,
    pub closed_at: Option<PhysicalTime>,
    pub cancellation: Option<CancellationReason>,
}

impl RecoveryRequest {
    /// Whether the time-lock still allows cancellation at `now`.
    pub fn within_time_lock(&self, now: PhysicalTime) -> bool {
        now < self.time_lock_expires_at
    }
}

/// A party's decision on a recovery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

/// Record of one attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub id: AttestationId,
    pub request_id: RecoveryRequestId,
    pub party_id: PartyId,
    /// Role of the party when it attested
    pub role: PartyRole,
    pub decision: Decision,
    pub attested_at: PhysicalTime,
    /// False for audit-only records submitted after quorum
    pub counted: bool,
}
