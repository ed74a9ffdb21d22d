//! # Vigil Core - Foundation Layer
//!
//! Shared vocabulary for the Vigil vault recovery engine.
//!
//! ## What Belongs Here
//!
//! - Record identifiers (`VaultId`, `PartyId`, ...)
//! - The unified error type and its result alias
//! - Physical time effects (wall clock and a manually driven clock)
//! - The validated `K-of-N` fragment scheme
//! - Engine configuration with defaults and validation
//!
//! ## What Does NOT Belong Here
//!
//! - Secret sharing, storage, or recovery workflow logic (belong in vigil-recovery)
//! - Command-line parsing or logging setup (belong in vigil-cli)

#![forbid(unsafe_code)]

/// Engine configuration
pub mod config;

/// Unified error handling
pub mod errors;

/// Record identifiers
pub mod identifiers;

/// Fragment scheme (threshold and distribution)
pub mod scheme;

/// Physical time effects
pub mod time;

pub use config::EngineConfig;
pub use errors::{VigilError, VigilResult};
pub use identifiers::{
    AttestationId, CheckInId, FragmentId, OwnerId, PartyId, RecoveryRequestId, VaultId,
};
pub use scheme::Scheme;
pub use time::{ManualClock, PhysicalTime, PhysicalTimeEffects, SystemClock, TimeError};
