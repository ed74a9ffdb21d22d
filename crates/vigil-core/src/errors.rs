//! Unified error system for the Vigil engine
//!
//! Business-rule failures are distinct variants so callers can match on them.
//! Infrastructure failures (storage, clock) carry a message and are treated as
//! unexpected by callers.

use serde::{Deserialize, Serialize};

/// Unified error type for all Vigil operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum VigilError {
    /// Fragments are corrupt, mismatched, from another split, or too few.
    ///
    /// Deliberately carries no detail about which fragment failed.
    #[error("Invalid fragment set")]
    InvalidFragmentSet,

    /// The vault is in a recovery and rejects mutations
    #[error("Vault is locked while recovery is in progress")]
    VaultLocked,

    /// The requested transition is not allowed from the current state
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// State the record was in
        from: String,
        /// State the caller attempted to reach
        to: String,
    },

    /// The time-lock elapsed, recovery can no longer be cancelled
    #[error("Cancellation window closed")]
    CancellationWindowClosed,

    /// Removing the guardian would drop below the scheme minimum
    #[error("At least {minimum} active guardians required")]
    MinimumGuardiansRequired {
        /// Minimum number of active guardians for the scheme
        minimum: usize,
    },

    /// Adding the guardian would exceed the scheme maximum
    #[error("Guardian cap of {maximum} exceeded")]
    GuardianCapExceeded {
        /// Maximum number of active guardians for the scheme
        maximum: usize,
    },

    /// A party with the same role and email already exists in the vault
    #[error("Duplicate party")]
    DuplicateParty,

    /// Not enough approvals have been recorded
    #[error("Quorum not reached")]
    QuorumNotReached,

    /// Quorum reached but the time-lock has not expired yet
    #[error("Recovery not eligible until time-lock expires")]
    RecoveryNotEligible,

    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Record not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Caller is not allowed to perform the operation
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// Error message describing the permission issue
        message: String,
    },

    /// Storage operation failed
    #[error("Storage error: {message}")]
    Storage {
        /// Error message describing the storage failure
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl VigilError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a permission denied error
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an invalid state transition error
    pub fn transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Whether the error stems from infrastructure rather than a business rule
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Internal { .. })
    }
}

/// Standard Result type for Vigil operations
pub type VigilResult<T> = std::result::Result<T, VigilError>;

impl From<std::io::Error> for VigilError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(err.to_string()),
            _ => Self::storage(err.to_string()),
        }
    }
}
