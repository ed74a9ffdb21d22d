//! Record identifiers
//!
//! Every durable record is keyed by a UUID wrapped in its own newtype so a
//! `PartyId` can never be passed where a `VaultId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from a UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Raw UUID bytes
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_identifier!(
    /// Identifier of a protected vault
    VaultId
);

uuid_identifier!(
    /// Identifier of the vault owner (issued by the surrounding identity system)
    OwnerId
);

uuid_identifier!(
    /// Identifier of a guardian, beneficiary, or attestor
    PartyId
);

uuid_identifier!(
    /// Identifier of a sealed fragment
    FragmentId
);

uuid_identifier!(
    /// Identifier of a check-in record
    CheckInId
);

uuid_identifier!(
    /// Identifier of a recovery request
    RecoveryRequestId
);

uuid_identifier!(
    /// Identifier of an attestation record
    AttestationId
);
