//! Fragment scheme
//!
//! A scheme names both the reconstruction threshold `K` and the distribution
//! `N`. The distribution doubles as the minimum number of active guardians a
//! vault must keep; the maximum is `max(N, GUARDIAN_CEILING)`.

use crate::errors::{VigilError, VigilResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound on active guardians for schemes distributing fewer fragments.
pub const GUARDIAN_CEILING: u8 = 5;

/// A validated `K-of-N` threshold scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scheme {
    threshold: u8,
    distribution: u8,
}

impl Scheme {
    /// Any two of three guardians reconstruct.
    pub const TWO_OF_THREE: Scheme = Scheme {
        threshold: 2,
        distribution: 3,
    };

    /// Any three of five guardians reconstruct.
    pub const THREE_OF_FIVE: Scheme = Scheme {
        threshold: 3,
        distribution: 5,
    };

    /// Create a scheme, rejecting thresholds below two or above the distribution.
    pub fn new(threshold: u8, distribution: u8) -> VigilResult<Self> {
        if threshold < 2 {
            return Err(VigilError::invalid(format!(
                "Threshold {threshold} must be at least 2"
            )));
        }
        if threshold > distribution {
            return Err(VigilError::invalid(format!(
                "Threshold {threshold} cannot exceed distribution {distribution}"
            )));
        }
        Ok(Self {
            threshold,
            distribution,
        })
    }

    /// Number of fragments required to reconstruct (`K`).
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Number of fragments issued at setup (`N`).
    pub fn distribution(&self) -> u8 {
        self.distribution
    }

    /// Fewest active guardians the vault may keep.
    pub fn min_guardians(&self) -> usize {
        usize::from(self.distribution)
    }

    /// Most active guardians the vault may hold.
    pub fn max_guardians(&self) -> usize {
        usize::from(self.distribution.max(GUARDIAN_CEILING))
    }

    /// Highest fragment index a share of this scheme may carry.
    pub fn max_index(&self) -> u8 {
        self.distribution.max(GUARDIAN_CEILING)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-of-{}", self.threshold, self.distribution)
    }
}

impl FromStr for Scheme {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (threshold, distribution) = s
            .trim()
            .split_once("-of-")
            .ok_or_else(|| VigilError::invalid(format!("Malformed scheme '{s}'")))?;
        let threshold = threshold
            .parse::<u8>()
            .map_err(|_| VigilError::invalid(format!("Malformed threshold in '{s}'")))?;
        let distribution = distribution
            .parse::<u8>()
            .map_err(|_| VigilError::invalid(format!("Malformed distribution in '{s}'")))?;
        Self::new(threshold, distribution)
    }
}

impl TryFrom<String> for Scheme {
    type Error = VigilError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scheme> for String {
    fn from(scheme: Scheme) -> Self {
        scheme.to_string()
    }
}
