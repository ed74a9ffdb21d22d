//! Physical time effects.
//!
//! Engine operations read the clock once at their start and evaluate every
//! deadline against that single reading. The trait is synchronous: nothing in
//! the engine waits on time, deadlines are compared lazily.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in one second.
pub const SECOND_MS: u64 = 1_000;
/// Milliseconds in one hour.
pub const HOUR_MS: u64 = 60 * 60 * SECOND_MS;
/// Milliseconds in one day.
pub const DAY_MS: u64 = 24 * HOUR_MS;

/// Error type for time operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum TimeError {
    #[error("Clock unavailable: {reason}")]
    ClockUnavailable { reason: String },
}

impl From<TimeError> for crate::VigilError {
    fn from(err: TimeError) -> Self {
        crate::VigilError::internal(format!("Time error: {err}"))
    }
}

/// Wall-clock instant in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhysicalTime {
    pub ts_ms: u64,
}

impl PhysicalTime {
    /// Create from milliseconds since the epoch.
    pub const fn from_ms(ts_ms: u64) -> Self {
        Self { ts_ms }
    }

    /// Instant `ms` later, saturating at the end of time.
    pub fn saturating_add_ms(self, ms: u64) -> Self {
        Self {
            ts_ms: self.ts_ms.saturating_add(ms),
        }
    }

    /// Instant `ms` earlier, saturating at the epoch.
    pub fn saturating_sub_ms(self, ms: u64) -> Self {
        Self {
            ts_ms: self.ts_ms.saturating_sub(ms),
        }
    }

    /// Milliseconds from `self` until `later` (zero if `later` is not after `self`).
    pub fn ms_until(self, later: PhysicalTime) -> u64 {
        later.ts_ms.saturating_sub(self.ts_ms)
    }
}

impl fmt::Display for PhysicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.ts_ms)
    }
}

/// Source of wall-clock time.
pub trait PhysicalTimeEffects: Send + Sync {
    fn physical_time(&self) -> Result<PhysicalTime, TimeError>;
}

impl<T: PhysicalTimeEffects + ?Sized> PhysicalTimeEffects for std::sync::Arc<T> {
    fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        (**self).physical_time()
    }
}

impl<T: PhysicalTimeEffects + ?Sized> PhysicalTimeEffects for &T {
    fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        (**self).physical_time()
    }
}

/// Operating system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl PhysicalTimeEffects for SystemClock {
    fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TimeError::ClockUnavailable {
                reason: e.to_string(),
            })?;
        let ts_ms = u64::try_from(elapsed.as_millis()).map_err(|_| TimeError::ClockUnavailable {
            reason: "timestamp overflow".to_string(),
        })?;
        Ok(PhysicalTime { ts_ms })
    }
}

/// Clock that only moves when told to; used by simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: PhysicalTime) -> Self {
        Self {
            now_ms: AtomicU64::new(start.ts_ms),
        }
    }

    /// Move the clock forward by `ms`.
    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Move the clock forward by whole days.
    pub fn advance_days(&self, days: u64) {
        self.advance_ms(days * DAY_MS);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, at: PhysicalTime) {
        self.now_ms.store(at.ts_ms, Ordering::SeqCst);
    }

    /// Current reading without going through the effect trait.
    pub fn now(&self) -> PhysicalTime {
        PhysicalTime {
            ts_ms: self.now_ms.load(Ordering::SeqCst),
        }
    }
}

impl PhysicalTimeEffects for ManualClock {
    fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        Ok(self.now())
    }
}
