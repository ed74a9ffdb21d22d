//! Vigil Testing Infrastructure
//!
//! Engine builders on a manual clock and in-memory store, vault fixtures with
//! a full roster, and sinks that capture facts and delivered secrets.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! ```rust,no_run
//! use vigil_testkit::*;
//!
//! let harness = EngineBuilder::new().build();
//! let vault = harness.vault(vigil_core::Scheme::TWO_OF_THREE, 3, 0, 1);
//! harness.clock.advance_days(91);
//! harness.engine.evaluate_liveness(vault.vault_id).unwrap();
//! ```

pub mod fixtures;
pub mod sinks;

pub use fixtures::*;
pub use sinks::*;
