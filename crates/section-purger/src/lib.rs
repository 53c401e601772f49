//! Section Purger
//!
//! The purger is the entry point the orchestrator talks to. It routes a
//! batch of same-kind invalidations through compilation, request assembly
//! and dispatch, and answers the scheduling questions (cooldown, capacity,
//! time hint) the orchestrator asks between batches.

pub mod error;
pub mod purger;
pub mod runtime;

pub use error::PurgeError;
pub use purger::{Handler, SectionPurger};
pub use runtime::RuntimeMeasurement;
