//! Purger error types
//!
//! Only batch-fatal conditions surface here. Per-invalidation failures end
//! up in the invalidation state and the log.

use section_core::{ConfigError, InvalidationKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PurgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalidation {id} is {found}, batch was offered as {expected}")]
    KindMismatch {
        expected: InvalidationKind,
        found: InvalidationKind,
        id: u64,
    },

    #[error("Unsupported invalidation kind: {0}")]
    UnsupportedKind(String),
}
