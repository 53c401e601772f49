//! Core error types

use thiserror::Error;

use crate::invalidation::InvalidationState;

/// Failure to turn an invalidation into a ban expression.
///
/// Only ever fatal to the invalidation it was raised for.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Secret {reference} unavailable: {reason}")]
    Unavailable { reference: String, reason: String },
}

/// Errors that make a purger instance unusable for the whole batch
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No settings stored for purger: {0}")]
    MissingSettings(String),

    #[error("Invalid settings: {}", .0.join("; "))]
    InvalidSettings(Vec<String>),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Invalid request method: {0}")]
    InvalidMethod(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalidation {id} already finished as {state}")]
    AlreadyFinished { id: u64, state: InvalidationState },
}
