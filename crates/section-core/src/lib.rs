//! Section Purge Core
//!
//! This crate provides the domain model shared by the purger crates:
//! invalidations and their lifecycle, the ban-expression compiler,
//! purger settings, and the collaborator traits for token substitution
//! and secret resolution.

pub mod compiler;
pub mod error;
pub mod hash;
pub mod invalidation;
pub mod secrets;
pub mod settings;
pub mod tokens;

pub use compiler::{BanExpression, ExpressionCompiler};
pub use error::{CompileError, ConfigError, SecretError, StateError};
pub use invalidation::{Invalidation, InvalidationKind, InvalidationState, ParseKindError};
pub use secrets::{EnvSecrets, SecretResolver, StaticSecrets};
pub use settings::{
    HeaderSetting, InMemorySettingsProvider, PurgerSettings, SettingsProvider,
    MAX_TIME_HINT_SECS, MIN_TIME_HINT_SECS,
};
pub use tokens::{InvalidationTokens, TokenContext, TokenReplacer};
