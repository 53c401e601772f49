//! Secret resolution
//!
//! Purger settings never hold the control-plane password itself, only a
//! reference that a [`SecretResolver`] turns into the value when a batch
//! starts.

use std::collections::HashMap;

use crate::error::SecretError;

/// Resolves a secret reference to its value
pub trait SecretResolver: Send + Sync {
    fn resolve_secret(&self, reference: &str) -> Result<String, SecretError>;
}

/// Secrets held in memory, keyed by reference
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn with(mut self, reference: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(reference.into(), value.into());
        self
    }
}

impl SecretResolver for StaticSecrets {
    fn resolve_secret(&self, reference: &str) -> Result<String, SecretError> {
        self.values
            .get(reference)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(reference.to_string()))
    }
}

/// Secrets read from environment variables.
///
/// The reference `section-password` with prefix `SECTION_SECRET_` is read
/// from `SECTION_SECRET_SECTION_PASSWORD`.
#[derive(Debug, Clone)]
pub struct EnvSecrets {
    prefix: String,
}

impl EnvSecrets {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn variable_name(&self, reference: &str) -> String {
        let normalized: String = reference
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", self.prefix, normalized)
    }
}

impl SecretResolver for EnvSecrets {
    fn resolve_secret(&self, reference: &str) -> Result<String, SecretError> {
        let name = self.variable_name(reference);
        match std::env::var(&name) {
            Ok(value) => Ok(value),
            Err(std::env::VarError::NotPresent) => Err(SecretError::NotFound(reference.to_string())),
            Err(e) => Err(SecretError::Unavailable {
                reference: reference.to_string(),
                reason: format!("{}: {}", name, e),
            }),
        }
    }
}
