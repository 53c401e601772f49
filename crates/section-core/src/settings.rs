//! Purger settings
//!
//! One [`PurgerSettings`] record exists per purger instance. Storage and
//! persistence belong to a [`SettingsProvider`]; the purger loads a fresh
//! copy at the start of every call and treats it as read-only.

use http::Method;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::invalidation::InvalidationKind;

/// Lower bound for time hints and for each timeout
pub const MIN_TIME_HINT_SECS: f64 = 0.1;

/// Upper bound for time hints and for the combined timeouts
pub const MAX_TIME_HINT_SECS: f64 = 10.0;

/// Upper bound for the cooldown between batches
pub const MAX_COOLDOWN_SECS: f64 = 3.0;

/// Outbound header, value may contain tokens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderSetting {
    pub field: String,
    pub value: String,
}

impl HeaderSetting {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Settings for a single Section purger instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurgerSettings {
    /// Purger instance identifier
    pub id: String,
    /// Readable name, used as the label when set
    #[serde(default)]
    pub name: String,
    /// Kind this instance was configured for
    #[serde(default = "default_invalidation_type")]
    pub invalidation_type: InvalidationKind,

    /// Hostname of the site being purged, scopes expressions when set
    #[serde(default)]
    pub site_name: String,
    /// Name of the Varnish proxy in the Section application
    #[serde(default = "default_proxy_name")]
    pub proxy_name: String,
    /// Control-plane host
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// `http` or `https`
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Path template placed before the API suffix
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_account")]
    pub account: u64,
    #[serde(default = "default_application")]
    pub application: u64,
    /// Section environment, e.g. Production or Staging
    #[serde(default = "default_environment_name")]
    pub environment_name: String,
    #[serde(default = "default_username")]
    pub username: String,
    /// Reference to the password, never the password itself
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_request_method")]
    pub request_method: String,
    /// Verify TLS certificates (https only)
    #[serde(default = "default_true")]
    pub verify: bool,

    #[serde(default)]
    pub headers: Vec<HeaderSetting>,
    /// Request payload. The API takes everything from the query string, so
    /// a body is never sent; setting one only switches the content type.
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_content_type")]
    pub body_content_type: String,

    /// Measure request runtime instead of deriving the time hint from the
    /// timeouts
    #[serde(default = "default_true")]
    pub runtime_measurement: bool,
    /// Total request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    /// Connect timeout in seconds
    #[serde(default = "default_timeout")]
    pub connect_timeout: f64,
    /// Seconds to wait after a batch before more work is offered
    #[serde(default)]
    pub cooldown_time: f64,
    /// Maximum requests per execution lifetime
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Treat 4xx and 5xx responses as failures
    #[serde(default = "default_true")]
    pub http_errors: bool,
}

impl PurgerSettings {
    /// Settings with every field at its default
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            invalidation_type: default_invalidation_type(),
            site_name: String::new(),
            proxy_name: default_proxy_name(),
            hostname: default_hostname(),
            port: default_port(),
            scheme: default_scheme(),
            path: default_path(),
            account: default_account(),
            application: default_application(),
            environment_name: default_environment_name(),
            username: default_username(),
            password: default_password(),
            request_method: default_request_method(),
            verify: true,
            headers: Vec::new(),
            body: String::new(),
            body_content_type: default_content_type(),
            runtime_measurement: true,
            timeout: default_timeout(),
            connect_timeout: default_timeout(),
            cooldown_time: 0.0,
            max_requests: default_max_requests(),
            http_errors: true,
        }
    }

    /// Site name, or `None` when unset
    pub fn site_name(&self) -> Option<&str> {
        Some(self.site_name.as_str()).filter(|s| !s.is_empty())
    }

    /// Label shown to operators
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            "Section"
        } else {
            &self.name
        }
    }

    /// Worst-case duration of one request in seconds
    pub fn static_time_hint(&self) -> f64 {
        self.connect_timeout + self.timeout
    }

    /// Check every field, reporting all problems at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        let timeouts_too_long = self.static_time_hint() > MAX_TIME_HINT_SECS;
        for (field, value) in [("connect_timeout", self.connect_timeout), ("timeout", self.timeout)] {
            if !(MIN_TIME_HINT_SECS..=MAX_TIME_HINT_SECS).contains(&value) {
                problems.push(format!(
                    "{} must be between {} and {} seconds, got {}",
                    field, MIN_TIME_HINT_SECS, MAX_TIME_HINT_SECS, value
                ));
            } else if timeouts_too_long {
                problems.push(format!(
                    "{}: connect_timeout + timeout must not exceed {} seconds",
                    field, MAX_TIME_HINT_SECS
                ));
            }
        }

        if !(0.0..=MAX_COOLDOWN_SECS).contains(&self.cooldown_time) {
            problems.push(format!(
                "cooldown_time must be between 0 and {} seconds, got {}",
                MAX_COOLDOWN_SECS, self.cooldown_time
            ));
        }
        if self.max_requests == 0 {
            problems.push("max_requests must be at least 1".to_string());
        }
        if self.scheme != "http" && self.scheme != "https" {
            problems.push(format!("scheme must be http or https, got {}", self.scheme));
        }
        if self.port == 0 {
            problems.push("port must not be 0".to_string());
        }
        if self.hostname.trim().is_empty() {
            problems.push("hostname must not be empty".to_string());
        }
        if Method::from_bytes(self.request_method.as_bytes()).is_err() {
            problems.push(format!("request_method is not valid: {}", self.request_method));
        }
        if !self.path.starts_with('/') || !self.path.ends_with('/') {
            problems.push(format!("path must start and end with '/', got {}", self.path));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::InvalidSettings(problems))
        }
    }
}

fn default_invalidation_type() -> InvalidationKind {
    InvalidationKind::Tag
}

fn default_proxy_name() -> String {
    "varnish".to_string()
}

fn default_hostname() -> String {
    "aperture.section.io".to_string()
}

fn default_port() -> u16 {
    443
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_account() -> u64 {
    1
}

fn default_application() -> u64 {
    100
}

fn default_environment_name() -> String {
    "Production".to_string()
}

fn default_username() -> String {
    "username".to_string()
}

fn default_password() -> String {
    "password".to_string()
}

fn default_request_method() -> String {
    "POST".to_string()
}

fn default_content_type() -> String {
    "application/json".to_string()
}

fn default_timeout() -> f64 {
    1.0
}

fn default_max_requests() -> usize {
    250
}

fn default_true() -> bool {
    true
}

/// Trait for providing purger settings
/// This allows settings to live in external storage while the purger
/// only ever sees an immutable snapshot
pub trait SettingsProvider: Send + Sync {
    /// Get the settings for a purger instance
    fn get_settings(&self, id: &str) -> Option<PurgerSettings>;

    /// Store settings, replacing any with the same id
    fn put_settings(&self, settings: PurgerSettings);

    /// Remove the settings of a purger instance
    fn remove_settings(&self, id: &str) -> Option<PurgerSettings>;
}

/// A simple in-memory implementation of SettingsProvider
pub struct InMemorySettingsProvider {
    settings: Arc<RwLock<HashMap<String, PurgerSettings>>>,
}

impl InMemorySettingsProvider {
    pub fn new(settings: Vec<PurgerSettings>) -> Self {
        Self {
            settings: Arc::new(RwLock::new(
                settings.into_iter().map(|s| (s.id.clone(), s)).collect(),
            )),
        }
    }

    /// Ids of all stored purger instances, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.settings.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl SettingsProvider for InMemorySettingsProvider {
    fn get_settings(&self, id: &str) -> Option<PurgerSettings> {
        self.settings.read().get(id).cloned()
    }

    fn put_settings(&self, settings: PurgerSettings) {
        self.settings.write().insert(settings.id.clone(), settings);
    }

    fn remove_settings(&self, id: &str) -> Option<PurgerSettings> {
        self.settings.write().remove(id)
    }
}
