//! Control-plane request assembly
//!
//! Builds the target URI and request options from purger settings. Nothing
//! here touches the network; every failure is a configuration problem.

use reqwest::Method;
use reqwest::header::{
    ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT as USER_AGENT_HEADER,
};
use section_core::{ConfigError, PurgerSettings, SecretResolver, TokenContext, TokenReplacer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// User agent sent with every request
pub const USER_AGENT: &str = "Section Purge module for Rust";

const JSON: &str = "application/json";

/// HTTP basic-auth credentials
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A request ready to receive a ban expression
#[derive(Debug, Clone)]
pub struct PurgeRequest {
    /// Endpoint URI ending in `banExpression=`
    pub uri: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub auth: BasicAuth,
    pub connect_timeout: Duration,
    pub timeout: Duration,
    /// TLS verification, only set for https targets
    pub verify_tls: Option<bool>,
    /// Treat 4xx and 5xx responses as failures
    pub http_errors: bool,
}

impl PurgeRequest {
    /// Diagnostic view of the request without credentials
    pub fn diagnostics(&self, target: &str) -> RequestDiagnostics {
        RequestDiagnostics {
            uri: target.to_string(),
            method: self.method.to_string(),
            options: RequestOptions {
                connect_timeout: self.connect_timeout.as_secs_f64(),
                timeout: self.timeout.as_secs_f64(),
                verify: self.verify_tls,
                http_errors: self.http_errors,
            },
            headers: self
                .headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
        }
    }
}

/// What gets logged when a request fails
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestDiagnostics {
    pub uri: String,
    pub method: String,
    pub options: RequestOptions,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestOptions {
    pub connect_timeout: f64,
    pub timeout: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<bool>,
    pub http_errors: bool,
}

/// Assembles [`PurgeRequest`]s from settings
pub struct RequestBuilder<'a> {
    settings: &'a PurgerSettings,
    tokens: &'a dyn TokenReplacer,
    secrets: &'a dyn SecretResolver,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(
        settings: &'a PurgerSettings,
        tokens: &'a dyn TokenReplacer,
        secrets: &'a dyn SecretResolver,
    ) -> Self {
        Self {
            settings,
            tokens,
            secrets,
        }
    }

    /// Resolve the configured credentials
    pub fn credentials(&self) -> Result<BasicAuth, ConfigError> {
        let password = self.secrets.resolve_secret(&self.settings.password)?;
        Ok(BasicAuth::new(self.settings.username.clone(), password))
    }

    /// Endpoint URI, ready for the encoded ban expression to be appended
    pub fn uri(&self, context: &TokenContext<'_>) -> String {
        let s = self.settings;
        format!(
            "{}://{}:{}{}api/v1/account/{}/application/{}/environment/{}/proxy/{}/state?banExpression=",
            s.scheme,
            s.hostname,
            s.port,
            self.tokens.replace(&s.path, context),
            s.account,
            s.application,
            s.environment_name,
            s.proxy_name
        )
    }

    /// Check the header settings that do not depend on the invalidation.
    ///
    /// A failure here is a configuration problem for the whole batch.
    pub fn check_headers(&self) -> Result<(), ConfigError> {
        if !self.settings.body.is_empty() {
            header_value("content-type", &self.settings.body_content_type)?;
        }
        for header in &self.settings.headers {
            header_name(&header.field)?;
            if !header.value.contains('[') {
                header_value(&header.field.to_lowercase(), &header.value)?;
            }
        }
        Ok(())
    }

    /// Outbound headers.
    ///
    /// Configured headers are keyed by their lower-cased name so a later
    /// entry replaces an earlier one regardless of case.
    pub fn headers(&self, context: &TokenContext<'_>) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        headers.insert(USER_AGENT_HEADER, HeaderValue::from_static(USER_AGENT));

        if !self.settings.body.is_empty() {
            headers.insert(
                CONTENT_TYPE,
                header_value("content-type", &self.settings.body_content_type)?,
            );
        }

        for header in &self.settings.headers {
            let name = header_name(&header.field)?;
            let value = self.tokens.replace(&header.value, context);
            let value = header_value(name.as_str(), &value)?;
            headers.insert(name, value);
        }

        Ok(headers)
    }

    /// Build the complete request for one invalidation
    pub fn build(
        &self,
        context: &TokenContext<'_>,
        auth: &BasicAuth,
    ) -> Result<PurgeRequest, ConfigError> {
        let s = self.settings;
        let method = Method::from_bytes(s.request_method.as_bytes())
            .map_err(|_| ConfigError::InvalidMethod(s.request_method.clone()))?;

        Ok(PurgeRequest {
            uri: self.uri(context),
            method,
            headers: self.headers(context)?,
            auth: auth.clone(),
            connect_timeout: seconds("connect_timeout", s.connect_timeout)?,
            timeout: seconds("timeout", s.timeout)?,
            verify_tls: (s.scheme == "https").then_some(s.verify),
            http_errors: s.http_errors,
        })
    }
}

fn header_name(field: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(field.to_lowercase().as_bytes()).map_err(|e| ConfigError::InvalidHeader {
        name: field.to_string(),
        reason: e.to_string(),
    })
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn seconds(field: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| ConfigError::InvalidSettings(vec![format!("{}: {}", field, e)]))
}
