//! Section purger
//!
//! Routes invalidation batches to the handler for their kind and runs
//! every invalidation through the same lifecycle:
//! processing, compile, build request, dispatch, final state.

use section_client::{Dispatcher, RequestBuilder, Transport};
use section_core::{
    ConfigError, ExpressionCompiler, Invalidation, InvalidationKind, PurgerSettings,
    SecretResolver, SettingsProvider, TokenContext, TokenReplacer,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info, warn};

use crate::error::PurgeError;
use crate::runtime::{RuntimeMeasurement, clamp_time_hint};

/// Handler responsible for a kind. Wildcard kinds share the handler of
/// their plain counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Tags,
    Urls,
    Paths,
    Domain,
    Regex,
    Raw,
    Everything,
}

impl Handler {
    pub fn for_kind(kind: InvalidationKind) -> Self {
        match kind {
            InvalidationKind::Tag => Handler::Tags,
            InvalidationKind::Url | InvalidationKind::WildcardUrl => Handler::Urls,
            InvalidationKind::Path | InvalidationKind::WildcardPath => Handler::Paths,
            InvalidationKind::Domain => Handler::Domain,
            InvalidationKind::Regex => Handler::Regex,
            InvalidationKind::Raw => Handler::Raw,
            InvalidationKind::Everything => Handler::Everything,
        }
    }

    /// Short tag used in log lines
    pub fn label(&self) -> &'static str {
        match self {
            Handler::Tags => "TAG",
            Handler::Urls => "URL",
            Handler::Paths => "PATH",
            Handler::Domain => "DOMAIN",
            Handler::Regex => "REGEX",
            Handler::Raw => "RAW",
            Handler::Everything => "EVERYTHING",
        }
    }
}

/// Purger sending ban expressions to the Section control plane
pub struct SectionPurger {
    id: String,
    settings: Arc<dyn SettingsProvider>,
    dispatcher: Dispatcher,
    tokens: Arc<dyn TokenReplacer>,
    secrets: Arc<dyn SecretResolver>,
    runtime: RuntimeMeasurement,
    requests_sent: AtomicUsize,
}

impl SectionPurger {
    pub fn new(
        id: impl Into<String>,
        settings: Arc<dyn SettingsProvider>,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenReplacer>,
        secrets: Arc<dyn SecretResolver>,
    ) -> Self {
        Self {
            id: id.into(),
            settings,
            dispatcher: Dispatcher::new(transport),
            tokens,
            secrets,
            runtime: RuntimeMeasurement::new(),
            requests_sent: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Handler a kind is routed to
    pub fn route(&self, kind: InvalidationKind) -> Handler {
        Handler::for_kind(kind)
    }

    /// Kinds this purger accepts
    pub fn supported_kinds(&self) -> &'static [InvalidationKind] {
        &InvalidationKind::ALL
    }

    fn load_settings(&self) -> Result<PurgerSettings, ConfigError> {
        self.settings
            .get_settings(&self.id)
            .ok_or_else(|| ConfigError::MissingSettings(self.id.clone()))
    }

    /// Invalidate a batch given its kind by name
    pub async fn invalidate_named(
        &self,
        kind: &str,
        invalidations: &mut [Invalidation],
    ) -> Result<(), PurgeError> {
        let kind: InvalidationKind = kind
            .parse()
            .map_err(|_| PurgeError::UnsupportedKind(kind.to_string()))?;
        self.invalidate(kind, invalidations).await
    }

    /// Invalidate a batch of invalidations that all share `kind`.
    ///
    /// Invalidations are dispatched one after another in the order given.
    /// A failing invalidation never stops the batch, even when its own
    /// expression makes the request unbuildable. A configuration problem
    /// does, and is returned before any invalidation is touched.
    pub async fn invalidate(
        &self,
        kind: InvalidationKind,
        invalidations: &mut [Invalidation],
    ) -> Result<(), PurgeError> {
        if let Some(other) = invalidations.iter().find(|i| i.kind() != kind) {
            return Err(PurgeError::KindMismatch {
                expected: kind,
                found: other.kind(),
                id: other.id(),
            });
        }
        if invalidations.is_empty() {
            return Ok(());
        }

        let settings = self.load_settings()?;
        settings.validate()?;

        let builder = RequestBuilder::new(&settings, self.tokens.as_ref(), self.secrets.as_ref());
        builder.check_headers()?;
        let auth = builder.credentials()?;
        let compiler = ExpressionCompiler::new(settings.site_name());
        let handler = self.route(kind);

        info!(
            purger = %self.id,
            "Invalidating {} {} invalidation(s)",
            invalidations.len(),
            kind
        );

        let started = self.runtime.start();
        for invalidation in invalidations.iter_mut() {
            if let Err(e) = invalidation.start_processing() {
                warn!(purger = %self.id, "Skipping invalidation: {}", e);
                continue;
            }

            let expression = match compiler.compile(kind, invalidation.expression()) {
                Ok(expression) => expression,
                Err(e) => {
                    invalidation.fail();
                    error!(
                        purger = %self.id,
                        invalidation = invalidation.id(),
                        "[{}] {}",
                        handler.label(),
                        e
                    );
                    continue;
                }
            };
            debug!(
                "[{}] expression `{}` was replaced to be: `{}`",
                handler.label(),
                invalidation.expression(),
                expression
            );

            // Only values carrying this invalidation's tokens can fail here
            let request = match builder.build(&TokenContext::new(invalidation), &auth) {
                Ok(request) => request,
                Err(e) => {
                    invalidation.fail();
                    error!(
                        purger = %self.id,
                        invalidation = invalidation.id(),
                        "[{}] {}",
                        handler.label(),
                        e
                    );
                    continue;
                }
            };

            self.requests_sent.fetch_add(1, Ordering::Relaxed);
            self.dispatcher.send(invalidation, &request, &expression).await;
        }

        if settings.runtime_measurement {
            self.runtime.stop(started, invalidations);
        }

        info!(purger = %self.id, "Finished {} batch", kind);
        Ok(())
    }

    /// Seconds the orchestrator should wait after a non-empty batch
    pub fn cooldown_time(&self) -> Result<f64, PurgeError> {
        Ok(self.load_settings()?.cooldown_time)
    }

    /// Requests this instance may still be offered in the current
    /// execution lifetime. Advisory only, nothing is throttled here.
    pub fn capacity_hint(&self) -> Result<usize, PurgeError> {
        let settings = self.load_settings()?;
        Ok(settings.max_requests.saturating_sub(self.requests_sent()))
    }

    /// Estimated seconds per invalidation
    pub fn time_hint(&self) -> Result<f64, PurgeError> {
        let settings = self.load_settings()?;
        let fallback = settings.static_time_hint();
        if settings.runtime_measurement {
            Ok(self.runtime.time_hint(fallback))
        } else {
            Ok(clamp_time_hint(fallback))
        }
    }

    pub fn has_runtime_measurement(&self) -> Result<bool, PurgeError> {
        Ok(self.load_settings()?.runtime_measurement)
    }

    pub fn label(&self) -> Result<String, PurgeError> {
        Ok(self.load_settings()?.label().to_string())
    }

    /// Requests dispatched so far
    pub fn requests_sent(&self) -> usize {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// Remove this instance's settings from the provider
    pub fn delete(&self) -> Option<PurgerSettings> {
        info!(purger = %self.id, "Deleting purger settings");
        self.settings.remove_settings(&self.id)
    }
}
