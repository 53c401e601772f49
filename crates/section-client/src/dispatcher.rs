//! Ban expression delivery
//!
//! The dispatcher makes exactly one attempt per invalidation and converts
//! whatever happens into the invalidation's final state plus a log entry.
//! Retrying is left to the orchestrator, which may offer a failed
//! invalidation again on a later cycle.

use section_core::{BanExpression, Invalidation};
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::TransportError;
use crate::request::PurgeRequest;
use crate::transport::Transport;

/// Classification of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Succeeded,
    /// The control plane could not be reached
    ConnectionFailed,
    /// Reached, but the attempt still counts as a failure
    Failed,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Succeeded => "succeeded",
            DispatchOutcome::ConnectionFailed => "connection_failed",
            DispatchOutcome::Failed => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Succeeded)
    }
}

/// Delivers compiled ban expressions
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send `expression` for an invalidation that is being processed.
    ///
    /// Leaves the invalidation either succeeded or failed.
    pub async fn send(
        &self,
        invalidation: &mut Invalidation,
        request: &PurgeRequest,
        expression: &BanExpression,
    ) -> DispatchOutcome {
        let target = format!("{}{}", request.uri, expression.url_encoded());

        let outcome = match self.transport.execute(&target, request).await {
            Ok(status)
                if request.http_errors && (status.is_client_error() || status.is_server_error()) =>
            {
                report_failure(
                    invalidation,
                    &target,
                    request,
                    &format!("Control plane responded with {}", status),
                );
                DispatchOutcome::Failed
            }
            Ok(status) => {
                debug!(
                    invalidation = invalidation.id(),
                    "Ban expression accepted with {}: {}", status, expression
                );
                DispatchOutcome::Succeeded
            }
            Err(TransportError::Connect(message)) => {
                error!(
                    invalidation = invalidation.id(),
                    "http request for {} responded with {}", target, message
                );
                DispatchOutcome::ConnectionFailed
            }
            Err(e) => {
                report_failure(invalidation, &target, request, &e.to_string());
                DispatchOutcome::Failed
            }
        };

        if outcome.is_success() {
            invalidation.succeed();
        } else {
            invalidation.fail();
        }

        metrics::counter!("section_purge_requests_total", "outcome" => outcome.as_str())
            .increment(1);

        outcome
    }
}

/// Log a failure together with everything about the request except the
/// credentials
fn report_failure(invalidation: &Invalidation, target: &str, request: &PurgeRequest, message: &str) {
    let diagnostics = request.diagnostics(target);
    let data = serde_json::to_string(&diagnostics).unwrap_or_else(|_| format!("{:?}", diagnostics));
    error!(
        invalidation = invalidation.id(),
        "{} data: {}", message, data
    );
}
