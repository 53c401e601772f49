//! Client error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The control plane could not be reached (DNS, TCP, TLS)
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let message = error_chain(&e);
        if e.is_connect() {
            TransportError::Connect(message)
        } else if e.is_timeout() {
            TransportError::Timeout(message)
        } else {
            TransportError::Other(message)
        }
    }
}

/// Render an error with all of its sources, reqwest keeps the useful part
/// (e.g. "Connection refused") a few levels down.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
