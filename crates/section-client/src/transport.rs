//! HTTP transport

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::TransportError;
use crate::request::PurgeRequest;

/// Sends one request to the control plane.
///
/// Implementations report transport-level failures only; the status code of
/// a response that did arrive is returned as-is, whatever its class.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, target: &str, request: &PurgeRequest) -> Result<StatusCode, TransportError>;
}

/// Client settings that can only be applied when a client is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ClientKey {
    connect_timeout: Duration,
    accept_invalid_certs: bool,
}

/// reqwest-backed transport.
///
/// Keeps one client per distinct connect timeout and TLS setting so that
/// connections are pooled across invalidations and batches.
#[derive(Default)]
pub struct ReqwestTransport {
    clients: Mutex<HashMap<ClientKey, Client>>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_for(&self, request: &PurgeRequest) -> Result<Client, TransportError> {
        let key = ClientKey {
            connect_timeout: request.connect_timeout,
            accept_invalid_certs: request.verify_tls == Some(false),
        };

        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder().connect_timeout(key.connect_timeout);
        if key.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build()?;

        debug!(
            "Created control-plane client (connect_timeout: {:?}, verify_tls: {})",
            key.connect_timeout, !key.accept_invalid_certs
        );
        clients.insert(key, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, target: &str, request: &PurgeRequest) -> Result<StatusCode, TransportError> {
        let client = self.client_for(request)?;

        let response = client
            .request(request.method.clone(), target)
            .headers(request.headers.clone())
            .basic_auth(&request.auth.username, Some(request.auth.password()))
            .timeout(request.timeout)
            .send()
            .await?;

        let status = response.status();
        // The body carries nothing we use, drain it so the connection is reusable
        response.bytes().await?;

        Ok(status)
    }
}
