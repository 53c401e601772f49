//! Shared fixtures: a stub control plane and log capture

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use section_core::{InMemorySettingsProvider, InvalidationTokens, PurgerSettings, StaticSecrets};
use section_client::ReqwestTransport;
use section_purger::SectionPurger;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

pub const PURGER_ID: &str = "section";

/// A request as seen by the stub control plane
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub ban_expression: Option<String>,
    pub authorization: Option<String>,
    pub headers: HeaderMap,
}

#[derive(Clone)]
struct StubState {
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    status: StatusCode,
}

pub struct ControlPlane {
    pub addr: SocketAddr,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ControlPlane {
    /// Start a control plane answering every request with `status`
    pub async fn start(status: StatusCode) -> Self {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            recorded: recorded.clone(),
            status,
        };
        let app = Router::new().fallback(record).with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, recorded }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn ban_expressions(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|r| r.ban_expression)
            .collect()
    }

    /// Settings pointing at this control plane
    pub fn settings(&self) -> PurgerSettings {
        settings_for(self.addr)
    }
}

async fn record(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> StatusCode {
    let ban_expression = uri.query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "banExpression")
            .map(|(_, value)| value.into_owned())
    });

    state.recorded.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        ban_expression,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        headers,
    });

    state.status
}

pub fn settings_for(addr: SocketAddr) -> PurgerSettings {
    PurgerSettings {
        scheme: "http".to_string(),
        hostname: addr.ip().to_string(),
        port: addr.port(),
        ..PurgerSettings::new(PURGER_ID)
    }
}

pub fn secrets() -> StaticSecrets {
    StaticSecrets::default().with("password", "hunter2")
}

/// Purger wired to the in-process collaborators
pub fn purger_with(settings: PurgerSettings, secrets: StaticSecrets) -> (SectionPurger, Arc<InMemorySettingsProvider>) {
    let provider = Arc::new(InMemorySettingsProvider::new(vec![settings]));
    let purger = SectionPurger::new(
        PURGER_ID,
        provider.clone(),
        Arc::new(ReqwestTransport::new()),
        Arc::new(InvalidationTokens),
        Arc::new(secrets),
    );
    (purger, provider)
}

pub fn purger(settings: PurgerSettings) -> SectionPurger {
    purger_with(settings, secrets()).0
}

#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Capture log output on the current thread until the guard is dropped
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}
