//! Section Control Plane Client
//!
//! This crate turns purger settings into concrete control-plane requests
//! and delivers compiled ban expressions, classifying each attempt as a
//! success, a connection failure or any other failure.

pub mod dispatcher;
pub mod error;
pub mod request;
pub mod transport;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::TransportError;
pub use request::{BasicAuth, PurgeRequest, RequestBuilder, RequestDiagnostics, USER_AGENT};
pub use transport::{ReqwestTransport, Transport};
