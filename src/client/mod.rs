//! Client runtime: session jar, request interceptor, and in-app route guard.

mod guard;
mod interceptor;
mod jar;
mod transport;

use axum::http::StatusCode;

use crate::envelope::EnvelopeError;

pub use guard::{AppGuard, MemoryNavigator, Navigator};
pub use interceptor::{ApiClient, LOGIN_ENDPOINT, LOGOUT_ENDPOINT, REFRESH_ENDPOINT};
pub use jar::{Epoch, SessionJar, SetCookie};
pub use transport::{HttpTransport, InboundResponse, OutboundRequest, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered 401. The session has been cleared.
    #[error("not authenticated: {0}")]
    Unauthenticated(String),
    /// The session was cleared or replaced while the request was in flight.
    #[error("session changed while the request was in flight")]
    SessionSuperseded,
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: StatusCode, message: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}
