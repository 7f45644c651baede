//! Error taxonomy for proxy sessions.
//!
//! Every variant is session-local. The only process-fatal failures are the
//! startup errors defined next to their subsystems (`ConfigError`,
//! `ListenerError`, `BlockListError`).

use std::time::Duration;
use thiserror::Error;

use crate::http::response::ProxyResponse;

/// Errors that can end a single proxy session.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Request head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },

    #[error("Request head not received within {0:?}")]
    HeadTimeout(Duration),

    #[error("Host blocked by policy: {host}")]
    PolicyBlocked { host: String },

    #[error("Origin {host}:{port} unreachable: {source}")]
    OriginUnreachable {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Connect to origin {host}:{port} timed out after {timeout:?}")]
    OriginTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    #[error("Peer idle for longer than {0:?}")]
    IoTimeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// The response the proxy owes the client for this error, if the client
    /// has not yet received anything.
    ///
    /// `None` means the connection is closed without a response.
    pub fn response(&self) -> Option<ProxyResponse> {
        match self {
            ProxyError::MalformedRequest(_) => Some(ProxyResponse::BadRequest),
            ProxyError::HeadTooLarge { .. } => Some(ProxyResponse::HeaderFieldsTooLarge),
            ProxyError::HeadTimeout(_) => Some(ProxyResponse::RequestTimeout),
            ProxyError::PolicyBlocked { .. } => Some(ProxyResponse::Forbidden),
            ProxyError::OriginUnreachable { .. } => Some(ProxyResponse::BadGateway),
            ProxyError::OriginTimeout { .. } => Some(ProxyResponse::GatewayTimeout),
            ProxyError::IoTimeout(_) | ProxyError::Io(_) => None,
        }
    }

    /// Whether the failure happened while talking to an origin the policy
    /// had already allowed.
    pub fn is_origin_failure(&self) -> bool {
        matches!(
            self,
            ProxyError::OriginUnreachable { .. } | ProxyError::OriginTimeout { .. }
        )
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
