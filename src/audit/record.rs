//! One audit record per proxy session.

use chrono::{DateTime, Local};
use std::net::SocketAddr;

use crate::http::HttpRequestHead;
use crate::policy::PolicyDecision;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Kind of proxy transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Http,
    Connect,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Http => "HTTP",
            RequestKind::Connect => "CONNECT",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request line forwarded to the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedLine {
    pub method: String,
    pub target: String,
    pub version: String,
}

/// Audit record for a single session.
///
/// Built when the session dispatches, completed with the transfer result
/// when it ends, then handed to an [`AuditLog`](super::AuditLog) by value.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    timestamp: DateTime<Local>,
    client: SocketAddr,
    host: Option<String>,
    port: Option<u16>,
    kind: RequestKind,
    decision: PolicyDecision,
    forwarded: Option<ForwardedLine>,
    bytes: Option<u64>,
    failure: Option<String>,
}

impl AuditRecord {
    fn new(client: SocketAddr, kind: RequestKind, decision: PolicyDecision) -> Self {
        Self {
            timestamp: Local::now(),
            client,
            host: None,
            port: None,
            kind,
            decision,
            forwarded: None,
            bytes: None,
            failure: None,
        }
    }

    /// A request that never produced a usable head.
    pub fn malformed(client: SocketAddr, reason: impl Into<String>) -> Self {
        let mut record = Self::empty(client);
        record.failure = Some(reason.into());
        record
    }

    /// A client that closed before sending any request. Not a failure.
    pub fn empty(client: SocketAddr) -> Self {
        Self::new(client, RequestKind::Http, PolicyDecision::Blocked)
    }

    /// A request denied by policy.
    pub fn blocked(client: SocketAddr, head: &HttpRequestHead) -> Self {
        let kind = if head.is_connect() {
            RequestKind::Connect
        } else {
            RequestKind::Http
        };
        let mut record = Self::new(client, kind, PolicyDecision::Blocked);
        record.host = Some(head.host().to_string());
        record.port = Some(head.port());
        record
    }

    /// An allowed plain HTTP request, recorded with its origin-form line.
    pub fn forwarded(client: SocketAddr, head: &HttpRequestHead) -> Self {
        let mut record = Self::new(client, RequestKind::Http, PolicyDecision::Allowed);
        record.host = Some(head.host().to_string());
        record.port = Some(head.port());
        record.forwarded = Some(ForwardedLine {
            method: head.method().to_string(),
            target: head.origin_form(),
            version: head.version().to_string(),
        });
        record
    }

    /// An allowed CONNECT tunnel.
    pub fn tunneled(client: SocketAddr, head: &HttpRequestHead) -> Self {
        let mut record = Self::new(client, RequestKind::Connect, PolicyDecision::Allowed);
        record.host = Some(head.host().to_string());
        record.port = Some(head.port());
        record
    }

    /// Fill in the byte count once the transfer is over.
    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = Some(bytes);
        self
    }

    /// Note why an allowed session did not complete.
    pub fn with_failure(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn client(&self) -> SocketAddr {
        self.client
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn decision(&self) -> PolicyDecision {
        self.decision
    }

    pub fn bytes(&self) -> Option<u64> {
        self.bytes
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// `ALLOWED`, `BLOCKED` or `CONNECT`.
    pub fn action(&self) -> &'static str {
        match (self.decision, self.kind) {
            (PolicyDecision::Blocked, _) => "BLOCKED",
            (PolicyDecision::Allowed, RequestKind::Http) => "ALLOWED",
            (PolicyDecision::Allowed, RequestKind::Connect) => "CONNECT",
        }
    }

    /// Emit the record as a structured tracing event.
    pub fn trace(&self) {
        tracing::info!(
            target: "forward_proxy::audit",
            client = %self.client,
            kind = %self.kind,
            decision = %self.decision,
            host = self.host.as_deref().unwrap_or("-"),
            port = self.port,
            bytes = self.bytes,
            failure = self.failure.as_deref(),
            "session finished"
        );
    }
}

/// Renders the line recording why a session failed:
/// `timestamp clientIP:clientPort ERROR detail`.
pub fn error_line(client: SocketAddr, detail: &str) -> String {
    format!("{} {} ERROR {}", Local::now().format(TIMESTAMP_FORMAT), client, detail)
}

/// Renders the audit log line:
/// `timestamp clientIP:clientPort ACTION host[:port] [method target version]`.
impl std::fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} ",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.client,
            self.action()
        )?;

        let host = self.host.as_deref().unwrap_or("-");
        match (self.decision, self.port) {
            (PolicyDecision::Allowed, Some(port)) => write!(f, "{}:{}", host, port)?,
            _ => write!(f, "{}", host)?,
        }

        if let (PolicyDecision::Allowed, Some(line)) = (self.decision, &self.forwarded) {
            write!(f, " {} {} {}", line.method, line.target, line.version)?;
        }
        Ok(())
    }
}
