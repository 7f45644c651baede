//! One proxy session per accepted connection.
//!
//! # Responsibilities
//! - Read the request head under the header deadline
//! - Consult the policy before any origin is contacted
//! - Dispatch to forwarding or tunneling
//! - Close the client and emit exactly one audit record, preceded by an
//!   `ERROR` line when the session failed

use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::audit::AuditRecord;
use crate::error::{ProxyError, Result};
use crate::http::read_request_head;
use crate::net::SessionState;
use crate::observability::metrics;
use crate::proxy::relay::write_all_timed;
use crate::proxy::{forward, tunnel, ProxyContext};

/// A single client connection and its progress through the session states.
#[derive(Debug)]
pub struct Session {
    client: TcpStream,
    peer: SocketAddr,
    state: SessionState,
    ctx: ProxyContext,
}

impl Session {
    pub fn new(client: TcpStream, peer: SocketAddr, ctx: ProxyContext) -> Self {
        Self {
            client,
            peer,
            state: SessionState::ReadingHead,
            ctx,
        }
    }

    /// Drive the session to completion.
    ///
    /// The audit record is written to the sink before it is returned.
    pub async fn run(mut self) -> AuditRecord {
        let record = self.drive().await;
        self.transition(SessionState::Closed);

        if let Err(e) = self.client.shutdown().await {
            tracing::trace!(error = %e, "Client already closed");
        }

        metrics::record_session(&record);
        record.trace();
        if let Some(failure) = record.failure() {
            self.ctx.audit.error(self.peer, failure);
        }
        self.ctx.audit.record(record.clone());
        record
    }

    async fn drive(&mut self) -> AuditRecord {
        let settings = self.ctx.settings;

        let (head, remainder) = match read_request_head(&mut self.client, settings.head).await {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                self.transition(SessionState::Blocked);
                return AuditRecord::empty(self.peer);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Rejecting request head");
                self.transition(SessionState::Blocked);
                self.reject(&e).await;
                return AuditRecord::malformed(self.peer, e.to_string());
            }
        };

        tracing::debug!(
            method = head.method(),
            host = head.host(),
            port = head.port(),
            "Request head received"
        );

        let decision = self.ctx.policy.decide(head.host());
        if !decision.is_allowed() {
            self.transition(SessionState::Blocked);
            let denied = ProxyError::PolicyBlocked {
                host: head.host().to_string(),
            };
            tracing::info!(host = head.host(), "Blocked by policy");
            self.reject(&denied).await;
            return AuditRecord::blocked(self.peer, &head);
        }

        if head.is_connect() {
            self.transition(SessionState::Tunneling);
            let (bytes, result) = tunnel::tunnel(&mut self.client, &head, &remainder, &settings).await;
            self.finish(AuditRecord::tunneled(self.peer, &head), bytes, result)
                .await
        } else {
            self.transition(SessionState::Forwarding);
            let (bytes, result) = forward::forward(&mut self.client, &head, &remainder, &settings).await;
            self.finish(AuditRecord::forwarded(self.peer, &head), bytes, result)
                .await
        }
    }

    async fn finish(&mut self, record: AuditRecord, bytes: u64, result: Result<()>) -> AuditRecord {
        let record = record.with_bytes(bytes);
        match result {
            Ok(()) => record,
            Err(e) => {
                if e.is_origin_failure() {
                    metrics::origin_failure(record.kind());
                    tracing::warn!(error = %e, "Origin failure");
                } else {
                    tracing::debug!(error = %e, "Transfer ended early");
                }
                self.reject(&e).await;
                record.with_failure(e.to_string())
            }
        }
    }

    /// Send the client the response owed for `error`, if any.
    async fn reject(&mut self, error: &ProxyError) {
        let Some(response) = error.response() else {
            return;
        };
        let idle = self.ctx.settings.relay.idle_timeout;
        if let Err(e) = write_all_timed(&mut self.client, &response.to_bytes(), idle).await {
            tracing::debug!(status = response.status(), error = %e, "Failed to send response");
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }
}
