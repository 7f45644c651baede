//! Accept loop and session supervision.
//!
//! # Responsibilities
//! - Accept connections until shutdown is requested
//! - Spawn one task per session, each with its own tracing span
//! - Stop accepting on shutdown, then drain live sessions up to a deadline
//!
//! # Design Decisions
//! - An accept error never stops the server; it is logged and retried
//! - Sessions left after the drain deadline are abandoned with the runtime

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::net::{ConnectionTracker, Listener, SessionSlot};
use crate::observability::metrics;
use crate::proxy::{ProxyContext, Session};

/// Pause after a failed accept, so a persistent error (e.g. fd exhaustion)
/// does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The forward proxy server.
#[derive(Debug)]
pub struct ProxyServer {
    listener: Listener,
    ctx: ProxyContext,
    tracker: ConnectionTracker,
    drain_timeout: Duration,
}

impl ProxyServer {
    pub fn new(listener: Listener, ctx: ProxyContext, drain_timeout: Duration) -> Self {
        Self {
            listener,
            ctx,
            tracker: ConnectionTracker::new(),
            drain_timeout,
        }
    }

    /// Address the server accepts on.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle on the live-session count.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Serve until `shutdown` is cancelled, then drain.
    pub async fn run(self, shutdown: CancellationToken) {
        let Self {
            listener,
            ctx,
            tracker,
            drain_timeout,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Proxy server accepting connections");
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, slot)) => spawn_session(&tracker, &ctx, stream, peer, slot),
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);
        let active = tracker.active_count();
        tracing::info!(active_sessions = active, "Listener closed, draining sessions");

        match tokio::time::timeout(drain_timeout, tracker.wait_idle()).await {
            Ok(()) => tracing::info!("All sessions drained"),
            Err(_) => tracing::warn!(
                remaining = tracker.active_count(),
                timeout = ?drain_timeout,
                "Drain deadline passed, abandoning sessions"
            ),
        }
    }
}

fn spawn_session(
    tracker: &ConnectionTracker,
    ctx: &ProxyContext,
    stream: TcpStream,
    peer: SocketAddr,
    slot: SessionSlot,
) {
    let guard = tracker.track();
    let id = guard.id();
    let span = tracing::info_span!("session", id = %id, peer = %peer);
    let session = Session::new(stream, peer, ctx.clone());

    metrics::session_opened();
    tokio::spawn(
        async move {
            let _slot = slot;
            let _guard = guard;
            session.run().await;
            metrics::session_closed();
        }
        .instrument(span),
    );
}
