//! TCP listener with pluggable admission control.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Ask the concurrency manager for a slot before each accept
//! - Surface bind failures as startup errors

use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::config::ListenerConfig;
use crate::net::concurrency::{self, ConcurrencyManager, SessionSlot};

/// Error type for listener operations.
#[derive(Error, Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] std::io::Error),
}

/// A TCP listener paired with the admission policy for new sessions.
#[derive(Debug)]
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Admission policy for new sessions.
    concurrency: Box<dyn ConcurrencyManager>,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let bind_error = |source| ListenerError::Bind {
            addr: config.bind_address.clone(),
            source,
        };

        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            bind_error(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;

        Ok(Self::from_std_parts(
            listener,
            concurrency::from_limit(config.max_connections),
        ))
    }

    /// Wrap an already bound listener.
    pub fn from_std_parts(inner: TcpListener, concurrency: Box<dyn ConcurrencyManager>) -> Self {
        if let Ok(address) = inner.local_addr() {
            tracing::info!(
                address = %address,
                max_connections = ?concurrency.limit(),
                "Listener bound"
            );
        }
        Self { inner, concurrency }
    }

    /// Accept a new connection once the concurrency manager admits it.
    ///
    /// Returns the stream and a slot that must be held for the session's
    /// lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, SessionSlot), ListenerError> {
        // Acquire the slot first (backpressure)
        let slot = self.concurrency.admit().await;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(peer_addr = %addr, "Connection accepted");

        Ok((stream, addr, slot))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Configured maximum concurrent sessions, if bounded.
    pub fn max_connections(&self) -> Option<usize> {
        self.concurrency.limit()
    }
}
