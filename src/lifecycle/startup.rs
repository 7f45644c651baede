//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Load the blocklist and open the audit log before accepting traffic
//! - Bind the listener and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: a configured blocklist that cannot be read aborts startup
//! - Subsystems initialize in order, not concurrently

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::audit::{AuditLog, FileAuditLog};
use crate::config::{PolicyConfig, ProxyConfig};
use crate::lifecycle::{signals, Shutdown};
use crate::net::{Listener, ListenerError};
use crate::observability::metrics;
use crate::policy::{BlockList, BlockListError, PolicyStore};
use crate::proxy::{ProxyContext, ProxyServer, SessionSettings};

/// Errors that prevent the proxy from starting.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Blocklist(#[from] BlockListError),

    #[error("Failed to open audit log {path:?}: {source}")]
    AuditLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid metrics address {0}")]
    MetricsAddress(String),

    #[error("Failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Build the policy store from configuration.
pub fn load_policy(config: &PolicyConfig) -> Result<PolicyStore, BlockListError> {
    match &config.blocklist_path {
        Some(path) => Ok(PolicyStore::new(BlockList::load(path)?)),
        None => {
            tracing::warn!("No blocklist configured, every host is allowed");
            Ok(PolicyStore::allow_all())
        }
    }
}

/// Start every subsystem and serve until SIGINT or SIGTERM.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let policy = load_policy(&config.policy)?;
    let audit = FileAuditLog::open(&config.audit.log_path).map_err(|source| {
        StartupError::AuditLog {
            path: config.audit.log_path.clone(),
            source,
        }
    })?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    serve(&config, policy, Arc::new(audit), shutdown).await
}

/// Bind and serve with the given policy and audit sink until `shutdown`.
pub async fn serve(
    config: &ProxyConfig,
    policy: PolicyStore,
    audit: Arc<dyn AuditLog>,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    let listener = Listener::bind(&config.listener).await?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        blocked_domains = policy.blocked_count(),
        audit_log = ?config.audit.log_path,
        "Forward proxy ready"
    );

    let ctx = ProxyContext::new(policy, audit, SessionSettings::from(config));
    let server = ProxyServer::new(
        listener,
        ctx,
        Duration::from_secs(config.shutdown.drain_secs),
    );
    server.run(shutdown.token()).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
