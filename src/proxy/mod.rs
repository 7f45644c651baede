//! Proxy session subsystem.
//!
//! # Data Flow
//! ```text
//! server.rs (accept loop, one task per session)
//!     → session.rs (read head → policy → dispatch → audit)
//!         → forward.rs (plain HTTP: origin-form rewrite, stream response)
//!         → tunnel.rs  (CONNECT: 200, then blind bidirectional relay)
//!     → origin.rs (connect with timeout)
//!     → relay.rs  (fixed-buffer copy with idle timeout)
//! ```
//!
//! # Design Decisions
//! - Sessions share only the immutable policy, the audit sink and settings
//! - Every session ends with exactly one audit record

pub mod forward;
pub mod origin;
pub mod relay;
pub mod server;
pub mod session;
pub mod tunnel;

use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditLog;
use crate::config::ProxyConfig;
use crate::http::HeadLimits;
use crate::policy::PolicyStore;

pub use relay::RelayOptions;
pub use server::ProxyServer;
pub use session::Session;

/// Per-session timeouts and buffer sizes, derived from config once.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Origin connect deadline.
    pub connect_timeout: Duration,
    /// Relay buffer and idle timeout.
    pub relay: RelayOptions,
    /// Request head bounds.
    pub head: HeadLimits,
}

impl From<&ProxyConfig> for SessionSettings {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            connect_timeout: config.timeouts.connect(),
            relay: RelayOptions {
                buffer_size: config.limits.buffer_size,
                idle_timeout: config.timeouts.io(),
            },
            head: HeadLimits {
                max_bytes: config.limits.max_header_bytes,
                chunk_size: config.limits.buffer_size,
                timeout: config.timeouts.header_read(),
            },
        }
    }
}

/// State shared read-only by every session.
#[derive(Clone)]
pub struct ProxyContext {
    pub policy: Arc<PolicyStore>,
    pub audit: Arc<dyn AuditLog>,
    pub settings: SessionSettings,
}

impl ProxyContext {
    pub fn new(policy: PolicyStore, audit: Arc<dyn AuditLog>, settings: SessionSettings) -> Self {
        Self {
            policy: Arc::new(policy),
            audit,
            settings,
        }
    }
}

impl std::fmt::Debug for ProxyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyContext")
            .field("blocked_domains", &self.policy.blocked_count())
            .field("settings", &self.settings)
            .finish()
    }
}
