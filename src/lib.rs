//! Forward HTTP proxy library.
//!
//! Accepts HTTP/1.x proxy requests, refuses hosts on a blocklist, forwards
//! plain HTTP requests in origin-form, and tunnels CONNECT requests as raw
//! bytes. Every session leaves one line in the audit log.

pub mod audit;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod policy;
pub mod proxy;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use lifecycle::Shutdown;
pub use proxy::ProxyServer;
